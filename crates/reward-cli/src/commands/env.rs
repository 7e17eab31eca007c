use super::{wants_help, EXIT_SUCCESS};
use reward_core::Engine;

pub fn run(engine: &Engine, args: &[String]) -> Result<u8, String> {
    if wants_help(args) {
        let help = engine.composer_help().map_err(|e| e.to_string())?;
        print!("{help}");
        return Ok(EXIT_SUCCESS);
    }
    engine.env(args).map_err(|e| e.to_string())?;
    Ok(EXIT_SUCCESS)
}

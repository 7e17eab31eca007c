use super::EXIT_SUCCESS;
use reward_core::Engine;

pub fn run(engine: &Engine, command: &[String]) -> Result<u8, String> {
    engine.debug(command).map_err(|e| e.to_string())?;
    Ok(EXIT_SUCCESS)
}

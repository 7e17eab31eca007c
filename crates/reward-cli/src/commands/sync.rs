use super::{Progress, EXIT_SUCCESS};
use reward_core::{Engine, SyncCommand};

pub fn run(engine: &Engine, command: SyncCommand) -> Result<u8, String> {
    match command {
        SyncCommand::Start => {
            let progress = Progress::start("starting file sync");
            match engine.sync(command) {
                Ok(_) => progress.finish(true, "file sync is watching for changes"),
                Err(e) => {
                    progress.finish(false, "file sync did not start");
                    return Err(e.to_string());
                }
            }
        }
        SyncCommand::List => {
            let listing = engine.sync(command).map_err(|e| e.to_string())?;
            print!("{listing}");
        }
        other => {
            engine.sync(other).map_err(|e| e.to_string())?;
        }
    }
    Ok(EXIT_SUCCESS)
}

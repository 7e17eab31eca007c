use super::EXIT_SUCCESS;
use reward_core::{DbOptions, Engine};
use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbCommand {
    Connect,
    Import,
}

pub fn run(
    engine: &Engine,
    command: DbCommand,
    root: bool,
    extra: Vec<String>,
) -> Result<u8, String> {
    let opts = DbOptions { root, extra };
    match command {
        DbCommand::Connect => engine.db_connect(&opts).map_err(|e| e.to_string())?,
        DbCommand::Import => {
            let stdin = std::io::stdin();
            if stdin.is_terminal() {
                return Err(
                    "db import reads the dump from stdin, e.g. `reward db import < dump.sql`"
                        .to_owned(),
                );
            }
            engine
                .db_import(&opts, Box::new(stdin))
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(EXIT_SUCCESS)
}

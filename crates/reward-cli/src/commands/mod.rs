pub mod db;
pub mod debug;
pub mod env;
pub mod svc;
pub mod sync;

use indicatif::{ProgressBar, ProgressStyle};
use reward_config::ConfigSnapshot;
use reward_core::{check_project, install_signal_cleanup, CoreError, Engine};
use reward_runtime::{DockerRuntime, MutagenCli, ShellComposer};
use std::sync::Arc;
use std::time::Duration;

pub use db::DbCommand;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Wire the engine to Docker, the shell composer and mutagen, and make sure
/// scratch files are removed when the process is interrupted.
pub fn build_engine(cfg: ConfigSnapshot) -> Result<Engine, String> {
    let host = cfg.docker_host();
    let runtime = DockerRuntime::connect(host.as_deref()).map_err(|e| e.to_string())?;
    let composer = ShellComposer::detect(host);
    let engine = Engine::new(
        cfg,
        Arc::new(runtime),
        Arc::new(composer),
        Arc::new(MutagenCli::new()),
    )
    .with_confirm(Arc::new(confirm));
    install_signal_cleanup(Arc::clone(engine.scratch())).map_err(|e| e.to_string())?;
    Ok(engine)
}

/// Checks that need neither Docker nor a subprocess, run before connecting.
pub fn preflight(cfg: &ConfigSnapshot, action: &str, project_scoped: bool) -> Result<(), String> {
    if project_scoped {
        check_project(cfg, action)
            .map(|_| ())
            .map_err(|e| e.to_string())
    } else {
        cfg.check_invoker(action)
            .map_err(|e| CoreError::from(e).to_string())
    }
}

/// Yes/no prompt; anything but an explicit yes declines.
pub fn confirm(prompt: &str) -> bool {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}

/// Spinner on stderr for operations that wait on an external tool. Hidden
/// when stderr is not a terminal.
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub fn start(msg: &str) -> Self {
        let bar = if console::Term::stderr().is_term() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed})")
                .expect("valid template")
                .tick_chars("◐◓◑◒ "),
        );
        bar.set_message(msg.to_owned());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Replace the spinner with a final line.
    pub fn finish(self, ok: bool, msg: &str) {
        let mark = if ok {
            console::style("done").green()
        } else {
            console::style("failed").red()
        };
        self.bar
            .set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
        self.bar.finish_with_message(format!("{mark}: {msg}"));
    }
}

/// Whether `args` only asks for help.
pub fn wants_help(args: &[String]) -> bool {
    match args {
        [] => true,
        [only] => matches!(only.as_str(), "-h" | "--help" | "help"),
        _ => false,
    }
}

//! The external composition tool.

use crate::process;
use crate::RuntimeError;
use std::io::Read;
use std::process::Command;
use tracing::debug;

/// Oldest composer release whose `version --short` and merge semantics are
/// supported.
pub const COMPOSE_MIN_VERSION: &str = "1.25.0";

/// How a composer invocation's output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Inherit the terminal; nothing is returned.
    Stream,
    /// Collect stdout and stderr and return them.
    Capture,
}

/// Capability over the external composer (`docker compose`).
pub trait Composer: Send + Sync {
    /// Output of `version --short`.
    fn version(&self) -> Result<String, RuntimeError>;

    /// Run with `args` (file, project and user arguments already assembled).
    fn run(&self, args: &[String], mode: OutputMode) -> Result<String, RuntimeError>;

    /// Run with `input` streamed into the composer's stdin.
    fn run_with_input(
        &self,
        args: &[String],
        input: Box<dyn Read + Send>,
    ) -> Result<(), RuntimeError>;
}

/// [`Composer`] that shells out to `docker-compose`, or to the `docker
/// compose` plugin when the standalone binary is not installed.
#[derive(Debug, Clone)]
pub struct ShellComposer {
    program: String,
    prefix: Vec<String>,
    docker_host: Option<String>,
}

impl ShellComposer {
    pub fn detect(docker_host: Option<String>) -> Self {
        let (program, prefix) = if which::which("docker-compose").is_ok() {
            ("docker-compose".to_owned(), Vec::new())
        } else {
            ("docker".to_owned(), vec!["compose".to_owned()])
        };
        debug!(program, ?prefix, "composer selected");
        Self {
            program,
            prefix,
            docker_host,
        }
    }

    fn command(&self, args: &[String]) -> Result<Command, RuntimeError> {
        let mut cmd = process::command(&self.program)?;
        cmd.args(&self.prefix).args(args);
        if let Some(host) = &self.docker_host {
            cmd.env("DOCKER_HOST", host);
        }
        Ok(cmd)
    }
}

impl Composer for ShellComposer {
    fn version(&self) -> Result<String, RuntimeError> {
        let args = ["version".to_owned(), "--short".to_owned()];
        let out = process::run_captured(&self.program, self.command(&args)?)?;
        Ok(out.trim().to_owned())
    }

    fn run(&self, args: &[String], mode: OutputMode) -> Result<String, RuntimeError> {
        let cmd = self.command(args)?;
        match mode {
            OutputMode::Stream => process::run_streamed(&self.program, cmd).map(|()| String::new()),
            OutputMode::Capture => process::run_captured(&self.program, cmd),
        }
    }

    fn run_with_input(
        &self,
        args: &[String],
        input: Box<dyn Read + Send>,
    ) -> Result<(), RuntimeError> {
        process::run_with_input(&self.program, self.command(args)?, input)
    }
}

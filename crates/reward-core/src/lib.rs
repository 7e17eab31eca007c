//! Lifecycle orchestration for Reward environments.
//!
//! This crate ties the configuration snapshot, the composition pipeline and
//! the runtime capabilities together into the [`Engine`]: the state machine
//! behind `env`, `svc`, `sync` and `db`. It also attaches the shared
//! services to project networks ([`peering`]), keeps one file-sync session
//! per project ([`sync`], driven by the transition table in [`lifecycle`])
//! and removes scratch files when the process is interrupted ([`signals`]).

pub mod engine;
pub mod lifecycle;
pub mod peering;
pub mod signals;
pub mod sync;

pub use engine::{check_project, Confirm, DbOptions, Engine, SyncCommand};
pub use lifecycle::{plan, SyncEvent, SyncState, SyncStep, Transition};
pub use peering::{peer_services, peered_services, PeerAction, PROXY_SERVICE};
pub use signals::install_signal_cleanup;
pub use sync::{container_changed, session_container_id, session_state, SyncCoordinator};

use reward_compose::ComposeError;
use reward_config::ConfigError;
use reward_runtime::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("environment name is empty; set {0} in the project .env file")]
    EnvEmpty(String),
    #[error("running as the superuser is not allowed (set {0}=true to override)")]
    NotAllowed(String),
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("cannot find container {name}: {source}")]
    Container {
        name: String,
        #[source]
        source: RuntimeError,
    },
    #[error(transparent)]
    Template(ComposeError),
    #[error("{program} exited with {}", describe_exit(.code))]
    SubprocessFailed { program: String, code: Option<i32> },
    #[error("file sync failed: {0}")]
    SyncFailed(String),
    #[error(transparent)]
    Runtime(RuntimeError),
    #[error("cannot remove scratch files: {0}")]
    Cleanup(#[source] std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[allow(clippy::ref_option)]
fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_owned(),
    }
}

impl CoreError {
    /// Wrap a lookup failure with the container it was about.
    pub fn container(name: &str, source: RuntimeError) -> Self {
        Self::Container {
            name: name.to_owned(),
            source,
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Invalid(msg) => Self::ConfigInvalid(msg),
            ConfigError::EnvEmpty(key) => Self::EnvEmpty(key),
            ConfigError::NotAllowed(key) => Self::NotAllowed(key),
            ConfigError::Io(e) => Self::Io(e),
            other => Self::ConfigInvalid(other.to_string()),
        }
    }
}

impl From<RuntimeError> for CoreError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::SubprocessFailed { program, code, .. } => {
                Self::SubprocessFailed { program, code }
            }
            RuntimeError::ProgramMissing(program) => {
                Self::PreconditionFailed(format!("required program not found: {program}"))
            }
            other => Self::Runtime(other),
        }
    }
}

impl From<ComposeError> for CoreError {
    fn from(e: ComposeError) -> Self {
        match e {
            ComposeError::Config(e) => e.into(),
            ComposeError::Io(e) => Self::Io(e),
            other => Self::Template(other),
        }
    }
}

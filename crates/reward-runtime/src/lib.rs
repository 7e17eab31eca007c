//! Container runtime introspection and external tool drivers for Reward.
//!
//! This crate is the execution layer. It defines the narrow capability traits
//! the orchestrator talks through: [`ContainerRuntime`] (label-scoped
//! container and network queries, network attach/detach) with a bollard-backed
//! Docker implementation and an in-memory mock, [`Composer`] for the external
//! composition tool, and [`SyncTool`] for the external file synchroniser.
//! It also hosts prerequisite and version checks and the SQL stream rewriter
//! used by database imports.

pub mod compose;
pub mod docker;
pub mod introspect;
pub mod mock;
pub mod prereq;
mod process;
pub mod sqlpipe;
pub mod sync;
pub mod version;

pub use compose::{Composer, OutputMode, ShellComposer, COMPOSE_MIN_VERSION};
pub use docker::DockerRuntime;
pub use introspect::{
    ContainerInfo, ContainerRuntime, Endpoint, Introspector, NetworkFilter, DOCKER_MIN_VERSION,
};
pub use mock::{CallLog, Invocation, MockComposer, MockRuntime, MockSync};
pub use prereq::{
    check_env_prereqs, format_missing, install_sync_tool, InstallMethod, MissingPrereq,
};
pub use sqlpipe::{rewrite_sql_line, SqlRewriter};
pub use sync::{MutagenCli, SyncSessionSpec, SyncTool, SyncVerb};
pub use version::{meets_minimum, parse_version, Version};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("container runtime error: {0}")]
    Api(String),
    #[error("no containers found matching {0}")]
    NotFound(String),
    #[error("too many containers found for {name}: {}", .matches.join(" "))]
    Ambiguous { name: String, matches: Vec<String> },
    #[error("container '{container}' is not attached to network '{network}'")]
    NoSuchNetwork { container: String, network: String },
    #[error("invalid address '{address}' for container '{container}'")]
    InvalidAddress { container: String, address: String },
    #[error("{program} exited with {}", describe_exit(.code))]
    SubprocessFailed {
        program: String,
        code: Option<i32>,
        output: String,
    },
    #[error("required program not found: {0}")]
    ProgramMissing(String),
    #[error("cannot parse version '{0}'")]
    Version(String),
    #[error("download failed: {0}")]
    Download(String),
}

#[allow(clippy::ref_option)]
fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_owned(),
    }
}

impl RuntimeError {
    /// Exit code of a failed subprocess, if that is what this error is.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::SubprocessFailed { code, .. } => *code,
            _ => None,
        }
    }
}

//! Layered configuration for Reward environments.
//!
//! This crate is the schema layer: it merges built-in defaults, the user YAML
//! file, the project `.env`, `REWARD_*` environment variables and command-line
//! flags into one immutable [`ConfigSnapshot`]. It also defines the recognised
//! environment types ([`EnvType`]), the typed feature toggles ([`Feature`],
//! [`Features`]), project-name validation ([`ProjectName`]) and host platform
//! detection ([`Platform`]).

pub mod defaults;
pub mod loader;
pub mod platform;
pub mod snapshot;
pub mod types;
pub mod value;

pub use loader::ConfigLoader;
pub use platform::{HostOs, Platform};
pub use snapshot::ConfigSnapshot;
pub use types::{EnvType, Feature, Features, ProjectName};
pub use value::is_enabled;

use thiserror::Error;

/// Application name. Prefixes configuration keys, labels and directories.
pub const APP_NAME: &str = "reward";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("environment name is empty; set {0} in the project .env file")]
    EnvEmpty(String),
    #[error("running as the superuser is not allowed (set {0}=true to override)")]
    NotAllowed(String),
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("failed to parse dotenv file {path}: {source}")]
    Dotenv {
        path: String,
        source: dotenvy::Error,
    },
}

/// Build the `reward_<suffix>` key for an application-scoped setting.
pub fn app_key(suffix: &str) -> String {
    format!("{APP_NAME}_{suffix}")
}

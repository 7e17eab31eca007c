//! Composition assembly for Reward environments.
//!
//! Selects template fragments for an environment type and its enabled
//! features ([`select`]), renders each one against the configuration
//! snapshot ([`render`]), writes the results to scratch files the external
//! composer reads ([`scratch`]), and cleans the composer's output before the
//! user sees it ([`filter`]). [`traefik`] writes the shared proxy's own
//! configuration files.

pub mod assets;
pub mod filter;
pub mod render;
pub mod scratch;
pub mod select;
pub mod traefik;

pub use filter::OutputFilter;
pub use render::{render_fragments, render_sync_config, Composition, RenderedFragment, Renderer};
pub use scratch::{compose_args, ScratchGuard, ScratchRegistry};
pub use traefik::{write_traefik_config, TraefikFiles};
pub use select::{
    select_environment, select_services, select_sync_config, Fragment, FragmentOrigin,
    FragmentSet, TemplateSources,
};

use reward_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("cannot parse template {name}: {source}")]
    TemplateParse {
        name: String,
        #[source]
        source: tera::Error,
    },
    #[error("cannot execute template {name}: {source}")]
    TemplateExec {
        name: String,
        #[source]
        source: tera::Error,
    },
    #[error("template {name} did not render to valid YAML: {source}")]
    Yaml {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("cannot read template override {}: {source}", .path.display())]
    Override {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("embedded template {0} is missing")]
    MissingAsset(String),
    #[error("composition I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

//! The external file synchroniser (mutagen).

use crate::process;
use crate::RuntimeError;
use std::fmt;
use std::path::PathBuf;

/// Session-level verbs addressed by label selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncVerb {
    Terminate,
    Pause,
    Resume,
    Flush,
    Monitor,
    Reset,
}

impl SyncVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Terminate => "terminate",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Flush => "flush",
            Self::Monitor => "monitor",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for SyncVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a new two-way session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSessionSpec {
    pub config_file: PathBuf,
    /// `key=value` label attached to the session.
    pub label: String,
    pub ignores: Vec<String>,
    /// Host side endpoint.
    pub alpha: String,
    /// Container side endpoint, `docker://<id><dir>`.
    pub beta: String,
}

impl SyncSessionSpec {
    /// Arguments following `sync create`.
    pub fn create_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c".to_owned(),
            self.config_file.display().to_string(),
            "--label".to_owned(),
            self.label.clone(),
        ];
        for ignore in self.ignores.iter().filter(|i| !i.is_empty()) {
            args.push("--ignore".to_owned());
            args.push(ignore.clone());
        }
        args.push(self.alpha.clone());
        args.push(self.beta.clone());
        args
    }
}

pub trait SyncTool: Send + Sync {
    fn version(&self) -> Result<String, RuntimeError>;

    fn create(&self, spec: &SyncSessionSpec) -> Result<(), RuntimeError>;

    /// Captured `sync list` output for sessions matching `label`.
    fn list(&self, label: &str) -> Result<String, RuntimeError>;

    fn control(&self, verb: SyncVerb, label: &str) -> Result<(), RuntimeError>;
}

/// [`SyncTool`] shelling out to the `mutagen` binary.
#[derive(Debug, Clone)]
pub struct MutagenCli {
    program: String,
}

impl Default for MutagenCli {
    fn default() -> Self {
        Self {
            program: "mutagen".to_owned(),
        }
    }
}

impl MutagenCli {
    pub fn new() -> Self {
        Self::default()
    }

    fn sync_args(verb: &str, label: &str) -> Vec<String> {
        vec![
            "sync".to_owned(),
            verb.to_owned(),
            "--label-selector".to_owned(),
            label.to_owned(),
        ]
    }
}

impl SyncTool for MutagenCli {
    fn version(&self) -> Result<String, RuntimeError> {
        let mut cmd = process::command(&self.program)?;
        cmd.arg("version");
        Ok(process::run_captured(&self.program, cmd)?.trim().to_owned())
    }

    fn create(&self, spec: &SyncSessionSpec) -> Result<(), RuntimeError> {
        let mut cmd = process::command(&self.program)?;
        cmd.args(["sync", "create"]).args(spec.create_args());
        process::run_streamed(&self.program, cmd)
    }

    fn list(&self, label: &str) -> Result<String, RuntimeError> {
        let mut cmd = process::command(&self.program)?;
        cmd.args(Self::sync_args("list", label));
        process::run_captured(&self.program, cmd)
    }

    fn control(&self, verb: SyncVerb, label: &str) -> Result<(), RuntimeError> {
        let mut cmd = process::command(&self.program)?;
        cmd.args(Self::sync_args(verb.as_str(), label));
        process::run_streamed(&self.program, cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_args_skip_empty_ignores() {
        let spec = SyncSessionSpec {
            config_file: PathBuf::from("/p/.reward/mutagen.yml"),
            label: "reward-sync=shop".to_owned(),
            ignores: vec!["node_modules".to_owned(), String::new()],
            alpha: "/p".to_owned(),
            beta: "docker://abc123/var/www/html".to_owned(),
        };
        assert_eq!(
            spec.create_args(),
            vec![
                "-c",
                "/p/.reward/mutagen.yml",
                "--label",
                "reward-sync=shop",
                "--ignore",
                "node_modules",
                "/p",
                "docker://abc123/var/www/html",
            ]
        );
    }

    #[test]
    fn verb_names() {
        assert_eq!(SyncVerb::Terminate.to_string(), "terminate");
        assert_eq!(
            MutagenCli::sync_args("pause", "reward-sync=shop"),
            vec!["sync", "pause", "--label-selector", "reward-sync=shop"]
        );
    }
}

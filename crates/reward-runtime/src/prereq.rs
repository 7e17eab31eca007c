use crate::{process, RuntimeError};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// An external binary that is not installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPrereq {
    Docker,
    /// Neither `docker-compose` nor the `docker compose` plugin works.
    Compose,
    Mutagen,
}

impl MissingPrereq {
    pub fn binary(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Compose => "docker-compose",
            Self::Mutagen => "mutagen",
        }
    }

    fn needed_for(self) -> &'static str {
        match self {
            Self::Docker => "inspecting and networking environment containers",
            Self::Compose => "starting and stopping environment services",
            Self::Mutagen => "syncing the project directory into the php-fpm container",
        }
    }

    fn install_hint(self) -> &'static str {
        match self {
            Self::Docker => "https://docs.docker.com/get-docker/",
            Self::Compose => "https://docs.docker.com/compose/install/",
            Self::Mutagen => "https://mutagen.io/documentation/introduction/installation",
        }
    }
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is used for {}; see {}",
            self.binary(),
            self.needed_for(),
            self.install_hint()
        )
    }
}

/// Docker plus a working composer. The compose plugin is only probed when
/// the standalone binary is absent.
pub fn check_env_prereqs() -> Vec<MissingPrereq> {
    if which::which("docker").is_err() {
        return vec![MissingPrereq::Docker];
    }
    if which::which("docker-compose").is_err() && !compose_plugin_works() {
        return vec![MissingPrereq::Compose];
    }
    Vec::new()
}

fn compose_plugin_works() -> bool {
    process::command("docker")
        .and_then(|mut cmd| {
            cmd.args(["compose", "version"]);
            process::run_captured("docker", cmd)
        })
        .is_ok()
}

/// One line naming what is missing, then one line per tool on how to get it.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let names: Vec<&str> = missing.iter().map(|m| m.binary()).collect();
    let mut msg = format!("not installed: {}", names.join(", "));
    for m in missing {
        let _ = write!(msg, "\n  {m}");
    }
    msg
}

/// How the synchroniser gets installed on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallMethod {
    Homebrew,
    /// Download an archive and unpack it into a directory.
    Archive { url: String },
}

/// Install the file synchroniser. `dest` is where archives are unpacked.
pub fn install_sync_tool(method: &InstallMethod, dest: &Path) -> Result<(), RuntimeError> {
    match method {
        InstallMethod::Homebrew => {
            info!("installing mutagen with homebrew");
            let mut cmd = process::command("brew")?;
            cmd.args(["install", "mutagen-io/mutagen/mutagen"]);
            process::run_streamed("brew", cmd)
        }
        InstallMethod::Archive { url } => {
            info!(url, "downloading mutagen");
            let archive = tempfile::Builder::new()
                .prefix("reward-mutagen-")
                .suffix(".zip")
                .tempfile()?;
            download(url, archive.path())?;

            std::fs::create_dir_all(dest)?;
            let mut cmd = process::command("tar")?;
            cmd.arg("-xf").arg(archive.path()).arg("-C").arg(dest);
            process::run_streamed("tar", cmd)?;
            debug!(dest = %dest.display(), "mutagen unpacked");
            Ok(())
        }
    }
}

fn download(url: &str, target: &Path) -> Result<(), RuntimeError> {
    let agent = ureq::Agent::new_with_defaults();
    let resp = agent.get(url).call().map_err(|e| match e {
        ureq::Error::StatusCode(code) => RuntimeError::Download(format!("{url}: HTTP {code}")),
        other => RuntimeError::Download(format!("{url}: {other}")),
    })?;
    let mut reader = resp.into_body().into_reader();
    let mut file = File::create(target)?;
    let bytes = io::copy(&mut reader, &mut file)?;
    debug!(url, bytes, "download complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_tool_says_where_to_get_it() {
        let line = MissingPrereq::Mutagen.to_string();
        assert!(line.starts_with("mutagen is used for syncing"), "{line}");
        assert!(line.ends_with("https://mutagen.io/documentation/introduction/installation"));
        assert!(MissingPrereq::Compose.to_string().contains("compose/install"));
    }

    #[test]
    fn report_names_the_missing_binaries_first() {
        let output = format_missing(&[MissingPrereq::Docker, MissingPrereq::Mutagen]);
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("not installed: docker, mutagen"));
        assert!(lines.next().unwrap().starts_with("  docker is used for"));
        assert!(lines.next().unwrap().starts_with("  mutagen is used for"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn unreachable_download_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = install_sync_tool(
            &InstallMethod::Archive {
                url: "http://127.0.0.1:9/mutagen.zip".to_owned(),
            },
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Download(_)));
    }
}

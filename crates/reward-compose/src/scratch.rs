//! Short-lived composition files handed to the external composer.

use crate::render::Composition;
use crate::ComposeError;
use reward_config::APP_NAME;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

/// Files written during one invocation, removed by [`ScratchRegistry::cleanup`].
///
/// Shared between the main flow and the signal handler, so registration and
/// cleanup take `&self`.
#[derive(Debug, Default)]
pub struct ScratchRegistry {
    paths: Mutex<Vec<PathBuf>>,
    keep: bool,
}

impl ScratchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave files in place on cleanup (`reward_skip_cleanup`).
    #[must_use]
    pub fn keep_files(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty `reward-*` file in the temp directory. It is
    /// registered while the list is locked, so a concurrent cleanup either
    /// runs before the file exists or removes it.
    fn create(&self) -> io::Result<NamedTempFile> {
        let mut paths = self.lock();
        let file = tempfile::Builder::new()
            .prefix(&format!("{APP_NAME}-"))
            .tempfile()?;
        paths.push(file.path().to_path_buf());
        Ok(file)
    }

    /// Write `content` to a new registered `reward-*` file.
    pub fn write(&self, content: &str) -> Result<PathBuf, ComposeError> {
        let mut file = self.create()?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        let path = file.into_temp_path().keep().map_err(|e| e.error)?;
        trace!(path = %path.display(), "scratch file written");
        Ok(path)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().clone()
    }

    /// Remove every registered file. Safe to call more than once; files that
    /// are already gone are not an error. Every file is attempted before the
    /// first failure is returned.
    pub fn cleanup(&self) -> io::Result<usize> {
        let drained: Vec<PathBuf> = self.lock().drain(..).collect();
        if self.keep {
            debug!(count = drained.len(), "keeping scratch files");
            return Ok(0);
        }

        let mut removed = 0;
        let mut first_err = None;
        for path in drained {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), "cannot remove scratch file: {e}");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                trace!(removed, "scratch files removed");
                Ok(removed)
            }
        }
    }

    /// Guard that cleans up when dropped, unless [`ScratchGuard::finish`]
    /// already did.
    pub fn guard(self: &Arc<Self>) -> ScratchGuard {
        ScratchGuard {
            registry: Some(Arc::clone(self)),
        }
    }
}

/// Runs [`ScratchRegistry::cleanup`] on drop, so files are removed on early
/// returns and panics too.
pub struct ScratchGuard {
    registry: Option<Arc<ScratchRegistry>>,
}

impl ScratchGuard {
    /// Clean up now and report the outcome instead of logging it on drop.
    pub fn finish(mut self) -> io::Result<usize> {
        match self.registry.take() {
            Some(registry) => registry.cleanup(),
            None => Ok(0),
        }
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            if let Err(e) = registry.cleanup() {
                warn!("scratch cleanup failed: {e}");
            }
        }
    }
}

/// Write `composition` to scratch files and build the composer command line:
/// one `-f <file>` pair per fragment in order, the project flags, then
/// `user_args`.
pub fn compose_args(
    registry: &ScratchRegistry,
    composition: &Composition,
    project_dir: &Path,
    project_name: &str,
    user_args: &[String],
) -> Result<Vec<String>, ComposeError> {
    let mut args = Vec::with_capacity(composition.len() * 2 + 4 + user_args.len());
    for fragment in composition.fragments() {
        let path = registry.write(&fragment.to_yaml()?)?;
        args.push("-f".to_owned());
        args.push(path.display().to_string());
    }
    args.extend([
        "--project-directory".to_owned(),
        project_dir.display().to_string(),
        "--project-name".to_owned(),
        project_name.to_owned(),
    ]);
    args.extend_from_slice(user_args);
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_are_prefixed_and_removed() {
        let registry = ScratchRegistry::new();
        let a = registry.write("a: 1\n").unwrap();
        let b = registry.write("b: 2\n").unwrap();
        assert_ne!(a, b);
        for p in [&a, &b] {
            let name = p.file_name().unwrap().to_string_lossy();
            assert!(name.starts_with("reward-"), "{name}");
            assert!(p.starts_with(std::env::temp_dir()));
        }
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "a: 1\n");

        assert_eq!(registry.cleanup().unwrap(), 2);
        assert!(!a.exists() && !b.exists());
        // second run has nothing left to do
        assert_eq!(registry.cleanup().unwrap(), 0);
    }

    #[test]
    fn already_deleted_files_are_ignored() {
        let registry = ScratchRegistry::new();
        let a = registry.write("x").unwrap();
        std::fs::remove_file(&a).unwrap();
        assert_eq!(registry.cleanup().unwrap(), 0);
    }

    #[test]
    fn keep_files_skips_removal() {
        let registry = ScratchRegistry::new().keep_files(true);
        let a = registry.write("x").unwrap();
        assert_eq!(registry.cleanup().unwrap(), 0);
        assert!(a.exists());
        std::fs::remove_file(a).unwrap();
    }

    #[test]
    fn guard_cleans_up_on_drop() {
        let registry = Arc::new(ScratchRegistry::new());
        let path = {
            let _guard = registry.guard();
            registry.write("x").unwrap()
        };
        assert!(!path.exists());
    }

    #[test]
    fn guard_cleans_up_on_panic() {
        let registry = Arc::new(ScratchRegistry::new());
        let inner = Arc::clone(&registry);
        let written = std::thread::spawn(move || {
            let _guard = inner.guard();
            let path = inner.write("x").unwrap();
            panic!("interrupted after writing {}", path.display());
        })
        .join();
        assert!(written.is_err());
        assert!(registry.paths().is_empty());
    }

    #[test]
    fn finished_guard_reports_and_disarms() {
        let registry = Arc::new(ScratchRegistry::new());
        let guard = registry.guard();
        let path = registry.write("x").unwrap();
        assert_eq!(guard.finish().unwrap(), 1);
        assert!(!path.exists());
    }

    #[test]
    fn file_is_tracked_before_content_is_written() {
        let registry = ScratchRegistry::new();
        let file = registry.create().unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(registry.paths(), [path.clone()]);
        // keep the empty file on disk as if the process stopped here
        let path = file.into_temp_path().keep().unwrap();
        assert_eq!(registry.cleanup().unwrap(), 1);
        assert!(!path.exists());
    }
}

//! File synchronisation between the project directory and the synced
//! container.

use crate::engine::Confirm;
use crate::lifecycle::{plan, SyncEvent, SyncState, SyncStep};
use crate::CoreError;
use regex::Regex;
use reward_compose::render_sync_config;
use reward_config::{ConfigSnapshot, HostOs, APP_NAME};
use reward_runtime::{
    format_missing, install_sync_tool, meets_minimum, parse_version, InstallMethod, Introspector,
    MissingPrereq, RuntimeError, SyncSessionSpec, SyncTool, SyncVerb,
};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

static SESSION_CONTAINER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"URL: docker://([^/\\]*)").expect("session URL pattern is valid")
});

/// Container id recorded in the session's container-side URL.
pub fn session_container_id(list_output: &str) -> Option<String> {
    SESSION_CONTAINER
        .captures(list_output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}

/// State of the session described by `list_output`.
pub fn session_state(list_output: &str) -> SyncState {
    let lower = list_output.to_lowercase();
    if !lower.contains("status:") {
        SyncState::Absent
    } else if lower.contains("[paused]") {
        SyncState::Paused
    } else {
        SyncState::Running
    }
}

/// A session must be recreated when it is bound to another container, when
/// the container is not running, or when there is no session.
pub fn container_changed(recorded: Option<&str>, current_id: &str, state: &str) -> bool {
    match recorded {
        None => true,
        Some(id) => id != current_id || state != "running",
    }
}

/// Keeps the project's single sync session in step with its environment.
pub struct SyncCoordinator<'a> {
    cfg: &'a ConfigSnapshot,
    tool: &'a dyn SyncTool,
    introspector: &'a Introspector,
    confirm: &'a Confirm,
    poll_interval: Duration,
}

impl<'a> SyncCoordinator<'a> {
    pub fn new(
        cfg: &'a ConfigSnapshot,
        tool: &'a dyn SyncTool,
        introspector: &'a Introspector,
        confirm: &'a Confirm,
    ) -> Self {
        Self {
            cfg,
            tool,
            introspector,
            confirm,
            poll_interval: Duration::from_secs(5),
        }
    }

    /// Delay between `list` calls while a new session starts.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// `<app>-sync=<project>`.
    pub fn label(&self) -> Result<String, CoreError> {
        Ok(format!("{APP_NAME}-sync={}", self.cfg.project_name()?))
    }

    /// Make sure the synchroniser is installed, offering to install it when
    /// it is missing. An old version only produces a warning.
    pub fn ensure_tool(&self) -> Result<(), CoreError> {
        let raw = match self.tool.version() {
            Ok(v) => v,
            Err(RuntimeError::ProgramMissing(_)) => {
                self.offer_install()?;
                self.tool.version()?
            }
            Err(e) => return Err(e.into()),
        };
        let required = self.cfg.mutagen_required_version();
        match parse_version(&raw) {
            Ok(installed) => {
                if !meets_minimum(&installed, &required).unwrap_or(true) {
                    warn!(
                        "mutagen {required} or greater is required (version {installed} is installed); please update mutagen"
                    );
                } else {
                    debug!(%installed, "mutagen version ok");
                }
            }
            Err(e) => warn!("cannot determine the mutagen version: {e}"),
        }
        Ok(())
    }

    fn offer_install(&self) -> Result<(), CoreError> {
        let missing = || CoreError::PreconditionFailed(format_missing(&[MissingPrereq::Mutagen]));
        let (method, prompt) = match self.cfg.os() {
            HostOs::Darwin => (
                InstallMethod::Homebrew,
                "Mutagen could not be found; would you like to install it via Homebrew?",
            ),
            HostOs::Windows => (
                InstallMethod::Archive {
                    url: self.cfg.mutagen_url(),
                },
                "Mutagen could not be found; would you like to download it?",
            ),
            HostOs::Linux => return Err(missing()),
        };
        if !(self.confirm)(prompt) {
            return Err(missing());
        }
        let dest = std::env::current_exe()?
            .parent()
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        install_sync_tool(&method, &dest)?;
        info!("mutagen installed");
        Ok(())
    }

    /// Tool check plus the per-project configuration file.
    pub fn prepare(&self) -> Result<(), CoreError> {
        self.ensure_tool()?;
        if render_sync_config(self.cfg, &self.cfg.sync_file())? {
            info!(path = %self.cfg.sync_file().display(), "sync configuration created");
        }
        Ok(())
    }

    pub fn list(&self) -> Result<String, CoreError> {
        Ok(self.tool.list(&self.label()?)?)
    }

    pub fn control(&self, verb: SyncVerb) -> Result<(), CoreError> {
        let label = self.label()?;
        debug!(%verb, label, "sync control");
        self.tool.control(verb, &label)?;
        Ok(())
    }

    /// Whether the synced container differs from the one the session in
    /// `list_output` is bound to. Lookup failures count as a change.
    pub fn synced_container_changed(&self, list_output: &str) -> bool {
        let name = self.cfg.synced_container();
        let state = match self.introspector.container_state_by_name(&name) {
            Ok(s) => s,
            Err(e) => {
                info!("cannot get the {name} container state ({e}); restarting sync");
                return true;
            }
        };
        let id = match self.introspector.container_id_by_name(&name) {
            Ok(id) => id,
            Err(e) => {
                info!("cannot get the {name} container id ({e}); restarting sync");
                return true;
            }
        };
        let recorded = session_container_id(list_output);
        let changed = container_changed(recorded.as_deref(), &id, &state);
        debug!(container = %name, %id, %state, ?recorded, changed, "synced container check");
        changed
    }

    /// Drive the session through `event`.
    pub fn apply(&self, event: SyncEvent) -> Result<SyncState, CoreError> {
        let output = self.list()?;
        let current = session_state(&output);
        let changed = event == SyncEvent::Up && self.synced_container_changed(&output);
        let transition = plan(current, event, changed);
        debug!(%current, ?event, changed, next = %transition.next, steps = ?transition.steps, "sync transition");

        for step in &transition.steps {
            match step {
                SyncStep::Terminate => self.control(SyncVerb::Terminate)?,
                SyncStep::Create => self.create()?,
                SyncStep::AwaitReady => self.await_ready()?,
                SyncStep::Pause => self.control(SyncVerb::Pause)?,
                SyncStep::Resume => self.control(SyncVerb::Resume)?,
            }
        }
        Ok(transition.next)
    }

    /// Replace any session with a fresh one and wait until it is watching.
    pub fn start(&self) -> Result<(), CoreError> {
        self.control(SyncVerb::Terminate)?;
        self.create()?;
        self.await_ready()
    }

    fn create(&self) -> Result<(), CoreError> {
        let name = self.cfg.synced_container();
        let id = self
            .introspector
            .container_id_by_name(&name)
            .map_err(|e| CoreError::container(&name, e))?;
        let spec = SyncSessionSpec {
            config_file: self.cfg.sync_file(),
            label: self.label()?,
            ignores: self.cfg.sync_ignore(),
            alpha: format!("{}{}", self.cfg.cwd().display(), self.cfg.web_root()),
            beta: format!("docker://{id}{}", self.cfg.synced_dir()),
        };
        info!(container = %name, "creating sync session");
        self.tool.create(&spec)?;
        Ok(())
    }

    fn await_ready(&self) -> Result<(), CoreError> {
        info!("waiting for sync to be ready");
        loop {
            let output = self.list()?;
            let lower = output.to_lowercase();
            if lower.contains("last error") {
                return Err(CoreError::SyncFailed(output.trim().to_owned()));
            }
            if lower.contains("watching for changes") {
                info!("sync is ready");
                return Ok(());
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reward_config::Platform;
    use reward_runtime::{CallLog, MockRuntime, MockSync};
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const LABEL: &str = "reward-sync=shop";

    fn cfg(cwd: PathBuf) -> ConfigSnapshot {
        let values: BTreeMap<String, Value> = [
            ("reward_env_name", json!("shop")),
            ("reward_env_type", json!("magento2")),
            ("reward_web_root", json!("/")),
            ("reward_env_synced_container", json!("php-fpm")),
            ("reward_env_synced_dir", json!("/var/www/html")),
            ("reward_mutagen_required_version", json!("0.11.8")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect();
        ConfigSnapshot::new(
            cwd,
            PathBuf::from("/home/dev/.reward"),
            Platform::new(HostOs::Darwin, "arm64", false),
            values,
        )
    }

    struct Fixture {
        cfg: ConfigSnapshot,
        sync: MockSync,
        runtime: Arc<MockRuntime>,
        introspector: Introspector,
        confirm: Confirm,
        log: CallLog,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let log = CallLog::new();
            let runtime = Arc::new(MockRuntime::new(APP_NAME, log.clone()));
            runtime.add_container("php-fpm", "shop", "abc123", "running");
            let introspector = Introspector::new(runtime.clone(), APP_NAME).for_environment("shop");
            Self {
                cfg: cfg(dir.path().to_path_buf()),
                sync: MockSync::new(log.clone()),
                runtime,
                introspector,
                confirm: Arc::new(|_: &str| false),
                log,
                _dir: dir,
            }
        }

        fn coordinator(&self) -> SyncCoordinator<'_> {
            SyncCoordinator::new(&self.cfg, &self.sync, &self.introspector, &self.confirm)
                .poll_interval(Duration::from_millis(1))
        }
    }

    #[test]
    fn session_url_parsing() {
        let out = "Alpha:\n\tURL: /work/shop/\nBeta:\n\tURL: docker://abc123/var/www/html\nStatus: Watching for changes\n";
        assert_eq!(session_container_id(out).as_deref(), Some("abc123"));
        assert_eq!(session_state(out), SyncState::Running);
        assert_eq!(session_container_id("----\n"), None);
        assert_eq!(session_state("----\n"), SyncState::Absent);
        assert_eq!(session_state("Status: [Paused]\n"), SyncState::Paused);
    }

    #[test]
    fn container_changed_rule() {
        assert!(container_changed(None, "abc", "running"));
        assert!(container_changed(Some("abc"), "def", "running"));
        assert!(container_changed(Some("abc"), "abc", "exited"));
        assert!(!container_changed(Some("abc"), "abc", "running"));
    }

    #[test]
    fn up_without_session_creates_and_waits() {
        let f = Fixture::new();
        f.sync.set_ready_after(2);
        let state = f.coordinator().apply(SyncEvent::Up).unwrap();
        assert_eq!(state, SyncState::Running);

        let entries = f.log.entries();
        let terminate = entries.iter().position(|e| e == "sync terminate reward-sync=shop");
        let create = entries
            .iter()
            .position(|e| e == "sync create reward-sync=shop docker://abc123/var/www/html");
        assert!(terminate.unwrap() < create.unwrap());
        // one state probe, then three polls until ready
        assert_eq!(f.log.count("sync list"), 4);

        let beta = f.sync.session_beta(LABEL).unwrap();
        assert_eq!(session_container_id(&format!("URL: {beta}")).as_deref(), Some("abc123"));
    }

    #[test]
    fn up_with_same_container_resumes() {
        let f = Fixture::new();
        f.sync.add_session(LABEL, "/work/shop/", "docker://abc123/var/www/html");
        f.coordinator().apply(SyncEvent::Up).unwrap();
        assert_eq!(f.log.count("sync resume"), 1);
        assert_eq!(f.log.count("sync create"), 0);
    }

    #[test]
    fn recreated_container_gets_new_session() {
        let f = Fixture::new();
        f.sync.add_session(LABEL, "/work/shop/", "docker://abc123/var/www/html");
        f.runtime.recreate_container("php-fpm", "fff999");
        f.coordinator().apply(SyncEvent::Up).unwrap();
        assert_eq!(
            f.sync.session_beta(LABEL).as_deref(),
            Some("docker://fff999/var/www/html")
        );
    }

    #[test]
    fn stopped_container_counts_as_changed() {
        let f = Fixture::new();
        f.sync.add_session(LABEL, "/work/shop/", "docker://abc123/var/www/html");
        f.runtime.set_state("php-fpm", "exited");
        f.coordinator().apply(SyncEvent::Up).unwrap();
        assert_eq!(f.log.count("sync create"), 1);
    }

    #[test]
    fn session_error_fails_start() {
        let f = Fixture::new();
        f.sync.fail_session(LABEL);
        let err = f.coordinator().start().unwrap_err();
        match err {
            CoreError::SyncFailed(msg) => assert!(msg.contains("Last error")),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn stop_then_down() {
        let f = Fixture::new();
        f.sync.add_session(LABEL, "/work/shop/", "docker://abc123/var/www/html");
        let c = f.coordinator();
        assert_eq!(c.apply(SyncEvent::Stop).unwrap(), SyncState::Paused);
        assert!(f.sync.is_paused(LABEL));
        assert_eq!(c.apply(SyncEvent::Down).unwrap(), SyncState::Absent);
        assert!(f.sync.session_beta(LABEL).is_none());
    }

    #[test]
    fn old_version_only_warns() {
        let f = Fixture::new();
        f.sync.set_version("0.10.0");
        f.coordinator().ensure_tool().unwrap();
    }

    #[test]
    fn prepare_writes_sync_config() {
        let f = Fixture::new();
        f.coordinator().prepare().unwrap();
        assert!(f.cfg.sync_file().is_file());
    }
}

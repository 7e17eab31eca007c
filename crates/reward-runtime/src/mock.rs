//! In-memory stand-ins for the container runtime, the composer and the
//! synchroniser. All three can share one [`CallLog`] so tests can assert the
//! relative order of calls across them.

use crate::compose::{Composer, OutputMode};
use crate::introspect::{ContainerInfo, ContainerRuntime, Endpoint, NetworkFilter};
use crate::sync::{SyncSessionSpec, SyncTool, SyncVerb};
use crate::RuntimeError;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, RuntimeError> {
    m.lock()
        .map_err(|e| RuntimeError::Api(format!("mutex poisoned: {e}")))
}

/// Ordered record of calls made against the mocks.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.into());
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Index of the first entry starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

fn selector_matches(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    match selector.split_once('=') {
        Some((k, v)) => labels.get(k).is_some_and(|have| have == v),
        None => labels.contains_key(selector),
    }
}

#[derive(Default)]
struct RuntimeState {
    containers: Vec<ContainerInfo>,
    networks: BTreeMap<String, BTreeMap<String, String>>,
    next_host: u8,
}

/// In-memory [`ContainerRuntime`].
///
/// Mirrors the daemon's behaviour where it matters to callers: connecting an
/// already-attached container or disconnecting a detached one is an error,
/// and network name filters are substring matches.
pub struct MockRuntime {
    app: String,
    state: Mutex<RuntimeState>,
    version: Mutex<String>,
    log: CallLog,
}

impl MockRuntime {
    pub fn new(app: impl Into<String>, log: CallLog) -> Self {
        Self {
            app: app.into(),
            state: Mutex::new(RuntimeState {
                next_host: 2,
                ..RuntimeState::default()
            }),
            version: Mutex::new("24.0.7".to_owned()),
            log,
        }
    }

    pub fn set_version(&self, version: &str) {
        if let Ok(mut v) = self.version.lock() {
            *v = version.to_owned();
        }
    }

    /// Add a container labelled with `name` and `environment`.
    pub fn add_container(&self, name: &str, environment: &str, id: &str, state: &str) {
        let mut labels = BTreeMap::new();
        labels.insert(format!("dev.{}.container.name", self.app), name.to_owned());
        labels.insert(
            format!("dev.{}.environment.name", self.app),
            environment.to_owned(),
        );
        if let Ok(mut st) = self.state.lock() {
            st.containers.push(ContainerInfo {
                id: id.to_owned(),
                names: vec![format!("{environment}_{name}_1")],
                state: state.to_owned(),
                labels,
                networks: BTreeMap::new(),
            });
        }
    }

    /// Replace the id of every container labelled `name`, as a recreate would.
    pub fn recreate_container(&self, name: &str, new_id: &str) {
        let key = format!("dev.{}.container.name", self.app);
        if let Ok(mut st) = self.state.lock() {
            for c in &mut st.containers {
                if c.labels.get(&key).is_some_and(|n| n == name) {
                    new_id.clone_into(&mut c.id);
                }
            }
        }
    }

    pub fn set_state(&self, name: &str, state: &str) {
        let key = format!("dev.{}.container.name", self.app);
        if let Ok(mut st) = self.state.lock() {
            for c in &mut st.containers {
                if c.labels.get(&key).is_some_and(|n| n == name) {
                    state.clone_into(&mut c.state);
                }
            }
        }
    }

    pub fn add_network(&self, name: &str, labels: &[(&str, &str)]) {
        if let Ok(mut st) = self.state.lock() {
            st.networks.insert(
                name.to_owned(),
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                    .collect(),
            );
        }
    }

    /// Drop a network and every attachment to it.
    pub fn remove_network(&self, name: &str) {
        if let Ok(mut st) = self.state.lock() {
            st.networks.remove(name);
            for c in &mut st.containers {
                c.networks.remove(name);
            }
        }
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.state
            .lock()
            .map(|st| st.networks.contains_key(name))
            .unwrap_or(false)
    }

    /// Attach every container of `environment` to `network`, as the composer
    /// does for project services.
    pub fn attach_environment(&self, environment: &str, network: &str) {
        let key = format!("dev.{}.environment.name", self.app);
        if let Ok(mut st) = self.state.lock() {
            let mut host = st.next_host;
            for c in &mut st.containers {
                if c.labels.get(&key).is_some_and(|e| e == environment)
                    && !c.networks.contains_key(network)
                {
                    c.networks.insert(network.to_owned(), endpoint(host, Vec::new()));
                    host = host.wrapping_add(1);
                }
            }
            st.next_host = host;
        }
    }

    /// Network names `name` (by container label) is attached to, with aliases.
    pub fn attachments(&self, name: &str) -> BTreeMap<String, Vec<String>> {
        let key = format!("dev.{}.container.name", self.app);
        self.state
            .lock()
            .map(|st| {
                st.containers
                    .iter()
                    .filter(|c| c.labels.get(&key).is_some_and(|n| n == name))
                    .flat_map(|c| {
                        c.networks
                            .iter()
                            .map(|(n, ep)| (n.clone(), ep.aliases.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn endpoint(host: u8, aliases: Vec<String>) -> Endpoint {
    Endpoint {
        ip_address: format!("172.20.0.{host}"),
        gateway: "172.20.0.1".to_owned(),
        aliases,
    }
}

impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    fn list_containers(&self, selectors: &[String]) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let st = lock(&self.state)?;
        Ok(st
            .containers
            .iter()
            .filter(|c| selectors.iter().all(|s| selector_matches(&c.labels, s)))
            .cloned()
            .collect())
    }

    fn list_networks(&self, filter: &NetworkFilter) -> Result<Vec<String>, RuntimeError> {
        let st = lock(&self.state)?;
        Ok(st
            .networks
            .iter()
            .filter(|(name, labels)| match filter {
                NetworkFilter::Name(n) => name.contains(n.as_str()),
                NetworkFilter::Label(l) => selector_matches(labels, l),
            })
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn connect_network(
        &self,
        network: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<(), RuntimeError> {
        let mut st = lock(&self.state)?;
        if !st.networks.contains_key(network) {
            return Err(RuntimeError::Api(format!("network {network} not found")));
        }
        let host = st.next_host;
        let container = st
            .containers
            .iter_mut()
            .find(|c| c.id == container_id)
            .ok_or_else(|| RuntimeError::Api(format!("no such container: {container_id}")))?;
        if container.networks.contains_key(network) {
            return Err(RuntimeError::Api(format!(
                "endpoint with name {container_id} already exists in network {network}"
            )));
        }
        container
            .networks
            .insert(network.to_owned(), endpoint(host, aliases.to_vec()));
        st.next_host = host.wrapping_add(1);
        self.log.record(format!(
            "runtime connect {container_id} {network} [{}]",
            aliases.join(",")
        ));
        Ok(())
    }

    fn disconnect_network(&self, network: &str, container_id: &str) -> Result<(), RuntimeError> {
        let mut st = lock(&self.state)?;
        let container = st
            .containers
            .iter_mut()
            .find(|c| c.id == container_id)
            .ok_or_else(|| RuntimeError::Api(format!("no such container: {container_id}")))?;
        if container.networks.remove(network).is_none() {
            return Err(RuntimeError::Api(format!(
                "container {container_id} is not connected to network {network}"
            )));
        }
        self.log
            .record(format!("runtime disconnect {container_id} {network}"));
        Ok(())
    }

    fn server_version(&self) -> Result<String, RuntimeError> {
        Ok(lock(&self.version)?.clone())
    }
}

/// One recorded composer call.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub args: Vec<String>,
    /// Contents of every `-f` file, read at call time.
    pub files: Vec<(PathBuf, String)>,
    pub stdin: Option<String>,
}

impl Invocation {
    /// Arguments after the file and project flags.
    pub fn user_args(&self) -> Vec<String> {
        strip_delegation(&self.args)
    }

    pub fn project_name(&self) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == "--project-name")
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

fn strip_delegation(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if matches!(a.as_str(), "-f" | "--project-directory" | "--project-name") {
            it.next();
        } else {
            out.push(a.clone());
        }
    }
    out
}

/// Fake [`Composer`].
///
/// When attached to a [`MockRuntime`], `up` creates the project network and
/// attaches the project's containers to it, and `down` removes it.
pub struct MockComposer {
    version: Mutex<String>,
    invocations: Mutex<Vec<Invocation>>,
    captured_output: Mutex<String>,
    fail_verb: Mutex<Option<(String, i32)>>,
    runtime: Option<Arc<MockRuntime>>,
    log: CallLog,
}

impl MockComposer {
    pub fn new(log: CallLog) -> Self {
        Self {
            version: Mutex::new("2.24.6".to_owned()),
            invocations: Mutex::new(Vec::new()),
            captured_output: Mutex::new(String::new()),
            fail_verb: Mutex::new(None),
            runtime: None,
            log,
        }
    }

    #[must_use]
    pub fn with_runtime(mut self, runtime: Arc<MockRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn set_version(&self, version: &str) {
        if let Ok(mut v) = self.version.lock() {
            *v = version.to_owned();
        }
    }

    /// Text returned from captured invocations.
    pub fn set_output(&self, output: &str) {
        if let Ok(mut o) = self.captured_output.lock() {
            *o = output.to_owned();
        }
    }

    /// Make invocations whose first user argument is `verb` exit with `code`.
    pub fn fail_on(&self, verb: &str, code: i32) {
        if let Ok(mut f) = self.fail_verb.lock() {
            *f = Some((verb.to_owned(), code));
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .map(|i| i.clone())
            .unwrap_or_default()
    }

    fn record(&self, args: &[String], stdin: Option<String>) -> Result<(), RuntimeError> {
        let mut files = Vec::new();
        let mut it = args.iter();
        while let Some(a) = it.next() {
            if a == "-f" {
                if let Some(path) = it.next() {
                    let path = PathBuf::from(path);
                    let content = std::fs::read_to_string(&path)?;
                    files.push((path, content));
                }
            }
        }
        let invocation = Invocation {
            args: args.to_vec(),
            files,
            stdin,
        };
        let user = invocation.user_args();
        self.log.record(format!("compose {}", user.join(" ")));

        if let Some((verb, code)) = lock(&self.fail_verb)?.clone() {
            if user.first() == Some(&verb) {
                lock(&self.invocations)?.push(invocation);
                return Err(RuntimeError::SubprocessFailed {
                    program: "docker-compose".to_owned(),
                    code: Some(code),
                    output: String::new(),
                });
            }
        }

        if let (Some(rt), Some(project)) = (&self.runtime, invocation.project_name()) {
            let network = format!("{project}_default");
            if user.iter().any(|a| a == "up") {
                if !rt.has_network(&network) {
                    rt.add_network(&network, &[]);
                }
                rt.attach_environment(project, &network);
            } else if user.first().is_some_and(|a| a == "down") {
                rt.remove_network(&network);
            }
        }

        lock(&self.invocations)?.push(invocation);
        Ok(())
    }
}

impl Composer for MockComposer {
    fn version(&self) -> Result<String, RuntimeError> {
        Ok(lock(&self.version)?.clone())
    }

    fn run(&self, args: &[String], mode: OutputMode) -> Result<String, RuntimeError> {
        self.record(args, None)?;
        match mode {
            OutputMode::Stream => Ok(String::new()),
            OutputMode::Capture => Ok(lock(&self.captured_output)?.clone()),
        }
    }

    fn run_with_input(
        &self,
        args: &[String],
        mut input: Box<dyn Read + Send>,
    ) -> Result<(), RuntimeError> {
        let mut stdin = String::new();
        input.read_to_string(&mut stdin)?;
        self.record(args, Some(stdin))
    }
}

#[derive(Debug, Clone)]
struct MockSession {
    alpha: String,
    beta: String,
    paused: bool,
    polls_until_ready: usize,
}

/// Fake [`SyncTool`] producing `sync list` output in the real tool's layout.
pub struct MockSync {
    version: Mutex<String>,
    sessions: Mutex<BTreeMap<String, MockSession>>,
    ready_after: Mutex<usize>,
    failing: Mutex<BTreeSet<String>>,
    missing: Mutex<bool>,
    log: CallLog,
}

impl MockSync {
    pub fn new(log: CallLog) -> Self {
        Self {
            version: Mutex::new("0.17.2".to_owned()),
            missing: Mutex::new(false),
            sessions: Mutex::new(BTreeMap::new()),
            ready_after: Mutex::new(0),
            failing: Mutex::new(BTreeSet::new()),
            log,
        }
    }

    pub fn set_version(&self, version: &str) {
        if let Ok(mut v) = self.version.lock() {
            *v = version.to_owned();
        }
    }

    /// Behave as if the binary is not installed.
    pub fn set_missing(&self, missing: bool) {
        if let Ok(mut m) = self.missing.lock() {
            *m = missing;
        }
    }

    /// Number of `list` calls a new session reports as still scanning.
    pub fn set_ready_after(&self, polls: usize) {
        if let Ok(mut r) = self.ready_after.lock() {
            *r = polls;
        }
    }

    /// Sessions created with `label` report an error instead of becoming ready.
    pub fn fail_session(&self, label: &str) {
        if let Ok(mut f) = self.failing.lock() {
            f.insert(label.to_owned());
        }
    }

    /// Seed an existing session, e.g. one left over from an earlier run.
    pub fn add_session(&self, label: &str, alpha: &str, beta: &str) {
        if let Ok(mut s) = self.sessions.lock() {
            s.insert(
                label.to_owned(),
                MockSession {
                    alpha: alpha.to_owned(),
                    beta: beta.to_owned(),
                    paused: false,
                    polls_until_ready: 0,
                },
            );
        }
    }

    pub fn session_beta(&self, label: &str) -> Option<String> {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(label).map(|m| m.beta.clone()))
    }

    pub fn is_paused(&self, label: &str) -> bool {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(label).map(|m| m.paused))
            .unwrap_or(false)
    }

    fn render(label: &str, session: &MockSession, status: &str) -> String {
        let (key, value) = label.split_once('=').unwrap_or((label, ""));
        let rule = "-".repeat(80);
        format!(
            "{rule}\nName: \nIdentifier: sync_mock\nLabels:\n\t{key}: {value}\n\
             Alpha:\n\tURL: {}\n\tConnected: Yes\n\
             Beta:\n\tURL: {}\n\tConnected: Yes\n\
             Status: {status}\n{rule}\n",
            session.alpha, session.beta
        )
    }
}

impl SyncTool for MockSync {
    fn version(&self) -> Result<String, RuntimeError> {
        if *lock(&self.missing)? {
            return Err(RuntimeError::ProgramMissing("mutagen".to_owned()));
        }
        Ok(lock(&self.version)?.clone())
    }

    fn create(&self, spec: &SyncSessionSpec) -> Result<(), RuntimeError> {
        self.log
            .record(format!("sync create {} {}", spec.label, spec.beta));
        let polls = *lock(&self.ready_after)?;
        lock(&self.sessions)?.insert(
            spec.label.clone(),
            MockSession {
                alpha: spec.alpha.clone(),
                beta: spec.beta.clone(),
                paused: false,
                polls_until_ready: polls,
            },
        );
        Ok(())
    }

    fn list(&self, label: &str) -> Result<String, RuntimeError> {
        self.log.record(format!("sync list {label}"));
        let failing = lock(&self.failing)?.contains(label);
        let mut sessions = lock(&self.sessions)?;
        let Some(session) = sessions.get_mut(label) else {
            return Ok(format!("{}\n", "-".repeat(80)));
        };
        let status = if failing {
            "Halted on root emptied\nLast error: beta scan failed"
        } else if session.paused {
            "[Paused]"
        } else if session.polls_until_ready > 0 {
            session.polls_until_ready -= 1;
            "Scanning files"
        } else {
            "Watching for changes"
        };
        Ok(Self::render(label, session, status))
    }

    fn control(&self, verb: SyncVerb, label: &str) -> Result<(), RuntimeError> {
        self.log.record(format!("sync {verb} {label}"));
        let mut sessions = lock(&self.sessions)?;
        match verb {
            SyncVerb::Terminate => {
                sessions.remove(label);
            }
            SyncVerb::Pause => {
                if let Some(s) = sessions.get_mut(label) {
                    s.paused = true;
                }
            }
            SyncVerb::Resume => {
                if let Some(s) = sessions.get_mut(label) {
                    s.paused = false;
                }
            }
            SyncVerb::Flush | SyncVerb::Monitor | SyncVerb::Reset => {}
        }
        Ok(())
    }
}

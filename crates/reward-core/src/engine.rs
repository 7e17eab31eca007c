use crate::lifecycle::SyncEvent;
use crate::peering::{peer_services, PeerAction, PROXY_SERVICE};
use crate::sync::SyncCoordinator;
use crate::CoreError;
use reward_compose::{
    compose_args, render_fragments, render_sync_config, select_environment, select_services,
    write_traefik_config, OutputFilter, ScratchRegistry, TemplateSources,
};
use reward_config::{ConfigSnapshot, ProjectName, APP_NAME};
use reward_runtime::{
    meets_minimum, parse_version, Composer, ContainerRuntime, Introspector, OutputMode,
    SqlRewriter, SyncTool, SyncVerb, COMPOSE_MIN_VERSION, DOCKER_MIN_VERSION,
};
use std::io::{BufReader, Read};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEBUG_CONTAINER: &str = "php-debug";

/// Answers a yes/no question put to the user.
pub type Confirm = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// `sync` subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    Start,
    Stop,
    Pause,
    Resume,
    List,
    Flush,
    Monitor,
    Reset,
}

/// Options shared by `db connect` and `db import`.
#[derive(Debug, Clone, Default)]
pub struct DbOptions {
    /// Connect as the database root user.
    pub root: bool,
    /// Extra arguments for the database client.
    pub extra: Vec<String>,
}

/// Lifecycle orchestrator for one invocation.
///
/// Holds the configuration snapshot and the three external capabilities.
/// Every public operation removes its scratch files before returning.
pub struct Engine {
    cfg: ConfigSnapshot,
    runtime: Arc<dyn ContainerRuntime>,
    composer: Arc<dyn Composer>,
    sync: Arc<dyn SyncTool>,
    scratch: Arc<ScratchRegistry>,
    confirm: Confirm,
    poll_interval: Duration,
}

fn has(args: &[String], wanted: &[&str]) -> bool {
    args.iter().any(|a| wanted.contains(&a.as_str()))
}

/// The composer subcommand: the first argument that is not a flag.
fn composer_verb(args: &[String]) -> Option<&str> {
    args.iter().map(String::as_str).find(|a| !a.starts_with('-'))
}

/// Insert `value` right after the first `anchor`.
fn insert_after(args: &mut Vec<String>, anchor: &str, value: &str) {
    if let Some(i) = args.iter().position(|a| a == anchor) {
        args.insert(i + 1, value.to_owned());
    }
}

/// Insert `value` right before the first `anchor`, or append it.
fn insert_before_or_append(args: &[String], anchor: &str, value: &str) -> Vec<String> {
    let mut out = args.to_vec();
    match out.iter().position(|a| a == anchor) {
        Some(i) => out.insert(i, value.to_owned()),
        None => out.push(value.to_owned()),
    }
    out
}

/// Project checks that need no subprocess: invoker, name, type.
pub fn check_project(cfg: &ConfigSnapshot, action: &str) -> Result<ProjectName, CoreError> {
    cfg.check_invoker(action)?;
    let project = cfg.project_name()?;
    cfg.env_type()?;
    Ok(project)
}

impl Engine {
    pub fn new(
        cfg: ConfigSnapshot,
        runtime: Arc<dyn ContainerRuntime>,
        composer: Arc<dyn Composer>,
        sync: Arc<dyn SyncTool>,
    ) -> Self {
        let scratch = Arc::new(ScratchRegistry::new().keep_files(cfg.skip_cleanup()));
        Self {
            cfg,
            runtime,
            composer,
            sync,
            scratch,
            confirm: Arc::new(|_: &str| false),
            poll_interval: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_confirm(mut self, confirm: Confirm) -> Self {
        self.confirm = confirm;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.cfg
    }

    /// Registry shared with the signal handler.
    pub fn scratch(&self) -> &Arc<ScratchRegistry> {
        &self.scratch
    }

    fn introspector(&self) -> Introspector {
        let introspector = Introspector::new(Arc::clone(&self.runtime), APP_NAME);
        match self.cfg.project_name() {
            Ok(project) => introspector.for_environment(project.as_str()),
            Err(_) => introspector,
        }
    }

    fn coordinator<'a>(&'a self, introspector: &'a Introspector) -> SyncCoordinator<'a> {
        SyncCoordinator::new(&self.cfg, self.sync.as_ref(), introspector, &self.confirm)
            .poll_interval(self.poll_interval)
    }

    /// Run `op`, then remove scratch files. A cleanup failure only turns a
    /// success into an error. If `op` panics the guard still cleans up.
    fn with_cleanup<T>(&self, op: impl FnOnce() -> Result<T, CoreError>) -> Result<T, CoreError> {
        let guard = self.scratch.guard();
        let result = op();
        match (result, guard.finish()) {
            (Ok(_), Err(e)) => Err(CoreError::Cleanup(e)),
            (result, Err(e)) => {
                warn!("cannot remove scratch files: {e}");
                result
            }
            (result, Ok(_)) => result,
        }
    }

    pub fn check_project(&self, action: &str) -> Result<ProjectName, CoreError> {
        check_project(&self.cfg, action)
    }

    /// Container runtime and composer must be reachable and recent enough.
    pub fn check_tools(&self) -> Result<(), CoreError> {
        let (installed, ok) = self
            .introspector()
            .check_runtime_version(DOCKER_MIN_VERSION)
            .map_err(|e| {
                CoreError::PreconditionFailed(format!("cannot reach the container runtime: {e}"))
            })?;
        if !ok {
            return Err(CoreError::PreconditionFailed(format!(
                "docker version is too old: {installed} is installed, {DOCKER_MIN_VERSION} or newer is required"
            )));
        }

        let raw = self.composer.version()?;
        let installed = parse_version(&raw)?;
        if !meets_minimum(&installed, COMPOSE_MIN_VERSION)? {
            return Err(CoreError::PreconditionFailed(format!(
                "docker compose version is too old: {installed} is installed, {COMPOSE_MIN_VERSION} or newer is required"
            )));
        }
        debug!(%installed, "composer version ok");
        Ok(())
    }

    fn check_ca_certificate(&self) -> Result<(), CoreError> {
        let ca = self.cfg.ca_cert_path();
        if ca.is_file() {
            return Ok(());
        }
        Err(CoreError::PreconditionFailed(format!(
            "missing root CA certificate {}; install it with `{APP_NAME} install` first",
            ca.display()
        )))
    }

    /// Composer help with the delegation details filtered out.
    pub fn composer_help(&self) -> Result<String, CoreError> {
        let out = self
            .composer
            .run(&["--help".to_owned()], OutputMode::Capture)?;
        Ok(OutputFilter::new().apply(&out))
    }

    /// Render the project composition to scratch files and build the full
    /// composer command line around `args`.
    fn env_command(
        &self,
        cfg: &ConfigSnapshot,
        project: &ProjectName,
        args: &[String],
    ) -> Result<Vec<String>, CoreError> {
        let set = select_environment(cfg, &TemplateSources::for_snapshot(cfg))?;
        let composition = render_fragments(&set, cfg)?;
        debug!(fragments = ?composition.names(), ?args, "project composition");
        Ok(compose_args(
            &self.scratch,
            &composition,
            cfg.cwd(),
            project,
            args,
        )?)
    }

    fn compose_env(
        &self,
        cfg: &ConfigSnapshot,
        project: &ProjectName,
        args: &[String],
    ) -> Result<(), CoreError> {
        let full = self.env_command(cfg, project, args)?;
        self.composer.run(&full, OutputMode::Stream)?;
        Ok(())
    }

    fn ensure_local_dirs(cfg: &ConfigSnapshot) -> Result<(), CoreError> {
        let local = cfg.local_dir();
        std::fs::create_dir_all(&local)?;
        if cfg.svc_enabled_permissive("nginx") {
            std::fs::create_dir_all(local.join("nginx"))?;
        }
        if cfg.svc_enabled_strict("varnish") {
            std::fs::create_dir_all(local.join("varnish"))?;
        }
        Ok(())
    }

    /// `env <args>`: run the composer against the project composition,
    /// sequencing peering and file sync around it.
    pub fn env(&self, args: &[String]) -> Result<(), CoreError> {
        let Some(verb) = args.first() else {
            return Err(CoreError::PreconditionFailed(
                "no composer command given".to_owned(),
            ));
        };
        let project = self.check_project(verb)?;
        if composer_verb(args) == Some("up") {
            self.check_ca_certificate()?;
        }
        self.check_tools()?;
        self.with_cleanup(|| self.run_env(&project, args))
    }

    fn run_env(&self, project: &ProjectName, args: &[String]) -> Result<(), CoreError> {
        let network = project.network_name();
        let introspector = self.introspector();
        let sync_enabled = self.cfg.sync_enabled();
        let coordinator = self.coordinator(&introspector);
        let mut args = args.to_vec();
        let verb = composer_verb(&args).unwrap_or_default().to_owned();

        if verb == "down" {
            if sync_enabled {
                coordinator.ensure_tool()?;
            }
            peer_services(&introspector, &self.cfg, &network, PeerAction::Disconnect)?;
        }

        if verb == "up" {
            if !introspector.network_exists(&network)? {
                info!(%network, "creating project network");
                let no_start = insert_before_or_append(&args, "--", "--no-start");
                self.compose_env(&self.cfg, project, &no_start)?;
            }
            peer_services(&introspector, &self.cfg, &network, PeerAction::Connect)?;
            if !has(&args, &["-d", "--detach"]) {
                insert_after(&mut args, "up", "--detach");
            }
        }

        let mut cfg = self.cfg.clone();
        if !matches!(verb.as_str(), "config" | "down") {
            if sync_enabled {
                coordinator.prepare()?;
                if has(&args, &["stop"]) {
                    coordinator.apply(SyncEvent::Stop)?;
                }
            }
            if matches!(verb.as_str(), "up" | "start") {
                let address = introspector
                    .container_address_in_network(PROXY_SERVICE, APP_NAME, &network)
                    .map_err(|e| CoreError::container(PROXY_SERVICE, e))?;
                debug!(%address, "proxy address");
                cfg = cfg.with_value("traefik_address", address.to_string());
            }
        }

        Self::ensure_local_dirs(&cfg)?;
        self.compose_env(&cfg, project, &args)?;

        if sync_enabled {
            let event = match verb.as_str() {
                "up" | "start" if !has(&args, &["--"]) => Some(SyncEvent::Up),
                "down" => Some(SyncEvent::Down),
                _ => None,
            };
            if let Some(event) = event {
                let state = coordinator.apply(event)?;
                debug!(?state, "sync session aligned");
            }
        }
        Ok(())
    }

    /// `svc <args>`: the shared services composition, run under the
    /// application name from the application home.
    pub fn svc(&self, args: &[String]) -> Result<(), CoreError> {
        let Some(verb) = args.first() else {
            return Err(CoreError::PreconditionFailed(
                "no composer command given".to_owned(),
            ));
        };
        self.cfg.check_invoker(verb)?;
        if composer_verb(args) == Some("up") {
            self.check_ca_certificate()?;
        }
        self.check_tools()?;
        self.with_cleanup(|| self.run_svc(args))
    }

    fn run_svc(&self, args: &[String]) -> Result<(), CoreError> {
        let mut args = args.to_vec();
        let verb = composer_verb(&args).unwrap_or_default().to_owned();
        if matches!(verb.as_str(), "up" | "restart") {
            let domain = self.cfg.get_string("reward_service_domain");
            let cert = self
                .cfg
                .ssl_dir()
                .join("certs")
                .join(format!("{domain}.crt.pem"));
            if !cert.is_file() {
                warn!(
                    "no certificate for {domain}; sign one with `{APP_NAME} sign-certificate {domain}`"
                );
            }
            let files = write_traefik_config(&self.cfg)?;
            debug!(?files, "proxy configuration written");
        }
        if verb == "up" && !has(&args, &["-d", "--detach"]) {
            insert_after(&mut args, "up", "--detach");
        }

        let set = select_services(&TemplateSources::for_snapshot(&self.cfg))?;
        let composition = render_fragments(&set, &self.cfg)?;
        let full = compose_args(
            &self.scratch,
            &composition,
            self.cfg.app_home(),
            APP_NAME,
            &args,
        )?;
        self.composer.run(&full, OutputMode::Stream)?;

        if matches!(verb.as_str(), "up" | "start" | "restart") {
            let introspector = Introspector::new(Arc::clone(&self.runtime), APP_NAME);
            let label = format!("dev.{APP_NAME}.environment.name");
            for network in introspector.networks_by_label(&label)? {
                peer_services(&introspector, &self.cfg, &network, PeerAction::Connect)?;
            }
        }
        Ok(())
    }

    /// `sync <command>`. Returns the session listing for
    /// [`SyncCommand::List`] and an empty string otherwise.
    pub fn sync(&self, command: SyncCommand) -> Result<String, CoreError> {
        self.check_project("sync")?;
        let introspector = self.introspector();
        let coordinator = self.coordinator(&introspector);
        coordinator.ensure_tool()?;
        match command {
            SyncCommand::Start => {
                if render_sync_config(&self.cfg, &self.cfg.sync_file())? {
                    info!("sync configuration created");
                }
                coordinator.start()?;
            }
            SyncCommand::Stop => coordinator.control(SyncVerb::Terminate)?,
            SyncCommand::Pause => coordinator.control(SyncVerb::Pause)?,
            SyncCommand::Resume => coordinator.control(SyncVerb::Resume)?,
            SyncCommand::Flush => coordinator.control(SyncVerb::Flush)?,
            SyncCommand::Monitor => coordinator.control(SyncVerb::Monitor)?,
            SyncCommand::Reset => coordinator.control(SyncVerb::Reset)?,
            SyncCommand::List => return coordinator.list(),
        }
        Ok(String::new())
    }

    /// `debug [command]`: run `command` (default `bash`) in the debug PHP
    /// container with the xdebug host set to its gateway on the project
    /// network.
    pub fn debug(&self, command: &[String]) -> Result<(), CoreError> {
        let project = self.check_project("debug")?;
        self.check_tools()?;
        let network = project.network_name();
        let gateway = self
            .introspector()
            .container_gateway_in_network(DEBUG_CONTAINER, &network)
            .map_err(|e| CoreError::container(DEBUG_CONTAINER, e))?;
        debug!(%gateway, "debug host");

        let mut args = vec![
            "exec".to_owned(),
            "-e".to_owned(),
            format!("XDEBUG_REMOTE_HOST={gateway}"),
            DEBUG_CONTAINER.to_owned(),
        ];
        if command.is_empty() {
            args.push("bash".to_owned());
        } else {
            args.extend_from_slice(command);
        }
        self.with_cleanup(|| self.compose_env(&self.cfg, &project, &args))
    }

    fn db_shell_command(&self, opts: &DbOptions) -> String {
        let (user, password) = if opts.root {
            ("-uroot", "-p$(printenv MYSQL_ROOT_PASSWORD)")
        } else {
            ("-u$(printenv MYSQL_USER)", "-p$(printenv MYSQL_PASSWORD)")
        };
        let mut command = format!(
            "{} {user} {password} --database=$(printenv MYSQL_DATABASE)",
            self.cfg.db_command()
        );
        for arg in &opts.extra {
            command.push(' ');
            command.push_str(arg);
        }
        command
    }

    fn check_db_running(&self) -> Result<String, CoreError> {
        let container = self.cfg.db_container();
        let state = self
            .introspector()
            .container_state_by_name(&container)
            .map_err(|e| CoreError::container(&container, e))?;
        if state != "running" {
            return Err(CoreError::PreconditionFailed(format!(
                "the {container} container is {state}; start the environment first"
            )));
        }
        Ok(container)
    }

    /// `db connect`: interactive client in the database container.
    pub fn db_connect(&self, opts: &DbOptions) -> Result<(), CoreError> {
        let project = self.check_project("db")?;
        self.check_tools()?;
        let container = self.check_db_running()?;
        let args = vec![
            "exec".to_owned(),
            container,
            "sh".to_owned(),
            "-c".to_owned(),
            self.db_shell_command(opts),
        ];
        self.with_cleanup(|| self.compose_env(&self.cfg, &project, &args))
    }

    /// `db import`: stream `input` through the SQL rewriter into the client.
    pub fn db_import(&self, opts: &DbOptions, input: Box<dyn Read + Send>) -> Result<(), CoreError> {
        let project = self.check_project("db")?;
        self.check_tools()?;
        let container = self.check_db_running()?;
        let args = vec![
            "exec".to_owned(),
            "-T".to_owned(),
            container,
            "sh".to_owned(),
            "-c".to_owned(),
            self.db_shell_command(opts),
        ];
        self.with_cleanup(|| {
            let full = self.env_command(&self.cfg, &project, &args)?;
            let rewritten = SqlRewriter::new(BufReader::new(input));
            info!("importing database");
            self.composer.run_with_input(&full, Box::new(rewritten))?;
            Ok(())
        })
    }
}

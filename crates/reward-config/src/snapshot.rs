use crate::platform::{HostOs, Platform};
use crate::types::{EnvType, Features, ProjectName};
use crate::value::{as_string, as_string_list, is_enabled};
use crate::{app_key, ConfigError, APP_NAME};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ADDITIONAL_HTTP_PORTS: &str = "traefik_bind_additional_http_ports";
const ADDITIONAL_HTTPS_PORTS: &str = "traefik_bind_additional_https_ports";

/// Immutable view of the merged configuration for one invocation.
///
/// Keys are lowercase. Application-scoped keys carry the `reward_` prefix;
/// project variables from `.env` (e.g. `php_version`) are kept as written.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    cwd: PathBuf,
    app_home: PathBuf,
    platform: Platform,
    values: BTreeMap<String, Value>,
}

impl ConfigSnapshot {
    pub fn new(
        cwd: PathBuf,
        app_home: PathBuf,
        platform: Platform,
        values: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            cwd,
            app_home,
            platform,
            values,
        }
    }

    /// Copy of this snapshot with one key replaced.
    #[must_use]
    pub fn with_value(&self, key: &str, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.values.insert(key.to_lowercase(), value.into());
        next
    }

    pub fn app_name(&self) -> &'static str {
        APP_NAME
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn app_home(&self) -> &Path {
        &self.app_home
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn os(&self) -> HostOs {
        self.platform.os
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(&key.to_lowercase())
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get(key).map(as_string).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).is_some_and(is_enabled)
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key).map(as_string_list).unwrap_or_default()
    }

    fn app_string(&self, suffix: &str) -> String {
        self.get_string(&app_key(suffix))
    }

    fn app_bool(&self, suffix: &str) -> bool {
        self.get_bool(&app_key(suffix))
    }

    /// The validated project name. Fails with `EnvEmpty` when unset.
    pub fn project_name(&self) -> Result<ProjectName, ConfigError> {
        ProjectName::parse(&self.app_string("env_name"))
    }

    pub fn env_type(&self) -> Result<EnvType, ConfigError> {
        let raw = self.app_string("env_type");
        if raw.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{} is not set in the project .env file",
                app_key("env_type").to_uppercase()
            )));
        }
        EnvType::parse(&raw)
    }

    pub fn features(&self) -> Features {
        Features::from_values(&self.values)
    }

    pub fn web_root(&self) -> String {
        self.app_string("web_root")
    }

    pub fn traefik_domain(&self) -> String {
        self.get_string("traefik_domain")
    }

    pub fn traefik_subdomain(&self) -> String {
        self.get_string("traefik_subdomain")
    }

    /// `<subdomain>.<domain>`, or just the domain when there is no subdomain.
    pub fn full_domain(&self) -> String {
        let sub = self.traefik_subdomain();
        if sub.is_empty() {
            self.traefik_domain()
        } else {
            format!("{sub}.{}", self.traefik_domain())
        }
    }

    pub fn resolve_domain_to_traefik(&self) -> bool {
        self.app_bool("resolve_domain_to_traefik")
    }

    /// Permissive toggle: on unless explicitly switched off.
    pub fn svc_enabled_permissive(&self, name: &str) -> bool {
        match self.get(&app_key(name)) {
            Some(v) => is_enabled(v),
            None => true,
        }
    }

    /// Strict toggle: off unless explicitly switched on.
    pub fn svc_enabled_strict(&self, name: &str) -> bool {
        self.app_bool(name)
    }

    pub fn single_web_container(&self) -> bool {
        self.app_bool("single_web_container")
    }

    pub fn allow_superuser(&self) -> bool {
        self.app_bool("allow_superuser")
    }

    pub fn skip_cleanup(&self) -> bool {
        self.app_bool("skip_cleanup")
    }

    pub fn docker_host(&self) -> Option<String> {
        let host = self.get_string("docker_host");
        (!host.is_empty()).then_some(host)
    }

    pub fn log_level(&self) -> Option<String> {
        let level = self.get_string("log_level");
        (!level.is_empty()).then_some(level.to_lowercase())
    }

    pub fn debug(&self) -> bool {
        self.get_bool("debug")
    }

    pub fn disable_colors(&self) -> bool {
        self.get_bool("disable_colors")
    }

    pub fn ssl_dir(&self) -> PathBuf {
        PathBuf::from(self.app_string("ssl_dir"))
    }

    /// Root CA certificate the proxy and `svc` depend on.
    pub fn ca_cert_path(&self) -> PathBuf {
        self.ssl_dir().join("rootca").join("certs").join("ca.cert.pem")
    }

    /// Effective sync decision, already resolved against the host OS.
    pub fn sync_enabled(&self) -> bool {
        self.app_bool("sync_enabled")
    }

    pub fn synced_container(&self) -> String {
        self.app_string("env_synced_container")
    }

    pub fn synced_dir(&self) -> String {
        self.app_string("env_synced_dir")
    }

    pub fn sync_ignore(&self) -> Vec<String> {
        self.get_list(&app_key("sync_ignore"))
    }

    /// Per-project synchroniser configuration, `<cwd>/.reward/mutagen.yml`.
    pub fn sync_file(&self) -> PathBuf {
        self.local_dir().join("mutagen.yml")
    }

    pub fn mutagen_url(&self) -> String {
        self.app_string("mutagen_url")
    }

    pub fn mutagen_required_version(&self) -> String {
        self.app_string("mutagen_required_version")
    }

    /// `<cwd>/.reward`, the project-local override and state directory.
    pub fn local_dir(&self) -> PathBuf {
        self.cwd.join(format!(".{APP_NAME}"))
    }

    pub fn db_container(&self) -> String {
        self.app_string("env_db_container")
    }

    pub fn db_command(&self) -> String {
        self.app_string("env_db_command")
    }

    /// Reject superuser invocations unless explicitly allowed. Windows and the
    /// `self-update` action are exempt.
    pub fn check_invoker(&self, action: &str) -> Result<(), ConfigError> {
        if self.allow_superuser() || self.platform.os == HostOs::Windows {
            return Ok(());
        }
        if action != "self-update" && self.platform.is_admin {
            return Err(ConfigError::NotAllowed(
                app_key("allow_superuser").to_uppercase(),
            ));
        }
        Ok(())
    }

    /// Flat object handed to templates: every key plus `app_name`.
    pub fn template_context(&self) -> Value {
        let mut map: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        map.insert("app_name".to_owned(), Value::String(APP_NAME.to_owned()));
        map.insert(
            app_key("home_dir"),
            Value::String(self.app_home.display().to_string()),
        );
        map.insert(
            app_key("cwd"),
            Value::String(self.cwd.display().to_string()),
        );
        let ports = [
            (ADDITIONAL_HTTP_PORTS, self.traefik_additional_http_ports()),
            (ADDITIONAL_HTTPS_PORTS, self.traefik_additional_https_ports()),
        ];
        for (suffix, list) in ports {
            map.insert(
                app_key(suffix),
                Value::Array(list.into_iter().map(Value::String).collect()),
            );
        }
        Value::Object(map)
    }

    /// Extra host ports the proxy binds for plain HTTP.
    pub fn traefik_additional_http_ports(&self) -> Vec<String> {
        self.get_list(&app_key(ADDITIONAL_HTTP_PORTS))
    }

    /// Extra host ports the proxy binds for TLS.
    pub fn traefik_additional_https_ports(&self) -> Vec<String> {
        self.get_list(&app_key(ADDITIONAL_HTTPS_PORTS))
    }
}

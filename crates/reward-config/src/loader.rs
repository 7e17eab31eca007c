//! Configuration layering.
//!
//! Precedence, lowest first: application defaults, env-type family defaults,
//! the embedded per-type dotenv, the user YAML file, the project `.env`,
//! `REWARD_*` environment variables, command-line flags. Values derived from
//! the merged result (synced container, php variant, domain defaults, the
//! effective sync decision) are computed last.

use crate::defaults::{application_defaults, family_defaults, parse_dotenv, type_defaults};
use crate::platform::{HostOs, Platform};
use crate::snapshot::ConfigSnapshot;
use crate::types::EnvType;
use crate::value::{as_string, is_enabled};
use crate::{app_key, ConfigError, APP_NAME};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Global options that may be given without the application prefix.
const GLOBAL_KEYS: [&str; 4] = ["log_level", "debug", "disable_colors", "docker_host"];

type Layer = BTreeMap<String, Value>;

pub struct ConfigLoader {
    cwd: PathBuf,
    app_home: Option<PathBuf>,
    user_home: Option<PathBuf>,
    config_file: Option<PathBuf>,
    env: Option<Vec<(String, String)>>,
    flags: Layer,
    platform: Option<Platform>,
}

impl ConfigLoader {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            app_home: None,
            user_home: None,
            config_file: None,
            env: None,
            flags: Layer::new(),
            platform: None,
        }
    }

    #[must_use]
    pub fn app_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.app_home = Some(path.into());
        self
    }

    #[must_use]
    pub fn user_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_home = Some(path.into());
        self
    }

    #[must_use]
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Replace the process environment as the source of `REWARD_*` variables.
    #[must_use]
    pub fn env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Set a value at flag precedence.
    #[must_use]
    pub fn flag(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.flags.insert(key.to_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn load(self) -> Result<ConfigSnapshot, ConfigError> {
        let platform = self.platform.clone().unwrap_or_else(Platform::detect);
        let user_home = match self.user_home.clone() {
            Some(h) => h,
            None => dirs::home_dir().ok_or_else(|| {
                ConfigError::Invalid("cannot determine the user home directory".to_owned())
            })?,
        };

        let env_layer = self.env_layer();

        let config_key = app_key("config_file");
        let config_file = self
            .flags
            .get(&config_key)
            .or_else(|| env_layer.get(&config_key))
            .map(|v| PathBuf::from(as_string(v)))
            .or_else(|| self.config_file.clone())
            .unwrap_or_else(|| user_home.join(format!(".{APP_NAME}.yml")));

        let yaml_layer = read_yaml_layer(&config_file)?;
        let dotenv_layer = read_dotenv_layer(&self.cwd.join(".env"))?;

        let mut user = Layer::new();
        for layer in [yaml_layer, dotenv_layer, env_layer, self.flags.clone()] {
            user.extend(layer);
        }

        let home_key = app_key("home_dir");
        let app_home = user
            .get(&home_key)
            .map(|v| PathBuf::from(as_string(v)))
            .or_else(|| self.app_home.clone())
            .unwrap_or_else(|| user_home.join(format!(".{APP_NAME}")));
        ensure_app_home(&app_home)?;

        let env_type = user
            .get(&app_key("env_type"))
            .and_then(|v| EnvType::parse(&as_string(v)).ok());

        let mut values = application_defaults(&app_home, &user_home, &platform);
        if let Some(t) = env_type {
            values.extend(family_defaults(t));
            values.extend(parse_dotenv(type_defaults(t), t.as_str())?);
        }
        values.extend(user);
        values.insert(home_key, json!(app_home.display().to_string()));
        values.insert(config_key, json!(config_file.display().to_string()));

        derive_values(&mut values, env_type, &platform);

        debug!(
            cwd = %self.cwd.display(),
            app_home = %app_home.display(),
            env_type = env_type.map(EnvType::as_str),
            "configuration loaded"
        );

        Ok(ConfigSnapshot::new(self.cwd, app_home, platform, values))
    }

    fn env_layer(&self) -> Layer {
        let vars: Vec<(String, String)> = match &self.env {
            Some(v) => v.clone(),
            None => std::env::vars().collect(),
        };
        let prefix = format!("{APP_NAME}_");
        let mut layer = Layer::new();
        for (key, value) in vars {
            let key = key.to_lowercase();
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            if GLOBAL_KEYS.contains(&rest) {
                layer.insert(rest.to_owned(), Value::String(value.clone()));
            }
            layer.insert(key, Value::String(value));
        }
        layer
    }
}

fn read_yaml_layer(path: &Path) -> Result<Layer, ConfigError> {
    if !path.is_file() {
        debug!(path = %path.display(), "no user config file");
        return Ok(Layer::new());
    }
    let content = fs::read_to_string(path)?;
    let parsed: Option<BTreeMap<String, Value>> =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.display().to_string(),
            source,
        })?;
    Ok(parsed
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect())
}

fn read_dotenv_layer(path: &Path) -> Result<Layer, ConfigError> {
    if !path.is_file() {
        return Ok(Layer::new());
    }
    let content = fs::read_to_string(path)?;
    parse_dotenv(&content, &path.display().to_string())
}

/// Create the application home with mode 0700 if it is missing, and reject an
/// existing one the owner cannot fully access.
fn ensure_app_home(path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
        }
        return Ok(());
    }
    if !path.is_dir() {
        return Err(ConfigError::Invalid(format!(
            "application home {} is not a directory",
            path.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)?.permissions().mode();
        if mode & 0o700 != 0o700 {
            return Err(ConfigError::Invalid(format!(
                "application home {} has mode {:o}, expected at least 0700",
                path.display(),
                mode & 0o777
            )));
        }
    }
    Ok(())
}

fn derive_values(values: &mut Layer, env_type: Option<EnvType>, platform: &Platform) {
    let name_key = app_key("env_name");
    let env_name = values.get(&name_key).map(as_string).unwrap_or_default();
    let env_name = env_name.trim().to_lowercase();
    if !env_name.is_empty() {
        values.insert(name_key, json!(env_name));
        values
            .entry("traefik_domain".to_owned())
            .or_insert_with(|| json!(format!("{env_name}.test")));
    }
    values
        .entry("traefik_subdomain".to_owned())
        .or_insert_with(|| json!(""));

    if let Some(t) = env_type {
        if t.has_php_variant() {
            let variant = if values.get(&app_key("single_web_container")).is_some_and(is_enabled) {
                format!("-{}-web", t.as_str())
            } else {
                format!("-{}", t.as_str())
            };
            values.insert(app_key("svc_php_variant"), json!(variant));
            values.insert(
                app_key("svc_php_debug_variant"),
                json!(format!("-{}", t.as_str())),
            );
        }
    }

    let synced_container = override_or(values, "sync_container", || {
        env_type.map_or("php-fpm", EnvType::default_synced_container)
    });
    let synced_dir = override_or(values, "sync_path", || {
        env_type.map_or("/var/www/html", EnvType::default_synced_dir)
    });
    values.insert(app_key("env_synced_container"), json!(synced_container));
    values.insert(app_key("env_synced_dir"), json!(synced_dir));

    let selenium_key = app_key("selenium_debug");
    let selenium = if values.get(&selenium_key).is_some_and(is_enabled) {
        "-debug"
    } else {
        ""
    };
    values.insert(selenium_key, json!(selenium));

    let sync = effective_sync(values, platform.os);
    values.insert(app_key("sync_enabled"), json!(sync));
}

fn override_or(values: &Layer, suffix: &str, fallback: impl FnOnce() -> &'static str) -> String {
    let configured = values.get(&app_key(suffix)).map(as_string).unwrap_or_default();
    if configured.is_empty() {
        fallback().to_owned()
    } else {
        configured
    }
}

/// An explicit `sync_enabled` or `mutagen_enabled` wins on any OS. Otherwise
/// sync runs on macOS, and on Windows unless WSL2 direct mount is requested.
fn effective_sync(values: &Layer, os: HostOs) -> bool {
    for suffix in ["sync_enabled", "mutagen_enabled"] {
        if let Some(v) = values.get(&app_key(suffix)) {
            return is_enabled(v);
        }
    }
    match os {
        HostOs::Darwin => true,
        HostOs::Windows => !values
            .get(&app_key("wsl2_direct_mount"))
            .is_some_and(is_enabled),
        HostOs::Linux => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux() -> Platform {
        Platform::new(HostOs::Linux, "amd64", false)
    }

    #[test]
    fn sync_defaults_follow_os() {
        let empty = Layer::new();
        assert!(effective_sync(&empty, HostOs::Darwin));
        assert!(effective_sync(&empty, HostOs::Windows));
        assert!(!effective_sync(&empty, HostOs::Linux));

        let mut wsl = Layer::new();
        wsl.insert("reward_wsl2_direct_mount".into(), json!("true"));
        assert!(!effective_sync(&wsl, HostOs::Windows));
    }

    #[test]
    fn explicit_sync_wins_on_any_os() {
        let mut on = Layer::new();
        on.insert("reward_mutagen_enabled".into(), json!(true));
        assert!(effective_sync(&on, HostOs::Linux));

        let mut off = Layer::new();
        off.insert("reward_sync_enabled".into(), json!("false"));
        assert!(!effective_sync(&off, HostOs::Darwin));
    }

    #[test]
    fn derive_sets_php_variant_for_php_types() {
        let mut values = Layer::new();
        derive_values(&mut values, Some(EnvType::Magento2), &linux());
        assert_eq!(values["reward_svc_php_variant"], json!("-magento2"));

        let mut values = Layer::new();
        values.insert("reward_single_web_container".into(), json!(true));
        derive_values(&mut values, Some(EnvType::Magento2), &linux());
        assert_eq!(values["reward_svc_php_variant"], json!("-magento2-web"));
        assert_eq!(values["reward_svc_php_debug_variant"], json!("-magento2"));

        let mut values = Layer::new();
        derive_values(&mut values, Some(EnvType::Laravel), &linux());
        assert!(!values.contains_key("reward_svc_php_variant"));
    }

    #[test]
    fn derive_honours_sync_overrides() {
        let mut values = Layer::new();
        values.insert("reward_sync_container".into(), json!("cli"));
        derive_values(&mut values, Some(EnvType::PwaStudio), &linux());
        assert_eq!(values["reward_env_synced_container"], json!("cli"));
        assert_eq!(values["reward_env_synced_dir"], json!("/usr/src/app"));
    }

    #[test]
    fn selenium_debug_becomes_suffix() {
        let mut values = Layer::new();
        values.insert("reward_selenium_debug".into(), json!("true"));
        derive_values(&mut values, None, &linux());
        assert_eq!(values["reward_selenium_debug"], json!("-debug"));

        let mut values = Layer::new();
        derive_values(&mut values, None, &linux());
        assert_eq!(values["reward_selenium_debug"], json!(""));
    }

    #[test]
    fn env_layer_maps_prefixed_globals() {
        let loader = ConfigLoader::new("/tmp").env_vars([
            ("REWARD_LOG_LEVEL", "debug"),
            ("REWARD_DB", "false"),
            ("PATH", "/usr/bin"),
        ]);
        let layer = loader.env_layer();
        assert_eq!(layer["log_level"], json!("debug"));
        assert_eq!(layer["reward_log_level"], json!("debug"));
        assert_eq!(layer["reward_db"], json!("false"));
        assert!(!layer.contains_key("path"));
    }
}

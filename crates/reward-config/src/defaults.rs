//! Built-in defaults.
//!
//! Three tiers, lowest first: application defaults that hold for every
//! project, defaults that depend on the environment type family (PWA, local,
//! everything else), and the per-type dotenv documents shipped with the binary.

use crate::platform::{HostOs, Platform};
use crate::types::EnvType;
use crate::{app_key, ConfigError};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub const MUTAGEN_URL: &str =
    "https://github.com/mutagen-io/mutagen/releases/download/v0.14.0/mutagen_windows_amd64_v0.14.0.zip";
pub const MUTAGEN_REQUIRED_VERSION: &str = "0.11.8";

/// The dotenv document holding feature toggles and version pins for `env_type`.
pub fn type_defaults(env_type: EnvType) -> &'static str {
    match env_type {
        EnvType::GenericPhp => include_str!("defaults/generic-php.env"),
        EnvType::Magento1 => include_str!("defaults/magento1.env"),
        EnvType::Magento2 => include_str!("defaults/magento2.env"),
        EnvType::Laravel => include_str!("defaults/laravel.env"),
        EnvType::PwaStudio => include_str!("defaults/pwa-studio.env"),
        EnvType::Symfony => include_str!("defaults/symfony.env"),
        EnvType::Shopware => include_str!("defaults/shopware.env"),
        EnvType::Wordpress => include_str!("defaults/wordpress.env"),
        EnvType::Local => include_str!("defaults/local.env"),
    }
}

/// Parse a dotenv document into lowercased keys with string values.
pub fn parse_dotenv(content: &str, origin: &str) -> Result<BTreeMap<String, Value>, ConfigError> {
    let mut out = BTreeMap::new();
    for item in dotenvy::from_read_iter(content.as_bytes()) {
        let (key, value) = item.map_err(|source| ConfigError::Dotenv {
            path: origin.to_owned(),
            source,
        })?;
        out.insert(key.to_lowercase(), Value::String(value));
    }
    Ok(out)
}

/// Defaults shared by every invocation.
pub fn application_defaults(
    app_home: &Path,
    user_home: &Path,
    platform: &Platform,
) -> BTreeMap<String, Value> {
    let ssl_dir = app_home.join("ssl");
    let mut d = BTreeMap::new();
    let mut set = |suffix: &str, value: Value| {
        d.insert(app_key(suffix), value);
    };

    set("ssl_dir", json!(ssl_dir.display().to_string()));
    set("ssl_ca_dir", json!(ssl_dir.join("rootca").display().to_string()));
    set("ssl_cert_dir", json!(ssl_dir.join("certs").display().to_string()));
    set(
        "composer_dir",
        json!(user_home.join(".composer").display().to_string()),
    );
    set("ssh_dir", json!(user_home.join(".ssh").display().to_string()));
    set("runtime_os", json!(platform.os.as_str()));
    set("runtime_arch", json!(platform.arch));
    set("resolve_domain_to_traefik", json!(true));
    set("service_domain", json!(format!("{}.test", crate::APP_NAME)));

    set("mutagen_url", json!(MUTAGEN_URL));
    set("mutagen_required_version", json!(MUTAGEN_REQUIRED_VERSION));

    for svc in ["portainer", "dnsmasq", "mailhog", "phpmyadmin", "tunnel", "elastichq"] {
        set(svc, json!(true));
    }
    set("adminer", json!(false));

    set("shared_composer", json!(true));
    set("single_web_container", json!(false));
    set("opensearch_dashboards", json!(true));
    set("env_db_command", json!("mysql"));
    set("env_db_dump_command", json!("mysqldump"));
    set("env_db_container", json!("db"));

    if platform.os == HostOs::Windows {
        d.insert("xdebug_connect_back_host".to_owned(), json!("host.docker.internal"));
    }

    d
}

/// Defaults that depend on the type family rather than the exact type.
pub fn family_defaults(env_type: EnvType) -> BTreeMap<String, Value> {
    let on: &[&str];
    let off: &[&str];
    match env_type {
        EnvType::PwaStudio => {
            on = &["node"];
            off = &[
                "db",
                "nginx",
                "php_fpm",
                "redis",
                "varnish",
                "elasticsearch",
                "opensearch",
                "opensearch_dashboards",
                "rabbitmq",
            ];
        }
        EnvType::Local => {
            on = &[];
            off = &["varnish", "elasticsearch", "opensearch", "rabbitmq"];
        }
        _ => {
            on = &["php_fpm", "nginx", "db", "redis"];
            off = &[];
        }
    }

    on.iter()
        .map(|k| (app_key(k), json!(true)))
        .chain(off.iter().map(|k| (app_key(k), json!(false))))
        .collect()
}

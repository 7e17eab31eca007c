//! Static and dynamic configuration for the shared reverse proxy.

use crate::assets;
use crate::render::Renderer;
use crate::select::{Fragment, FragmentOrigin};
use crate::ComposeError;
use reward_config::ConfigSnapshot;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const TRAEFIK_TEMPLATE: &str = "templates/traefik/traefik.yml";
const CERT_SUFFIX: &str = ".crt.pem";

/// Paths of the files written by [`write_traefik_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraefikFiles {
    pub static_config: PathBuf,
    pub dynamic_config: PathBuf,
}

/// `<home>/etc/traefik`.
pub fn config_dir(cfg: &ConfigSnapshot) -> PathBuf {
    cfg.app_home().join("etc").join("traefik")
}

/// Render `traefik.yml` and regenerate `dynamic.yml` from the certificates
/// present under `<home>/ssl/certs`.
pub fn write_traefik_config(cfg: &ConfigSnapshot) -> Result<TraefikFiles, ComposeError> {
    let dir = config_dir(cfg);
    fs::create_dir_all(&dir)?;

    let source = assets::embedded(TRAEFIK_TEMPLATE)
        .ok_or_else(|| ComposeError::MissingAsset(TRAEFIK_TEMPLATE.to_owned()))?;
    let fragment = Fragment {
        name: TRAEFIK_TEMPLATE.to_owned(),
        origin: FragmentOrigin::Embedded,
        source: source.to_owned(),
    };
    debug!(
        http = ?cfg.traefik_additional_http_ports(),
        https = ?cfg.traefik_additional_https_ports(),
        "additional proxy entry points"
    );
    let static_config = dir.join("traefik.yml");
    fs::write(&static_config, Renderer::new(cfg)?.render(&fragment)?)?;

    let certs = certificate_names(&cfg.app_home().join("ssl").join("certs"))?;
    debug!(?certs, "available certificates");
    let dynamic_config = dir.join("dynamic.yml");
    fs::write(
        &dynamic_config,
        dynamic_config_yaml(&cfg.get_string("reward_service_domain"), &certs),
    )?;

    Ok(TraefikFiles {
        static_config,
        dynamic_config,
    })
}

/// Base names (without `.crt.pem`) of the certificates in `dir`, sorted.
/// A missing directory yields no certificates.
pub fn certificate_names(dir: &Path) -> Result<Vec<String>, ComposeError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut names = Vec::new();
    for entry in entries {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if let Some(base) = name.strip_suffix(CERT_SUFFIX) {
            trace!(certificate = base, "found certificate");
            names.push(base.to_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn dynamic_config_yaml(service_domain: &str, certs: &[String]) -> String {
    let mut out = format!(
        "tls:
  stores:
    default:
      defaultCertificate:
        certFile: /etc/ssl/certs/{service_domain}.crt.pem
        keyFile: /etc/ssl/certs/{service_domain}.key.pem
  certificates:
"
    );
    if certs.is_empty() {
        out = out.replace("  certificates:\n", "  certificates: []\n");
    }
    for name in certs {
        let _ = write!(
            out,
            "    - certFile: /etc/ssl/certs/{name}.crt.pem\n      keyFile: /etc/ssl/certs/{name}.key.pem\n"
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use reward_config::{HostOs, Platform};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn snapshot(home: &Path) -> ConfigSnapshot {
        let mut values = BTreeMap::new();
        values.insert("reward_service_domain".to_owned(), json!("reward.test"));
        values.insert("reward_traefik_log_level".to_owned(), json!("debug"));
        ConfigSnapshot::new(
            home.join("project"),
            home.to_path_buf(),
            Platform::new(HostOs::Linux, "amd64", false),
            values,
        )
    }

    #[test]
    fn writes_static_and_dynamic_config() {
        let home = tempfile::tempdir().unwrap();
        let certs = home.path().join("ssl/certs");
        fs::create_dir_all(&certs).unwrap();
        for f in ["shop.test.crt.pem", "shop.test.key.pem", "reward.test.crt.pem", "notes.txt"] {
            fs::write(certs.join(f), "").unwrap();
        }

        let files = write_traefik_config(&snapshot(home.path())).unwrap();
        assert_eq!(files.static_config, home.path().join("etc/traefik/traefik.yml"));

        let static_cfg = fs::read_to_string(&files.static_config).unwrap();
        assert!(static_cfg.contains("level: DEBUG"));
        assert!(static_cfg.contains("network: reward"));

        let dynamic = fs::read_to_string(&files.dynamic_config).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&dynamic).unwrap();
        assert_eq!(
            doc["tls"]["stores"]["default"]["defaultCertificate"]["certFile"],
            serde_yaml::Value::from("/etc/ssl/certs/reward.test.crt.pem")
        );
        let listed: Vec<&str> = doc["tls"]["certificates"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|c| c["certFile"].as_str().unwrap())
            .collect();
        assert_eq!(
            listed,
            vec![
                "/etc/ssl/certs/reward.test.crt.pem",
                "/etc/ssl/certs/shop.test.crt.pem"
            ]
        );
    }

    #[test]
    fn no_certificates_is_still_valid_yaml() {
        let home = tempfile::tempdir().unwrap();
        let files = write_traefik_config(&snapshot(home.path())).unwrap();
        let dynamic = fs::read_to_string(files.dynamic_config).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&dynamic).unwrap();
        assert!(doc["tls"]["certificates"].as_sequence().unwrap().is_empty());
    }
}

//! Attaching the shared services to project networks.
//!
//! The shared services run under the application's own environment name.
//! The proxy is always peered; the others follow their toggles.

use crate::CoreError;
use reward_config::{ConfigSnapshot, APP_NAME};
use reward_runtime::Introspector;
use tracing::debug;

/// The reverse proxy every environment routes through.
pub const PROXY_SERVICE: &str = "traefik";

/// Peered when not switched off.
const ON_BY_DEFAULT: [&str; 4] = ["tunnel", "mailhog", "phpmyadmin", "elastichq"];
/// Peered only when switched on.
const OFF_BY_DEFAULT: [&str; 1] = ["adminer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAction {
    Connect,
    Disconnect,
}

/// Shared services to attach to project networks, proxy first.
pub fn peered_services(cfg: &ConfigSnapshot) -> Vec<&'static str> {
    let mut services = vec![PROXY_SERVICE];
    services.extend(
        ON_BY_DEFAULT
            .iter()
            .copied()
            .filter(|s| cfg.svc_enabled_permissive(s)),
    );
    services.extend(
        OFF_BY_DEFAULT
            .iter()
            .copied()
            .filter(|s| cfg.svc_enabled_strict(s)),
    );
    services
}

fn proxy_aliases(cfg: &ConfigSnapshot) -> Vec<String> {
    if !cfg.resolve_domain_to_traefik() {
        return Vec::new();
    }
    let mut aliases = vec![cfg.traefik_domain()];
    let full = cfg.full_domain();
    if !aliases.contains(&full) {
        aliases.push(full);
    }
    aliases.retain(|a| !a.is_empty());
    aliases
}

/// Connect or disconnect every peered service container on `network`.
///
/// Containers already in the requested state are skipped. A failing attach
/// or detach is logged and the loop continues; only listing failures are
/// returned.
pub fn peer_services(
    introspector: &Introspector,
    cfg: &ConfigSnapshot,
    network: &str,
    action: PeerAction,
) -> Result<(), CoreError> {
    let runtime = introspector.runtime();
    for service in peered_services(cfg) {
        let aliases = if service == PROXY_SERVICE {
            proxy_aliases(cfg)
        } else {
            Vec::new()
        };
        let selectors = [
            introspector.container_label(service),
            introspector.environment_label(APP_NAME),
        ];
        for container in introspector.containers_by_label(&selectors)? {
            let attached = container.networks.contains_key(network);
            let result = match action {
                PeerAction::Connect if attached => {
                    debug!(service, network, "already connected");
                    continue;
                }
                PeerAction::Disconnect if !attached => {
                    debug!(service, network, "not connected");
                    continue;
                }
                PeerAction::Connect => {
                    debug!(service, network, ?aliases, "connecting");
                    runtime.connect_network(network, &container.id, &aliases)
                }
                PeerAction::Disconnect => {
                    debug!(service, network, "disconnecting");
                    runtime.disconnect_network(network, &container.id)
                }
            };
            if let Err(e) = result {
                debug!(service, network, "{e}");
            }
        }
    }
    Ok(())
}

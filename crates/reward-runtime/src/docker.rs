//! Docker Engine API backend.

use crate::introspect::{ContainerInfo, ContainerRuntime, Endpoint, NetworkFilter};
use crate::RuntimeError;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, EndpointSettings};
use bollard::network::{ConnectNetworkOptions, DisconnectNetworkOptions, ListNetworksOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use std::collections::HashMap;
use std::future::Future;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// [`ContainerRuntime`] backed by the Docker daemon.
///
/// The orchestrator is synchronous; each call drives the bollard future to
/// completion on a private current-thread tokio runtime.
pub struct DockerRuntime {
    client: Docker,
    rt: Runtime,
}

impl DockerRuntime {
    /// Connect to `host` when given (`unix://`, `tcp://`, `http://`), otherwise
    /// to the platform default honouring `DOCKER_HOST`.
    pub fn connect(host: Option<&str>) -> Result<Self, RuntimeError> {
        let client = match host {
            None => Docker::connect_with_local_defaults(),
            Some(h) if h.starts_with("unix://") || h.starts_with("npipe://") => {
                Docker::connect_with_socket(h, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(h) if h.starts_with("tcp://") || h.starts_with("http://") => {
                Docker::connect_with_http(h, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(other) => {
                return Err(RuntimeError::Api(format!(
                    "unsupported docker host '{other}'"
                )))
            }
        }
        .map_err(api_err)?;

        let rt = Builder::new_current_thread().enable_all().build()?;
        debug!(host = host.unwrap_or("default"), "docker client ready");
        Ok(Self { client, rt })
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.rt.block_on(fut)
    }
}

fn api_err(e: bollard::errors::Error) -> RuntimeError {
    RuntimeError::Api(e.to_string())
}

fn summary_to_info(summary: ContainerSummary) -> ContainerInfo {
    let networks = summary
        .network_settings
        .and_then(|s| s.networks)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, ep)| (name, endpoint_from(ep)))
        .collect();

    ContainerInfo {
        id: summary.id.unwrap_or_default(),
        names: summary
            .names
            .unwrap_or_default()
            .into_iter()
            .map(|n| n.trim_start_matches('/').to_owned())
            .collect(),
        state: summary.state.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default().into_iter().collect(),
        networks,
    }
}

fn endpoint_from(ep: EndpointSettings) -> Endpoint {
    Endpoint {
        ip_address: ep.ip_address.unwrap_or_default(),
        gateway: ep.gateway.unwrap_or_default(),
        aliases: ep.aliases.unwrap_or_default(),
    }
}

impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    fn list_containers(&self, selectors: &[String]) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_owned(), selectors.to_vec());
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };
        let found = self
            .block_on(self.client.list_containers(Some(options)))
            .map_err(api_err)?;
        Ok(found.into_iter().map(summary_to_info).collect())
    }

    fn list_networks(&self, filter: &NetworkFilter) -> Result<Vec<String>, RuntimeError> {
        let (key, value) = match filter {
            NetworkFilter::Name(n) => ("name", n.clone()),
            NetworkFilter::Label(l) => ("label", l.clone()),
        };
        let mut filters = HashMap::new();
        filters.insert(key.to_owned(), vec![value]);
        let found = self
            .block_on(
                self.client
                    .list_networks(Some(ListNetworksOptions::<String> { filters })),
            )
            .map_err(api_err)?;
        Ok(found.into_iter().filter_map(|n| n.name).collect())
    }

    fn connect_network(
        &self,
        network: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<(), RuntimeError> {
        let endpoint_config = EndpointSettings {
            aliases: (!aliases.is_empty()).then(|| aliases.to_vec()),
            ..Default::default()
        };
        let options = ConnectNetworkOptions {
            container: container_id.to_owned(),
            endpoint_config,
        };
        self.block_on(self.client.connect_network(network, options))
            .map_err(api_err)
    }

    fn disconnect_network(&self, network: &str, container_id: &str) -> Result<(), RuntimeError> {
        let options = DisconnectNetworkOptions {
            container: container_id.to_owned(),
            force: false,
        };
        self.block_on(self.client.disconnect_network(network, options))
            .map_err(api_err)
    }

    fn server_version(&self) -> Result<String, RuntimeError> {
        let v = self.block_on(self.client.version()).map_err(api_err)?;
        v.version
            .ok_or_else(|| RuntimeError::Api("daemon did not report a version".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::ContainerSummaryNetworkSettings;

    #[test]
    fn summary_conversion_strips_slashes() {
        let mut networks = HashMap::new();
        networks.insert(
            "shop_default".to_owned(),
            EndpointSettings {
                ip_address: Some("172.20.0.5".to_owned()),
                gateway: Some("172.20.0.1".to_owned()),
                aliases: Some(vec!["shop.test".to_owned()]),
                ..Default::default()
            },
        );
        let summary = ContainerSummary {
            id: Some("abc123".to_owned()),
            names: Some(vec!["/traefik".to_owned()]),
            state: Some("running".to_owned()),
            network_settings: Some(ContainerSummaryNetworkSettings {
                networks: Some(networks),
            }),
            ..Default::default()
        };

        let info = summary_to_info(summary);
        assert_eq!(info.id, "abc123");
        assert_eq!(info.names, vec!["traefik"]);
        assert!(info.is_running());
        let ep = &info.networks["shop_default"];
        assert_eq!(ep.ip_address, "172.20.0.5");
        assert_eq!(ep.gateway, "172.20.0.1");
        assert_eq!(ep.aliases, vec!["shop.test"]);
    }

    #[test]
    fn rejects_unknown_host_scheme() {
        assert!(matches!(
            DockerRuntime::connect(Some("ssh://example")),
            Err(RuntimeError::Api(_))
        ));
    }
}

//! Label-scoped container and network queries.
//!
//! Every container Reward manages carries `dev.<app>.container.name=<name>`
//! and `dev.<app>.environment.name=<env>` labels. Global services use the
//! application name as their environment name.

use crate::version::{meets_minimum, parse_version, Version};
use crate::RuntimeError;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, trace};

pub const DOCKER_MIN_VERSION: &str = "20.4.0";

/// One network attachment of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub ip_address: String,
    pub gateway: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub names: Vec<String>,
    pub state: String,
    pub labels: BTreeMap<String, String>,
    pub networks: BTreeMap<String, Endpoint>,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkFilter {
    /// Exact network name.
    Name(String),
    /// `key` or `key=value` label selector.
    Label(String),
}

/// Container runtime capability used by the orchestrator.
pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// All containers (running or not) carrying every `key=value` selector.
    fn list_containers(&self, selectors: &[String]) -> Result<Vec<ContainerInfo>, RuntimeError>;

    fn list_networks(&self, filter: &NetworkFilter) -> Result<Vec<String>, RuntimeError>;

    fn connect_network(
        &self,
        network: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<(), RuntimeError>;

    fn disconnect_network(&self, network: &str, container_id: &str) -> Result<(), RuntimeError>;

    fn server_version(&self) -> Result<String, RuntimeError>;
}

/// Query façade over a [`ContainerRuntime`], scoped to one application and
/// optionally to one environment.
#[derive(Clone)]
pub struct Introspector {
    runtime: Arc<dyn ContainerRuntime>,
    app: String,
    environment: Option<String>,
}

impl Introspector {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, app: impl Into<String>) -> Self {
        Self {
            runtime,
            app: app.into(),
            environment: None,
        }
    }

    /// Scope name-based lookups to containers of `environment`.
    #[must_use]
    pub fn for_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn container_label(&self, name: &str) -> String {
        format!("dev.{}.container.name={name}", self.app)
    }

    pub fn environment_label(&self, environment: &str) -> String {
        format!("dev.{}.environment.name={environment}", self.app)
    }

    pub fn containers_by_label(
        &self,
        selectors: &[String],
    ) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let found = self.runtime.list_containers(selectors)?;
        trace!(?selectors, count = found.len(), "listed containers");
        Ok(found)
    }

    /// IPv4 address of `name` (in `environment`) on `network`.
    pub fn container_address_in_network(
        &self,
        name: &str,
        environment: &str,
        network: &str,
    ) -> Result<Ipv4Addr, RuntimeError> {
        let container = self.single(name, Some(environment))?;
        let endpoint = endpoint_in(&container, name, network)?;
        debug!(container = name, network, address = %endpoint.ip_address, "container address");
        parse_ipv4(name, &endpoint.ip_address)
    }

    /// Gateway of `name`'s endpoint on `network`.
    pub fn container_gateway_in_network(
        &self,
        name: &str,
        network: &str,
    ) -> Result<Ipv4Addr, RuntimeError> {
        let container = self.single(name, self.environment.as_deref())?;
        let endpoint = endpoint_in(&container, name, network)?;
        parse_ipv4(name, &endpoint.gateway)
    }

    pub fn container_id_by_name(&self, name: &str) -> Result<String, RuntimeError> {
        Ok(self.single(name, self.environment.as_deref())?.id)
    }

    pub fn container_state_by_name(&self, name: &str) -> Result<String, RuntimeError> {
        Ok(self.single(name, self.environment.as_deref())?.state)
    }

    pub fn network_exists(&self, network: &str) -> Result<bool, RuntimeError> {
        let found = self
            .runtime
            .list_networks(&NetworkFilter::Name(network.to_owned()))?;
        // the runtime's name filter is a substring match
        Ok(found.iter().any(|n| n == network))
    }

    pub fn networks_by_label(&self, label: &str) -> Result<Vec<String>, RuntimeError> {
        let found = self
            .runtime
            .list_networks(&NetworkFilter::Label(label.to_owned()))?;
        trace!(label, ?found, "networks by label");
        Ok(found)
    }

    pub fn runtime_version(&self) -> Result<Version, RuntimeError> {
        parse_version(&self.runtime.server_version()?)
    }

    /// Installed runtime version and whether it satisfies `minimum`.
    pub fn check_runtime_version(&self, minimum: &str) -> Result<(Version, bool), RuntimeError> {
        let installed = self.runtime_version()?;
        let ok = meets_minimum(&installed, minimum)?;
        debug!(%installed, minimum, ok, "container runtime version");
        Ok((installed, ok))
    }

    fn single(&self, name: &str, environment: Option<&str>) -> Result<ContainerInfo, RuntimeError> {
        let mut selectors = vec![self.container_label(name)];
        if let Some(env) = environment {
            selectors.push(self.environment_label(env));
        }
        let mut found = self.runtime.list_containers(&selectors)?;
        match found.len() {
            0 => Err(RuntimeError::NotFound(selectors.join(", "))),
            1 => Ok(found.remove(0)),
            _ => Err(RuntimeError::Ambiguous {
                name: name.to_owned(),
                matches: found.into_iter().flat_map(|c| c.names).collect(),
            }),
        }
    }
}

fn endpoint_in<'a>(
    container: &'a ContainerInfo,
    name: &str,
    network: &str,
) -> Result<&'a Endpoint, RuntimeError> {
    container
        .networks
        .get(network)
        .ok_or_else(|| RuntimeError::NoSuchNetwork {
            container: name.to_owned(),
            network: network.to_owned(),
        })
}

fn parse_ipv4(container: &str, raw: &str) -> Result<Ipv4Addr, RuntimeError> {
    raw.parse().map_err(|_| RuntimeError::InvalidAddress {
        container: container.to_owned(),
        address: raw.to_owned(),
    })
}

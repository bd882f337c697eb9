//! Container runtime collaborator
//!
//! The runtime is reached through traits so the sequencer never talks to
//! Docker directly: production uses the CLI-backed implementation in
//! [`cli`], tests substitute fakes.

pub mod cli;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;

use crate::errors::DeployerError;

/// Error fragment Docker reports when swarm init cannot pick an address.
/// Recognizing it lets the sequencer ask the operator for one.
pub const ADVERTISE_ADDR_ERROR: &str = "could not choose an IP address to advertise";

/// Desired node configuration for the single-node case
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSpec {
    pub availability: String,
    pub role: String,
    pub labels: BTreeMap<String, String>,
}

impl NodeSpec {
    /// Labels for a lone node that has to carry both the datastore and the
    /// database
    pub fn single_node_manager() -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("datastore".to_string(), "true".to_string());
        labels.insert("database".to_string(), "true".to_string());
        Self {
            availability: "active".to_string(),
            role: "manager".to_string(),
            labels,
        }
    }
}

/// Overlay network parameters. Both flavors are always encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub attachable: bool,
    pub internal: bool,
}

impl NetworkSpec {
    /// Externally attachable overlay network (proxy side)
    pub fn attachable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attachable: true,
            internal: false,
        }
    }

    /// Internal-only overlay network (application stack side)
    pub fn internal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attachable: false,
            internal: true,
        }
    }
}

/// Low-level container runtime operations
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Cluster id when this host is already a swarm member
    async fn cluster_id(&self) -> Result<Option<String>, DeployerError>;

    /// Initialize a new swarm, returning the cluster id
    async fn swarm_init(&self, advertise_addr: Option<&str>) -> Result<String, DeployerError>;

    /// Node ids of the cluster
    async fn list_nodes(&self) -> Result<Vec<String>, DeployerError>;

    /// Update a node's availability, role and labels
    async fn update_node(&self, node_id: &str, spec: &NodeSpec) -> Result<(), DeployerError>;

    /// Names of all deployed services
    async fn list_services(&self) -> Result<Vec<String>, DeployerError>;

    /// Normalized task states ("running", "pending", ...) of a service
    async fn service_task_states(&self, service: &str) -> Result<Vec<String>, DeployerError>;

    /// Names of all registered secrets
    async fn list_secret_names(&self) -> Result<Vec<String>, DeployerError>;

    /// Register a new immutable secret
    async fn create_secret(&self, name: &str, data: &[u8]) -> Result<(), DeployerError>;

    /// Names of all networks
    async fn list_networks(&self) -> Result<Vec<String>, DeployerError>;

    /// Create an encrypted overlay network
    async fn create_network(&self, spec: &NetworkSpec) -> Result<(), DeployerError>;

    /// Attach a container to a network. Already-attached is not an error.
    async fn connect_network(&self, network: &str, container: &str) -> Result<(), DeployerError>;
}

/// Stack submission capability.
///
/// Two implementations exist: the shell-based one in [`cli`] (the
/// production path) and the management-API one in [`crate::mgmt::api`].
#[async_trait]
pub trait StackDeployer: Send + Sync {
    /// Deploy the stack described by `compose_file` under `stack`
    async fn deploy(&self, compose_file: &Path, stack: &str) -> Result<(), DeployerError>;
}

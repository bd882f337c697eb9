//! Idempotent resource provisioning
//!
//! Every ensure-function is a no-op when the resource already exists.
//! There is no rollback on partial failure: rerunning the whole sequence
//! is the recovery path.

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::runtime::{ContainerRuntime, NetworkSpec};

/// Flavor of an overlay network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFlavor {
    /// Externally attachable, used by the proxy
    Attachable,

    /// Internal-only, used by the application stack
    Internal,
}

/// Idempotent provisioner for paths, networks and secrets
pub struct Provisioner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl Provisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Ensure a directory exists
    pub async fn ensure_path(&self, dir: &Dir) -> Result<(), DeployerError> {
        dir.create().await
    }

    /// Ensure a shared data directory exists, owned by the given uid/gid
    pub async fn ensure_owned_path(
        &self,
        dir: &Dir,
        owner: Option<(u32, u32)>,
    ) -> Result<(), DeployerError> {
        match owner {
            Some((uid, gid)) => dir.create_owned(uid, gid).await,
            None => dir.create().await,
        }
    }

    /// Ensure an encrypted overlay network exists
    pub async fn ensure_overlay_network(
        &self,
        name: &str,
        flavor: NetworkFlavor,
    ) -> Result<(), DeployerError> {
        let existing = self.runtime.list_networks().await?;
        if existing.iter().any(|n| n == name) {
            debug!("network '{}' already exists", name);
            return Ok(());
        }

        let spec = match flavor {
            NetworkFlavor::Attachable => NetworkSpec::attachable(name),
            NetworkFlavor::Internal => NetworkSpec::internal(name),
        };
        info!("creating overlay network '{}'", name);
        self.runtime.create_network(&spec).await
    }

    /// Ensure a secret exists with the given content.
    ///
    /// Runtime secrets are immutable, so an existing secret of the same
    /// name is left untouched whatever its content.
    pub async fn ensure_secret(&self, name: &str, data: &[u8]) -> Result<(), DeployerError> {
        let existing = self.runtime.list_secret_names().await?;
        if existing.iter().any(|n| n == name) {
            debug!("secret '{}' already exists", name);
            return Ok(());
        }

        info!("creating secret '{}'", name);
        self.runtime.create_secret(name, data).await
    }

    /// Ensure a secret exists with the content of a credential file
    pub async fn ensure_secret_from_file(
        &self,
        name: &str,
        file: &File,
    ) -> Result<(), DeployerError> {
        let existing = self.runtime.list_secret_names().await?;
        if existing.iter().any(|n| n == name) {
            debug!("secret '{}' already exists", name);
            return Ok(());
        }

        let data = file.read_bytes().await?;
        info!("creating secret '{}'", name);
        self.runtime.create_secret(name, &data).await
    }
}

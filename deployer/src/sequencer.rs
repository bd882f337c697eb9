//! Deployment sequencer
//!
//! The ordered, resumable bootstrap: swarm init, proxy, management UI,
//! application stack, certificate-mode reconciliation. Every provisioning
//! step is idempotent, so a run interrupted anywhere can simply be
//! re-executed from the top.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;
use tracing::{info, warn};

use crate::certs;
use crate::context::{DeploymentContext, HttpsMode};
use crate::convergence::{ConvergenceWaiter, ProxyNotifier, WaiterOptions};
use crate::credentials::{generate_password, CredentialStore};
use crate::errors::DeployerError;
use crate::mgmt::api::{CustomTemplate, ManagementApi};
use crate::mgmt::token::TokenStore;
use crate::net;
use crate::operator::OperatorPrompt;
use crate::provision::{NetworkFlavor, Provisioner};
use crate::runtime::{ContainerRuntime, NodeSpec, StackDeployer, ADVERTISE_ADDR_ERROR};
use crate::storage::layout::StorageLayout;
use crate::template::TemplateEngine;

/// Fixed names and tunables of the bootstrap sequence
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Directory holding the stack templates
    pub templates_dir: PathBuf,

    /// Self-signing script used in manual HTTPS mode
    pub self_certificate_script: PathBuf,

    /// Reverse proxy stack name
    pub proxy_stack: String,

    /// Reverse proxy service name
    pub proxy_service: String,

    /// Attachable overlay network shared with the proxy
    pub proxy_network: String,

    /// Management UI stack name
    pub mgmt_stack: String,

    /// Management UI service name
    pub mgmt_service: String,

    /// Hostname the management UI resolves under inside the cluster
    pub mgmt_host: String,

    /// Endpoint name selected in the management UI
    pub endpoint_name: String,

    /// Convergence timeout for proxy/management/application deploys.
    /// Generous: proxy startup can be slow.
    pub deploy_timeout: Duration,

    /// Delay after management UI convergence before the first API call
    pub settle_delay: Duration,

    /// uid/gid owning the per-stack data shares; `None` skips chown
    pub datashare_owner: Option<(u32, u32)>,

    /// Length of the generated secondary stack secret
    pub secondary_secret_length: usize,

    /// Length of the generated proxy credential user
    pub proxy_credential_user_length: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("/tools/templates"),
            self_certificate_script: PathBuf::from("/usr/bin/self-certificate.sh"),
            proxy_stack: "proxy".to_string(),
            proxy_service: "proxy_proxy".to_string(),
            proxy_network: "proxy".to_string(),
            mgmt_stack: "portainer".to_string(),
            mgmt_service: "portainer_portainer".to_string(),
            mgmt_host: "portainer".to_string(),
            endpoint_name: "primary".to_string(),
            deploy_timeout: Duration::from_secs(300),
            settle_delay: Duration::from_secs(3),
            datashare_owner: Some((890, 890)),
            secondary_secret_length: 12,
            proxy_credential_user_length: 8,
        }
    }
}

/// External collaborators, injected rather than read from globals
pub struct Collaborators {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub deployer: Arc<dyn StackDeployer>,
    pub api: Arc<dyn ManagementApi>,
    pub engine: Arc<dyn TemplateEngine>,
    pub operator: Arc<dyn OperatorPrompt>,
}

/// The bootstrap state machine
pub struct Sequencer {
    config: SequencerConfig,
    context: DeploymentContext,
    layout: StorageLayout,
    runtime: Arc<dyn ContainerRuntime>,
    deployer: Arc<dyn StackDeployer>,
    api: Arc<dyn ManagementApi>,
    engine: Arc<dyn TemplateEngine>,
    operator: Arc<dyn OperatorPrompt>,
    notifier: ProxyNotifier,
    store: CredentialStore,
    provisioner: Provisioner,
    waiter: ConvergenceWaiter,
    tokens: TokenStore,
}

impl Sequencer {
    pub fn new(
        config: SequencerConfig,
        context: DeploymentContext,
        layout: StorageLayout,
        collaborators: Collaborators,
        notifier: ProxyNotifier,
        waiter_options: WaiterOptions,
    ) -> Self {
        let store = CredentialStore::new(layout.credentials_dir());
        let provisioner = Provisioner::new(collaborators.runtime.clone());
        let waiter = ConvergenceWaiter::new(
            collaborators.runtime.clone(),
            notifier.clone(),
            config.mgmt_service.clone(),
            waiter_options,
        );
        let tokens = TokenStore::new(layout.token_file());

        Self {
            config,
            context,
            layout,
            runtime: collaborators.runtime,
            deployer: collaborators.deployer,
            api: collaborators.api,
            engine: collaborators.engine,
            operator: collaborators.operator,
            notifier,
            store,
            provisioner,
            waiter,
            tokens,
        }
    }

    /// Execute the whole bootstrap sequence
    pub async fn run(&self) -> Result<(), DeployerError> {
        self.context.validate()?;
        self.ensure_paths().await?;

        let cluster_id = self.ensure_swarm().await?.ok_or_else(|| {
            DeployerError::SwarmError(
                "this host is not part of a cluster and none was initialized".to_string(),
            )
        })?;
        info!("cluster id: {}", cluster_id);

        if self.context.https_mode == HttpsMode::Manual {
            certs::bootstrap_self_signed(
                &self.config.self_certificate_script,
                &self.context.fqdn,
                &self.context.stack,
            )
            .await?;
        }

        self.provision_stack_secrets().await?;
        self.label_single_node().await?;

        self.provisioner
            .ensure_overlay_network(&self.config.proxy_network, NetworkFlavor::Attachable)
            .await?;
        // This runner must sit on the proxy network so the management UI's
        // service name resolves for the API calls below
        let host = System::host_name().unwrap_or_else(|| "localhost".to_string());
        self.runtime
            .connect_network(&self.config.proxy_network, &host)
            .await?;

        self.deploy_proxy().await?;
        self.deploy_management_ui().await?;
        self.notifier.reconfigure().await;
        self.deploy_application_stack().await?;
        self.reconcile_certificate_mode().await?;
        self.cleanup().await;

        Ok(())
    }

    /// Create the shared directories
    async fn ensure_paths(&self) -> Result<(), DeployerError> {
        self.provisioner
            .ensure_path(&self.layout.credentials_dir())
            .await?;
        self.provisioner
            .ensure_path(&self.layout.certificates_dir())
            .await?;
        self.provisioner
            .ensure_owned_path(&self.layout.datashares_dir(), self.config.datashare_owner)
            .await?;
        self.provisioner
            .ensure_owned_path(
                &self.layout.stack_datashare(&self.context.stack),
                self.config.datashare_owner,
            )
            .await?;
        Ok(())
    }

    /// Return the cluster id, initializing a swarm with operator consent
    /// when this host is not yet a member. `None` means the operator
    /// declined or initialization failed.
    async fn ensure_swarm(&self) -> Result<Option<String>, DeployerError> {
        if let Some(id) = self.runtime.cluster_id().await? {
            return Ok(Some(id));
        }

        warn!("this system is not a swarm node");
        if !self
            .operator
            .confirm("Do you want to create a manager node?")
            .await?
        {
            return Ok(None);
        }

        match self.runtime.swarm_init(None).await {
            Ok(id) => Ok(Some(id)),
            Err(e) if e.to_string().contains(ADVERTISE_ADDR_ERROR) => {
                let addr = self
                    .operator
                    .ask("Please input the IP address to advertise")
                    .await?;
                match self.runtime.swarm_init(Some(&addr)).await {
                    Ok(id) => Ok(Some(id)),
                    Err(e) => {
                        warn!("cluster not initialized: {}", e);
                        Ok(None)
                    }
                }
            }
            Err(e) => {
                warn!("cluster not initialized: {}", e);
                Ok(None)
            }
        }
    }

    /// Admin credential pair plus the generated secondary secret
    async fn provision_stack_secrets(&self) -> Result<(), DeployerError> {
        let stack = &self.context.stack;
        let credential = self.store.get_or_create(stack, "admin").await?;

        self.provisioner
            .ensure_secret(
                &format!("{}_superadmin_name", stack),
                credential.user.as_bytes(),
            )
            .await?;
        self.provisioner
            .ensure_secret(
                &format!("{}_superadmin_pass", stack),
                credential.password.as_bytes(),
            )
            .await?;
        self.provisioner
            .ensure_secret(
                &format!("{}_pms_pass", stack),
                generate_password(self.config.secondary_secret_length).as_bytes(),
            )
            .await?;
        Ok(())
    }

    /// In the single-node case the lone node carries the datastore and the
    /// database. Multi-node topologies need operator-placed labels.
    async fn label_single_node(&self) -> Result<(), DeployerError> {
        let nodes = self.runtime.list_nodes().await?;
        if let [node] = nodes.as_slice() {
            info!("labeling single node {} as datastore/database", node);
            self.runtime
                .update_node(node, &NodeSpec::single_node_manager())
                .await?;
        }
        Ok(())
    }

    async fn deploy_proxy(&self) -> Result<(), DeployerError> {
        let rendered = self.engine.render(
            &self.config.templates_dir,
            &format!("{}.template", self.config.proxy_stack),
            &self.context,
        )?;
        let file = self.layout.rendered_stack_file(&self.config.proxy_stack);
        file.write_string(&rendered).await?;

        let user = generate_password(self.config.proxy_credential_user_length);
        self.store.get_or_create("swarm-credential", &user).await?;
        self.provisioner
            .ensure_secret_from_file(
                "swarm-credential",
                &self.store.dir().file("swarm-credential"),
            )
            .await?;

        self.deployer
            .deploy(file.path(), &self.config.proxy_stack)
            .await?;
        self.waiter
            .wait_for_service(&self.config.proxy_service, self.config.deploy_timeout)
            .await?;
        info!("proxy status: https://{}/services/status", self.context.fqdn);

        file.delete().await?;
        Ok(())
    }

    /// Deploy and initialize the management UI. Skipped entirely once its
    /// services exist: this step is not re-entered on reruns.
    async fn deploy_management_ui(&self) -> Result<(), DeployerError> {
        let stack = &self.config.mgmt_stack;
        let services = self.runtime.list_services().await?;
        let prefix = format!("{}_", stack);
        if services.iter().any(|s| s == stack || s.starts_with(&prefix)) {
            info!("management UI already deployed, skipping");
            return Ok(());
        }

        let rendered = self.engine.render(
            &self.config.templates_dir,
            &format!("{}.template", stack),
            &self.context,
        )?;
        let file = self.layout.rendered_stack_file(stack);
        file.write_string(&rendered).await?;
        self.deployer.deploy(file.path(), stack).await?;
        file.delete().await?;

        self.waiter
            .wait_for_service(&self.config.mgmt_service, self.config.deploy_timeout)
            .await?;
        tokio::time::sleep(self.config.settle_delay).await;

        let credential = self.store.read("swarm-credential").await?;
        let address = net::resolve_host(&self.config.mgmt_host).await;
        info!("management UI resolved at {}", address);

        self.api
            .admin_init(&credential.user, &credential.password)
            .await?;

        let token = self
            .tokens
            .get_or_exchange(self.api.as_ref(), &credential.user, &credential.password)
            .await?;
        self.api.set_token(&token).await;

        self.api.push_settings().await?;
        self.api.select_endpoint(&self.config.endpoint_name).await?;
        self.api.set_public_ip(&self.context.fqdn).await?;

        info!(
            "management UI: https://{}.{}/",
            stack, self.context.fqdn
        );
        Ok(())
    }

    async fn deploy_application_stack(&self) -> Result<(), DeployerError> {
        let stack = &self.context.stack;
        info!("deploying the '{}' stack", stack);

        self.provisioner
            .ensure_overlay_network(&self.context.stack_network(), NetworkFlavor::Internal)
            .await?;
        self.waiter
            .wait_for_service(&self.config.mgmt_service, self.config.deploy_timeout)
            .await?;

        let token = self.tokens.read().await?;
        self.api.set_token(&token).await;
        self.api.select_endpoint(&self.config.endpoint_name).await?;

        // Replace, not accumulate: drop any stale template of the same name
        self.api.delete_custom_template(stack).await?;

        let rendered =
            self.engine
                .render(&self.config.templates_dir, "stack.template", &self.context)?;
        let file = self.layout.rendered_stack_file(stack);
        file.write_string(&rendered).await?;

        self.api
            .create_custom_template(&CustomTemplate {
                title: stack.clone(),
                description: format!("{} stack", stack),
                note: String::new(),
                logo: String::new(),
                file_content: rendered,
                platform: 1,
                template_type: 1,
            })
            .await?;

        // Submission goes through the shell deployer; the API deploy route
        // exists behind the same interface but is not the production path
        self.deployer.deploy(file.path(), stack).await?;
        file.delete().await?;
        Ok(())
    }

    /// In auto mode, a placeholder certificate means the renewal helper has
    /// to take over: signal it, renew, clear the signal, reload the proxy.
    async fn reconcile_certificate_mode(&self) -> Result<(), DeployerError> {
        if self.context.https_mode != HttpsMode::Auto {
            return Ok(());
        }

        let certificate = self.layout.stack_certificate(&self.context.stack);
        if !certs::is_self_signed(certificate.path())? {
            return Ok(());
        }

        info!("active certificate is self-signed, switching to auto mode");
        let certbot = self.context.certbot_service();
        self.waiter.wait_default(&certbot).await?;

        let token = self.tokens.read().await?;
        self.api.set_token(&token).await;
        self.api.select_endpoint(&self.config.endpoint_name).await?;

        self.api
            .execute_in_service(&certbot, &["/usr/bin/send_message", "HTTPSMODE='auto'"])
            .await?;
        self.api
            .execute_in_service(&certbot, &["/usr/bin/renew-certificates.sh"])
            .await?;
        self.api
            .execute_in_service(&certbot, &["/usr/bin/send_message", ""])
            .await?;
        self.api
            .execute_in_service(&self.config.proxy_service, &["/usr/bin/reload"])
            .await?;
        Ok(())
    }

    /// Best-effort removal of the transient cache under the stack datashare
    async fn cleanup(&self) {
        let cache = self.layout.stack_cache_dir(&self.context.stack);
        if let Err(e) = cache.delete().await {
            warn!("could not remove {}: {}", cache.path().display(), e);
        }
    }
}

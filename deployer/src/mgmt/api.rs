//! Portainer REST client
//!
//! The wire format stays behind the [`ManagementApi`] trait; the sequencer
//! only knows the operations. The client talks to the in-cluster endpoint
//! over plain HTTP or the self-signed HTTPS of the bootstrap phase, so
//! certificate verification is disabled.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::runtime::StackDeployer;

/// Custom template registration payload
#[derive(Debug, Clone, Serialize)]
pub struct CustomTemplate {
    #[serde(rename = "Title")]
    pub title: String,

    #[serde(rename = "Description")]
    pub description: String,

    #[serde(rename = "Note")]
    pub note: String,

    #[serde(rename = "Logo")]
    pub logo: String,

    #[serde(rename = "FileContent")]
    pub file_content: String,

    /// 1 = linux
    #[serde(rename = "Platform")]
    pub platform: u8,

    /// 1 = swarm stack
    #[serde(rename = "Type")]
    pub template_type: u8,
}

/// Operations the sequencer needs from the management UI
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Install the API token used by authenticated calls
    async fn set_token(&self, token: &str);

    /// One-time admin account initialization. Non-success responses are
    /// logged, not failed: the wizard may already be past initialization
    /// on reruns.
    async fn admin_init(&self, user: &str, password: &str) -> Result<(), DeployerError>;

    /// Exchange credentials for a long-lived API token
    async fn create_token(
        &self,
        description: &str,
        user: &str,
        password: &str,
    ) -> Result<String, DeployerError>;

    /// Push cosmetic instance settings
    async fn push_settings(&self) -> Result<(), DeployerError>;

    /// Select the active endpoint by name for subsequent calls
    async fn select_endpoint(&self, name: &str) -> Result<(), DeployerError>;

    /// Publish the public domain of the active endpoint
    async fn set_public_ip(&self, fqdn: &str) -> Result<(), DeployerError>;

    /// Delete a custom template by title; absent is not an error
    async fn delete_custom_template(&self, title: &str) -> Result<(), DeployerError>;

    /// Register a custom template
    async fn create_custom_template(&self, template: &CustomTemplate) -> Result<(), DeployerError>;

    /// Run a command inside a running task of the named service
    async fn execute_in_service(
        &self,
        service: &str,
        command: &[&str],
    ) -> Result<(), DeployerError>;

    /// Deploy a stack through the API
    async fn deploy_stack(&self, stack: &str, file_content: &str) -> Result<(), DeployerError>;
}

/// `reqwest`-backed Portainer client
pub struct PortainerClient {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
    endpoint_id: RwLock<Option<i64>>,
}

impl PortainerClient {
    pub fn new(base_url: &str) -> Result<Self, DeployerError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
            endpoint_id: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn api_key(&self) -> Result<String, DeployerError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| DeployerError::TokenError("no management token set".to_string()))
    }

    async fn active_endpoint(&self) -> Result<i64, DeployerError> {
        self.endpoint_id
            .read()
            .await
            .ok_or_else(|| DeployerError::ApiError("no endpoint selected".to_string()))
    }

    /// POST with the API key header, failing on non-success
    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DeployerError> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("X-API-Key", self.api_key().await?)
            .json(body)
            .send()
            .await?;
        Self::into_json(response).await
    }

    async fn into_json(response: reqwest::Response) -> Result<serde_json::Value, DeployerError> {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!("management API call failed: {} - {}", status, text);
            return Err(DeployerError::ApiError(format!("{}: {}", status, text)));
        }
        if text.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ManagementApi for PortainerClient {
    async fn set_token(&self, token: &str) {
        *self.token.write().await = Some(token.to_string());
    }

    async fn admin_init(&self, user: &str, password: &str) -> Result<(), DeployerError> {
        let url = self.url("/users/admin/init");
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "Username": user, "Password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("admin init returned {}: {}", status, body);
        }

        // Touch the setup wizard so the UI does not re-prompt for it
        let wizard = format!("{}/#!/wizard", self.base_url.trim_end_matches("/api"));
        debug!("GET {}", wizard);
        match self.client.get(&wizard).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!("wizard returned {}", response.status());
            }
            Ok(_) => {}
            Err(e) => warn!("wizard request failed: {}", e),
        }
        Ok(())
    }

    async fn create_token(
        &self,
        description: &str,
        user: &str,
        password: &str,
    ) -> Result<String, DeployerError> {
        let url = self.url("/auth");
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "username": user, "password": password }))
            .send()
            .await?;
        let body = Self::into_json(response).await?;
        let jwt = body
            .get("jwt")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let url = self.url("/users/me/tokens");
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", jwt))
            .json(&serde_json::json!({ "description": description }))
            .send()
            .await?;
        let body = Self::into_json(response).await?;

        Ok(body
            .get("rawAPIKey")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn push_settings(&self) -> Result<(), DeployerError> {
        let url = self.url("/settings");
        debug!("PUT {}", url);
        let response = self
            .client
            .put(&url)
            .header("X-API-Key", self.api_key().await?)
            .json(&serde_json::json!({
                "LogoURL": "",
                "EnableTelemetry": false,
                "TemplatesURL": ""
            }))
            .send()
            .await?;
        Self::into_json(response).await?;
        Ok(())
    }

    async fn select_endpoint(&self, name: &str) -> Result<(), DeployerError> {
        let url = self.url("/endpoints");
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("X-API-Key", self.api_key().await?)
            .send()
            .await?;
        let body = Self::into_json(response).await?;

        let endpoints = body.as_array().cloned().unwrap_or_default();
        let id = endpoints
            .iter()
            .find(|e| e.get("Name").and_then(|n| n.as_str()) == Some(name))
            .and_then(|e| e.get("Id"))
            .and_then(|id| id.as_i64())
            .ok_or_else(|| DeployerError::ApiError(format!("endpoint '{}' not found", name)))?;

        *self.endpoint_id.write().await = Some(id);
        Ok(())
    }

    async fn set_public_ip(&self, fqdn: &str) -> Result<(), DeployerError> {
        let id = self.active_endpoint().await?;
        let url = self.url(&format!("/endpoints/{}", id));
        debug!("PUT {}", url);
        let response = self
            .client
            .put(&url)
            .header("X-API-Key", self.api_key().await?)
            .json(&serde_json::json!({ "PublicURL": fqdn }))
            .send()
            .await?;
        Self::into_json(response).await?;
        Ok(())
    }

    async fn delete_custom_template(&self, title: &str) -> Result<(), DeployerError> {
        let url = self.url("/custom_templates");
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("X-API-Key", self.api_key().await?)
            .send()
            .await?;
        let body = Self::into_json(response).await?;

        let id = body
            .as_array()
            .into_iter()
            .flatten()
            .find(|t| t.get("Title").and_then(|v| v.as_str()) == Some(title))
            .and_then(|t| t.get("Id"))
            .and_then(|id| id.as_i64());

        if let Some(id) = id {
            let url = self.url(&format!("/custom_templates/{}", id));
            debug!("DELETE {}", url);
            let response = self
                .client
                .delete(&url)
                .header("X-API-Key", self.api_key().await?)
                .send()
                .await?;
            Self::into_json(response).await?;
        }
        Ok(())
    }

    async fn create_custom_template(&self, template: &CustomTemplate) -> Result<(), DeployerError> {
        let body = serde_json::to_value(template)?;
        self.post_json("/custom_templates/create/string", &body)
            .await?;
        Ok(())
    }

    async fn execute_in_service(
        &self,
        service: &str,
        command: &[&str],
    ) -> Result<(), DeployerError> {
        let endpoint = self.active_endpoint().await?;

        // Find a running container of the service through the endpoint's
        // Docker proxy
        let filters = serde_json::json!({
            "label": [format!("com.docker.swarm.service.name={}", service)]
        });
        let url = self.url(&format!(
            "/endpoints/{}/docker/containers/json?filters={}",
            endpoint, filters
        ));
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("X-API-Key", self.api_key().await?)
            .send()
            .await?;
        let containers = Self::into_json(response).await?;
        let container_id = containers
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|c| c.get("Id").and_then(|id| id.as_str()))
            .next()
            .ok_or_else(|| {
                DeployerError::ApiError(format!("no running container for service '{}'", service))
            })?
            .to_string();

        let exec = self
            .post_json(
                &format!("/endpoints/{}/docker/containers/{}/exec", endpoint, container_id),
                &serde_json::json!({
                    "Cmd": command,
                    "AttachStdout": true,
                    "AttachStderr": true
                }),
            )
            .await?;
        let exec_id = exec
            .get("Id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| DeployerError::ApiError("exec create returned no id".to_string()))?
            .to_string();

        self.post_json(
            &format!("/endpoints/{}/docker/exec/{}/start", endpoint, exec_id),
            &serde_json::json!({ "Detach": false, "Tty": false }),
        )
        .await?;
        Ok(())
    }

    async fn deploy_stack(&self, stack: &str, file_content: &str) -> Result<(), DeployerError> {
        let endpoint = self.active_endpoint().await?;
        self.post_json(
            &format!("/stacks/create/swarm/string?endpointId={}", endpoint),
            &serde_json::json!({
                "Name": stack,
                "StackFileContent": file_content
            }),
        )
        .await?;
        Ok(())
    }
}

/// [`StackDeployer`] backed by the management API.
///
/// The production path is the shell-based deployer; this one exists so
/// both submission routes share one interface.
pub struct ApiStackDeployer {
    api: Arc<dyn ManagementApi>,
}

impl ApiStackDeployer {
    pub fn new(api: Arc<dyn ManagementApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StackDeployer for ApiStackDeployer {
    async fn deploy(&self, compose_file: &Path, stack: &str) -> Result<(), DeployerError> {
        let content = File::new(compose_file).read_string().await?;
        self.api.deploy_stack(stack, &content).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingApi {
        deployed: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ManagementApi for RecordingApi {
        async fn set_token(&self, _token: &str) {}
        async fn admin_init(&self, _u: &str, _p: &str) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn create_token(
            &self,
            _d: &str,
            _u: &str,
            _p: &str,
        ) -> Result<String, DeployerError> {
            Ok("token".to_string())
        }
        async fn push_settings(&self) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn select_endpoint(&self, _name: &str) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn set_public_ip(&self, _fqdn: &str) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn delete_custom_template(&self, _title: &str) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn create_custom_template(&self, _t: &CustomTemplate) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn execute_in_service(
            &self,
            _service: &str,
            _command: &[&str],
        ) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn deploy_stack(&self, stack: &str, file_content: &str) -> Result<(), DeployerError> {
            self.deployed
                .lock()
                .unwrap()
                .push((stack.to_string(), file_content.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn api_deployer_submits_file_content() {
        let tmp = tempfile::tempdir().unwrap();
        let compose = tmp.path().join("migasfree.yml");
        tokio::fs::write(&compose, "services: {}\n").await.unwrap();

        let api = Arc::new(RecordingApi::default());
        let deployer = ApiStackDeployer::new(api.clone());
        deployer.deploy(&compose, "migasfree").await.unwrap();

        let deployed = api.deployed.lock().unwrap();
        assert_eq!(
            deployed.as_slice(),
            &[("migasfree".to_string(), "services: {}\n".to_string())]
        );
    }
}

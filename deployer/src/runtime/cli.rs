//! Docker CLI backed runtime

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DeployerError;
use crate::runtime::{ContainerRuntime, NetworkSpec, NodeSpec, StackDeployer};

/// Runtime implementation that shells out to the `docker` binary
#[derive(Debug, Clone, Default)]
pub struct DockerCli;

impl DockerCli {
    pub fn new() -> Self {
        Self
    }

    /// Run a docker subcommand and return trimmed stdout
    async fn run(&self, args: &[&str]) -> Result<String, DeployerError> {
        debug!("docker {}", args.join(" "));
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| DeployerError::RuntimeError(format!("failed to run docker: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeployerError::RuntimeError(format!(
                "docker {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a docker subcommand and return stdout lines
    async fn run_lines(&self, args: &[&str]) -> Result<Vec<String>, DeployerError> {
        let stdout = self.run(args).await?;
        Ok(stdout
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn cluster_id(&self) -> Result<Option<String>, DeployerError> {
        let id = self
            .run(&["info", "--format", "{{.Swarm.Cluster.ID}}"])
            .await?;
        if id.is_empty() || id.contains("no value") {
            Ok(None)
        } else {
            Ok(Some(id))
        }
    }

    async fn swarm_init(&self, advertise_addr: Option<&str>) -> Result<String, DeployerError> {
        let mut args = vec!["swarm", "init"];
        if let Some(addr) = advertise_addr {
            args.push("--advertise-addr");
            args.push(addr);
        }
        self.run(&args)
            .await
            .map_err(|e| DeployerError::SwarmError(e.to_string()))?;

        self.cluster_id()
            .await?
            .ok_or_else(|| DeployerError::SwarmError("no cluster id after swarm init".to_string()))
    }

    async fn list_nodes(&self) -> Result<Vec<String>, DeployerError> {
        self.run_lines(&["node", "ls", "--format", "{{.ID}}"]).await
    }

    async fn update_node(&self, node_id: &str, spec: &NodeSpec) -> Result<(), DeployerError> {
        let mut args: Vec<String> = vec!["node".to_string(), "update".to_string()];
        if !spec.availability.is_empty() {
            args.push("--availability".to_string());
            args.push(spec.availability.clone());
        }
        if !spec.role.is_empty() {
            args.push("--role".to_string());
            args.push(spec.role.clone());
        }
        for (key, value) in &spec.labels {
            args.push("--label-add".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(node_id.to_string());

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args).await?;
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<String>, DeployerError> {
        self.run_lines(&["service", "ls", "--format", "{{.Name}}"])
            .await
    }

    async fn service_task_states(&self, service: &str) -> Result<Vec<String>, DeployerError> {
        // CurrentState reads like "Running 5 seconds ago"; keep the state word
        let lines = self
            .run_lines(&["service", "ps", service, "--format", "{{.CurrentState}}"])
            .await?;
        Ok(lines
            .iter()
            .filter_map(|line| line.split_whitespace().next())
            .map(|state| state.to_lowercase())
            .collect())
    }

    async fn list_secret_names(&self) -> Result<Vec<String>, DeployerError> {
        self.run_lines(&["secret", "ls", "--format", "{{.Name}}"])
            .await
    }

    async fn create_secret(&self, name: &str, data: &[u8]) -> Result<(), DeployerError> {
        debug!("docker secret create {} -", name);
        let mut child = Command::new("docker")
            .args(["secret", "create", name, "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DeployerError::RuntimeError(format!("failed to run docker: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(data).await?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DeployerError::RuntimeError(format!("failed to run docker: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeployerError::RuntimeError(format!(
                "docker secret create {} failed: {}",
                name,
                stderr.trim()
            )));
        }

        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<String>, DeployerError> {
        self.run_lines(&["network", "ls", "--format", "{{.Name}}"])
            .await
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<(), DeployerError> {
        let mut args = vec!["network", "create", "--driver", "overlay", "--opt", "encrypted"];
        if spec.attachable {
            args.push("--attachable");
        }
        if spec.internal {
            args.push("--internal");
        }
        args.push(&spec.name);
        self.run(&args).await?;
        Ok(())
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<(), DeployerError> {
        match self.run(&["network", "connect", network, container]).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already exists in network") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl StackDeployer for DockerCli {
    async fn deploy(&self, compose_file: &Path, stack: &str) -> Result<(), DeployerError> {
        let compose = compose_file.to_string_lossy();
        self.run(&[
            "stack",
            "deploy",
            "-c",
            compose.as_ref(),
            stack,
            "--detach=true",
            "--resolve-image=never",
        ])
        .await?;
        Ok(())
    }
}

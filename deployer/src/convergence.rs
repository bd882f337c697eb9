//! Service convergence waiting

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::DeployerError;
use crate::runtime::ContainerRuntime;

/// Best-effort reconfigure notifications to the reverse proxy.
///
/// Failures are swallowed: the proxy picks newly deployed backends up on
/// its own schedule if the notification is lost.
#[derive(Debug, Clone)]
pub struct ProxyNotifier {
    client: reqwest::Client,
    reconfigure_url: String,
}

impl ProxyNotifier {
    pub fn new(reconfigure_url: impl Into<String>) -> Result<Self, DeployerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            reconfigure_url: reconfigure_url.into(),
        })
    }

    /// Ask the proxy to re-read its backend list
    pub async fn reconfigure(&self) {
        debug!("POST {}", self.reconfigure_url);
        match self.client.post(&self.reconfigure_url).send().await {
            Ok(_) => {}
            Err(e) => warn!("proxy reconfigure notification failed: {}", e),
        }
    }
}

/// Waiter configuration
#[derive(Debug, Clone)]
pub struct WaiterOptions {
    /// Interval between task-state polls
    pub poll_interval: Duration,

    /// Timeout used when no explicit one is given
    pub default_timeout: Duration,
}

impl Default for WaiterOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            default_timeout: Duration::from_secs(30),
        }
    }
}

/// Polls a service's tasks until one reports a running state
pub struct ConvergenceWaiter {
    runtime: Arc<dyn ContainerRuntime>,
    notifier: ProxyNotifier,
    mgmt_service: String,
    options: WaiterOptions,
}

impl ConvergenceWaiter {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        notifier: ProxyNotifier,
        mgmt_service: impl Into<String>,
        options: WaiterOptions,
    ) -> Self {
        Self {
            runtime,
            notifier,
            mgmt_service: mgmt_service.into(),
            options,
        }
    }

    /// Wait with the default timeout
    pub async fn wait_default(&self, service: &str) -> Result<(), DeployerError> {
        self.wait_for_service(service, self.options.default_timeout)
            .await
    }

    /// Wait until `service` has at least one running task.
    ///
    /// Convergence of the management UI additionally fires a best-effort
    /// proxy reconfigure so the UI becomes routable without a proxy
    /// restart. A timeout is fatal for the run; the sequence is safe to
    /// re-execute from the top.
    pub async fn wait_for_service(
        &self,
        service: &str,
        timeout: Duration,
    ) -> Result<(), DeployerError> {
        info!("waiting for service '{}'", service);
        let start = Instant::now();

        loop {
            if start.elapsed() > timeout {
                return Err(DeployerError::Timeout {
                    service: service.to_string(),
                    timeout,
                });
            }

            let states = self.runtime.service_task_states(service).await?;
            if states.iter().any(|state| state == "running") {
                info!("service '{}' is running", service);
                if service == self.mgmt_service {
                    self.notifier.reconfigure().await;
                }
                return Ok(());
            }
            debug!("service '{}' not yet running: {:?}", service, states);

            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::runtime::{NetworkSpec, NodeSpec};

    /// Runtime whose task-state answers are scripted per poll; the last
    /// entry repeats forever.
    #[derive(Default)]
    struct ScriptedRuntime {
        polls: Mutex<VecDeque<Vec<String>>>,
    }

    impl ScriptedRuntime {
        fn with_polls(polls: Vec<Vec<&str>>) -> Self {
            Self {
                polls: Mutex::new(
                    polls
                        .into_iter()
                        .map(|states| states.into_iter().map(String::from).collect())
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl ContainerRuntime for ScriptedRuntime {
        async fn cluster_id(&self) -> Result<Option<String>, DeployerError> {
            Ok(None)
        }
        async fn swarm_init(&self, _addr: Option<&str>) -> Result<String, DeployerError> {
            unimplemented!()
        }
        async fn list_nodes(&self) -> Result<Vec<String>, DeployerError> {
            Ok(vec![])
        }
        async fn update_node(&self, _id: &str, _spec: &NodeSpec) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn list_services(&self) -> Result<Vec<String>, DeployerError> {
            Ok(vec![])
        }
        async fn service_task_states(&self, _service: &str) -> Result<Vec<String>, DeployerError> {
            let mut polls = self.polls.lock().unwrap();
            if polls.len() > 1 {
                Ok(polls.pop_front().unwrap())
            } else {
                Ok(polls.front().cloned().unwrap_or_default())
            }
        }
        async fn list_secret_names(&self) -> Result<Vec<String>, DeployerError> {
            Ok(vec![])
        }
        async fn create_secret(&self, _name: &str, _data: &[u8]) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn list_networks(&self) -> Result<Vec<String>, DeployerError> {
            Ok(vec![])
        }
        async fn create_network(&self, _spec: &NetworkSpec) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn connect_network(&self, _n: &str, _c: &str) -> Result<(), DeployerError> {
            Ok(())
        }
    }

    fn waiter(runtime: ScriptedRuntime) -> ConvergenceWaiter {
        ConvergenceWaiter::new(
            Arc::new(runtime),
            ProxyNotifier::new("http://127.0.0.1:1/services/reconfigure").unwrap(),
            "portainer_portainer",
            WaiterOptions {
                poll_interval: Duration::from_millis(10),
                default_timeout: Duration::from_millis(200),
            },
        )
    }

    #[tokio::test]
    async fn returns_once_a_task_is_running() {
        let runtime = ScriptedRuntime::with_polls(vec![
            vec!["pending"],
            vec!["preparing"],
            vec!["running"],
        ]);
        let waiter = waiter(runtime);

        waiter
            .wait_for_service("proxy_proxy", Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn times_out_but_not_before_the_deadline() {
        let runtime = ScriptedRuntime::with_polls(vec![vec!["pending"]]);
        let waiter = waiter(runtime);

        let timeout = Duration::from_millis(100);
        let start = std::time::Instant::now();
        let err = waiter
            .wait_for_service("proxy_proxy", timeout)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(start.elapsed() >= timeout);
    }

    #[tokio::test]
    async fn mgmt_convergence_swallows_notifier_failures() {
        // The reconfigure endpoint points at a closed port; convergence
        // must still succeed.
        let runtime = ScriptedRuntime::with_polls(vec![vec!["running"]]);
        let waiter = waiter(runtime);

        waiter
            .wait_for_service("portainer_portainer", Duration::from_secs(5))
            .await
            .unwrap();
    }
}

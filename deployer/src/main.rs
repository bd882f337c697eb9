//! Swarm Bootstrap Deployer - Entry Point
//!
//! Runs once on a manager host and takes the cluster from bare Docker to a
//! serving application stack.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use swarmboot::context::DeploymentContext;
use swarmboot::convergence::{ProxyNotifier, WaiterOptions};
use swarmboot::filesys::dir::Dir;
use swarmboot::logs::{init_logging, LogOptions};
use swarmboot::mgmt::api::PortainerClient;
use swarmboot::operator::{OperatorPrompt, Preanswered, StdinPrompt};
use swarmboot::runtime::cli::DockerCli;
use swarmboot::sequencer::{Collaborators, Sequencer, SequencerConfig};
use swarmboot::storage::layout::StorageLayout;
use swarmboot::template::TeraEngine;
use swarmboot::utils::version_info;

use tracing::error;

const MGMT_BASE_URL: &str = "http://portainer:9000/api";
const PROXY_RECONFIGURE_URL: &str = "http://proxy:8001/services/reconfigure";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        println!(
            "{}",
            serde_json::to_string_pretty(&version_info()).unwrap()
        );
        return;
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: cli_args
            .get("log-level")
            .and_then(|level| level.parse().ok())
            .unwrap_or_default(),
        json_format: cli_args.contains_key("json-logs"),
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Filesystem layout, overridable for non-standard hosts
    let mut layout = StorageLayout::default();
    if let Some(share_dir) = cli_args.get("share-dir") {
        layout.share_dir = share_dir.into();
    }
    if let Some(work_dir) = cli_args.get("work-dir") {
        layout.work_dir = work_dir.into();
    }

    // Retrieve the settings file
    let context = match DeploymentContext::load(&Dir::new(&layout.work_dir)).await {
        Ok(context) => context,
        Err(e) => {
            error!("Unable to load deployment settings: {}", e);
            std::process::exit(1);
        }
    };

    let mut config = SequencerConfig::default();
    if let Some(templates_dir) = cli_args.get("templates-dir") {
        config.templates_dir = templates_dir.into();
    }

    // Non-interactive runs pre-answer the swarm-init confirmation
    let operator: Arc<dyn OperatorPrompt> = if cli_args.contains_key("yes") {
        Arc::new(Preanswered {
            confirm: true,
            answer: cli_args.get("advertise-addr").cloned(),
        })
    } else {
        Arc::new(StdinPrompt::new())
    };

    let api = match PortainerClient::new(MGMT_BASE_URL) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            error!("Unable to build the management API client: {}", e);
            std::process::exit(1);
        }
    };
    let notifier = match ProxyNotifier::new(PROXY_RECONFIGURE_URL) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!("Unable to build the proxy notifier: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = Arc::new(DockerCli::new());
    let collaborators = Collaborators {
        runtime: runtime.clone(),
        deployer: runtime,
        api,
        engine: Arc::new(TeraEngine::new()),
        operator,
    };

    let sequencer = Sequencer::new(
        config,
        context,
        layout,
        collaborators,
        notifier,
        WaiterOptions::default(),
    );
    if let Err(e) = sequencer.run().await {
        error!("Deployment failed: {}", e);
        std::process::exit(1);
    }
}

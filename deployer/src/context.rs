//! Deployment context loaded from the settings file

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;

/// HTTPS handling mode for the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpsMode {
    /// Operator-provided or self-signed certificates
    Manual,

    /// Certificates renewed automatically by the certbot helper service
    Auto,
}

/// Stack configuration context.
///
/// Loaded once at startup and treated as read-only for the rest of the run,
/// except for the stack-specific sub-context merged in by
/// [`DeploymentContext::load`]. Keys are uppercase to match the variable
/// names used inside the stack templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentContext {
    /// Application stack name
    #[serde(rename = "STACK")]
    pub stack: String,

    /// Fully-qualified domain name the cluster is served under
    #[serde(rename = "FQDN")]
    pub fqdn: String,

    /// HTTPS certificate mode
    #[serde(rename = "HTTPSMODE")]
    pub https_mode: HttpsMode,

    /// Arbitrary template variables passed through to the stack templates
    #[serde(flatten)]
    pub vars: BTreeMap<String, serde_json::Value>,
}

impl DeploymentContext {
    /// Load the context from `settings.json` in the working directory, then
    /// merge the stack-specific sub-context (`<stack>.json`) when present.
    pub async fn load(work_dir: &Dir) -> Result<Self, DeployerError> {
        let settings = work_dir.file("settings.json");
        if !settings.exists().await {
            return Err(DeployerError::ConfigError(format!(
                "settings file not found: {}",
                settings.path().display()
            )));
        }

        let mut context: DeploymentContext = settings.read_json().await.map_err(|e| {
            DeployerError::ConfigError(format!(
                "invalid settings file {}: {}",
                settings.path().display(),
                e
            ))
        })?;
        context.validate()?;

        let stack_settings = work_dir.file(&format!("{}.json", context.stack));
        if stack_settings.exists().await {
            let sub: BTreeMap<String, serde_json::Value> = stack_settings.read_json().await?;
            context.merge(sub);
        }

        Ok(context)
    }

    /// Check the required keys carry usable values
    pub fn validate(&self) -> Result<(), DeployerError> {
        if self.stack.is_empty() {
            return Err(DeployerError::ConfigError("STACK must not be empty".to_string()));
        }
        if self.fqdn.is_empty() {
            return Err(DeployerError::ConfigError("FQDN must not be empty".to_string()));
        }
        Ok(())
    }

    /// Merge a stack-specific sub-context. Existing keys are overwritten,
    /// but the required top-level keys stay untouched.
    pub fn merge(&mut self, sub: BTreeMap<String, serde_json::Value>) {
        for (key, value) in sub {
            if key == "STACK" || key == "FQDN" || key == "HTTPSMODE" {
                continue;
            }
            self.vars.insert(key, value);
        }
    }

    /// Internal overlay network name for the application stack
    pub fn stack_network(&self) -> String {
        format!("{}_network", self.stack)
    }

    /// Certificate renewal helper service name
    pub fn certbot_service(&self) -> String {
        format!("{}_certbot", self.stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_context() -> DeploymentContext {
        serde_json::from_value(serde_json::json!({
            "STACK": "migasfree",
            "FQDN": "cluster.example.org",
            "HTTPSMODE": "manual",
            "TZ": "Europe/Madrid"
        }))
        .unwrap()
    }

    #[test]
    fn parses_required_keys_and_extra_vars() {
        let context = base_context();
        assert_eq!(context.stack, "migasfree");
        assert_eq!(context.fqdn, "cluster.example.org");
        assert_eq!(context.https_mode, HttpsMode::Manual);
        assert_eq!(
            context.vars.get("TZ"),
            Some(&serde_json::Value::String("Europe/Madrid".to_string()))
        );
    }

    #[test]
    fn rejects_missing_https_mode() {
        let result: Result<DeploymentContext, _> = serde_json::from_value(serde_json::json!({
            "STACK": "migasfree",
            "FQDN": "cluster.example.org"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_stack() {
        let mut context = base_context();
        context.stack = String::new();
        assert!(context.validate().is_err());
    }

    #[test]
    fn merge_keeps_required_keys() {
        let mut context = base_context();
        let mut sub = BTreeMap::new();
        sub.insert("STACK".to_string(), serde_json::json!("other"));
        sub.insert("PMS".to_string(), serde_json::json!("apt"));
        context.merge(sub);

        assert_eq!(context.stack, "migasfree");
        assert_eq!(context.vars.get("PMS"), Some(&serde_json::json!("apt")));
    }
}

//! Management token persistence
//!
//! The token is exchanged once and reused on every later run. An existing
//! token file is trusted without revalidation; if the token is revoked
//! out-of-band, later management calls fail with an auth error and the
//! operator has to delete the token file. Known limitation, carried over
//! deliberately.

use tracing::{debug, info};

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::mgmt::api::ManagementApi;

/// Description attached to freshly exchanged tokens
const TOKEN_DESCRIPTION: &str = "deploy";

/// Persisted management API token
#[derive(Debug, Clone)]
pub struct TokenStore {
    file: File,
}

impl TokenStore {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Return the persisted token, or exchange the given credentials for a
    /// new one and persist it.
    ///
    /// An empty token after either path is a fatal misconfiguration: the
    /// stored credentials no longer match what the management UI holds,
    /// and the operator must delete the token file before rerunning.
    pub async fn get_or_exchange(
        &self,
        api: &dyn ManagementApi,
        user: &str,
        password: &str,
    ) -> Result<String, DeployerError> {
        let token = if self.file.exists().await {
            debug!("reusing persisted management token");
            self.file.read_string().await?.trim().to_string()
        } else {
            info!("exchanging credentials for a new management token");
            let token = api.create_token(TOKEN_DESCRIPTION, user, password).await?;
            self.file.write_string(&token).await?;
            token
        };

        if token.is_empty() {
            return Err(DeployerError::TokenError(format!(
                "exchanged management token is empty; delete {} and rerun",
                self.file.path().display()
            )));
        }

        Ok(token)
    }

    /// Read the persisted token
    pub async fn read(&self) -> Result<String, DeployerError> {
        Ok(self.file.read_string().await?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::mgmt::api::CustomTemplate;

    struct ExchangeCounter {
        exchanges: AtomicU32,
        token: String,
    }

    impl ExchangeCounter {
        fn returning(token: &str) -> Self {
            Self {
                exchanges: AtomicU32::new(0),
                token: token.to_string(),
            }
        }
    }

    #[async_trait]
    impl ManagementApi for ExchangeCounter {
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
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            Ok(self.token.clone())
        }
        async fn push_settings(&self) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn select_endpoint(&self, _n: &str) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn set_public_ip(&self, _f: &str) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn delete_custom_template(&self, _t: &str) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn create_custom_template(&self, _t: &CustomTemplate) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn execute_in_service(
            &self,
            _s: &str,
            _c: &[&str],
        ) -> Result<(), DeployerError> {
            Ok(())
        }
        async fn deploy_stack(&self, _s: &str, _f: &str) -> Result<(), DeployerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn existing_token_file_skips_the_exchange() {
        let tmp = tempfile::tempdir().unwrap();
        let file = File::new(tmp.path().join("portainer-token"));
        file.write_string("stored-token\n").await.unwrap();

        let api = ExchangeCounter::returning("fresh-token");
        let store = TokenStore::new(file);
        let token = store.get_or_exchange(&api, "admin", "pw").await.unwrap();

        assert_eq!(token, "stored-token");
        assert_eq!(api.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_token_file_exchanges_once_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let file = File::new(tmp.path().join("portainer-token"));

        let api = ExchangeCounter::returning("fresh-token");
        let store = TokenStore::new(file.clone());
        let token = store.get_or_exchange(&api, "admin", "pw").await.unwrap();

        assert_eq!(token, "fresh-token");
        assert_eq!(api.exchanges.load(Ordering::SeqCst), 1);
        assert_eq!(file.read_string().await.unwrap(), "fresh-token");
    }

    #[tokio::test]
    async fn empty_exchanged_token_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let file = File::new(tmp.path().join("portainer-token"));

        let api = ExchangeCounter::returning("");
        let store = TokenStore::new(file);
        let err = store.get_or_exchange(&api, "admin", "pw").await.unwrap_err();

        assert!(matches!(err, DeployerError::TokenError(_)));
    }
}

//! Credential store
//!
//! Credentials are small `user:password` files in the shared credentials
//! directory. Creation is read-if-exists: once a credential is written its
//! value never changes across reruns, since secrets and tokens derived from
//! it are held by external systems.

use rand::distr::Alphanumeric;
use rand::Rng;

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;

/// Default generated password length
pub const DEFAULT_PASSWORD_LENGTH: usize = 30;

/// A stored (user, password) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub password: String,
}

/// Generate a random alphanumeric password
pub fn generate_password(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Store for persisted credentials
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: Dir,
}

impl CredentialStore {
    /// Create a store over the given credentials directory
    pub fn new(dir: Dir) -> Self {
        Self { dir }
    }

    /// The credentials directory
    pub fn dir(&self) -> &Dir {
        &self.dir
    }

    /// Get the credential named `name`, creating it with `default_user` and
    /// a fresh random password when absent.
    ///
    /// The returned pair is always read back from disk, so it matches the
    /// persisted record even on the creation path.
    pub async fn get_or_create(
        &self,
        name: &str,
        default_user: &str,
    ) -> Result<Credential, DeployerError> {
        let file = self.dir.file(name);
        if !file.exists().await {
            let password = generate_password(DEFAULT_PASSWORD_LENGTH);
            file.write_string(&format!("{}:{}", default_user, password))
                .await?;
        }

        self.read(name).await
    }

    /// Read an existing credential
    pub async fn read(&self, name: &str) -> Result<Credential, DeployerError> {
        let contents = self.dir.file(name).read_string().await?;
        let (user, password) = contents.trim_end().split_once(':').ok_or_else(|| {
            DeployerError::CredentialError(format!("malformed credential file: {}", name))
        })?;

        Ok(Credential {
            user: user.to_string(),
            password: password.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(Dir::new(dir.path()));
        (dir, store)
    }

    #[test]
    fn generated_passwords_are_alphanumeric() {
        let password = generate_password(DEFAULT_PASSWORD_LENGTH);
        assert_eq!(password.len(), DEFAULT_PASSWORD_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (_tmp, store) = temp_store();

        let first = store.get_or_create("migasfree", "admin").await.unwrap();
        let second = store.get_or_create("migasfree", "admin").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.user, "admin");
        assert_eq!(first.password.len(), DEFAULT_PASSWORD_LENGTH);
    }

    #[tokio::test]
    async fn explicit_user_is_persisted() {
        let (_tmp, store) = temp_store();

        let credential = store.get_or_create("swarm-credential", "x7Gh2LqP").await.unwrap();
        assert_eq!(credential.user, "x7Gh2LqP");
    }

    #[tokio::test]
    async fn read_missing_credential_fails() {
        let (_tmp, store) = temp_store();
        assert!(store.read("nope").await.is_err());
    }
}

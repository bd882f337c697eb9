//! Storage layout for the deployer
//!
//! The share directory lives on the cluster-wide filesystem and survives
//! reruns; the working directory holds transient rendered stack files.

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Filesystem layout
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Shared cluster data directory
    pub share_dir: PathBuf,

    /// Working directory for rendered stack files
    pub work_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(share_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            share_dir: share_dir.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Shared credentials directory, one file per credential
    pub fn credentials_dir(&self) -> Dir {
        Dir::new(self.share_dir.join("credentials"))
    }

    /// Shared certificates directory
    pub fn certificates_dir(&self) -> Dir {
        Dir::new(self.share_dir.join("certificates"))
    }

    /// Root of the per-stack data shares
    pub fn datashares_dir(&self) -> Dir {
        Dir::new(self.share_dir.join("datashares"))
    }

    /// Data share for a specific stack
    pub fn stack_datashare(&self, stack: &str) -> Dir {
        self.datashares_dir().subdir(stack)
    }

    /// Transient cache directory inside a stack's data share
    pub fn stack_cache_dir(&self, stack: &str) -> Dir {
        self.stack_datashare(stack).subdir("cache")
    }

    /// Persisted management API token
    pub fn token_file(&self) -> File {
        self.credentials_dir().file("portainer-token")
    }

    /// Active certificate for a stack
    pub fn stack_certificate(&self, stack: &str) -> File {
        self.certificates_dir().file(&format!("{}.pem", stack))
    }

    /// Rendered stack file in the working directory, deleted after submission
    pub fn rendered_stack_file(&self, stack: &str) -> File {
        File::new(self.work_dir.join(format!("{}.yml", stack)))
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/mnt/cluster", "/stack")
    }
}

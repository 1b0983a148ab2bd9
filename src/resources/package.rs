//! Chart package registry.
//!
//! A pull yields a [`PulledPackage`] that owns its local artifact. The artifact
//! lives in a private temporary directory removed when the handle is dropped,
//! so every exit path of the caller (success, error or cancellation) cleans it
//! up.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::debug;

use crate::controller::error::{Error, Result};

/// Package artifact pulled to local disk.
#[derive(Debug)]
pub struct PulledPackage {
    path: PathBuf,
    _dir: TempDir,
}

impl PulledPackage {
    /// Take ownership of `dir`; `path` must live inside it.
    pub fn new(path: PathBuf, dir: TempDir) -> Self {
        Self { path, _dir: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Source of chart packages.
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Pull `name` from `channel`. A missing package fails with `Package`.
    async fn pull_package(&self, name: &str, channel: &str) -> Result<PulledPackage>;
}

/// Registry laid out as `<root>/<channel>/<name>.tgz`.
#[derive(Clone, Debug)]
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn source(&self, name: &str, channel: &str) -> PathBuf {
        self.root.join(channel).join(format!("{}.tgz", name))
    }
}

#[async_trait]
impl PackageRegistry for DirectoryRegistry {
    async fn pull_package(&self, name: &str, channel: &str) -> Result<PulledPackage> {
        let source = self.source(name, channel);
        if !tokio::fs::try_exists(&source).await? {
            return Err(Error::Package(format!(
                "package {} not found in channel {}",
                name, channel
            )));
        }

        let dir = tempfile::Builder::new().prefix("chart-").tempdir()?;
        let path = dir.path().join(format!("{}.tgz", name));
        tokio::fs::copy(&source, &path).await?;
        debug!(package = %name, channel = %channel, path = %path.display(), "Pulled package");
        Ok(PulledPackage::new(path, dir))
    }
}

//! Filesystem-backed object storage

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::{ObjectStore, PortError, PortResult};
use crate::core_access::MediaLocator;

/// Stores artifacts as files under a root directory, keyed by public id
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a public id to a path, refusing anything outside the root
    fn path_for(&self, public_id: &str) -> PortResult<PathBuf> {
        let relative = Path::new(public_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if public_id.is_empty() || escapes {
            return Err(PortError::Storage(format!("invalid object id: {}", public_id)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn delete(&self, locator: &MediaLocator) -> PortResult<()> {
        let path = self.path_for(&locator.public_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Object already absent");
                Ok(())
            }
            Err(e) => Err(PortError::Io(e)),
        }
    }
}

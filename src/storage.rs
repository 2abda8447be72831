//! Blob storage and failure-sink collaborators, with a local filesystem backend.
//!
//! The pipeline only talks to [`BlobStore`] and [`FailureSink`]; the local implementations
//! map blob names and sink keys onto paths below a root directory.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::gate::FileType;

/// Container holding uploaded artifacts.
pub const RAW_CONTAINER: &str = "raw-documents";

/// Container holding diverted payloads.
pub const FAILURE_CONTAINER: &str = "processing-failures";

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Name or key would escape the storage root or is empty.
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
    /// Requested object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),
    /// Underlying filesystem operation failed.
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Properties of a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobProperties {
    /// Blob name within its container.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Stored content type, when known.
    pub content_type: Option<String>,
}

/// Read access to stored artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Look up an artifact; `Ok(None)` when it does not exist.
    async fn properties(&self, name: &str) -> Result<Option<BlobProperties>, StoreError>;

    /// Read an artifact's bytes.
    async fn read(&self, name: &str) -> Result<Bytes, StoreError>;
}

/// Durable location for payloads that could not be processed.
#[async_trait]
pub trait FailureSink: Send + Sync {
    /// Store `payload` under `key`, overwriting any previous value.
    async fn divert(&self, key: &str, payload: Bytes) -> Result<(), StoreError>;
}

/// Blob container backed by a directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Container rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Upload container below a storage root.
    pub fn under(root: &Path) -> Self {
        Self::new(root.join(RAW_CONTAINER))
    }

    /// Directory holding the container's blobs.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn properties(&self, name: &str) -> Result<Option<BlobProperties>, StoreError> {
        let path = resolve(&self.root, name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(BlobProperties {
                name: name.to_string(),
                size: meta.len(),
                content_type: FileType::from_file_name(name).map(|ty| ty.mime_type().to_string()),
            })),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn read(&self, name: &str) -> Result<Bytes, StoreError> {
        let path = resolve(&self.root, name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Failure sink writing one file per diverted payload.
#[derive(Debug, Clone)]
pub struct LocalFailureSink {
    root: PathBuf,
}

impl LocalFailureSink {
    /// Sink rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Failure container below a storage root.
    pub fn under(root: &Path) -> Self {
        Self::new(root.join(FAILURE_CONTAINER))
    }
}

#[async_trait]
impl FailureSink for LocalFailureSink {
    async fn divert(&self, key: &str, payload: Bytes) -> Result<(), StoreError> {
        let path = resolve(&self.root, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &payload).await?;
        tracing::debug!(path = %path.display(), bytes = payload.len(), "Wrote failure sink entry");
        Ok(())
    }
}

/// Map a slash-separated name onto a path under `root`, refusing traversal.
fn resolve(root: &Path, name: &str) -> Result<PathBuf, StoreError> {
    let relative = Path::new(name.trim_start_matches('/'));
    let mut path = root.to_path_buf();
    let mut segments = 0;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                segments += 1;
            }
            Component::CurDir => {}
            _ => return Err(StoreError::InvalidKey(name.to_string())),
        }
    }
    if segments == 0 {
        return Err(StoreError::InvalidKey(name.to_string()));
    }
    Ok(path)
}

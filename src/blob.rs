//! Raw document byte storage.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors returned by blob storage backends.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Storage path escapes the blob root or is otherwise malformed.
    #[error("invalid storage path '{0}'")]
    InvalidPath(String),
    /// Filesystem operation failed.
    #[error("blob I/O failed for '{path}': {source}")]
    Io {
        /// Storage path involved in the failing operation.
        path: String,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

/// Interface implemented by blob storage backends.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under the given storage path, overwriting any existing blob.
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError>;

    /// Fetch the bytes stored under the path.
    async fn download(&self, path: &str) -> Result<Vec<u8>, BlobError>;

    /// Delete the blobs under the given paths. Missing blobs are ignored.
    async fn remove(&self, paths: &[String]) -> Result<(), BlobError>;
}

/// Filesystem-backed blob store rooted at a single directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let traversal = relative.components().any(|component| {
            !matches!(component, Component::Normal(_))
        });
        if path.is_empty() || traversal {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| BlobError::Io {
                    path: path.to_string(),
                    source,
                })?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|source| BlobError::Io {
                path: path.to_string(),
                source,
            })?;
        tracing::debug!(path, bytes = bytes.len(), "Blob stored");
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target)
            .await
            .map_err(|source| BlobError::Io {
                path: path.to_string(),
                source,
            })
    }

    async fn remove(&self, paths: &[String]) -> Result<(), BlobError> {
        for path in paths {
            let target = self.resolve(path)?;
            match tokio::fs::remove_file(&target).await {
                Ok(()) => tracing::debug!(path, "Blob removed"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(BlobError::Io {
                        path: path.to_string(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }
}

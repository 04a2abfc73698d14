//! Reference image backends and the embedding provider seam.
//!
//! The backend is chosen once from configuration: either a fixed local
//! directory or a prefix inside an object store bucket.

use crate::types::DetectedFace;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("invalid image reference: {0:?}")]
    InvalidReference(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("object store: {0}")]
    ObjectStore(#[from] object_store::Error),
}

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("malformed image data: {0}")]
    Malformed(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Turns raw image bytes into one encoding per detected face.
///
/// Every encoding returned by one provider must share the same dimension.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, image: &[u8]) -> Result<Vec<DetectedFace>, EmbedError>;
}

/// Where reference images live.
#[derive(Clone)]
pub enum ImageSource {
    /// Images are files under a fixed directory.
    Local { dir: PathBuf },
    /// Images are objects under `prefix` in a bucket.
    Object {
        store: Arc<dyn ObjectStore>,
        prefix: String,
    },
}

impl std::fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSource::Local { dir } => f.debug_struct("Local").field("dir", dir).finish(),
            ImageSource::Object { store, prefix } => f
                .debug_struct("Object")
                .field("store", &store.to_string())
                .field("prefix", prefix)
                .finish(),
        }
    }
}

impl ImageSource {
    pub fn local(dir: impl Into<PathBuf>) -> Self {
        ImageSource::Local { dir: dir.into() }
    }

    pub fn object(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        ImageSource::Object {
            store,
            prefix: prefix.into(),
        }
    }

    /// Fetch the raw bytes of the reference image named `reference`.
    ///
    /// References are plain file names; anything that could escape the
    /// configured directory or prefix is rejected.
    pub async fn fetch(&self, reference: &str) -> Result<Vec<u8>, SourceError> {
        validate_reference(reference)?;
        match self {
            ImageSource::Local { dir } => {
                let path = dir.join(reference);
                tracing::debug!(path = %path.display(), "reading reference image");
                tokio::fs::read(&path)
                    .await
                    .map_err(|source| SourceError::Io { path, source })
            }
            ImageSource::Object { store, prefix } => {
                let key = if prefix.is_empty() {
                    ObjectPath::from(reference)
                } else {
                    ObjectPath::from(prefix.as_str()).child(reference)
                };
                tracing::debug!(%key, "fetching reference image from object store");
                let bytes = store.get(&key).await?.bytes().await?;
                Ok(bytes.to_vec())
            }
        }
    }
}

fn validate_reference(reference: &str) -> Result<(), SourceError> {
    let bad = reference.is_empty()
        || reference == "."
        || reference == ".."
        || reference.contains('/')
        || reference.contains('\\')
        || reference.contains('\0');
    if bad {
        return Err(SourceError::InvalidReference(reference.to_string()));
    }
    Ok(())
}

//! Gallery loading from a manifest of known identities.
//!
//! Loading is best-effort: an identity whose image cannot be fetched or
//! embedded is logged and skipped, and an unreadable manifest yields an empty
//! gallery. Nothing here touches the published snapshot.

use crate::gallery::{GalleryEntry, GallerySnapshot};
use crate::source::{EmbedError, EmbeddingProvider, ImageSource, SourceError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("manifest {path} unreadable: {reason}")]
    ManifestUnreadable { path: PathBuf, reason: String },
    #[error("failed to load identity {name}: {source}")]
    IdentityLoadFailed {
        name: String,
        #[source]
        source: IdentityFailure,
    },
}

/// Why a single manifest entry could not be loaded.
#[derive(Error, Debug)]
pub enum IdentityFailure {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error("malformed manifest entry: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One known identity as listed in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    /// Reference image name, resolved by the configured [`ImageSource`].
    pub image: String,
}

/// Read a JSON manifest: an array of `{"name": ..., "image": ...}` objects.
///
/// Only the document shape is checked here. Elements are returned raw so a
/// single malformed entry can be skipped without losing the rest.
pub async fn read_manifest(path: &Path) -> Result<Vec<serde_json::Value>, LoadError> {
    let unreadable = |reason: String| LoadError::ManifestUnreadable {
        path: path.to_path_buf(),
        reason,
    };
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| unreadable(e.to_string()))?;
    serde_json::from_slice(&raw).map_err(|e| unreadable(e.to_string()))
}

/// Convert raw manifest elements into entries, logging and dropping the
/// ones that do not have a string `name` and `image`.
pub fn parse_entries(values: Vec<serde_json::Value>) -> Vec<ManifestEntry> {
    values
        .into_iter()
        .filter_map(|value| {
            let name = value
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("unknown")
                .to_string();
            match serde_json::from_value::<ManifestEntry>(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    let err = LoadError::IdentityLoadFailed {
                        name,
                        source: e.into(),
                    };
                    tracing::error!(error = %err, "skipping employee");
                    None
                }
            }
        })
        .collect()
}

/// Builds gallery snapshots from a manifest.
pub struct GalleryLoader {
    source: ImageSource,
    provider: Arc<dyn EmbeddingProvider>,
}

impl GalleryLoader {
    pub fn new(source: ImageSource, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { source, provider }
    }

    /// Read the manifest at `path` and build a snapshot from it.
    ///
    /// An unreadable manifest is logged and produces an empty snapshot.
    /// The manifest entries are returned alongside so callers can see the
    /// reference image of every loaded name.
    pub async fn load_from(&self, path: &Path) -> (GallerySnapshot, Vec<ManifestEntry>) {
        match read_manifest(path).await {
            Ok(values) => {
                tracing::info!(
                    path = %path.display(),
                    count = values.len(),
                    "loading employees from manifest"
                );
                let manifest = parse_entries(values);
                let snapshot = self.load(&manifest).await;
                (snapshot, manifest)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load employee data");
                (GallerySnapshot::empty(), Vec::new())
            }
        }
    }

    /// Build a snapshot from `manifest`, in manifest order.
    ///
    /// Names are unique within a gallery: only the first entry listing a
    /// name is considered, later ones are logged and ignored.
    pub async fn load(&self, manifest: &[ManifestEntry]) -> GallerySnapshot {
        let mut entries = Vec::with_capacity(manifest.len());
        let mut seen = HashSet::new();

        for item in manifest {
            if !seen.insert(item.name.as_str()) {
                tracing::warn!(
                    name = %item.name,
                    image = %item.image,
                    "duplicate employee name in manifest; keeping the first"
                );
                continue;
            }
            match self.load_one(item).await {
                Ok(Some(entry)) => {
                    tracing::info!(name = %item.name, "loaded employee");
                    entries.push(entry);
                }
                Ok(None) => {
                    tracing::warn!(
                        name = %item.name,
                        image = %item.image,
                        "no face encoding found in reference image; skipping"
                    );
                }
                Err(e) => {
                    let err = LoadError::IdentityLoadFailed {
                        name: item.name.clone(),
                        source: e,
                    };
                    tracing::error!(error = %err, "skipping employee");
                }
            }
        }

        tracing::info!(
            loaded = entries.len(),
            listed = manifest.len(),
            "gallery build finished"
        );
        GallerySnapshot::new(entries)
    }

    /// Resolve and embed one entry. `Ok(None)` means no face was found.
    async fn load_one(&self, item: &ManifestEntry) -> Result<Option<GalleryEntry>, IdentityFailure> {
        let image = self.source.fetch(&item.image).await?;
        let faces = self.provider.embed(&image)?;

        if faces.len() > 1 {
            tracing::debug!(
                name = %item.name,
                faces = faces.len(),
                "multiple faces in reference image; keeping the first"
            );
        }

        Ok(faces.into_iter().next().map(|face| GalleryEntry {
            name: item.name.clone(),
            encoding: face.encoding,
        }))
    }
}

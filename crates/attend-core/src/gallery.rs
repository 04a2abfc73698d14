//! Gallery snapshots and their publication point.
//!
//! A [`GallerySnapshot`] is immutable once built. [`GalleryStore`] holds the
//! currently published snapshot behind an `ArcSwap`, so readers take a cheap
//! `Arc` clone without locking and a reload replaces the whole snapshot with a
//! single pointer swap.

use crate::types::Embedding;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A known identity paired with its reference encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub name: String,
    pub encoding: Embedding,
}

/// Point-in-time view of the gallery.
#[derive(Debug, Clone, Default)]
pub struct GallerySnapshot {
    version: u64,
    entries: Vec<GalleryEntry>,
}

impl GallerySnapshot {
    /// Build an unpublished snapshot. The version is stamped by
    /// [`GalleryStore::publish`].
    pub fn new(entries: Vec<GalleryEntry>) -> Self {
        Self { version: 0, entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Publication generation. `0` for the initial empty gallery and for
    /// snapshots that were never published.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }
}

/// Holder of the currently published gallery snapshot.
pub struct GalleryStore {
    current: ArcSwap<GallerySnapshot>,
    last_version: AtomicU64,
}

impl GalleryStore {
    /// Start with an empty gallery at version 0.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(GallerySnapshot::empty()),
            last_version: AtomicU64::new(0),
        }
    }

    /// Current snapshot. The returned `Arc` stays valid and unchanged even if
    /// a reload publishes a newer snapshot while the caller is using it.
    pub fn snapshot(&self) -> Arc<GallerySnapshot> {
        self.current.load_full()
    }

    /// Stamp the next version onto `snapshot` and make it the current one.
    pub fn publish(&self, mut snapshot: GallerySnapshot) -> Arc<GallerySnapshot> {
        snapshot.version = self.last_version.fetch_add(1, Ordering::AcqRel) + 1;
        let published = Arc::new(snapshot);
        self.current.store(Arc::clone(&published));
        tracing::info!(
            version = published.version,
            known_faces = published.len(),
            "gallery snapshot published"
        );
        published
    }
}

impl Default for GalleryStore {
    fn default() -> Self {
        Self::new()
    }
}

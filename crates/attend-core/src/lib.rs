//! attend-core: Face gallery matching and attendance recording.
//!
//! Holds the published gallery snapshot, matches probe encodings against it
//! by Euclidean nearest neighbour with a per-call threshold, and records an
//! attendance event for each accepted match.

pub mod gallery;
pub mod loader;
pub mod matcher;
pub mod recorder;
pub mod service;
pub mod source;
pub mod types;

pub use gallery::{GalleryEntry, GallerySnapshot, GalleryStore};
pub use loader::{GalleryLoader, LoadError, ManifestEntry};
pub use matcher::{EuclideanMatcher, MatchOutcome, Matcher};
pub use recorder::{AttendanceRecorder, AttendanceStore, StoreError, PROVISIONED_IMAGE_TAG};
pub use service::{AttendanceService, GallerySummary, RecognizeError, Recognition};
pub use source::{EmbedError, EmbeddingProvider, ImageSource, SourceError};
pub use types::{AttendanceEntry, AttendanceRecord, BoundingBox, DetectedFace, Embedding, Identity};

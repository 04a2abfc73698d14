//! Nearest-neighbour matching of a probe encoding against a gallery snapshot.

use crate::gallery::GallerySnapshot;
use crate::types::Embedding;

/// Result of matching a probe encoding against a gallery snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Nearest entry is strictly closer than the threshold.
    Matched { name: String, distance: f32 },
    /// Nearest entry is at or beyond the threshold. Carries the nearest
    /// candidate for logging only.
    Rejected { nearest: String, distance: f32 },
    /// The snapshot has no entries; nothing was compared.
    EmptyGallery,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }
}

/// Strategy for comparing a probe encoding against a gallery snapshot.
///
/// Implementations must be callable concurrently from many workers.
pub trait Matcher: Send + Sync {
    fn compare(&self, probe: &Embedding, gallery: &GallerySnapshot, threshold: f32)
        -> MatchOutcome;
}

/// Euclidean nearest-neighbour matcher with a strict distance threshold.
///
/// Precondition: the probe has the same dimension as every gallery entry.
/// The embedding provider guarantees this; it is checked in debug builds only.
#[derive(Debug, Default, Clone, Copy)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &GallerySnapshot,
        threshold: f32,
    ) -> MatchOutcome {
        if gallery.is_empty() {
            return MatchOutcome::EmptyGallery;
        }

        let mut best_dist = f32::INFINITY;
        let mut best_idx = 0;

        // Every entry is visited. Strict `<` keeps the first index on ties
        // and never lets a NaN distance take the lead.
        for (i, entry) in gallery.entries().iter().enumerate() {
            debug_assert_eq!(
                probe.dim(),
                entry.encoding.dim(),
                "encoding dimension mismatch for {}",
                entry.name
            );
            let dist = probe.euclidean_distance(&entry.encoding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = i;
            }
        }

        let name = gallery.entries()[best_idx].name.clone();

        if best_dist < threshold {
            MatchOutcome::Matched {
                name,
                distance: best_dist,
            }
        } else {
            MatchOutcome::Rejected {
                nearest: name,
                distance: best_dist,
            }
        }
    }
}

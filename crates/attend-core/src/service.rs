//! Recognition orchestration: the three operations exposed to request handlers.

use crate::gallery::GalleryStore;
use crate::loader::GalleryLoader;
use crate::matcher::{Matcher, MatchOutcome};
use crate::recorder::{AttendanceRecorder, StoreError};
use crate::types::{AttendanceEntry, Embedding};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("no face found in image")]
    NoFaceDetected,
    #[error("no known faces in the gallery")]
    EmptyGallery,
    #[error("no known employee matched")]
    NoMatchFound,
    #[error("attendance store: {0}")]
    Store(#[from] StoreError),
}

/// Gallery contents as reported after a reload or on a status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GallerySummary {
    pub version: u64,
    pub known_faces_count: usize,
    pub known_names: Vec<String>,
}

/// A successful recognition and the attendance it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recognition {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub distance: f32,
}

/// Owns the published gallery and wires loader, matcher and recorder together.
pub struct AttendanceService {
    gallery: GalleryStore,
    loader: GalleryLoader,
    matcher: Box<dyn Matcher>,
    recorder: AttendanceRecorder,
    reload_lock: tokio::sync::Mutex<()>,
}

impl AttendanceService {
    /// Create a service with an empty gallery. Call
    /// [`reload_gallery`](Self::reload_gallery) to populate it.
    pub fn new(
        loader: GalleryLoader,
        matcher: Box<dyn Matcher>,
        recorder: AttendanceRecorder,
    ) -> Self {
        Self {
            gallery: GalleryStore::new(),
            loader,
            matcher,
            recorder,
            reload_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Rebuild the gallery from `manifest` and publish it in one swap.
    ///
    /// Never fails: unreadable manifests publish an empty gallery and bad
    /// entries are dropped. Loaded names are provisioned in the store with
    /// their manifest image; provisioning failures are only logged.
    pub async fn reload_gallery(&self, manifest: &Path) -> GallerySummary {
        let _guard = self.reload_lock.lock().await;

        let (snapshot, entries) = self.loader.load_from(manifest).await;
        let published = self.gallery.publish(snapshot);

        let store = self.recorder.store();
        for entry in published.entries() {
            let image = entries
                .iter()
                .find(|m| m.name == entry.name)
                .map(|m| m.image.as_str())
                .unwrap_or(crate::recorder::PROVISIONED_IMAGE_TAG);
            if let Err(e) = store.get_or_create_identity(&entry.name, image) {
                tracing::warn!(name = %entry.name, error = %e, "failed to provision employee");
            }
        }

        GallerySummary {
            version: published.version(),
            known_faces_count: published.len(),
            known_names: published.names(),
        }
    }

    /// Match `faces` (in provider order) against the current gallery and
    /// record attendance for the first accepted face.
    pub fn recognize(
        &self,
        faces: &[Embedding],
        threshold: f32,
    ) -> Result<Recognition, RecognizeError> {
        if faces.is_empty() {
            tracing::warn!("no face found");
            return Err(RecognizeError::NoFaceDetected);
        }

        // One snapshot for the whole request, even if a reload lands mid-way.
        let snapshot = self.gallery.snapshot();
        if snapshot.is_empty() {
            tracing::error!("no known faces in the gallery");
            return Err(RecognizeError::EmptyGallery);
        }

        tracing::debug!(
            faces = faces.len(),
            known_faces = snapshot.len(),
            version = snapshot.version(),
            threshold,
            "recognizing"
        );

        for face in faces {
            match self.matcher.compare(face, &snapshot, threshold) {
                MatchOutcome::Matched { name, distance } => {
                    tracing::info!(%name, distance, "matched");
                    let record = self.recorder.record(&name)?;
                    return Ok(Recognition {
                        name,
                        timestamp: record.timestamp,
                        distance,
                    });
                }
                MatchOutcome::Rejected { nearest, distance } => {
                    tracing::info!(%nearest, distance, threshold, "nearest face above threshold");
                }
                MatchOutcome::EmptyGallery => return Err(RecognizeError::EmptyGallery),
            }
        }

        tracing::warn!("no face matched with the required accuracy");
        Err(RecognizeError::NoMatchFound)
    }

    /// Every attendance record with its employee name, in storage order.
    pub fn get_attendance(&self) -> Result<Vec<AttendanceEntry>, StoreError> {
        self.recorder.attendance()
    }

    /// Summary of the currently published gallery.
    pub fn status(&self) -> GallerySummary {
        let snapshot = self.gallery.snapshot();
        GallerySummary {
            version: snapshot.version(),
            known_faces_count: snapshot.len(),
            known_names: snapshot.names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::{GalleryEntry, GallerySnapshot};
    use crate::loader::tests::{write_image, write_manifest, JsonProvider};
    use crate::matcher::EuclideanMatcher;
    use crate::recorder::tests::MemoryStore;
    use crate::source::{EmbeddingProvider, ImageSource};
    use std::sync::Arc;

    struct Fixture {
        dir: tempfile::TempDir,
        manifest: std::path::PathBuf,
        store: Arc<MemoryStore>,
        service: AttendanceService,
    }

    fn fixture(entries: &[(&str, &str, &[f32])]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        for (_, image, encoding) in entries {
            write_image(dir.path(), image, &[*encoding]);
        }
        let manifest = dir.path().join("employees.json");
        let listed: Vec<(&str, &str)> = entries.iter().map(|(n, i, _)| (*n, *i)).collect();
        write_manifest(&manifest, &listed);

        let store = Arc::new(MemoryStore::default());
        let service = AttendanceService::new(
            GalleryLoader::new(ImageSource::local(dir.path()), Arc::new(JsonProvider)),
            Box::new(EuclideanMatcher),
            AttendanceRecorder::new(store.clone()),
        );
        Fixture {
            dir,
            manifest,
            store,
            service,
        }
    }

    fn enc(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[tokio::test]
    async fn test_recognize_records_attendance() {
        let fx = fixture(&[("A", "a.json", &[0.0, 0.0]), ("B", "b.json", &[10.0, 10.0])]);
        let summary = fx.service.reload_gallery(&fx.manifest).await;
        assert_eq!(summary.known_faces_count, 2);
        assert_eq!(summary.known_names, vec!["A", "B"]);

        let hit = fx.service.recognize(&[enc(&[0.1, 0.1])], 5.0).unwrap();
        assert_eq!(hit.name, "A");
        assert!((hit.distance - 0.1414).abs() < 1e-3);

        let attendance = fx.service.get_attendance().unwrap();
        assert_eq!(attendance.len(), 1);
        assert_eq!(attendance[0].name, "A");
        assert_eq!(attendance[0].timestamp, hit.timestamp);
    }

    #[tokio::test]
    async fn test_reload_provisions_manifest_images() {
        let fx = fixture(&[("A", "a.json", &[0.0, 0.0])]);
        fx.service.reload_gallery(&fx.manifest).await;
        fx.service.reload_gallery(&fx.manifest).await;

        let ids = fx.store.identities();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].reference_image, "a.json");
    }

    #[tokio::test]
    async fn test_no_match_beyond_threshold() {
        let fx = fixture(&[("A", "a.json", &[0.0, 0.0]), ("B", "b.json", &[10.0, 10.0])]);
        fx.service.reload_gallery(&fx.manifest).await;

        let err = fx.service.recognize(&[enc(&[5.0, 5.0])], 5.0).unwrap_err();
        assert!(matches!(err, RecognizeError::NoMatchFound));
        assert!(fx.service.get_attendance().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_gallery_is_distinct() {
        let fx = fixture(&[]);
        let summary = fx.service.reload_gallery(&fx.manifest).await;
        assert_eq!(summary.known_faces_count, 0);

        let err = fx.service.recognize(&[enc(&[0.0, 0.0])], 5.0).unwrap_err();
        assert!(matches!(err, RecognizeError::EmptyGallery));
    }

    #[tokio::test]
    async fn test_no_face_wins_regardless_of_gallery() {
        let empty = fixture(&[]);
        assert!(matches!(
            empty.service.recognize(&[], 5.0),
            Err(RecognizeError::NoFaceDetected)
        ));

        let full = fixture(&[("A", "a.json", &[0.0, 0.0])]);
        full.service.reload_gallery(&full.manifest).await;
        assert!(matches!(
            full.service.recognize(&[], 5.0),
            Err(RecognizeError::NoFaceDetected)
        ));
    }

    #[tokio::test]
    async fn test_first_accepting_face_wins() {
        let fx = fixture(&[("A", "a.json", &[0.0, 0.0]), ("B", "b.json", &[10.0, 10.0])]);
        fx.service.reload_gallery(&fx.manifest).await;

        // The stranger is rejected; B is accepted before the closer A match.
        let faces = [enc(&[50.0, 50.0]), enc(&[10.4, 10.0]), enc(&[0.0, 0.0])];
        let hit = fx.service.recognize(&faces, 0.5).unwrap();
        assert_eq!(hit.name, "B");
        assert_eq!(fx.service.get_attendance().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let fx = fixture(&[("A", "a.json", &[0.3, 0.7]), ("B", "b.json", &[4.0, -2.0])]);
        let first = fx.service.reload_gallery(&fx.manifest).await;
        let second = fx.service.reload_gallery(&fx.manifest).await;

        assert_eq!(first.known_names, second.known_names);
        assert_eq!(second.version, first.version + 1);

        // Re-embedding an unmodified reference image lands at distance 0.
        let image = std::fs::read(fx.dir.path().join("b.json")).unwrap();
        let probe = JsonProvider.embed(&image).unwrap().remove(0).encoding;
        let hit = fx.service.recognize(&[probe], 0.01).unwrap();
        assert_eq!(hit.name, "B");
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn test_concurrent_matches_never_see_torn_snapshot() {
        // Old entries sit on the x axis, new entries at y = 100, so a match
        // against the origin tells us exactly which snapshot it saw.
        let build = |prefix: &str, y: f32, count: usize| {
            GallerySnapshot::new(
                (0..count)
                    .map(|i| GalleryEntry {
                        name: format!("{prefix}-{i}"),
                        encoding: Embedding::new(vec![i as f32, y]),
                    })
                    .collect(),
            )
        };

        let store = GalleryStore::new();
        store.publish(build("old", 0.0, 8));
        let probe = Embedding::new(vec![0.0, 0.0]);

        std::thread::scope(|s| {
            s.spawn(|| {
                for round in 0..200 {
                    if round % 2 == 0 {
                        store.publish(build("new", 100.0, 3));
                    } else {
                        store.publish(build("old", 0.0, 8));
                    }
                }
            });

            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..500 {
                        let snap = store.snapshot();
                        let outcome = EuclideanMatcher.compare(&probe, &snap, 1000.0);
                        let (name, distance) = match outcome {
                            MatchOutcome::Matched { name, distance } => (name, distance),
                            other => panic!("expected a match, got {other:?}"),
                        };
                        if name.starts_with("old") {
                            assert_eq!(snap.len(), 8);
                            assert_eq!(distance, 0.0);
                        } else {
                            assert!(name.starts_with("new"));
                            assert_eq!(snap.len(), 3);
                            assert_eq!(distance, 100.0);
                        }
                    }
                });
            }
        });
    }
}

use crate::provider::EncodingFileProvider;
use attend_core::{AttendanceService, Embedding, RecognizeError, Recognition};
use std::path::PathBuf;
use std::sync::Arc;
use zbus::interface;

/// Errors returned over D-Bus. Each recognition outcome gets its own error
/// name so clients can tell "no data" from "rejected face".
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.attend.Attendance1.Error")]
pub enum AttendError {
    #[zbus(error)]
    ZBus(zbus::Error),
    /// The payload contained no faces.
    NoFaceDetected(String),
    /// The gallery has no known faces.
    EmptyGallery(String),
    /// No face was close enough to a known employee.
    NoMatchFound(String),
    /// The encodings payload could not be parsed.
    InvalidInput(String),
    /// The attendance store failed.
    Storage(String),
}

impl From<RecognizeError> for AttendError {
    fn from(e: RecognizeError) -> Self {
        let msg = e.to_string();
        match e {
            RecognizeError::NoFaceDetected => AttendError::NoFaceDetected(msg),
            RecognizeError::EmptyGallery => AttendError::EmptyGallery(msg),
            RecognizeError::NoMatchFound => AttendError::NoMatchFound(msg),
            RecognizeError::Store(_) => AttendError::Storage(msg),
        }
    }
}

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.attend.Attendance1
/// Object path: /org/attend/Attendance1
pub struct AttendanceInterface {
    service: Arc<AttendanceService>,
    manifest_path: PathBuf,
    live_threshold: f32,
    upload_threshold: f32,
}

impl AttendanceInterface {
    pub fn new(
        service: Arc<AttendanceService>,
        manifest_path: PathBuf,
        live_threshold: f32,
        upload_threshold: f32,
    ) -> Self {
        Self {
            service,
            manifest_path,
            live_threshold,
            upload_threshold,
        }
    }

    /// Parse `encodings` and run recognition off the async executor; the
    /// attendance write is a blocking SQLite call.
    async fn run_recognize(
        &self,
        encodings: &str,
        threshold: f32,
    ) -> Result<Recognition, AttendError> {
        let faces: Vec<Embedding> = EncodingFileProvider::parse(encodings.as_bytes())
            .map_err(|e| AttendError::InvalidInput(e.to_string()))?
            .into_iter()
            .map(|face| face.encoding)
            .collect();
        tracing::info!(faces = faces.len(), threshold, "recognize requested");

        let service = Arc::clone(&self.service);
        let result = tokio::task::spawn_blocking(move || service.recognize(&faces, threshold))
            .await
            .map_err(|e| AttendError::Storage(format!("recognition task failed: {e}")))?;
        Ok(result?)
    }

    /// A non-positive or non-finite requested threshold selects the live one.
    fn effective_threshold(&self, requested: f64) -> f32 {
        if requested.is_finite() && requested > 0.0 {
            requested as f32
        } else {
            self.live_threshold
        }
    }
}

#[interface(name = "org.attend.Attendance1")]
impl AttendanceInterface {
    /// Reload the face gallery from the manifest.
    async fn reload_gallery(&self) -> Result<String, AttendError> {
        tracing::info!(manifest = %self.manifest_path.display(), "reload requested");
        let summary = self.service.reload_gallery(&self.manifest_path).await;
        Ok(serde_json::json!({
            "status": "Database reloaded",
            "gallery_version": summary.version,
            "known_faces_count": summary.known_faces_count,
            "known_names": summary.known_names,
        })
        .to_string())
    }

    /// Recognize a face list and record attendance for the first match.
    async fn recognize(&self, encodings: &str, threshold: f64) -> Result<String, AttendError> {
        let threshold = self.effective_threshold(threshold);
        let hit = self.run_recognize(encodings, threshold).await?;
        Ok(recognition_json(&hit))
    }

    /// Recognize a manually uploaded photo using the upload threshold.
    async fn recognize_upload(&self, encodings: &str) -> Result<String, AttendError> {
        let hit = self.run_recognize(encodings, self.upload_threshold).await?;
        Ok(recognition_json(&hit))
    }

    /// Return every attendance record as a JSON array of `{name, timestamp}`.
    async fn get_attendance(&self) -> Result<String, AttendError> {
        let service = Arc::clone(&self.service);
        let entries = tokio::task::spawn_blocking(move || service.get_attendance())
            .await
            .map_err(|e| AttendError::Storage(format!("attendance task failed: {e}")))?
            .map_err(|e| AttendError::Storage(e.to_string()))?;

        let rows: Vec<_> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "timestamp": e.timestamp.to_rfc3339(),
                })
            })
            .collect();
        Ok(serde_json::Value::Array(rows).to_string())
    }

    /// Return daemon status information.
    async fn status(&self) -> Result<String, AttendError> {
        let summary = self.service.status();
        Ok(serde_json::json!({
            "status": "OK",
            "daemon_version": env!("CARGO_PKG_VERSION"),
            "gallery_version": summary.version,
            "known_faces_count": summary.known_faces_count,
            "known_names": summary.known_names,
            "live_threshold": self.live_threshold,
            "upload_threshold": self.upload_threshold,
        })
        .to_string())
    }
}

fn recognition_json(hit: &Recognition) -> String {
    serde_json::json!({
        "name": hit.name,
        "timestamp": hit.timestamp.to_rfc3339(),
        "distance": hit.distance,
    })
    .to_string()
}

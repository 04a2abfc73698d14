//! Embedding provider over serialized embedder output.
//!
//! Face embedding runs outside the daemon. Reference "images" and recognize
//! payloads carry its output as JSON: either a bare array of encodings
//! (`[[0.1, ...], ...]`) or an array of `{"encoding": [...], "bbox": {...}}`
//! objects, one element per detected face.

use attend_core::{DetectedFace, EmbedError, Embedding, EmbeddingProvider};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum EncodedFace {
    Bare(Embedding),
    Detected(DetectedFace),
}

impl From<EncodedFace> for DetectedFace {
    fn from(face: EncodedFace) -> Self {
        match face {
            EncodedFace::Bare(encoding) => DetectedFace {
                encoding,
                bbox: None,
            },
            EncodedFace::Detected(face) => face,
        }
    }
}

/// Reads encodings produced by the external embedder.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncodingFileProvider;

impl EncodingFileProvider {
    /// Parse a JSON face list, checking that every encoding has the same
    /// non-zero dimension.
    pub fn parse(raw: &[u8]) -> Result<Vec<DetectedFace>, EmbedError> {
        let faces: Vec<EncodedFace> =
            serde_json::from_slice(raw).map_err(|e| EmbedError::Malformed(e.to_string()))?;
        let faces: Vec<DetectedFace> = faces.into_iter().map(DetectedFace::from).collect();

        if let Some(first) = faces.first() {
            let expected = first.encoding.dim();
            if expected == 0 {
                return Err(EmbedError::Malformed("empty encoding".into()));
            }
            if let Some(bad) = faces.iter().find(|f| f.encoding.dim() != expected) {
                return Err(EmbedError::DimensionMismatch {
                    expected,
                    actual: bad.encoding.dim(),
                });
            }
        }
        Ok(faces)
    }
}

impl EmbeddingProvider for EncodingFileProvider {
    fn embed(&self, image: &[u8]) -> Result<Vec<DetectedFace>, EmbedError> {
        Self::parse(image)
    }
}

//! attendance-vision — Face detection and encoding engine.
//!
//! Uses SCRFD for face detection and landmarks, and ArcFace for face
//! encoding, both running via ONNX Runtime on the CPU. [`OnnxFaceEncoder`]
//! plugs the pair into the core session loop.

pub mod alignment;
pub mod detector;
pub mod recognizer;
pub mod types;

pub use alignment::align_face;
pub use detector::{DetectorError, FaceDetector};
pub use recognizer::{FaceRecognizer, RecognizerError};
pub use types::BoundingBox;

use attendance_core::{Embedding, FaceEncoder, Metric};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detector + recognizer pair producing one embedding per detected face.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models. Fails fast if either file is missing.
    pub fn load(detector_path: &Path, recognizer_path: &Path) -> Result<Self, EncoderError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path)?,
            recognizer: FaceRecognizer::load(recognizer_path)?,
        })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    type Frame = RgbImage;
    type Error = EncoderError;

    fn detect_and_encode(&mut self, frame: &RgbImage) -> Result<Vec<Embedding>, EncoderError> {
        let faces = self.detector.detect(frame)?;
        let mut encodings = Vec::with_capacity(faces.len());
        for face in &faces {
            match self.recognizer.encode(frame, face) {
                Ok(embedding) => encodings.push(embedding),
                Err(RecognizerError::EmptyCrop) => {
                    tracing::debug!(?face, "face box outside frame; skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(encodings)
    }

    /// ArcFace embeddings are unit length; compare them by angle.
    fn metric(&self) -> Metric {
        Metric::Cosine
    }
}

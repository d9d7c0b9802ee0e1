//! Enrollment capture: pull frames until one contains a face, then save it.

use crate::gallery::GalleryStore;
use crate::session::{FaceEncoder, FrameSource, SessionError};
use crate::types::Embedding;
use std::sync::atomic::{AtomicBool, Ordering};

/// Capture up to `attempts` frames and enroll the first face found under `name`.
///
/// Frames without a face are reported and skipped. Nothing is written unless
/// a face is captured.
pub fn capture_enrollment<S, E>(
    name: &str,
    source: &mut S,
    encoder: &mut E,
    store: &GalleryStore,
    attempts: usize,
    stop: &AtomicBool,
) -> Result<Embedding, SessionError>
where
    S: FrameSource,
    E: FaceEncoder<Frame = S::Frame>,
{
    tracing::info!(name, attempts, "capturing face for enrollment");

    for attempt in 1..=attempts {
        if stop.load(Ordering::Relaxed) {
            return Err(SessionError::Cancelled);
        }

        let Some(frame) = source
            .next_frame()
            .map_err(|e| SessionError::Capture(Box::new(e)))?
        else {
            tracing::warn!(attempt, "frame stream ended during enrollment");
            break;
        };

        let encodings = encoder
            .detect_and_encode(&frame)
            .map_err(|e| SessionError::Encode(Box::new(e)))?;

        match encodings.into_iter().next() {
            Some(encoding) => {
                store.save(name, encoding.clone())?;
                tracing::info!(name, attempt, "successfully enrolled");
                return Ok(encoding);
            }
            None => tracing::warn!(attempt, "no face detected, trying again"),
        }
    }

    Err(SessionError::NoFaceCaptured { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{FakeEncoder, FakeSource};
    use tempfile::TempDir;

    #[test]
    fn test_retries_until_face_found() {
        let dir = TempDir::new().unwrap();
        let store = GalleryStore::new(dir.path().join("face_encodings.json"));
        let e1 = Embedding::new(vec![0.1, 0.2]);
        let mut source = FakeSource::new(vec![vec![], vec![], vec![e1.clone()]]);
        let mut encoder = FakeEncoder::default();

        let enrolled = capture_enrollment(
            "Alice",
            &mut source,
            &mut encoder,
            &store,
            5,
            &AtomicBool::new(false),
        )
        .unwrap();

        assert_eq!(enrolled, e1);
        assert_eq!(encoder.calls, 3);
        let (encodings, names) = store.load().unwrap().into_parts();
        assert_eq!(names, vec!["Alice".to_string()]);
        assert_eq!(encodings, vec![e1]);
    }

    #[test]
    fn test_first_face_of_frame_is_enrolled() {
        let dir = TempDir::new().unwrap();
        let store = GalleryStore::new(dir.path().join("face_encodings.json"));
        let first = Embedding::new(vec![1.0]);
        let mut source = FakeSource::new(vec![vec![first.clone(), Embedding::new(vec![2.0])]]);

        let enrolled = capture_enrollment(
            "Bob",
            &mut source,
            &mut FakeEncoder::default(),
            &store,
            1,
            &AtomicBool::new(false),
        )
        .unwrap();
        assert_eq!(enrolled, first);
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_no_face_saves_nothing() {
        let dir = TempDir::new().unwrap();
        let store = GalleryStore::new(dir.path().join("face_encodings.json"));
        let mut source = FakeSource::new(vec![vec![]; 10]);

        let err = capture_enrollment(
            "Alice",
            &mut source,
            &mut FakeEncoder::default(),
            &store,
            3,
            &AtomicBool::new(false),
        )
        .unwrap_err();

        assert!(matches!(err, SessionError::NoFaceCaptured { attempts: 3 }));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_stop_cancels_enrollment() {
        let dir = TempDir::new().unwrap();
        let store = GalleryStore::new(dir.path().join("face_encodings.json"));
        let mut source = FakeSource::new(vec![vec![Embedding::new(vec![1.0])]]);

        let err = capture_enrollment(
            "Alice",
            &mut source,
            &mut FakeEncoder::default(),
            &store,
            3,
            &AtomicBool::new(true),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Cancelled));
        assert!(store.load().unwrap().is_empty());
    }
}

//! Recognition session loop.
//!
//! Single-threaded and synchronous: each frame is encoded, matched and
//! possibly marked before the next one is pulled from the source.

use crate::config::Config;
use crate::gallery::{Gallery, GalleryError};
use crate::ledger::{Ledger, LedgerError};
use crate::matcher::{Matcher, Metric, NearestMatcher};
use crate::types::{Embedding, Identity};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("frame capture failed: {0}")]
    Capture(#[source] BoxError),
    #[error("face encoding failed: {0}")]
    Encode(#[source] BoxError),
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("no face detected in {attempts} captured frames")]
    NoFaceCaptured { attempts: usize },
    #[error("stopped before a face was captured")]
    Cancelled,
}

/// Source of camera frames.
pub trait FrameSource {
    type Frame;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Self::Frame>, Self::Error>;
}

/// Face detector + encoder collaborator.
pub trait FaceEncoder {
    type Frame;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Encodings for every face found in `frame`, in detection order.
    fn detect_and_encode(&mut self, frame: &Self::Frame) -> Result<Vec<Embedding>, Self::Error>;

    /// Distance function on the scale the tolerance is expressed in.
    fn metric(&self) -> Metric {
        Metric::Euclidean
    }
}

/// What happened to one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    /// Whether this frame was run through the encoder and matcher.
    pub sampled: bool,
    /// Identity to display for this frame; skipped frames repeat the last one.
    pub identity: Identity,
    /// Name marked present by this frame, if any.
    pub marked: Option<String>,
}

/// Totals for a finished session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    pub frames: u64,
    pub sampled: u64,
    pub marked: Vec<String>,
}

/// Per-run recognition state over a loaded gallery and the ledger.
pub struct Session<'a, M: Matcher = NearestMatcher> {
    gallery: &'a Gallery,
    ledger: &'a Ledger,
    matcher: M,
    tolerance: f32,
    frame_skip: u32,
    frame_count: u64,
    current: Identity,
    /// Names already settled this run. The ledger remains the source of truth.
    confirmed: HashSet<String>,
}

impl<'a> Session<'a, NearestMatcher> {
    pub fn new(config: &Config, gallery: &'a Gallery, ledger: &'a Ledger) -> Self {
        Self::with_matcher(config, gallery, ledger, NearestMatcher::default())
    }
}

impl<'a, M: Matcher> Session<'a, M> {
    pub fn with_matcher(config: &Config, gallery: &'a Gallery, ledger: &'a Ledger, matcher: M) -> Self {
        Self {
            gallery,
            ledger,
            matcher,
            tolerance: config.tolerance,
            frame_skip: config.frame_skip.max(1),
            frame_count: 0,
            current: Identity::Unknown,
            confirmed: HashSet::new(),
        }
    }

    /// Identity computed on the most recent sampled frame.
    pub fn current(&self) -> &Identity {
        &self.current
    }

    /// Process one frame: every `frame_skip`-th frame is matched and may mark.
    pub fn process_frame<E: FaceEncoder>(
        &mut self,
        encoder: &mut E,
        frame: &E::Frame,
    ) -> Result<FrameOutcome, SessionError> {
        self.frame_count += 1;
        if self.frame_count % u64::from(self.frame_skip) != 0 {
            return Ok(FrameOutcome {
                sampled: false,
                identity: self.current.clone(),
                marked: None,
            });
        }

        let encodings = encoder
            .detect_and_encode(frame)
            .map_err(|e| SessionError::Encode(Box::new(e)))?;

        // Only the first detected face is matched.
        self.current = match encodings.first() {
            Some(probe) => self.matcher.compare(probe, self.gallery, self.tolerance).identity,
            None => Identity::Unknown,
        };

        let marked = self.confirm()?;
        Ok(FrameOutcome {
            sampled: true,
            identity: self.current.clone(),
            marked,
        })
    }

    /// Mark the current identity if it is known and not yet marked today.
    fn confirm(&mut self) -> Result<Option<String>, SessionError> {
        let Identity::Known(name) = &self.current else {
            return Ok(None);
        };
        if self.confirmed.contains(name) {
            return Ok(None);
        }

        let mut marked = None;
        if self.ledger.already_marked_today(name)? {
            tracing::debug!(name = %name, "already marked today");
        } else {
            self.ledger.mark_present(name)?;
            tracing::info!(name = %name, "attendance marked");
            marked = Some(name.clone());
        }
        self.confirmed.insert(name.clone());
        Ok(marked)
    }

    /// Pull frames until the source ends or `stop` is raised.
    ///
    /// `stop` is checked between frames only.
    pub fn run<S, E>(
        &mut self,
        source: &mut S,
        encoder: &mut E,
        stop: &AtomicBool,
    ) -> Result<SessionSummary, SessionError>
    where
        S: FrameSource,
        E: FaceEncoder<Frame = S::Frame>,
    {
        let mut summary = SessionSummary::default();

        while !stop.load(Ordering::Relaxed) {
            let Some(frame) = source
                .next_frame()
                .map_err(|e| SessionError::Capture(Box::new(e)))?
            else {
                tracing::info!("frame stream ended");
                break;
            };

            let outcome = self.process_frame(encoder, &frame)?;
            summary.frames += 1;
            if outcome.sampled {
                summary.sampled += 1;
                tracing::trace!(frame = self.frame_count, identity = %outcome.identity, "frame matched");
            }
            summary.marked.extend(outcome.marked);
        }

        tracing::info!(
            frames = summary.frames,
            sampled = summary.sampled,
            marked = summary.marked.len(),
            "session finished"
        );
        Ok(summary)
    }
}

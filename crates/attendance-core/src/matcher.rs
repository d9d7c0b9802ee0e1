//! Nearest-neighbour matching of a probe encoding against the gallery.

use crate::gallery::Gallery;
use crate::types::{Embedding, Identity};

/// Default maximum distance at which two encodings count as the same person.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: Identity,
    /// Distance to the nearest gallery entry, `None` for an empty gallery.
    pub distance: Option<f32>,
    /// Gallery index of the nearest entry, matched or not.
    pub nearest_index: Option<usize>,
}

impl MatchResult {
    fn unknown() -> Self {
        Self {
            identity: Identity::Unknown,
            distance: None,
            nearest_index: None,
        }
    }
}

/// Distance function used to compare two encodings.
///
/// The right choice depends on the encoder: unit-length ArcFace vectors are
/// compared by cosine distance, raw feature vectors by Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    #[default]
    Euclidean,
    Cosine,
}

impl Metric {
    pub fn distance(self, a: &Embedding, b: &Embedding) -> f32 {
        match self {
            Metric::Euclidean => a.distance(b),
            Metric::Cosine => a.cosine_distance(b),
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery, tolerance: f32) -> MatchResult;
}

/// Nearest-neighbour matcher over a [`Metric`].
///
/// The nearest entry wins if its distance is `<= tolerance`. On equal
/// distances the earliest entry in gallery order is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestMatcher {
    metric: Metric,
}

impl NearestMatcher {
    pub fn new(metric: Metric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }
}

impl Matcher for NearestMatcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery, tolerance: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in gallery.entries().iter().enumerate() {
            let dist = self.metric.distance(probe, &entry.encoding);
            // Strict `<` keeps the first of several equal minima.
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((i, dist));
            }
        }

        let Some((idx, dist)) = best else {
            return MatchResult::unknown();
        };

        let identity = if dist <= tolerance {
            Identity::Known(gallery.entries()[idx].name.clone())
        } else {
            Identity::Unknown
        };

        tracing::trace!(index = idx, distance = dist, tolerance, %identity, "nearest gallery entry");

        MatchResult {
            identity,
            distance: Some(dist),
            nearest_index: Some(idx),
        }
    }
}

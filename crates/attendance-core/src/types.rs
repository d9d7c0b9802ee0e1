use serde::{Deserialize, Serialize};
use std::fmt;

/// Label shown for a face that matched no enrolled person.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Default status written by [`crate::Ledger::mark`].
pub const STATUS_PRESENT: &str = "Present";

/// Face feature vector produced by the encoder (typically 512-dimensional).
///
/// Serializes transparently as a plain numeric array so the gallery file
/// stays a list of vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance between two embeddings. 0.0 means identical.
    ///
    /// Dimensions beyond the shorter vector are ignored; the gallery does not
    /// validate dimensionality.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Cosine distance, `1 - cos(a, b)`, in `[0, 2]`. 0.0 means same direction.
    ///
    /// A zero vector has no direction and sits at 1.0 from everything.
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        let dot: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();
        let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm(&self.values) * norm(&other.values);
        if denom > 0.0 {
            (1.0 - dot / denom).max(0.0)
        } else {
            1.0
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// One enrolled face: a person's name and the encoding captured for them.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrollment {
    pub name: String,
    pub encoding: Embedding,
}

/// Outcome of identifying a face.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Identity {
    Known(String),
    #[default]
    Unknown,
}

impl Identity {
    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Known(name) => Some(name),
            Identity::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or(UNKNOWN_LABEL))
    }
}

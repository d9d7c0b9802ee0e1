//! attendance-core — Face-recognition attendance bookkeeping.
//!
//! Holds the enrolled-face gallery, the nearest-neighbour matcher, the
//! append-only attendance ledger and the per-frame session loop. Camera
//! capture and face encoding are supplied by collaborators through the
//! [`FrameSource`] and [`FaceEncoder`] traits.

pub mod config;
pub mod enroll;
pub mod gallery;
pub mod ledger;
pub mod matcher;
pub mod session;
pub mod types;

pub use config::{Config, ConfigError};
pub use enroll::capture_enrollment;
pub use gallery::{Gallery, GalleryError, GalleryStore};
pub use ledger::{AttendanceRecord, Ledger, LedgerError};
pub use matcher::{MatchResult, Matcher, Metric, NearestMatcher, DEFAULT_TOLERANCE};
pub use session::{FaceEncoder, FrameOutcome, FrameSource, Session, SessionError, SessionSummary};
pub use types::{Embedding, Enrollment, Identity, STATUS_PRESENT, UNKNOWN_LABEL};

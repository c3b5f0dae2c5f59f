//! presence-core: recognition-to-ledger building blocks.
//!
//! Matches a face probe against enrolled templates through an opaque
//! [`Scorer`], classifies the submission time into a check-in or
//! check-out, and defines the collaborator traits the attendance
//! pipeline drives (candidate source, camera lookup, ledger).

pub mod classifier;
pub mod clock;
pub mod matcher;
pub mod scorer;
pub mod source;
pub mod types;

pub use classifier::Classifier;
pub use clock::{Clock, FixedClock, SystemClock};
pub use matcher::{CandidateMatcher, Match, MatchOutcome, MatchReport};
pub use scorer::{CosineScorer, ScoreError, Scorer};
pub use source::{CameraDirectory, CandidateSource, Ledger, StoreError};
pub use types::{
    AttendanceEntry, AttendanceRecord, Camera, Embedding, Employee, EventType, FaceTemplate,
    NewAttendance, Probe,
};

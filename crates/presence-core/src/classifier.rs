//! Time-of-day attendance classification.

use crate::types::EventType;
use chrono::{DateTime, Local, NaiveTime, Timelike};

/// Default check-in cutoff, 07:30 local time.
pub fn default_check_in_before() -> NaiveTime {
    NaiveTime::from_hms_opt(7, 30, 0).unwrap_or(NaiveTime::MIN)
}

/// Single-boundary classifier.
///
/// Anything strictly before the boundary is a check-in; everything else,
/// evening included, is a check-out. There is no second
/// (evening) window.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    check_in_before: NaiveTime,
}

impl Classifier {
    pub fn new(check_in_before: NaiveTime) -> Self {
        Self { check_in_before }
    }

    pub fn boundary(&self) -> NaiveTime {
        self.check_in_before
    }

    /// Classify a wall-clock time of day. Compared at minute resolution.
    pub fn classify_time(&self, time: NaiveTime) -> EventType {
        let minutes = time.hour() * 60 + time.minute();
        let boundary = self.check_in_before.hour() * 60 + self.check_in_before.minute();
        if minutes < boundary {
            EventType::CheckIn
        } else {
            EventType::CheckOut
        }
    }

    pub fn classify(&self, at: &DateTime<Local>) -> EventType {
        self.classify_time(at.time())
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_check_in_before())
    }
}

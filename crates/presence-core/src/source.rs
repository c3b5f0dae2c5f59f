//! Collaborator interfaces consumed by the attendance pipeline.

use crate::types::{AttendanceEntry, Camera, Employee, EventType, NewAttendance};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("employee {employee_id} already has {event_type} attendance for {day}")]
    DuplicateAttendance {
        employee_id: String,
        event_type: EventType,
        day: NaiveDate,
    },
    #[error("persistence failure: {0}")]
    Backend(#[source] BoxError),
}

impl StoreError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        StoreError::Backend(err.into())
    }
}

/// Read-only supplier of enrolled candidates.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Active employees with a stored template, in stable enrollment order.
    async fn list_active_with_template(&self) -> Result<Vec<Employee>, StoreError>;
}

#[async_trait]
pub trait CameraDirectory: Send + Sync {
    async fn get(&self, camera_id: &str) -> Result<Option<Camera>, StoreError>;
}

/// Append-only attendance ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Atomically insert one record for (employee, event type, day).
    ///
    /// Exactly one caller per key succeeds; every other caller gets
    /// [`StoreError::DuplicateAttendance`]. On success the record comes
    /// back enriched with the employee and camera as of the write.
    async fn try_insert(&self, entry: NewAttendance) -> Result<AttendanceEntry, StoreError>;
}

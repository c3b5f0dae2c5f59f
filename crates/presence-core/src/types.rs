use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Face embedding vector, the decoded form of a template or probe for the
/// built-in cosine scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Decode an embedding from its wire form: a JSON array of floats.
    pub fn decode(encoded: &str) -> Result<Self, serde_json::Error> {
        let values: Vec<f32> = serde_json::from_str(encoded)?;
        Ok(Self { values })
    }

    /// Encode as a JSON array of floats.
    pub fn encode(&self) -> String {
        serde_json::to_string(&self.values).unwrap_or_else(|_| "[]".to_string())
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// Always processes all dimensions.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// Stored face template of an enrolled employee. Opaque to everything
/// except the [`Scorer`](crate::Scorer).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceTemplate(pub String);

impl FaceTemplate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FaceTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FaceTemplate({} bytes)", self.0.len())
    }
}

/// Face representation submitted for recognition.
#[derive(Clone, PartialEq, Eq)]
pub struct Probe {
    pub data: String,
}

impl Probe {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    /// Reference stored on the attendance record in place of the raw
    /// probe: lowercase hex SHA-256 of the probe data.
    pub fn digest(&self) -> String {
        let digest = Sha256::digest(self.data.as_bytes());
        format!("{digest:x}")
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Probe({} bytes)", self.data.len())
    }
}

/// An enrolled employee. Read-only input to the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: String,
    pub employee_number: String,
    pub name: String,
    pub email: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub active: bool,
    /// Never leaves the process in API payloads.
    #[serde(skip_serializing)]
    pub template: Option<FaceTemplate>,
}

/// A camera that tags the origin of an attendance event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub active: bool,
}

/// The two mutually exclusive per-day attendance events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "check-in")]
    CheckIn,
    #[serde(rename = "check-out")]
    CheckOut,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CheckIn => "check-in",
            EventType::CheckOut => "check-out",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check-in" => Ok(EventType::CheckIn),
            "check-out" => Ok(EventType::CheckOut),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Everything the ledger needs to attempt one attendance write.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub employee_id: String,
    pub camera_id: String,
    pub event_type: EventType,
    pub confidence: f32,
    pub probe_ref: String,
    pub timestamp: DateTime<Local>,
}

impl NewAttendance {
    /// Local calendar day that forms the uniqueness key.
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// A persisted, append-only attendance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub employee_id: String,
    pub camera_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Local>,
    pub day: NaiveDate,
    pub confidence: f32,
    pub probe_ref: String,
}

/// A record enriched with the employee and camera snapshot taken at
/// write time.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceEntry {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub employee: Employee,
    pub camera: Camera,
}

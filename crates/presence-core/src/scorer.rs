//! Face similarity scoring.
//!
//! The similarity computation is an external capability: the matcher only
//! sees a score in [0, 1] or a per-call failure.

use crate::types::{Embedding, FaceTemplate, Probe};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("cannot decode face representation: {0}")]
    Decode(String),
    #[error("scorer unavailable: {0}")]
    Unavailable(String),
    #[error("scorer returned out-of-range score {0}")]
    OutOfRange(f32),
}

/// Compares a stored template against a probe.
///
/// Calls may fail transiently; the matcher skips the candidate and keeps
/// going.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn compare(&self, template: &FaceTemplate, probe: &Probe) -> Result<f32, ScoreError>;
}

/// Cosine similarity over JSON-encoded embeddings, clamped to [0, 1].
pub struct CosineScorer;

#[async_trait]
impl Scorer for CosineScorer {
    async fn compare(&self, template: &FaceTemplate, probe: &Probe) -> Result<f32, ScoreError> {
        let known = Embedding::decode(template.as_str())
            .map_err(|e| ScoreError::Decode(format!("template: {e}")))?;
        let live = Embedding::decode(&probe.data)
            .map_err(|e| ScoreError::Decode(format!("probe: {e}")))?;

        if known.values.len() != live.values.len() {
            return Err(ScoreError::Decode(format!(
                "dimension mismatch: template {} vs probe {}",
                known.values.len(),
                live.values.len()
            )));
        }

        Ok(known.similarity(&live).clamp(0.0, 1.0))
    }
}

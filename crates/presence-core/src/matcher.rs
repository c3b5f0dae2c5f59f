//! Candidate matching: fan a probe out to every enrolled candidate and
//! reduce the scores to at most one winner.

use crate::scorer::{ScoreError, Scorer};
use crate::types::{Employee, Probe};
use futures::future::FutureExt;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

pub const DEFAULT_THRESHOLD: f32 = 0.7;
pub const DEFAULT_PARALLELISM: usize = 4;

/// Winning candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Position of the candidate in enrollment order.
    pub index: usize,
    pub employee_id: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(Match),
    NoMatch,
}

/// Outcome plus per-run counters.
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub outcome: MatchOutcome,
    /// Candidates that returned a usable score.
    pub scored: usize,
    /// Candidates skipped because the scorer failed.
    pub failed: usize,
}

/// Bounded-concurrency matcher with a deterministic reduction.
///
/// A candidate qualifies when its score is strictly above the threshold.
/// The winner is the highest qualifying score; equal scores go to the
/// lowest enrollment index, so the result never depends on which scorer
/// call finished first.
#[derive(Clone)]
pub struct CandidateMatcher {
    scorer: Arc<dyn Scorer>,
    threshold: f32,
    parallelism: usize,
}

impl CandidateMatcher {
    pub fn new(scorer: Arc<dyn Scorer>, threshold: f32, parallelism: usize) -> Self {
        Self {
            scorer,
            threshold,
            parallelism: parallelism.max(1),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Score `probe` against every candidate and pick the best match.
    ///
    /// Scorer failures (including NaN or out-of-range scores) skip that
    /// candidate only.
    pub async fn best_match(&self, probe: &Probe, candidates: &[Employee]) -> MatchReport {
        // Calls own their inputs; the match must stay spawnable.
        let calls: Vec<_> = candidates
            .iter()
            .enumerate()
            .map(|(index, employee)| {
                let scorer = Arc::clone(&self.scorer);
                let template = employee.template.clone();
                let probe = probe.clone();
                async move {
                    let result = match template {
                        Some(template) => scorer.compare(&template, &probe).await,
                        None => Err(ScoreError::Decode("no enrolled template".into())),
                    };
                    (index, result.and_then(validate_score))
                }
                .boxed()
            })
            .collect();

        let mut results = stream::iter(calls).buffer_unordered(self.parallelism);

        let mut best: Option<Match> = None;
        let mut scored = 0;
        let mut failed = 0;

        while let Some((index, result)) = results.next().await {
            let employee = &candidates[index];
            let score = match result {
                Ok(score) => score,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        employee_id = %employee.id,
                        index,
                        error = %e,
                        "scorer failed for candidate; skipping"
                    );
                    continue;
                }
            };
            scored += 1;
            tracing::debug!(employee_id = %employee.id, index, score, "candidate scored");

            if score > self.threshold && beats(best.as_ref(), score, index) {
                best = Some(Match {
                    index,
                    employee_id: employee.id.clone(),
                    score,
                });
            }
        }

        MatchReport {
            outcome: best.map_or(MatchOutcome::NoMatch, MatchOutcome::Matched),
            scored,
            failed,
        }
    }
}

fn validate_score(score: f32) -> Result<f32, ScoreError> {
    if (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(ScoreError::OutOfRange(score))
    }
}

fn beats(current: Option<&Match>, score: f32, index: usize) -> bool {
    match current {
        None => true,
        Some(best) => score > best.score || (score == best.score && index < best.index),
    }
}

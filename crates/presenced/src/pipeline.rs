//! The recognition-to-ledger pipeline shared by every ingress adapter.
//!
//! `Received → Matching → NoMatch | Matched → Classifying → Writing →
//! Duplicate | Written → Broadcasting → Responded`. Nothing loops back.

use crate::broadcast::Broadcaster;
use presence_core::{
    AttendanceEntry, CameraDirectory, CandidateMatcher, CandidateSource, Classifier, Clock,
    Employee, Ledger, MatchOutcome, NewAttendance, Probe, StoreError,
};
use presence_store::Store;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error("no active employees found")]
    NoActiveEmployees,
    #[error("employee already has attendance for today")]
    Duplicate { employee: Employee, confidence: f32 },
    #[error("persistence failure: {0}")]
    Persistence(#[source] StoreError),
    #[error("submission task failed: {0}")]
    Aborted(String),
}

/// One submission as received by either adapter.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeRequest {
    pub image_data: Option<String>,
    #[serde(alias = "cctvId")]
    pub camera_id: Option<String>,
}

impl RecognizeRequest {
    fn validate(self) -> Result<(Probe, String), PipelineError> {
        let image_data = self.image_data.filter(|s| !s.is_empty());
        let camera_id = self.camera_id.filter(|s| !s.trim().is_empty());
        match (image_data, camera_id) {
            (Some(image_data), Some(camera_id)) => Ok((Probe::new(image_data), camera_id)),
            _ => Err(PipelineError::Validation(
                "Image data and camera ID are required".into(),
            )),
        }
    }
}

/// Successful pipeline outcomes. A probe nobody matches is not an error.
#[derive(Debug, Clone)]
pub enum Recognition {
    Recorded {
        employee: Employee,
        entry: AttendanceEntry,
        confidence: f32,
    },
    NoMatch,
}

/// The three external collaborators the pipeline reads and writes.
#[derive(Clone)]
pub struct Collaborators {
    pub candidates: Arc<dyn CandidateSource>,
    pub cameras: Arc<dyn CameraDirectory>,
    pub ledger: Arc<dyn Ledger>,
}

impl Collaborators {
    pub fn from_store(store: Store) -> Self {
        Self {
            candidates: Arc::new(store.clone()),
            cameras: Arc::new(store.clone()),
            ledger: Arc::new(store),
        }
    }
}

/// Clone-safe handle to the shared pipeline.
#[derive(Clone)]
pub struct Pipeline {
    collaborators: Collaborators,
    matcher: CandidateMatcher,
    classifier: Classifier,
    clock: Arc<dyn Clock>,
    broadcaster: Broadcaster,
}

impl Pipeline {
    pub fn new(
        collaborators: Collaborators,
        matcher: CandidateMatcher,
        classifier: Classifier,
        clock: Arc<dyn Clock>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            collaborators,
            matcher,
            classifier,
            clock,
            broadcaster,
        }
    }

    /// Run one submission on its own task and wait for the result.
    ///
    /// The task outlives the caller: if the adapter goes away mid-flight,
    /// a started ledger write and its broadcast still complete.
    pub async fn submit_detached(&self, request: RecognizeRequest) -> Result<Recognition, PipelineError> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.submit(request).await })
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "submission task failed");
                Err(PipelineError::Aborted(e.to_string()))
            })
    }

    /// Match, classify, record and publish one submission.
    pub async fn submit(&self, request: RecognizeRequest) -> Result<Recognition, PipelineError> {
        let (probe, camera_id) = request.validate()?;

        let camera = self
            .collaborators
            .cameras
            .get(&camera_id)
            .await
            .map_err(|e| self.persistence_failure(e))?;
        if camera.is_none() {
            return Err(PipelineError::Validation(format!("Unknown camera: {camera_id}")));
        }

        let mut candidates = self
            .collaborators
            .candidates
            .list_active_with_template()
            .await
            .map_err(|e| self.persistence_failure(e))?;
        if candidates.is_empty() {
            tracing::warn!(camera_id = %camera_id, "no active enrolled employees");
            return Err(PipelineError::NoActiveEmployees);
        }

        let report = self.matcher.best_match(&probe, &candidates).await;
        let best = match report.outcome {
            MatchOutcome::Matched(best) => best,
            MatchOutcome::NoMatch => {
                tracing::info!(
                    camera_id = %camera_id,
                    candidates = candidates.len(),
                    scored = report.scored,
                    failed = report.failed,
                    "no face matched"
                );
                return Ok(Recognition::NoMatch);
            }
        };
        let employee = candidates.swap_remove(best.index);

        let now = self.clock.now();
        let event_type = self.classifier.classify(&now);
        tracing::debug!(
            employee_id = %employee.id,
            score = best.score,
            %event_type,
            "face matched"
        );

        let attempt = NewAttendance {
            employee_id: employee.id.clone(),
            camera_id: camera_id.clone(),
            event_type,
            confidence: best.score,
            probe_ref: probe.digest(),
            timestamp: now,
        };

        match self.collaborators.ledger.try_insert(attempt).await {
            Ok(entry) => {
                let delivered = self.broadcaster.publish_attendance(entry.clone());
                tracing::info!(
                    record_id = %entry.record.id,
                    employee_id = %employee.id,
                    camera_id = %camera_id,
                    %event_type,
                    confidence = best.score,
                    delivered,
                    "attendance recorded"
                );
                Ok(Recognition::Recorded {
                    employee,
                    entry,
                    confidence: best.score,
                })
            }
            Err(StoreError::DuplicateAttendance { day, .. }) => {
                tracing::info!(
                    employee_id = %employee.id,
                    %event_type,
                    %day,
                    "duplicate attendance rejected"
                );
                Err(PipelineError::Duplicate {
                    employee,
                    confidence: best.score,
                })
            }
            Err(e) => Err(self.persistence_failure(e)),
        }
    }

    fn persistence_failure(&self, err: StoreError) -> PipelineError {
        tracing::error!(error = %err, "attendance pipeline persistence failure");
        PipelineError::Persistence(err)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::broadcast::BroadcastEvent;
    use async_trait::async_trait;
    use chrono::{DateTime, Local, TimeZone};
    use presence_core::{
        Camera, EventType, FaceTemplate, FixedClock, ScoreError, Scorer,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast::error::TryRecvError;

    /// Scorer keyed by template text; unknown templates fail.
    pub(crate) struct TableScorer {
        scores: HashMap<String, f32>,
        pub(crate) calls: AtomicUsize,
    }

    impl TableScorer {
        pub(crate) fn new(scores: &[(&str, f32)]) -> Arc<Self> {
            Arc::new(Self {
                scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Scorer for TableScorer {
        async fn compare(&self, template: &FaceTemplate, _probe: &Probe) -> Result<f32, ScoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.scores
                .get(template.as_str())
                .copied()
                .ok_or_else(|| ScoreError::Unavailable("scorer timed out".into()))
        }
    }

    pub(crate) fn local(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn employee(id: &str, template: &str) -> Employee {
        Employee {
            id: id.into(),
            employee_number: id.into(),
            name: format!("Employee {id}"),
            email: None,
            position: None,
            department: None,
            active: true,
            template: Some(FaceTemplate(template.into())),
        }
    }

    /// Store with camera `cam-1` and employees `a`, `b`, `c` whose
    /// templates are their ids.
    pub(crate) async fn seeded_store() -> Store {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_camera(Camera {
                id: "cam-1".into(),
                name: "Lobby".into(),
                location: None,
                active: true,
            })
            .await
            .unwrap();
        for id in ["a", "b", "c"] {
            store.upsert_employee(employee(id, id)).await.unwrap();
        }
        store
    }

    pub(crate) fn pipeline(
        store: &Store,
        scorer: Arc<TableScorer>,
        now: DateTime<Local>,
        broadcaster: &Broadcaster,
    ) -> Pipeline {
        Pipeline::new(
            Collaborators::from_store(store.clone()),
            CandidateMatcher::new(scorer, 0.7, 4),
            Classifier::default(),
            Arc::new(FixedClock(now)),
            broadcaster.clone(),
        )
    }

    pub(crate) fn request(camera_id: &str) -> RecognizeRequest {
        RecognizeRequest {
            image_data: Some("probe-bytes".into()),
            camera_id: Some(camera_id.into()),
        }
    }

    #[tokio::test]
    async fn test_threshold_edge_is_no_match() {
        let store = seeded_store().await;
        let broadcaster = Broadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        let scorer = TableScorer::new(&[("a", 0.7), ("b", 0.1), ("c", 0.2)]);
        let p = pipeline(&store, scorer, local(7, 0), &broadcaster);

        let result = p.submit(request("cam-1")).await.unwrap();
        assert!(matches!(result, Recognition::NoMatch));
        assert!(store.list_attendance(None).await.unwrap().is_empty());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_partial_scorer_failure_still_matches() {
        let store = seeded_store().await;
        let broadcaster = Broadcaster::new(8);
        let scorer = TableScorer::new(&[("c", 0.95)]);
        let p = pipeline(&store, scorer.clone(), local(7, 0), &broadcaster);

        match p.submit(request("cam-1")).await.unwrap() {
            Recognition::Recorded { employee, entry, confidence } => {
                assert_eq!(employee.id, "c");
                assert!((confidence - 0.95).abs() < 1e-6);
                assert!((entry.record.confidence - 0.95).abs() < 1e-6);
                assert_eq!(entry.record.probe_ref, Probe::new("probe-bytes").digest());
            }
            other => panic!("expected a record, got {other:?}"),
        }
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_write_once() {
        let store = seeded_store().await;
        let broadcaster = Broadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        let scorer = TableScorer::new(&[("a", 0.9)]);
        let p = pipeline(&store, scorer, local(7, 10), &broadcaster);

        let (first, second) = tokio::join!(
            p.submit_detached(request("cam-1")),
            p.submit_detached(request("cam-1"))
        );
        let results = [first, second];
        let recorded = results
            .iter()
            .filter(|r| matches!(r, Ok(Recognition::Recorded { .. })))
            .count();
        let duplicates = results
            .iter()
            .filter(|r| matches!(r, Err(PipelineError::Duplicate { .. })))
            .count();
        assert_eq!((recorded, duplicates), (1, 1));
        assert_eq!(store.list_attendance(None).await.unwrap().len(), 1);

        // Exactly one broadcast for exactly one write.
        assert!(matches!(rx.try_recv(), Ok(BroadcastEvent::AttendanceUpdate(_))));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_many_concurrent_submissions_write_once() {
        let store = seeded_store().await;
        let broadcaster = Broadcaster::new(64);
        let scorer = TableScorer::new(&[("b", 0.88)]);
        let p = pipeline(&store, scorer, local(17, 0), &broadcaster);

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let p = p.clone();
                tokio::spawn(async move { p.submit(request("cam-1")).await })
            })
            .collect();
        let mut recorded = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(Recognition::Recorded { .. }) => recorded += 1,
                Err(PipelineError::Duplicate { .. }) => duplicates += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(recorded, 1);
        assert_eq!(duplicates, 11);
    }

    #[tokio::test]
    async fn test_time_of_day_classification() {
        let store = seeded_store().await;
        let broadcaster = Broadcaster::new(8);
        let scorer = TableScorer::new(&[("a", 0.9)]);

        for (now, expected) in [
            (local(7, 0), EventType::CheckIn),
            (local(17, 0), EventType::CheckOut),
        ] {
            let p = pipeline(&store, scorer.clone(), now, &broadcaster);
            match p.submit(request("cam-1")).await.unwrap() {
                Recognition::Recorded { entry, .. } => {
                    assert_eq!(entry.record.event_type, expected);
                    assert_eq!(entry.record.timestamp, now);
                }
                other => panic!("expected a record, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_no_active_employees_skips_scoring() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_camera(Camera {
                id: "cam-1".into(),
                name: "Lobby".into(),
                location: None,
                active: true,
            })
            .await
            .unwrap();
        let broadcaster = Broadcaster::new(8);
        let scorer = TableScorer::new(&[]);
        let p = pipeline(&store, scorer.clone(), local(7, 0), &broadcaster);

        let err = p.submit(request("cam-1")).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoActiveEmployees));
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_any_work() {
        let store = seeded_store().await;
        let broadcaster = Broadcaster::new(8);
        let scorer = TableScorer::new(&[("a", 0.9)]);
        let p = pipeline(&store, scorer.clone(), local(7, 0), &broadcaster);

        let missing_probe = RecognizeRequest {
            image_data: Some(String::new()),
            camera_id: Some("cam-1".into()),
        };
        let missing_camera = RecognizeRequest {
            image_data: Some("probe".into()),
            camera_id: None,
        };
        for req in [missing_probe, missing_camera, request("cam-404")] {
            let err = p.submit(req).await.unwrap_err();
            assert!(matches!(err, PipelineError::Validation(_)));
        }
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_carries_employee_and_confidence() {
        let store = seeded_store().await;
        let broadcaster = Broadcaster::new(8);
        let scorer = TableScorer::new(&[("b", 0.81)]);
        let p = pipeline(&store, scorer, local(6, 45), &broadcaster);

        p.submit(request("cam-1")).await.unwrap();
        let mut rx = broadcaster.subscribe();
        match p.submit(request("cam-1")).await.unwrap_err() {
            PipelineError::Duplicate { employee, confidence } => {
                assert_eq!(employee.id, "b");
                assert!((confidence - 0.81).abs() < 1e-6);
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_abort_write() {
        let store = seeded_store().await;
        let broadcaster = Broadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        let scorer = TableScorer::new(&[("a", 0.9)]);
        let p = pipeline(&store, scorer, local(7, 0), &broadcaster);

        // The caller gives up long before the submission can finish.
        let _ = tokio::time::timeout(
            std::time::Duration::from_micros(1),
            p.submit_detached(request("cam-1")),
        )
        .await;

        let event = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .expect("broadcast after caller dropped")
            .unwrap();
        match event {
            BroadcastEvent::AttendanceUpdate(update) => {
                assert_eq!(update.data.record.employee_id, "a");
            }
            other => panic!("unexpected event {other:?}"),
        }
        let records = store.list_attendance(None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record.event_type, EventType::CheckIn);
    }
}

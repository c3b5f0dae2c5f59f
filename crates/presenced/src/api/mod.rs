//! HTTP and WebSocket ingress.
//!
//! Both adapters hand submissions to the same [`Pipeline`] and answer
//! with the same [`RecognitionResponse`] body; neither applies rules of
//! its own.

mod attendance;
mod recognize;
mod ws;

use crate::broadcast::Broadcaster;
use crate::pipeline::{Pipeline, PipelineError, Recognition};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use presence_core::{AttendanceEntry, Clock, Employee, StoreError};
use presence_store::Store;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub store: Store,
    pub broadcaster: Broadcaster,
    pub clock: Arc<dyn Clock>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(attendance::health))
        .route("/attendance", get(attendance::list_all))
        .route("/attendance/today", get(attendance::list_today))
        .route("/attendance/recognize", post(recognize::recognize))
        .route("/ws", get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Result body shared by both adapters.
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee: Option<Employee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<AttendanceEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl RecognitionResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            employee: None,
            attendance: None,
            confidence: None,
        }
    }

    /// Map a pipeline result to its body and HTTP status.
    pub fn from_result(result: Result<Recognition, PipelineError>) -> (StatusCode, Self) {
        match result {
            Ok(Recognition::Recorded {
                employee,
                entry,
                confidence,
            }) => (
                StatusCode::OK,
                Self {
                    success: true,
                    message: format!("Attendance recorded for {}", employee.name),
                    employee: Some(employee),
                    attendance: Some(entry),
                    confidence: Some(confidence),
                },
            ),
            Ok(Recognition::NoMatch) => (
                StatusCode::OK,
                Self {
                    confidence: Some(0.0),
                    ..Self::failure("No face recognized")
                },
            ),
            Err(PipelineError::Validation(message)) => {
                (StatusCode::BAD_REQUEST, Self::failure(message))
            }
            Err(PipelineError::NoActiveEmployees) => (
                StatusCode::NOT_FOUND,
                Self::failure("No active employees found"),
            ),
            Err(PipelineError::Duplicate {
                employee,
                confidence,
            }) => (
                StatusCode::BAD_REQUEST,
                Self {
                    employee: Some(employee),
                    confidence: Some(confidence),
                    ..Self::failure("Employee already has attendance for today")
                },
            ),
            Err(PipelineError::Persistence(_)) | Err(PipelineError::Aborted(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Self::failure("Failed to process face recognition"),
            ),
        }
    }
}

/// Read-path failure, rendered in the same `{success, message}` shape.
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "attendance read failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RecognitionResponse::failure("Failed to fetch attendance")),
        )
            .into_response()
    }
}

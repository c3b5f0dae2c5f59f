use super::{ApiError, AppState};
use axum::extract::State;
use axum::Json;
use presence_core::AttendanceEntry;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    module: &'static str,
    version: &'static str,
    subscribers: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        module: "presenced",
        version: env!("CARGO_PKG_VERSION"),
        subscribers: state.broadcaster.subscriber_count(),
    })
}

/// GET /attendance: every record, newest first.
pub async fn list_all(State(state): State<AppState>) -> Result<Json<Vec<AttendanceEntry>>, ApiError> {
    Ok(Json(state.store.list_attendance(None).await?))
}

/// GET /attendance/today: what a reconnecting observer loads before
/// following live updates.
pub async fn list_today(
    State(state): State<AppState>,
) -> Result<Json<Vec<AttendanceEntry>>, ApiError> {
    let today = state.clock.now().date_naive();
    Ok(Json(state.store.list_attendance(Some(today)).await?))
}

use super::{AppState, RecognitionResponse};
use crate::pipeline::{PipelineError, RecognizeRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

/// POST /attendance/recognize
pub async fn recognize(
    State(state): State<AppState>,
    payload: Result<Json<RecognizeRequest>, JsonRejection>,
) -> (StatusCode, Json<RecognitionResponse>) {
    let result = match payload {
        Ok(Json(request)) => state.pipeline.submit_detached(request).await,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "malformed recognize request");
            Err(PipelineError::Validation(
                "Image data and camera ID are required".into(),
            ))
        }
    };
    let (status, body) = RecognitionResponse::from_result(result);
    (status, Json(body))
}

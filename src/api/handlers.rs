use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::pipeline::{EventPublisher, PublishError};
use crate::query::AggregationQueryEngine;

pub struct AppState {
    pub engine: AggregationQueryEngine,
    pub publisher: EventPublisher,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

pub(crate) fn error_response(
    status: StatusCode,
    error: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Accept one encoded click event for the consumer loop.
///
/// The body is queued as-is; malformed events are discarded by the consumer,
/// not rejected here.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<SuccessResponse>), (StatusCode, Json<ErrorResponse>)> {
    if body.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "event body is required"));
    }

    match state.publisher.publish(body.to_vec()) {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(SuccessResponse {
                message: "queued".to_string(),
            }),
        )),
        Err(e @ PublishError::Full) => {
            tracing::warn!("Analytics event buffer full, dropping event");
            Err(error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
        Err(e @ PublishError::Closed) => {
            tracing::error!("Analytics consumer is not running, dropping event");
            Err(error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}

//! Analytics API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use super::handlers::{error_response, AppState, ErrorResponse};
use crate::models::{AggregationQuery, AnalyticsSummary};
use crate::query::{QueryError, SummaryParams};

/// Get the aggregated summary for a specific short code
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<AnalyticsSummary>, (StatusCode, Json<ErrorResponse>)> {
    let code = code.trim();
    if code.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "code is required"));
    }

    let query = AggregationQuery::from_params(code, &params, Utc::now())
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    match state.engine.summarize(&query).await {
        Ok(summary) => Ok(Json(summary)),
        Err(QueryError::Storage(e)) if e.is_unavailable() => {
            tracing::error!(code = %query.code, error = %e, "Analytics store unavailable");
            Err(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "analytics store unavailable",
            ))
        }
        Err(e) => {
            tracing::error!(code = %query.code, error = %e, "Failed to get analytics");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to get analytics",
            ))
        }
    }
}

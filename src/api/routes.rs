use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::analytics::get_summary;
use super::handlers::{health_check, ingest_event, AppState};
use crate::pipeline::EventPublisher;
use crate::query::AggregationQueryEngine;

pub fn create_api_router(engine: AggregationQueryEngine, publisher: EventPublisher) -> Router {
    let state = Arc::new(AppState { engine, publisher });

    Router::new()
        .route("/health", get(health_check))
        .route("/events", post(ingest_event))
        .route("/analytics/{code}", get(get_summary))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

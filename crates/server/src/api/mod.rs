pub mod batch;
pub mod health;
pub mod webhook;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the collector + webhook router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/connections/batch", post(batch::receive_batch))
        .route("/api/v1/connections/health", get(health::collector_health))
        .route("/webhook", post(webhook::receive_webhook))
        .route("/webhook/health", get(webhook::webhook_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

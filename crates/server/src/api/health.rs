use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Collector health payload.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database_connected: bool,
}

/// `GET /api/v1/connections/health` -- liveness plus store status.
#[utoipa::path(
    get,
    path = "/api/v1/connections/health",
    tag = "Collector",
    summary = "Collector health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn collector_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        database_connected: state.database_connected,
    })
}

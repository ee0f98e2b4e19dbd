use std::collections::{HashMap, HashSet};

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use chrono::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use argus_core::{BatchReport, BatchResponse, UserIdentifier};
use argus_detector::MONITOR_THRESHOLD;
use argus_store::{ACTIVE_WINDOW_SECS, NewConnection};

use crate::auth;
use crate::error::ServerError;
use crate::state::AppState;

/// Detection window handed to the scorer after each batch.
const DETECTION_WINDOW_MINUTES: i64 = 60;

/// `POST /api/v1/connections/batch` -- ingest one batch from a node agent.
///
/// The bearer token pins the batch to a single node: a well-formed header
/// that resolves to no node is a 403, as is a body claiming another
/// node's uuid. Per-connection failures never abort the batch; they are
/// counted into `errors`.
#[utoipa::path(
    post,
    path = "/api/v1/connections/batch",
    tag = "Collector",
    summary = "Ingest a connection batch",
    request_body = BatchReport,
    responses(
        (status = 200, description = "Batch processed", body = BatchResponse),
        (status = 401, description = "Missing or malformed Authorization header"),
        (status = 403, description = "Unknown token or node mismatch"),
        (status = 422, description = "Malformed body")
    )
)]
pub async fn receive_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(report): Json<BatchReport>,
) -> Result<Json<BatchResponse>, ServerError> {
    let token = auth::bearer_token(&headers)?;
    let node = auth::node_for_token(state.store.as_ref(), token).await?;

    if report.node_uuid != node.uuid {
        warn!(token_node = %node.uuid, body_node = %report.node_uuid, "node uuid mismatch");
        return Err(ServerError::Forbidden(format!(
            "token does not match node uuid, expected {}",
            node.uuid
        )));
    }

    debug!(node = %node.uuid, connections = report.connections.len(), "batch received");

    let mut processed = 0usize;
    let mut errors = 0usize;
    // Users touched by this batch, with the IPs just reported for each.
    // The sweep must see the batch IPs so fresh sessions survive it.
    let mut affected: HashMap<Uuid, HashSet<String>> = HashMap::new();

    for conn in &report.connections {
        let ident = UserIdentifier::parse(&conn.user_email);
        let user_uuid = match state.store.resolve_user(&ident).await {
            Ok(Some(uuid)) => uuid,
            Ok(None) => {
                warn!(identifier = %ident, "no user resolves, skipping connection");
                errors += 1;
                continue;
            }
            Err(e) => {
                warn!(identifier = %ident, error = %e, "identity lookup failed");
                errors += 1;
                continue;
            }
        };

        let device_info = serde_json::json!({
            "user_email": conn.user_email,
            "bytes_sent": conn.bytes_sent,
            "bytes_received": conn.bytes_received,
        });
        let insert = state
            .store
            .insert_connection(NewConnection {
                user_uuid,
                ip_address: conn.ip_address.clone(),
                node_uuid: conn.node_uuid,
                // Agent log time, never the server clock: microsecond
                // offsets between same-second events must survive.
                connected_at: conn.connected_at,
                device_info,
            })
            .await;

        match insert {
            Ok(id) => {
                debug!(id, user = %user_uuid, ip = %conn.ip_address, "connection recorded");
                processed += 1;
                affected
                    .entry(user_uuid)
                    .or_default()
                    .insert(conn.ip_address.clone());
            }
            Err(e) => {
                warn!(user = %user_uuid, error = %e, "connection insert failed");
                errors += 1;
            }
        }
    }

    if processed > 0 {
        for (user_uuid, fresh_ips) in &affected {
            post_process_user(&state, *user_uuid, fresh_ips).await;
        }
    }

    Ok(Json(BatchResponse {
        status: "ok".to_owned(),
        processed,
        errors,
        node_uuid: node.uuid,
    }))
}

/// Per-user follow-up after inserts: close stale rows, recompute stats,
/// score, and notify. Failures here are logged, never returned; the batch
/// was already accepted.
async fn post_process_user(state: &AppState, user_uuid: Uuid, fresh_ips: &HashSet<String>) {
    // The log has no disconnect events, so this sweep is the only place
    // sessions end. It runs after the inserts above: an IP present in the
    // batch is never closed as stale.
    match state
        .store
        .sweep_stale(user_uuid, fresh_ips, Duration::seconds(ACTIVE_WINDOW_SECS))
        .await
    {
        Ok(0) => {}
        Ok(closed) => debug!(user = %user_uuid, closed, "stale connections closed"),
        Err(e) => warn!(user = %user_uuid, error = %e, "stale sweep failed"),
    }

    match state.monitor.stats(user_uuid, DETECTION_WINDOW_MINUTES).await {
        Ok(stats) => debug!(
            user = %user_uuid,
            active = stats.active_connections_count,
            unique_ips = stats.unique_ips_in_window,
            simultaneous = stats.simultaneous_connections,
            "connection stats"
        ),
        Err(e) => warn!(user = %user_uuid, error = %e, "stats recompute failed"),
    }

    let score = match state
        .detector
        .check_user(user_uuid, DETECTION_WINDOW_MINUTES)
        .await
    {
        Ok(Some(score)) => score,
        Ok(None) => return,
        Err(e) => {
            warn!(user = %user_uuid, error = %e, "violation check failed");
            return;
        }
    };

    debug!(
        user = %user_uuid,
        total = score.total,
        action = score.recommended_action.as_str(),
        "violation check"
    );

    if score.total >= MONITOR_THRESHOLD {
        let user = state.store.user_by_uuid(user_uuid).await.ok().flatten();
        state
            .dispatcher
            .violation(user_uuid, &score, user.as_ref(), false)
            .await;
    }
}

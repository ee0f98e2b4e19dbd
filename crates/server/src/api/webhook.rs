use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use argus_core::ControlEvent;

use crate::error::ServerError;
use crate::state::AppState;

/// Signature header set by the panel.
const SIGNATURE_HEADER: &str = "x-remnawave-signature";

/// Verify `X-Remnawave-Signature`.
///
/// The panel sends either the literal shared secret (legacy) or the hex
/// HMAC-SHA256 of the raw body. Both paths compare in constant time. An
/// unset secret accepts everything, for development, and says so loudly.
fn verify_signature(
    secret: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), ServerError> {
    let Some(secret) = secret else {
        warn!("webhook secret not configured, accepting unsigned request");
        return Ok(());
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Unauthorized("missing signature header".to_owned()))?;

    // Legacy: literal secret in the header.
    if bool::from(signature.as_bytes().ct_eq(secret.as_bytes())) {
        debug!("webhook signature matched the shared secret");
        return Ok(());
    }

    // Current: hex HMAC-SHA256 over the raw body.
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| ServerError::Config(e.to_string()))?;
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        debug!("webhook signature verified via HMAC");
        Ok(())
    } else {
        warn!(
            got_len = signature.len(),
            expected_len = expected.len(),
            "webhook signature mismatch"
        );
        Err(ServerError::Forbidden("invalid signature".to_owned()))
    }
}

/// `POST /webhook` -- control-plane change events.
///
/// Events are mirrored into the store and fanned out to the operator
/// topics. Both steps are best-effort behind the signature gate; the
/// panel only cares that we accepted the event.
#[utoipa::path(
    post,
    path = "/webhook",
    tag = "Webhook",
    summary = "Receive a control-plane event",
    responses(
        (status = 200, description = "Event accepted"),
        (status = 401, description = "Missing signature"),
        (status = 403, description = "Signature mismatch"),
        (status = 422, description = "Malformed event body")
    )
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServerError> {
    verify_signature(state.webhook_secret.as_deref(), &headers, &body)?;

    let event: ControlEvent =
        serde_json::from_slice(&body).map_err(|e| ServerError::Schema(e.to_string()))?;

    debug!(event = %event.event, "webhook event received");

    if let Some(sync) = &state.sync {
        sync.handle_event(&event).await;
    }
    state.dispatcher.lifecycle(&event).await;

    Ok(Json(serde_json::json!({"status": "ok"})))
}

/// `GET /webhook/health` -- listener liveness.
#[utoipa::path(
    get,
    path = "/webhook/health",
    tag = "Webhook",
    summary = "Webhook health",
    responses((status = 200, description = "Listener is up"))
)]
pub async fn webhook_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "service": "webhook"}))
}

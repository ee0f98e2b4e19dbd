//! Agent-token authentication and rotation.

use axum::http::HeaderMap;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use tracing::{info, warn};
use uuid::Uuid;

use argus_core::Node;
use argus_store::LedgerStore;

use crate::error::ServerError;

/// Pull the bearer token out of the `Authorization` header.
///
/// A missing or malformed header is a 401; whether the token matches
/// anything is the caller's 403 to decide.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ServerError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| ServerError::Unauthorized("missing Authorization header".to_owned()))?;
    let value = header
        .to_str()
        .map_err(|_| ServerError::Unauthorized("malformed Authorization header".to_owned()))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServerError::Unauthorized("expected a Bearer token".to_owned()))?
        .trim();
    if token.is_empty() {
        return Err(ServerError::Unauthorized("empty bearer token".to_owned()));
    }
    Ok(token)
}

/// Resolve a bearer token to its node. Unknown tokens are a 403: the
/// header was well-formed, the credential just grants nothing.
pub async fn node_for_token(
    store: &dyn LedgerStore,
    token: &str,
) -> Result<Node, ServerError> {
    match store.node_by_agent_token(token).await? {
        Some(node) => Ok(node),
        None => {
            warn!(
                token_prefix = token.get(..8).unwrap_or(token),
                "unknown agent token"
            );
            Err(ServerError::Forbidden("invalid or expired token".to_owned()))
        }
    }
}

/// Generate a fresh agent token: 32 random bytes, url-safe base64.
#[must_use]
pub fn generate_agent_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Rotate a node's agent token, generating one when none is supplied.
/// Returns the installed token, or `None` for an unknown node.
///
/// This is the administrative provisioning operation; the collector path
/// itself never writes node fields.
pub async fn rotate_agent_token(
    store: &dyn LedgerStore,
    node_uuid: Uuid,
    token: Option<String>,
) -> Result<Option<String>, ServerError> {
    let token = token.unwrap_or_else(generate_agent_token);
    if store.set_agent_token(node_uuid, Some(&token)).await? {
        info!(node = %node_uuid, "agent token rotated");
        Ok(Some(token))
    } else {
        Ok(None)
    }
}

/// Revoke a node's agent token. Returns `false` for an unknown node.
pub async fn revoke_agent_token(
    store: &dyn LedgerStore,
    node_uuid: Uuid,
) -> Result<bool, ServerError> {
    let revoked = store.set_agent_token(node_uuid, None).await?;
    if revoked {
        info!(node = %node_uuid, "agent token revoked");
    }
    Ok(revoked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(bearer_token(&headers_with("Bearer abc123")).unwrap(), "abc123");
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(ServerError::Unauthorized(_))
        ));
        assert!(matches!(
            bearer_token(&headers_with("Basic abc")),
            Err(ServerError::Unauthorized(_))
        ));
        assert!(matches!(
            bearer_token(&headers_with("Bearer   ")),
            Err(ServerError::Unauthorized(_))
        ));
    }

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let a = generate_agent_token();
        let b = generate_agent_token();
        assert_ne!(a, b);
        assert!(a.len() >= 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn rotation_installs_and_revocation_clears_the_token() {
        use argus_store_memory::{MemoryLedgerStore, fixtures};

        let store = MemoryLedgerStore::new();
        let node = fixtures::node("edge-1", None);
        store.upsert_node(&node).await.unwrap();

        let token = rotate_agent_token(&store, node.uuid, None)
            .await
            .unwrap()
            .expect("node exists");
        let resolved = node_for_token(&store, &token).await.unwrap();
        assert_eq!(resolved.uuid, node.uuid);

        assert!(revoke_agent_token(&store, node.uuid).await.unwrap());
        assert!(matches!(
            node_for_token(&store, &token).await,
            Err(ServerError::Forbidden(_))
        ));

        // Unknown nodes rotate to nothing.
        let missing = rotate_agent_token(&store, Uuid::new_v4(), None).await.unwrap();
        assert_eq!(missing, None);
    }
}

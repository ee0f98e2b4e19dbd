//! Read-only REST implementation of the [`ControlPlane`] contract.
//!
//! Only the list and single-entity GETs the mirror needs live here; all
//! administrative mutation stays in the panel's own tooling.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use argus_core::UpstreamError;

use crate::api::ControlPlane;

/// Panel connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlPlaneConfig {
    /// Panel base URL, e.g. `https://panel.example.net`.
    pub api_base_url: String,
    /// Bearer token for the panel API.
    pub api_token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    30
}

pub struct RestControlPlane {
    config: ControlPlaneConfig,
    client: reqwest::Client,
}

impl RestControlPlane {
    /// # Errors
    ///
    /// [`UpstreamError::Network`] when the HTTP client cannot be built.
    pub fn new(config: ControlPlaneConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    async fn get(&self, path: &str) -> Result<serde_json::Value, UpstreamError> {
        let url = format!("{}{path}", self.config.api_base_url.trim_end_matches('/'));
        let mut request = self.client.get(&url);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Network(e.to_string())
            }
        })?;

        match response.status().as_u16() {
            200..=299 => response
                .json()
                .await
                .map_err(|e| UpstreamError::Validation(e.to_string())),
            401 | 403 => Err(UpstreamError::Unauthorized),
            404 => Err(UpstreamError::NotFound),
            429 => Err(UpstreamError::RateLimited),
            s if s >= 500 => Err(UpstreamError::Server(format!("status {s}"))),
            s => Err(UpstreamError::Validation(format!("unexpected status {s}"))),
        }
    }
}

/// Unwrap the panel's `{"response": ...}` envelope into an entity list.
/// List bodies are either a bare array or an object with one well-known
/// array field.
fn entity_list(body: serde_json::Value, field: &str) -> Vec<serde_json::Value> {
    let response = body.get("response").cloned().unwrap_or(body);
    match response {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => map
            .remove(field)
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl ControlPlane for RestControlPlane {
    async fn users_page(
        &self,
        page: u32,
        size: u32,
    ) -> Result<Vec<serde_json::Value>, UpstreamError> {
        let start = page.saturating_sub(1) * size;
        let body = self
            .get(&format!("/api/users?start={start}&size={size}"))
            .await?;
        Ok(entity_list(body, "users"))
    }

    async fn nodes(&self) -> Result<Vec<serde_json::Value>, UpstreamError> {
        Ok(entity_list(self.get("/api/nodes").await?, "nodes"))
    }

    async fn hosts(&self) -> Result<Vec<serde_json::Value>, UpstreamError> {
        Ok(entity_list(self.get("/api/hosts").await?, "hosts"))
    }

    async fn config_profiles(&self) -> Result<Vec<serde_json::Value>, UpstreamError> {
        Ok(entity_list(
            self.get("/api/config-profiles").await?,
            "configProfiles",
        ))
    }

    async fn user(&self, uuid: &str) -> Result<serde_json::Value, UpstreamError> {
        self.get(&format!("/api/users/{uuid}")).await
    }

    async fn node(&self, uuid: &str) -> Result<serde_json::Value, UpstreamError> {
        self.get(&format!("/api/nodes/{uuid}")).await
    }

    async fn host(&self, uuid: &str) -> Result<serde_json::Value, UpstreamError> {
        self.get(&format!("/api/hosts/{uuid}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_list_handles_both_envelope_shapes() {
        let bare = serde_json::json!({"response": [{"uuid": "a"}]});
        assert_eq!(entity_list(bare, "users").len(), 1);

        let wrapped = serde_json::json!({"response": {"users": [{"uuid": "a"}, {"uuid": "b"}], "total": 2}});
        assert_eq!(entity_list(wrapped, "users").len(), 2);

        let empty = serde_json::json!({"response": {"total": 0}});
        assert!(entity_list(empty, "users").is_empty());
    }
}

use async_trait::async_trait;

use argus_core::UpstreamError;

/// Contract of the control-plane REST client (an external collaborator).
///
/// Entities come back as raw JSON payloads; [`crate::map`] turns them into
/// mirror rows. Implementations own authentication, caching, and retries.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// One page of users. Pages start at 1; a short or empty page is the
    /// last one.
    async fn users_page(
        &self,
        page: u32,
        size: u32,
    ) -> Result<Vec<serde_json::Value>, UpstreamError>;

    async fn nodes(&self) -> Result<Vec<serde_json::Value>, UpstreamError>;

    async fn hosts(&self) -> Result<Vec<serde_json::Value>, UpstreamError>;

    async fn config_profiles(&self) -> Result<Vec<serde_json::Value>, UpstreamError>;

    async fn user(&self, uuid: &str) -> Result<serde_json::Value, UpstreamError>;

    async fn node(&self, uuid: &str) -> Result<serde_json::Value, UpstreamError>;

    async fn host(&self, uuid: &str) -> Result<serde_json::Value, UpstreamError>;
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mirrored edge node.
///
/// Everything except `agent_token` is owned by the sync worker. The token is
/// set through the administrative rotation operation and is the sole
/// credential the collector accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub uuid: Uuid,
    pub name: String,
    pub address: String,
    pub port: Option<i32>,
    pub is_disabled: bool,
    pub is_connected: bool,
    pub traffic_limit_bytes: Option<i64>,
    pub traffic_used_bytes: i64,
    pub updated_at: DateTime<Utc>,
    /// Bearer secret for the collector endpoint. Unique across nodes,
    /// `None` until an operator provisions the agent.
    pub agent_token: Option<String>,
    /// Opaque upstream payload.
    pub raw_data: serde_json::Value,
}

/// Mirrored inbound host entry (identity side table, synced as-is).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub uuid: Uuid,
    pub remark: String,
    pub updated_at: DateTime<Utc>,
    pub raw_data: serde_json::Value,
}

/// Mirrored tunnel configuration profile (identity side table, synced as-is).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigProfile {
    pub uuid: Uuid,
    pub name: String,
    pub updated_at: DateTime<Utc>,
    pub raw_data: serde_json::Value,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the latest sync run for one entity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Error,
    InProgress,
}

/// Per-entity-class sync bookkeeping row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Entity class key (`users`, `nodes`, `hosts`, `config_profiles`,
    /// `asn_<country>`).
    pub key: String,
    pub last_sync_at: DateTime<Utc>,
    pub sync_status: SyncStatus,
    pub records_synced: i64,
    pub error_message: Option<String>,
}

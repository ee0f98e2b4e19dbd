use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single accepted connection as observed by a node agent.
///
/// This is the wire unit of `POST /api/v1/connections/batch`. The tunnel
/// access log only exposes accept events, so `disconnected_at` is always
/// `None` when produced by the tailer and byte counters are zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConnectionReport {
    /// Free-form identifier from the log's `email:` field, normalized to
    /// `user_<id>` by the tailer. Resolved against the user mirror by the
    /// collector.
    pub user_email: String,

    /// Client IPv4 address.
    pub ip_address: String,

    /// Node the connection was observed on.
    pub node_uuid: Uuid,

    /// Accept timestamp parsed from the log, treated as UTC. Microseconds
    /// are preserved so same-second events stay distinguishable.
    pub connected_at: DateTime<Utc>,

    /// Always `None` from the tailer; closure is derived server-side.
    #[serde(default)]
    pub disconnected_at: Option<DateTime<Utc>>,

    /// Not exposed by the tunnel log.
    #[serde(default)]
    pub bytes_sent: u64,

    #[serde(default)]
    pub bytes_received: u64,
}

/// One batch submission from a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BatchReport {
    /// Node the batch claims to originate from. Must match the node the
    /// bearer token resolves to.
    pub node_uuid: Uuid,

    /// Submission time on the agent.
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub connections: Vec<ConnectionReport>,
}

impl BatchReport {
    #[must_use]
    pub fn new(node_uuid: Uuid, connections: Vec<ConnectionReport>) -> Self {
        Self {
            node_uuid,
            timestamp: Utc::now(),
            connections,
        }
    }
}

/// Collector response for a processed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BatchResponse {
    pub status: String,
    /// Connections persisted to the ledger.
    pub processed: usize,
    /// Connections skipped (unresolved identity or storage failure).
    pub errors: usize,
    pub node_uuid: Uuid,
}

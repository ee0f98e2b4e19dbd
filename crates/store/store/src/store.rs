use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use argus_core::{
    AsnRecord, ConfigProfile, ConnectionRow, Host, Node, SyncMetadata, SyncStatus, User,
    UserIdentifier,
};

use crate::error::StoreError;

/// Default active-set window in seconds. Open rows older than this are
/// eligible for the stale-closure sweep.
pub const ACTIVE_WINDOW_SECS: i64 = 300;

/// Upper bound on rows examined by one sweep invocation for one user.
pub const SWEEP_SCAN_LIMIT: usize = 1000;

/// A connection about to enter the ledger.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub user_uuid: Uuid,
    pub ip_address: String,
    pub node_uuid: Uuid,
    /// Accept time from the agent log, never the server clock.
    pub connected_at: DateTime<Utc>,
    pub device_info: serde_json::Value,
}

/// Storage authority for the connection ledger and the mirrored
/// control-plane entities.
///
/// The ledger is append-only: rows are inserted open and mutated exactly
/// once, when [`close_connection`](LedgerStore::close_connection) stamps
/// `disconnected_at`. All active-set state flows through these operations.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // -- Users (written by the sync worker only) --------------------------

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Returns `true` if the row existed. Ledger rows for the user are
    /// removed by the backend (cascade semantics).
    async fn delete_user(&self, uuid: Uuid) -> Result<bool, StoreError>;

    async fn user_by_uuid(&self, uuid: Uuid) -> Result<Option<User>, StoreError>;

    async fn user_by_short_uuid(&self, short_uuid: &str) -> Result<Option<User>, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Case-insensitive username lookup.
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn user_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StoreError>;

    async fn user_by_subscription_uuid(
        &self,
        subscription_uuid: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Find a user whose opaque upstream payload carries the given id.
    /// Last-resort strategy for log identifiers that match no mirror column.
    async fn user_uuid_from_raw_data(&self, id: &str) -> Result<Option<Uuid>, StoreError>;

    /// Resolve a report identifier to a user UUID, trying the strategies
    /// in order and never guessing: log ids match `short_uuid`, then the
    /// wire form against `email`, then the raw payload; everything else
    /// matches `email` only.
    async fn resolve_user(&self, ident: &UserIdentifier) -> Result<Option<Uuid>, StoreError> {
        match ident {
            UserIdentifier::LogId(id) => {
                if let Some(user) = self.user_by_short_uuid(id).await? {
                    return Ok(Some(user.uuid));
                }
                if let Some(user) = self.user_by_email(&ident.as_wire()).await? {
                    return Ok(Some(user.uuid));
                }
                self.user_uuid_from_raw_data(id).await
            }
            UserIdentifier::Email(email) => {
                Ok(self.user_by_email(email).await?.map(|u| u.uuid))
            }
        }
    }

    // -- Nodes ------------------------------------------------------------

    async fn upsert_node(&self, node: &Node) -> Result<(), StoreError>;

    async fn delete_node(&self, uuid: Uuid) -> Result<bool, StoreError>;

    async fn node_by_uuid(&self, uuid: Uuid) -> Result<Option<Node>, StoreError>;

    /// Bearer-token lookup for the collector. Tokens are unique.
    async fn node_by_agent_token(&self, token: &str) -> Result<Option<Node>, StoreError>;

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;

    /// Set or revoke a node's agent token. The only node field the
    /// collector side ever writes. Returns `false` for an unknown node.
    async fn set_agent_token(
        &self,
        node_uuid: Uuid,
        token: Option<&str>,
    ) -> Result<bool, StoreError>;

    // -- Hosts / config profiles (mirrors) --------------------------------

    async fn upsert_host(&self, host: &Host) -> Result<(), StoreError>;

    async fn delete_host(&self, uuid: Uuid) -> Result<bool, StoreError>;

    async fn upsert_config_profile(&self, profile: &ConfigProfile) -> Result<(), StoreError>;

    // -- Connection ledger ------------------------------------------------

    /// Append an open row. Returns the ledger id.
    async fn insert_connection(&self, conn: NewConnection) -> Result<i64, StoreError>;

    /// Stamp `disconnected_at = now()` if the row is still open.
    /// Idempotent: returns `false` (and changes nothing) when the row is
    /// already closed or unknown.
    async fn close_connection(&self, id: i64) -> Result<bool, StoreError>;

    /// Open rows for a user, newest first, bounded by `limit`.
    async fn open_connections(
        &self,
        user_uuid: Uuid,
        limit: usize,
    ) -> Result<Vec<ConnectionRow>, StoreError>;

    /// The active set: open rows newer than `now - max_age`, newest first.
    async fn active_connections(
        &self,
        user_uuid: Uuid,
        max_age: Duration,
    ) -> Result<Vec<ConnectionRow>, StoreError>;

    /// Rows with `connected_at > now - window`, newest first, open or not.
    async fn connection_history(
        &self,
        user_uuid: Uuid,
        window: Duration,
    ) -> Result<Vec<ConnectionRow>, StoreError>;

    /// Count of distinct IPs seen for the user inside the window.
    async fn unique_ip_count(&self, user_uuid: Uuid, window: Duration) -> Result<u64, StoreError>;

    /// Close open rows older than `max_age` whose IP was not observed in
    /// the latest batch for this user. This is the only mechanism that
    /// terminates sessions; the tunnel log carries no disconnect events.
    /// Scans at most [`SWEEP_SCAN_LIMIT`] rows. Returns the number closed.
    async fn sweep_stale(
        &self,
        user_uuid: Uuid,
        fresh_ips: &HashSet<String>,
        max_age: Duration,
    ) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut closed = 0u64;
        for row in self.open_connections(user_uuid, SWEEP_SCAN_LIMIT).await? {
            if row.connected_at > now - max_age {
                continue;
            }
            if fresh_ips.contains(&row.ip_address) {
                continue;
            }
            if self.close_connection(row.id).await? {
                closed += 1;
            }
        }
        Ok(closed)
    }

    // -- Sync metadata ----------------------------------------------------

    async fn sync_metadata(&self, key: &str) -> Result<Option<SyncMetadata>, StoreError>;

    /// Upsert the bookkeeping row for one entity class.
    async fn record_sync(
        &self,
        key: &str,
        status: SyncStatus,
        records_synced: i64,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    // -- ASN registry cache -----------------------------------------------

    async fn asn_record(&self, country_code: &str, asn: u32)
    -> Result<Option<AsnRecord>, StoreError>;

    async fn upsert_asn_record(&self, record: &AsnRecord) -> Result<(), StoreError>;
}

//! In-memory [`LedgerStore`] backend.
//!
//! Backs the integration tests and serves as the degraded-mode store when
//! no database is configured. Each table is its own [`DashMap`], so
//! concurrent requests contend per key, not per store; cross-table
//! invariants (cascade and set-null on deletion) are applied eagerly.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use argus_core::{
    AsnRecord, ConfigProfile, ConnectionRow, Host, Node, SyncMetadata, SyncStatus, User,
};
use argus_store::{LedgerStore, NewConnection, StoreError};

/// DashMap-backed store over per-table maps.
#[derive(Default)]
pub struct MemoryLedgerStore {
    users: DashMap<Uuid, User>,
    nodes: DashMap<Uuid, Node>,
    hosts: DashMap<Uuid, Host>,
    config_profiles: DashMap<Uuid, ConfigProfile>,
    connections: DashMap<i64, ConnectionRow>,
    sync_metadata: DashMap<String, SyncMetadata>,
    asn_records: DashMap<(String, u32), AsnRecord>,
    next_connection_id: AtomicI64,
}

impl MemoryLedgerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn find_user<P>(&self, predicate: P) -> Option<User>
    where
        P: Fn(&User) -> bool,
    {
        self.users
            .iter()
            .find(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
    }

    /// Whether another node already holds this token.
    fn token_taken(&self, node_uuid: Uuid, token: &str) -> bool {
        self.nodes.iter().any(|entry| {
            entry.key() != &node_uuid && entry.value().agent_token.as_deref() == Some(token)
        })
    }

    fn user_connections(&self, user_uuid: Uuid) -> Vec<ConnectionRow> {
        self.connections
            .iter()
            .filter(|entry| entry.value().user_uuid == user_uuid)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        self.users.insert(user.uuid, user.clone());
        Ok(())
    }

    async fn delete_user(&self, uuid: Uuid) -> Result<bool, StoreError> {
        let existed = self.users.remove(&uuid).is_some();
        if existed {
            // FK cascade semantics: the ledger follows the user.
            self.connections.retain(|_, c| c.user_uuid != uuid);
        }
        Ok(existed)
    }

    async fn user_by_uuid(&self, uuid: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&uuid).map(|entry| entry.value().clone()))
    }

    async fn user_by_short_uuid(&self, short_uuid: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find_user(|u| u.short_uuid.as_deref() == Some(short_uuid)))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find_user(|u| u.email.as_deref() == Some(email)))
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find_user(|u| {
            u.username
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(username))
        }))
    }

    async fn user_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.find_user(|u| u.telegram_id == Some(telegram_id)))
    }

    async fn user_by_subscription_uuid(
        &self,
        subscription_uuid: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.find_user(|u| u.subscription_uuid.as_deref() == Some(subscription_uuid)))
    }

    async fn user_uuid_from_raw_data(&self, id: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .find_user(|u| match u.raw_data.get("id") {
                Some(serde_json::Value::String(s)) => s == id,
                Some(serde_json::Value::Number(n)) => n.to_string() == id,
                _ => false,
            })
            .map(|u| u.uuid))
    }

    async fn upsert_node(&self, node: &Node) -> Result<(), StoreError> {
        if let Some(ref token) = node.agent_token
            && self.token_taken(node.uuid, token)
        {
            return Err(StoreError::Constraint("agent_token not unique".into()));
        }
        // The sync worker never carries tokens; keep the provisioned one.
        let kept_token = node.agent_token.clone().or_else(|| {
            self.nodes
                .get(&node.uuid)
                .and_then(|existing| existing.value().agent_token.clone())
        });
        let mut node = node.clone();
        node.agent_token = kept_token;
        self.nodes.insert(node.uuid, node);
        Ok(())
    }

    async fn delete_node(&self, uuid: Uuid) -> Result<bool, StoreError> {
        let existed = self.nodes.remove(&uuid).is_some();
        if existed {
            // FK set-null semantics: ledger rows outlive their node.
            for mut entry in self
                .connections
                .iter_mut()
                .filter(|entry| entry.value().node_uuid == Some(uuid))
            {
                entry.value_mut().node_uuid = None;
            }
        }
        Ok(existed)
    }

    async fn node_by_uuid(&self, uuid: Uuid) -> Result<Option<Node>, StoreError> {
        Ok(self.nodes.get(&uuid).map(|entry| entry.value().clone()))
    }

    async fn node_by_agent_token(&self, token: &str) -> Result<Option<Node>, StoreError> {
        Ok(self
            .nodes
            .iter()
            .find(|entry| entry.value().agent_token.as_deref() == Some(token))
            .map(|entry| entry.value().clone()))
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    async fn set_agent_token(
        &self,
        node_uuid: Uuid,
        token: Option<&str>,
    ) -> Result<bool, StoreError> {
        if let Some(t) = token
            && self.token_taken(node_uuid, t)
        {
            return Err(StoreError::Constraint("agent_token not unique".into()));
        }
        match self.nodes.get_mut(&node_uuid) {
            Some(mut node) => {
                node.value_mut().agent_token = token.map(str::to_owned);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_host(&self, host: &Host) -> Result<(), StoreError> {
        self.hosts.insert(host.uuid, host.clone());
        Ok(())
    }

    async fn delete_host(&self, uuid: Uuid) -> Result<bool, StoreError> {
        Ok(self.hosts.remove(&uuid).is_some())
    }

    async fn upsert_config_profile(&self, profile: &ConfigProfile) -> Result<(), StoreError> {
        self.config_profiles.insert(profile.uuid, profile.clone());
        Ok(())
    }

    async fn insert_connection(&self, conn: NewConnection) -> Result<i64, StoreError> {
        if !self.users.contains_key(&conn.user_uuid) {
            return Err(StoreError::Constraint("unknown user_uuid".into()));
        }
        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.connections.insert(
            id,
            ConnectionRow {
                id,
                user_uuid: conn.user_uuid,
                ip_address: conn.ip_address,
                node_uuid: Some(conn.node_uuid),
                connected_at: conn.connected_at,
                disconnected_at: None,
                device_info: conn.device_info,
            },
        );
        Ok(id)
    }

    async fn close_connection(&self, id: i64) -> Result<bool, StoreError> {
        match self.connections.get_mut(&id) {
            Some(mut row) if row.value().disconnected_at.is_none() => {
                row.value_mut().disconnected_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn open_connections(
        &self,
        user_uuid: Uuid,
        limit: usize,
    ) -> Result<Vec<ConnectionRow>, StoreError> {
        let mut rows: Vec<ConnectionRow> = self
            .user_connections(user_uuid)
            .into_iter()
            .filter(|c| c.disconnected_at.is_none())
            .collect();
        rows.sort_by_key(|c| std::cmp::Reverse(c.connected_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn active_connections(
        &self,
        user_uuid: Uuid,
        max_age: Duration,
    ) -> Result<Vec<ConnectionRow>, StoreError> {
        let cutoff = Utc::now() - max_age;
        let mut rows: Vec<ConnectionRow> = self
            .user_connections(user_uuid)
            .into_iter()
            .filter(|c| c.disconnected_at.is_none() && c.connected_at > cutoff)
            .collect();
        rows.sort_by_key(|c| std::cmp::Reverse(c.connected_at));
        Ok(rows)
    }

    async fn connection_history(
        &self,
        user_uuid: Uuid,
        window: Duration,
    ) -> Result<Vec<ConnectionRow>, StoreError> {
        let cutoff = Utc::now() - window;
        let mut rows: Vec<ConnectionRow> = self
            .user_connections(user_uuid)
            .into_iter()
            .filter(|c| c.connected_at > cutoff)
            .collect();
        rows.sort_by_key(|c| std::cmp::Reverse(c.connected_at));
        Ok(rows)
    }

    async fn unique_ip_count(&self, user_uuid: Uuid, window: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - window;
        let ips: std::collections::HashSet<String> = self
            .user_connections(user_uuid)
            .into_iter()
            .filter(|c| c.connected_at > cutoff)
            .map(|c| c.ip_address)
            .collect();
        Ok(ips.len() as u64)
    }

    async fn sync_metadata(&self, key: &str) -> Result<Option<SyncMetadata>, StoreError> {
        Ok(self.sync_metadata.get(key).map(|entry| entry.value().clone()))
    }

    async fn record_sync(
        &self,
        key: &str,
        status: SyncStatus,
        records_synced: i64,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        self.sync_metadata.insert(
            key.to_owned(),
            SyncMetadata {
                key: key.to_owned(),
                last_sync_at: Utc::now(),
                sync_status: status,
                records_synced,
                error_message: error_message.map(str::to_owned),
            },
        );
        Ok(())
    }

    async fn asn_record(
        &self,
        country_code: &str,
        asn: u32,
    ) -> Result<Option<AsnRecord>, StoreError> {
        Ok(self
            .asn_records
            .get(&(country_code.to_owned(), asn))
            .map(|entry| entry.value().clone()))
    }

    async fn upsert_asn_record(&self, record: &AsnRecord) -> Result<(), StoreError> {
        let mut record = record.clone();
        record.last_synced_at = Some(Utc::now());
        self.asn_records
            .insert((record.country_code.clone(), record.asn), record);
        Ok(())
    }
}

/// Test helpers for constructing mirror rows without going through a sync.
pub mod fixtures {
    use super::{DateTime, Utc, Uuid};
    use argus_core::{Node, User, UserStatus};

    /// An active user with the given short uuid and email.
    #[must_use]
    pub fn user(short_uuid: &str, email: &str) -> User {
        User {
            uuid: Uuid::new_v4(),
            short_uuid: Some(short_uuid.to_owned()),
            username: Some(format!("u-{short_uuid}")),
            subscription_uuid: None,
            telegram_id: None,
            email: Some(email.to_owned()),
            status: UserStatus::Active,
            expire_at: None,
            traffic_limit_bytes: None,
            used_traffic_bytes: 0,
            hwid_device_limit: Some(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            raw_data: serde_json::json!({"id": short_uuid}),
        }
    }

    /// A connected node holding the given agent token.
    #[must_use]
    pub fn node(name: &str, agent_token: Option<&str>) -> Node {
        Node {
            uuid: Uuid::new_v4(),
            name: name.to_owned(),
            address: format!("{name}.example.net"),
            port: Some(443),
            is_disabled: false,
            is_connected: true,
            traffic_limit_bytes: None,
            traffic_used_bytes: 0,
            updated_at: Utc::now(),
            agent_token: agent_token.map(str::to_owned),
            raw_data: serde_json::Value::Null,
        }
    }

    /// A fixed timestamp helper for deterministic ledger tests.
    #[must_use]
    pub fn at(secs_ago: i64) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::seconds(secs_ago)
    }
}

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use argus_core::ConnectionRow;
use argus_store::{ACTIVE_WINDOW_SECS, LedgerStore, StoreError};

use crate::analyzers::temporal;

/// Derived per-user connection statistics. Pure reads over the ledger, no
/// caching; the store is the source of truth.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionStats {
    pub active_connections_count: usize,
    pub unique_ips_in_window: u64,
    pub simultaneous_connections: u32,
}

/// Statistics reader over a [`LedgerStore`].
pub struct ConnectionMonitor {
    store: Arc<dyn LedgerStore>,
}

impl ConnectionMonitor {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// The user's active set with the default 5-minute window.
    pub async fn active_connections(
        &self,
        user_uuid: Uuid,
    ) -> Result<Vec<ConnectionRow>, StoreError> {
        self.store
            .active_connections(user_uuid, Duration::seconds(ACTIVE_WINDOW_SECS))
            .await
    }

    pub async fn unique_ips_in_window(
        &self,
        user_uuid: Uuid,
        minutes: i64,
    ) -> Result<u64, StoreError> {
        self.store
            .unique_ip_count(user_uuid, Duration::minutes(minutes))
            .await
    }

    /// Max distinct IPs in any simultaneity group of the active set.
    pub async fn simultaneous_connections(&self, user_uuid: Uuid) -> Result<u32, StoreError> {
        let active = self.active_connections(user_uuid).await?;
        Ok(temporal::simultaneous_count(&active, Utc::now()))
    }

    /// All three derivations in one pass over the active set.
    pub async fn stats(
        &self,
        user_uuid: Uuid,
        window_minutes: i64,
    ) -> Result<ConnectionStats, StoreError> {
        let active = self.active_connections(user_uuid).await?;
        let unique_ips = self
            .store
            .unique_ip_count(user_uuid, Duration::minutes(window_minutes))
            .await?;
        Ok(ConnectionStats {
            active_connections_count: active.len(),
            unique_ips_in_window: unique_ips,
            simultaneous_connections: temporal::simultaneous_count(&active, Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_store_memory::{MemoryLedgerStore, fixtures};
    use argus_store::NewConnection;

    #[tokio::test]
    async fn stats_reflect_the_ledger() {
        let store = Arc::new(MemoryLedgerStore::new());
        let user = fixtures::user("1", "a@example.com");
        let node = fixtures::node("edge", None);
        store.upsert_user(&user).await.unwrap();
        store.upsert_node(&node).await.unwrap();

        for (ip, secs_ago) in [("203.0.113.1", 40i64), ("203.0.113.2", 20), ("203.0.113.1", 10)] {
            store
                .insert_connection(NewConnection {
                    user_uuid: user.uuid,
                    ip_address: ip.to_owned(),
                    node_uuid: node.uuid,
                    connected_at: fixtures::at(secs_ago),
                    device_info: serde_json::Value::Null,
                })
                .await
                .unwrap();
        }

        let monitor = ConnectionMonitor::new(store);
        let stats = monitor.stats(user.uuid, 60).await.unwrap();
        assert_eq!(stats.active_connections_count, 3);
        assert_eq!(stats.unique_ips_in_window, 2);
        assert_eq!(stats.simultaneous_connections, 2);
    }

    #[tokio::test]
    async fn spaced_connections_count_as_sequential() {
        let store = Arc::new(MemoryLedgerStore::new());
        let user = fixtures::user("1", "a@example.com");
        let node = fixtures::node("edge", None);
        store.upsert_user(&user).await.unwrap();
        store.upsert_node(&node).await.unwrap();

        // 6 minutes apart: the older row is not even in the active set.
        for (ip, secs_ago) in [("203.0.113.1", 380i64), ("203.0.113.2", 20)] {
            store
                .insert_connection(NewConnection {
                    user_uuid: user.uuid,
                    ip_address: ip.to_owned(),
                    node_uuid: node.uuid,
                    connected_at: fixtures::at(secs_ago),
                    device_info: serde_json::Value::Null,
                })
                .await
                .unwrap();
        }

        let monitor = ConnectionMonitor::new(store);
        let stats = monitor.stats(user.uuid, 60).await.unwrap();
        assert_eq!(stats.active_connections_count, 1);
        assert_eq!(stats.simultaneous_connections, 1);
    }
}

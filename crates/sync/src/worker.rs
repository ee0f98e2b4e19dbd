use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use argus_core::{ControlEvent, EventFamily, SyncStatus, UpstreamError};
use argus_store::{LedgerStore, StoreError};

use crate::api::ControlPlane;
use crate::map;

/// Users are pulled in pages of this size.
const USERS_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Records mirrored per entity class in one full sync; `-1` marks a class
/// whose sync failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub users: i64,
    pub nodes: i64,
    pub hosts: i64,
    pub config_profiles: i64,
}

/// Mirrors control-plane entities into the ledger store.
///
/// One initial full sync runs all entity classes concurrently; afterwards
/// a periodic loop repeats the pull. Event-driven updates run inline on
/// the incoming event. With no store connection every operation silently
/// becomes a no-op; the collector keeps working with identity misses.
pub struct SyncWorker {
    store: Arc<dyn LedgerStore>,
    /// Pull client. `None` runs event-driven mirroring only.
    api: Option<Arc<dyn ControlPlane>>,
    interval: Duration,
}

impl SyncWorker {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, api: Arc<dyn ControlPlane>, interval: Duration) -> Self {
        Self {
            store,
            api: Some(api),
            interval,
        }
    }

    /// Event-driven mirroring only; no periodic pulls.
    #[must_use]
    pub fn event_only(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            api: None,
            interval: Duration::from_secs(0),
        }
    }

    /// Run the initial sync, then the periodic loop, until dropped.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if self.api.is_none() {
                info!("no control-plane client configured, periodic sync disabled");
                return;
            }
            info!(interval_secs = self.interval.as_secs(), "sync worker starting");
            self.initial_sync().await;
            loop {
                tokio::time::sleep(self.interval).await;
                debug!("periodic sync running");
                self.full_sync().await;
            }
        })
    }

    /// One concurrent pull of every entity class. Per-class failures are
    /// logged and recorded; none aborts the others.
    pub async fn initial_sync(&self) {
        let summary = self.full_sync().await;
        info!(
            users = summary.users,
            nodes = summary.nodes,
            hosts = summary.hosts,
            config_profiles = summary.config_profiles,
            "initial sync completed"
        );
    }

    pub async fn full_sync(&self) -> SyncSummary {
        let (users, nodes, hosts, profiles) = tokio::join!(
            self.sync_users(),
            self.sync_nodes(),
            self.sync_hosts(),
            self.sync_config_profiles(),
        );

        let count = |name: &str, result: Result<i64, SyncError>| match result {
            Ok(n) => n,
            Err(e) => {
                error!(class = name, error = %e, "sync failed");
                -1
            }
        };

        SyncSummary {
            users: count("users", users),
            nodes: count("nodes", nodes),
            hosts: count("hosts", hosts),
            config_profiles: count("config_profiles", profiles),
        }
    }

    /// Paginated user pull. Unmappable payloads are skipped and logged.
    pub async fn sync_users(&self) -> Result<i64, SyncError> {
        let Some(api) = self.api.clone() else {
            return Ok(0);
        };
        self.sync_class("users", || async move {
            let mut synced = 0i64;
            let mut page = 1u32;
            loop {
                let batch = api.users_page(page, USERS_PAGE_SIZE).await?;
                let last_page = batch.len() < USERS_PAGE_SIZE as usize;
                for payload in &batch {
                    match map::user_from_payload(payload) {
                        Some(user) => {
                            self.store.upsert_user(&user).await?;
                            synced += 1;
                        }
                        None => warn!(page, "skipping unmappable user payload"),
                    }
                }
                if last_page {
                    break;
                }
                page += 1;
            }
            Ok(synced)
        })
        .await
    }

    pub async fn sync_nodes(&self) -> Result<i64, SyncError> {
        let Some(api) = self.api.clone() else {
            return Ok(0);
        };
        self.sync_class("nodes", || async move {
            let mut synced = 0i64;
            for payload in api.nodes().await? {
                match map::node_from_payload(&payload) {
                    Some(node) => {
                        self.store.upsert_node(&node).await?;
                        synced += 1;
                    }
                    None => warn!("skipping unmappable node payload"),
                }
            }
            Ok(synced)
        })
        .await
    }

    pub async fn sync_hosts(&self) -> Result<i64, SyncError> {
        let Some(api) = self.api.clone() else {
            return Ok(0);
        };
        self.sync_class("hosts", || async move {
            let mut synced = 0i64;
            for payload in api.hosts().await? {
                match map::host_from_payload(&payload) {
                    Some(host) => {
                        self.store.upsert_host(&host).await?;
                        synced += 1;
                    }
                    None => warn!("skipping unmappable host payload"),
                }
            }
            Ok(synced)
        })
        .await
    }

    pub async fn sync_config_profiles(&self) -> Result<i64, SyncError> {
        let Some(api) = self.api.clone() else {
            return Ok(0);
        };
        self.sync_class("config_profiles", || async move {
            let mut synced = 0i64;
            for payload in api.config_profiles().await? {
                match map::config_profile_from_payload(&payload) {
                    Some(profile) => {
                        self.store.upsert_config_profile(&profile).await?;
                        synced += 1;
                    }
                    None => warn!("skipping unmappable config profile payload"),
                }
            }
            Ok(synced)
        })
        .await
    }

    /// Shared bookkeeping: degraded-mode short circuit, metadata row on
    /// success and on failure.
    async fn sync_class<F, Fut>(&self, key: &str, run: F) -> Result<i64, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, SyncError>>,
    {
        if !self.store_connected().await {
            debug!(class = key, "store not connected, sync skipped");
            return Ok(0);
        }

        match run().await {
            Ok(synced) => {
                self.store
                    .record_sync(key, SyncStatus::Success, synced, None)
                    .await
                    .ok();
                debug!(class = key, synced, "sync class completed");
                Ok(synced)
            }
            Err(e) => {
                self.store
                    .record_sync(key, SyncStatus::Error, 0, Some(&e.to_string()))
                    .await
                    .ok();
                Err(e)
            }
        }
    }

    async fn store_connected(&self) -> bool {
        !matches!(
            self.store.sync_metadata("users").await,
            Err(StoreError::NotConnected)
        )
    }

    /// Apply a control-plane change event to the mirror. Deletions remove
    /// the local row; everything else upserts from the payload.
    pub async fn handle_event(&self, event: &ControlEvent) {
        if !self.store_connected().await {
            debug!(event = %event.event, "store not connected, event sync skipped");
            return;
        }

        let result = match event.family() {
            EventFamily::User => self.apply_user_event(event).await,
            EventFamily::Node => self.apply_node_event(event).await,
            EventFamily::Host => self.apply_host_event(event).await,
            _ => {
                debug!(event = %event.event, "event family not mirrored");
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(event = %event.event, error = %e, "event sync failed");
        }
    }

    async fn apply_user_event(&self, event: &ControlEvent) -> Result<(), SyncError> {
        if event.is_deletion() {
            if let Some(uuid) = event.entity_uuid().and_then(|s| Uuid::parse_str(s).ok()) {
                self.store.delete_user(uuid).await?;
                debug!(%uuid, "user removed by event");
            } else {
                warn!(event = %event.event, "deletion event without a uuid");
            }
            return Ok(());
        }
        match map::user_from_payload(&event.data) {
            Some(user) => self.store.upsert_user(&user).await.map_err(Into::into),
            None => {
                warn!(event = %event.event, "user event payload unmappable");
                Ok(())
            }
        }
    }

    async fn apply_node_event(&self, event: &ControlEvent) -> Result<(), SyncError> {
        if event.is_deletion() {
            if let Some(uuid) = event.entity_uuid().and_then(|s| Uuid::parse_str(s).ok()) {
                self.store.delete_node(uuid).await?;
                debug!(%uuid, "node removed by event");
            } else {
                warn!(event = %event.event, "deletion event without a uuid");
            }
            return Ok(());
        }
        match map::node_from_payload(&event.data) {
            Some(node) => self.store.upsert_node(&node).await.map_err(Into::into),
            None => {
                warn!(event = %event.event, "node event payload unmappable");
                Ok(())
            }
        }
    }

    async fn apply_host_event(&self, event: &ControlEvent) -> Result<(), SyncError> {
        if event.is_deletion() {
            if let Some(uuid) = event.entity_uuid().and_then(|s| Uuid::parse_str(s).ok()) {
                self.store.delete_host(uuid).await?;
            }
            return Ok(());
        }
        match map::host_from_payload(&event.data) {
            Some(host) => self.store.upsert_host(&host).await.map_err(Into::into),
            None => Ok(()),
        }
    }
}

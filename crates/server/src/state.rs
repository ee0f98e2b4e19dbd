use std::sync::Arc;

use argus_detector::{ConnectionMonitor, ViolationDetector};
use argus_notify::Dispatcher;
use argus_store::LedgerStore;
use argus_sync::SyncWorker;

/// Shared per-request state.
///
/// The store is the only authority for active-set state; everything else
/// here is a stateless reader or a best-effort sink.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub monitor: Arc<ConnectionMonitor>,
    pub detector: Arc<ViolationDetector>,
    pub dispatcher: Arc<Dispatcher>,
    /// Event mirror; `None` only in tests that exercise the collector
    /// surface alone.
    pub sync: Option<Arc<SyncWorker>>,
    /// Webhook shared secret.
    pub webhook_secret: Option<String>,
    /// Whether a real database backs the store (surfaced by health).
    pub database_connected: bool,
}

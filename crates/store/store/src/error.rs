use thiserror::Error;

/// Errors surfaced by ledger-store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend is not connected. Callers treat this as degraded mode:
    /// identity lookups miss, sweeps and sync become no-ops.
    #[error("store not connected")]
    NotConnected,

    /// A transient backend failure; the caller may retry.
    #[error("transient database error: {0}")]
    Transient(String),

    /// A row violated a schema constraint. Logged and skipped per row,
    /// never aborts a batch.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the caller may retry the operation as-is.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{ACTIVE_WINDOW_SECS, LedgerStore, NewConnection, SWEEP_SCAN_LIMIT};

//! Node agent: follows the tunnel's access log and ships accepted
//! connections to the collector.
//!
//! The tailer and the reporter are independent tasks; their only shared
//! state is a bounded in-memory queue. Lost batches are acceptable by
//! design, the next tail read re-derives the same active set.

pub mod config;
pub mod error;
pub mod reporter;
pub mod tail;

pub use config::AgentConfig;
pub use error::AgentError;
pub use reporter::BatchReporter;
pub use tail::{RealtimeTailer, SnapshotTailer};

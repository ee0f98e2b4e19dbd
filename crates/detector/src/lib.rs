//! Violation detection.
//!
//! [`ConnectionMonitor`] derives pure statistics over the ledger;
//! [`ViolationDetector`] combines five weighted sub-analyzers into a graded
//! enforcement recommendation. Given identical inputs the scorer is
//! deterministic; enrichment failures degrade sub-scores to zero rather
//! than synthesize data.

pub mod analyzers;
pub mod detector;
pub mod monitor;

pub use detector::{MONITOR_THRESHOLD, ViolationDetector};
pub use monitor::{ConnectionMonitor, ConnectionStats};

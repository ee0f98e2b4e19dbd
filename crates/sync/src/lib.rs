//! Control-plane mirroring.
//!
//! The REST client itself lives outside this system; [`ControlPlane`] is
//! its contract. [`SyncWorker`] keeps the local mirror fresh two ways: a
//! periodic full pull and event-driven upserts fed from the webhook.

pub mod api;
pub mod client;
pub mod map;
pub mod worker;

pub use api::ControlPlane;
pub use client::{ControlPlaneConfig, RestControlPlane};
pub use worker::{SyncError, SyncSummary, SyncWorker};

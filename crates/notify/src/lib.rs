//! Operator notifications.
//!
//! The [`Dispatcher`] renders violations and control-plane lifecycle events
//! and hands them to a [`Messenger`] (the chat front-end's delivery
//! contract). Delivery is best-effort: failures are logged and swallowed,
//! never propagated into the triggering flow.

pub mod dispatcher;
pub mod render;
pub mod throttle;
pub mod topic;

pub use dispatcher::{Dispatcher, Messenger, NotifyError};
pub use throttle::ViolationThrottle;
pub use topic::{NotifyConfig, Topic};

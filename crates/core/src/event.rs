use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity family of a control-plane event, derived from the event name
/// prefix (`user.created`, `node.connection_lost`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFamily {
    User,
    Node,
    Host,
    HwidDevice,
    Service,
    Crm,
    Errors,
    Other,
}

/// A control-plane change event delivered over the webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlEvent {
    /// Dotted event name, e.g. `user.modified`.
    pub event: String,
    /// Entity payload as sent by the panel.
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ControlEvent {
    #[must_use]
    pub fn family(&self) -> EventFamily {
        match self.event.split('.').next().unwrap_or("") {
            "user" => EventFamily::User,
            "node" => EventFamily::Node,
            "host" => EventFamily::Host,
            "user_hwid_devices" => EventFamily::HwidDevice,
            "service" => EventFamily::Service,
            "crm" => EventFamily::Crm,
            "errors" => EventFamily::Errors,
            _ => EventFamily::Other,
        }
    }

    /// The action suffix (`created`, `modified`, `deleted`, ...).
    #[must_use]
    pub fn action(&self) -> &str {
        self.event.split_once('.').map_or("", |(_, rest)| rest)
    }

    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.action() == "deleted"
    }

    /// Entity UUID from the payload, if the panel included one.
    #[must_use]
    pub fn entity_uuid(&self) -> Option<&str> {
        self.data.get("uuid").and_then(serde_json::Value::as_str)
    }
}

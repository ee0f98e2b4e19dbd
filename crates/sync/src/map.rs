//! Payload-to-mirror mapping.
//!
//! Control-plane payloads arrive camelCased and sometimes wrapped in a
//! `response` envelope. Only the columns the mirror indexes are lifted out;
//! everything else stays verbatim in `raw_data`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use argus_core::{ConfigProfile, Host, Node, User, UserStatus};

fn unwrap_envelope(payload: &serde_json::Value) -> &serde_json::Value {
    payload.get("response").unwrap_or(payload)
}

fn str_field(data: &serde_json::Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}

fn i64_field(data: &serde_json::Value, key: &str) -> Option<i64> {
    data.get(key).and_then(serde_json::Value::as_i64)
}

fn bool_field(data: &serde_json::Value, key: &str) -> bool {
    data.get(key)
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

fn time_field(data: &serde_json::Value, key: &str) -> Option<DateTime<Utc>> {
    data.get(key)
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn uuid_field(data: &serde_json::Value, key: &str) -> Option<Uuid> {
    data.get(key)
        .and_then(serde_json::Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Map a user payload. `None` when the uuid is missing or malformed.
#[must_use]
pub fn user_from_payload(payload: &serde_json::Value) -> Option<User> {
    let data = unwrap_envelope(payload);
    let uuid = uuid_field(data, "uuid")?;
    let status = str_field(data, "status")
        .and_then(|s| UserStatus::from_str(&s).ok())
        .unwrap_or(UserStatus::Active);

    Some(User {
        uuid,
        short_uuid: str_field(data, "shortUuid"),
        username: str_field(data, "username"),
        subscription_uuid: str_field(data, "subscriptionUuid"),
        telegram_id: i64_field(data, "telegramId"),
        email: str_field(data, "email"),
        status,
        expire_at: time_field(data, "expireAt"),
        traffic_limit_bytes: i64_field(data, "trafficLimitBytes"),
        used_traffic_bytes: i64_field(data, "usedTrafficBytes").unwrap_or(0),
        hwid_device_limit: i64_field(data, "hwidDeviceLimit")
            .and_then(|n| i32::try_from(n).ok()),
        created_at: time_field(data, "createdAt").unwrap_or_else(Utc::now),
        updated_at: time_field(data, "updatedAt").unwrap_or_else(Utc::now),
        raw_data: data.clone(),
    })
}

/// Map a node payload. Agent tokens never arrive from upstream; the store
/// preserves locally provisioned ones on upsert.
#[must_use]
pub fn node_from_payload(payload: &serde_json::Value) -> Option<Node> {
    let data = unwrap_envelope(payload);
    let uuid = uuid_field(data, "uuid")?;

    Some(Node {
        uuid,
        name: str_field(data, "name").unwrap_or_else(|| uuid.to_string()),
        address: str_field(data, "address").unwrap_or_default(),
        port: i64_field(data, "port").and_then(|n| i32::try_from(n).ok()),
        is_disabled: bool_field(data, "isDisabled"),
        is_connected: bool_field(data, "isConnected"),
        traffic_limit_bytes: i64_field(data, "trafficLimitBytes"),
        traffic_used_bytes: i64_field(data, "trafficUsedBytes").unwrap_or(0),
        updated_at: time_field(data, "updatedAt").unwrap_or_else(Utc::now),
        agent_token: None,
        raw_data: data.clone(),
    })
}

#[must_use]
pub fn host_from_payload(payload: &serde_json::Value) -> Option<Host> {
    let data = unwrap_envelope(payload);
    let uuid = uuid_field(data, "uuid")?;
    Some(Host {
        uuid,
        remark: str_field(data, "remark").unwrap_or_else(|| uuid.to_string()),
        updated_at: time_field(data, "updatedAt").unwrap_or_else(Utc::now),
        raw_data: data.clone(),
    })
}

#[must_use]
pub fn config_profile_from_payload(payload: &serde_json::Value) -> Option<ConfigProfile> {
    let data = unwrap_envelope(payload);
    let uuid = uuid_field(data, "uuid")?;
    Some(ConfigProfile {
        uuid,
        name: str_field(data, "name").unwrap_or_else(|| uuid.to_string()),
        updated_at: time_field(data, "updatedAt").unwrap_or_else(Utc::now),
        raw_data: data.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_maps_from_enveloped_payload() {
        let payload = serde_json::json!({"response": {
            "uuid": "8d8f7a2e-63b1-4f3a-9f31-6f56d5f0a001",
            "shortUuid": "154",
            "username": "Alice",
            "status": "LIMITED",
            "telegramId": 42,
            "expireAt": "2026-06-01T00:00:00Z",
            "hwidDeviceLimit": 3
        }});
        let user = user_from_payload(&payload).unwrap();
        assert_eq!(user.short_uuid.as_deref(), Some("154"));
        assert_eq!(user.status, UserStatus::Limited);
        assert_eq!(user.hwid_device_limit, Some(3));
        assert_eq!(user.raw_data["username"], "Alice");
    }

    #[test]
    fn unknown_status_defaults_to_active() {
        let payload = serde_json::json!({
            "uuid": "8d8f7a2e-63b1-4f3a-9f31-6f56d5f0a001",
            "status": "SOMETHING_NEW"
        });
        assert_eq!(user_from_payload(&payload).unwrap().status, UserStatus::Active);
    }

    #[test]
    fn missing_uuid_maps_to_none() {
        assert!(user_from_payload(&serde_json::json!({"username": "x"})).is_none());
        assert!(node_from_payload(&serde_json::json!({"name": "x"})).is_none());
    }

    #[test]
    fn node_payload_never_carries_a_token() {
        let payload = serde_json::json!({
            "uuid": "8d8f7a2e-63b1-4f3a-9f31-6f56d5f0a002",
            "name": "edge-1",
            "address": "edge-1.example.net",
            "isConnected": true
        });
        let node = node_from_payload(&payload).unwrap();
        assert_eq!(node.agent_token, None);
        assert!(node.is_connected);
    }
}

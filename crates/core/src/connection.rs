use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of the append-only connection ledger.
///
/// Rows are written once and mutated exactly once: the `disconnected_at`
/// transition from `NULL` to a timestamp. A row with `disconnected_at`
/// unset and `connected_at` within the active window is an open session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRow {
    pub id: i64,
    pub user_uuid: Uuid,
    pub ip_address: String,
    /// `None` after the owning node was deleted (FK set-null semantics).
    pub node_uuid: Option<Uuid>,
    pub connected_at: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
    /// Opaque agent-supplied context (original identifier, byte counters).
    pub device_info: serde_json::Value,
}

impl ConnectionRow {
    /// Whether the row is open and younger than `max_age` relative to `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.disconnected_at.is_none() && self.connected_at > now - max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(connected_at: DateTime<Utc>, disconnected_at: Option<DateTime<Utc>>) -> ConnectionRow {
        ConnectionRow {
            id: 1,
            user_uuid: Uuid::new_v4(),
            ip_address: "203.0.113.9".to_owned(),
            node_uuid: None,
            connected_at,
            disconnected_at,
            device_info: serde_json::Value::Null,
        }
    }

    #[test]
    fn open_recent_row_is_active() {
        let now = Utc::now();
        assert!(row(now - Duration::minutes(2), None).is_active(now, Duration::minutes(5)));
    }

    #[test]
    fn stale_or_closed_rows_are_not_active() {
        let now = Utc::now();
        assert!(!row(now - Duration::minutes(6), None).is_active(now, Duration::minutes(5)));
        assert!(!row(now - Duration::minutes(1), Some(now)).is_active(now, Duration::minutes(5)));
    }
}

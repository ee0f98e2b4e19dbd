use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription state as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    Active,
    Disabled,
    Limited,
    Expired,
}

impl UserStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Disabled => "DISABLED",
            Self::Limited => "LIMITED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "DISABLED" => Ok(Self::Disabled),
            "LIMITED" => Ok(Self::Limited),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(format!("unknown user status: {other}")),
        }
    }
}

/// Mirrored subscriber record.
///
/// Created and updated only by the sync worker from control-plane events or
/// the periodic pull; telemetry never mutates users. `raw_data` keeps the
/// upstream payload verbatim for lookups the mirror columns don't cover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub uuid: Uuid,
    pub short_uuid: Option<String>,
    pub username: Option<String>,
    pub subscription_uuid: Option<String>,
    pub telegram_id: Option<i64>,
    pub email: Option<String>,
    pub status: UserStatus,
    pub expire_at: Option<DateTime<Utc>>,
    pub traffic_limit_bytes: Option<i64>,
    pub used_traffic_bytes: i64,
    /// Permitted device count from the subscription plan.
    pub hwid_device_limit: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Opaque upstream payload.
    pub raw_data: serde_json::Value,
}

impl User {
    /// Device allowance used by the temporal analyzer; never below 1.
    #[must_use]
    pub fn device_count(&self) -> u32 {
        self.hwid_device_limit
            .and_then(|n| u32::try_from(n).ok())
            .map_or(1, |n| n.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_limit(limit: Option<i32>) -> User {
        User {
            uuid: Uuid::new_v4(),
            short_uuid: None,
            username: None,
            subscription_uuid: None,
            telegram_id: None,
            email: None,
            status: UserStatus::Active,
            expire_at: None,
            traffic_limit_bytes: None,
            used_traffic_bytes: 0,
            hwid_device_limit: limit,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            raw_data: serde_json::Value::Null,
        }
    }

    #[test]
    fn device_count_floors_at_one() {
        assert_eq!(user_with_limit(None).device_count(), 1);
        assert_eq!(user_with_limit(Some(0)).device_count(), 1);
        assert_eq!(user_with_limit(Some(-3)).device_count(), 1);
        assert_eq!(user_with_limit(Some(4)).device_count(), 4);
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&UserStatus::Active).unwrap(),
            r#""ACTIVE""#
        );
        let back: UserStatus = serde_json::from_str(r#""LIMITED""#).unwrap();
        assert_eq!(back, UserStatus::Limited);
    }
}

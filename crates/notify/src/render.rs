//! Message rendering for operator chats.
//!
//! Output is the chat front-end's HTML subset (`<b>`, `<code>`), with all
//! payload-derived text escaped.

use uuid::Uuid;

use argus_core::{ControlEvent, EventFamily, User, ViolationAction, ViolationScore};

/// Escape payload text for the HTML subset.
#[must_use]
pub fn esc(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn severity(total: f64) -> (&'static str, &'static str) {
    if total >= 95.0 {
        ("\u{1f6a8}", "critical")
    } else if total >= 90.0 {
        ("\u{1f534}", "high")
    } else if total >= 80.0 {
        ("\u{1f7e0}", "elevated")
    } else if total >= 65.0 {
        ("\u{1f7e1}", "low")
    } else {
        ("\u{1f535}", "monitoring")
    }
}

fn action_label(action: ViolationAction) -> &'static str {
    match action {
        ViolationAction::NoAction => "no action",
        ViolationAction::Monitor => "monitor",
        ViolationAction::Warn => "warn the user",
        ViolationAction::SoftBlock => "soft block (rate limit)",
        ViolationAction::TempBlock => "temporary block",
        ViolationAction::HardBlock => "block",
    }
}

/// Render a violation verdict.
#[must_use]
pub fn render_violation(user_uuid: Uuid, score: &ViolationScore, user: Option<&User>) -> String {
    let (emoji, level) = severity(score.total);
    let mut lines = Vec::new();

    lines.push(format!("{emoji} <b>Violation detected</b>"));
    lines.push(String::new());

    lines.push("\u{1f464} <b>User</b>".to_owned());
    if let Some(user) = user {
        if let Some(username) = &user.username {
            lines.push(format!("   Username: <code>{}</code>", esc(username)));
        }
        if let Some(short) = &user.short_uuid {
            lines.push(format!("   Short UUID: <code>{}</code>", esc(short)));
        }
    }
    let uuid_str = user_uuid.to_string();
    lines.push(format!("   UUID: <code>{}...</code>", &uuid_str[..8]));
    lines.push(String::new());

    lines.push("\u{26a0} <b>Details</b>".to_owned());
    lines.push(format!("   Severity: <b>{level}</b>"));
    lines.push(format!("   Score: <code>{:.1}/100</code>", score.total));
    lines.push(format!(
        "   Confidence: <code>{:.0}%</code>",
        score.confidence * 100.0
    ));
    lines.push(format!(
        "   Recommended action: <b>{}</b>",
        action_label(score.recommended_action)
    ));

    if !score.reasons.is_empty() {
        lines.push(String::new());
        lines.push("\u{1f4cb} <b>Reasons</b>".to_owned());
        for (i, reason) in score.reasons.iter().take(10).enumerate() {
            lines.push(format!("   {}. {}", i + 1, esc(reason)));
        }
        if score.reasons.len() > 10 {
            lines.push(format!("   ... and {} more", score.reasons.len() - 10));
        }
    }

    let factors = [
        ("temporal pattern", score.breakdown.temporal.score),
        ("geography", score.breakdown.geo.score),
        ("provider class", score.breakdown.asn.score),
        ("profile deviation", score.breakdown.profile.score),
        ("device fingerprints", score.breakdown.device.score),
    ];
    if factors.iter().any(|(_, s)| *s > 0.0) {
        lines.push(String::new());
        lines.push("\u{1f4ca} <b>Factors</b>".to_owned());
        for (name, sub_score) in factors {
            if sub_score > 0.0 {
                lines.push(format!("   {name}: <code>{sub_score:.1}</code>"));
            }
        }
    }

    lines.join("\n")
}

fn user_event_title(action: &str) -> String {
    let title = match action {
        "created" => "\u{2705} <b>User created</b>",
        "modified" => "\u{270f} <b>User modified</b>",
        "deleted" => "\u{1f5d1} <b>User deleted</b>",
        "expired" => "\u{23f1} <b>Subscription expired</b>",
        "expires_in_72h" => "\u{23f0} <b>Subscription expires in 72 hours</b>",
        "expires_in_48h" => "\u{23f0} <b>Subscription expires in 48 hours</b>",
        "expires_in_24h" => "\u{23f0} <b>Subscription expires in 24 hours</b>",
        "expired_24h_ago" => "\u{23f1} <b>Subscription expired 24 hours ago</b>",
        "revoked" => "\u{1f6ab} <b>Subscription revoked</b>",
        "disabled" => "\u{274c} <b>User disabled</b>",
        "enabled" => "\u{2705} <b>User enabled</b>",
        "limited" => "\u{26a0} <b>Traffic limit reached</b>",
        "traffic_reset" => "\u{1f504} <b>Traffic reset</b>",
        "first_connected" => "\u{1f7e2} <b>First connection</b>",
        "bandwidth_threshold" => "\u{1f4ca} <b>Bandwidth threshold reached</b>",
        "not_connected" => "\u{1f534} <b>User never connected</b>",
        _ => "\u{270f} <b>User modified</b>",
    };
    title.to_owned()
}

fn node_event_title(action: &str) -> String {
    let title = match action {
        "created" => "\u{2705} <b>Node created</b>",
        "modified" => "\u{270f} <b>Node modified</b>",
        "deleted" => "\u{1f5d1} <b>Node deleted</b>",
        "connection_lost" => "\u{1f534} <b>Node connection lost</b>",
        "connection_restored" => "\u{1f7e2} <b>Node connection restored</b>",
        "traffic_notify" => "\u{1f4ca} <b>Node traffic threshold</b>",
        _ => "\u{270f} <b>Node modified</b>",
    };
    title.to_owned()
}

fn generic_title(family: EventFamily, event: &str) -> String {
    let label = match family {
        EventFamily::HwidDevice => "Device event",
        EventFamily::Crm => "CRM event",
        EventFamily::Errors => "Panel error",
        _ => "Service event",
    };
    format!("\u{2139} <b>{label}</b>: <code>{}</code>", esc(event))
}

/// Scalar payload fields worth echoing to an operator, in display order.
const SUMMARY_FIELDS: &[(&str, &str)] = &[
    ("username", "Username"),
    ("shortUuid", "Short UUID"),
    ("name", "Name"),
    ("address", "Address"),
    ("email", "Email"),
    ("status", "Status"),
    ("expireAt", "Expires"),
    ("uuid", "UUID"),
];

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Field-by-field diff of the payload against its `old_state`, if the
/// upsert provided one.
fn diff_lines(data: &serde_json::Value) -> Vec<String> {
    let Some(old) = data.get("old_state").and_then(serde_json::Value::as_object) else {
        return Vec::new();
    };
    let Some(new) = data.as_object() else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    for (key, old_value) in old {
        if key == "old_state" {
            continue;
        }
        let new_value = new.get(key).unwrap_or(&serde_json::Value::Null);
        if new_value == old_value {
            continue;
        }
        let (Some(old_s), Some(new_s)) =
            (scalar_to_string(old_value), scalar_to_string(new_value))
        else {
            continue;
        };
        lines.push(format!(
            "   {}: <code>{}</code> \u{2192} <code>{}</code>",
            esc(key),
            esc(&old_s),
            esc(&new_s)
        ));
    }
    lines
}

/// Render a control-plane lifecycle event.
#[must_use]
pub fn render_lifecycle(event: &ControlEvent) -> String {
    let mut lines = Vec::new();
    let title = match event.family() {
        EventFamily::User => user_event_title(event.action()),
        EventFamily::Node => node_event_title(event.action()),
        family => generic_title(family, &event.event),
    };
    lines.push(title);
    lines.push(String::new());

    for (key, label) in SUMMARY_FIELDS {
        if let Some(value) = event.data.get(*key).and_then(scalar_to_string) {
            lines.push(format!("   {label}: <code>{}</code>", esc(&value)));
        }
    }

    let changes = diff_lines(&event.data);
    if !changes.is_empty() {
        lines.push(String::new());
        lines.push("\u{1f4dd} <b>Changes</b>".to_owned());
        lines.extend(changes);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::ScoreBreakdown;

    fn score(total: f64) -> ViolationScore {
        ViolationScore {
            total,
            breakdown: ScoreBreakdown::default(),
            recommended_action: ViolationAction::for_total(total),
            confidence: total / 100.0,
            reasons: vec!["simultaneous connections from 5 distinct IPs".to_owned()],
        }
    }

    #[test]
    fn violation_message_carries_score_and_action() {
        let text = render_violation(Uuid::new_v4(), &score(92.0), None);
        assert!(text.contains("92.0/100"));
        assert!(text.contains("<b>block</b>"));
        assert!(text.contains("simultaneous connections"));
    }

    #[test]
    fn payload_text_is_escaped() {
        let mut s = score(50.0);
        s.reasons = vec!["<script>alert(1)</script>".to_owned()];
        let text = render_violation(Uuid::new_v4(), &s, None);
        assert!(!text.contains("<script>"));
        assert!(text.contains("&lt;script&gt;"));
    }

    #[test]
    fn lifecycle_diff_renders_changed_fields_only() {
        let event = ControlEvent {
            event: "user.modified".to_owned(),
            data: serde_json::json!({
                "uuid": "abc",
                "username": "alice",
                "status": "DISABLED",
                "old_state": {"username": "alice", "status": "ACTIVE"}
            }),
            timestamp: None,
        };
        let text = render_lifecycle(&event);
        assert!(text.contains("User modified"));
        assert!(text.contains("ACTIVE"));
        assert!(text.contains("DISABLED"));
        // Unchanged field not diffed.
        assert!(!text.contains("alice</code> \u{2192}"));
    }

    #[test]
    fn unknown_user_action_falls_back_to_modified() {
        let event = ControlEvent {
            event: "user.something_new".to_owned(),
            data: serde_json::json!({"uuid": "abc"}),
            timestamp: None,
        };
        assert!(render_lifecycle(&event).contains("User modified"));
    }
}

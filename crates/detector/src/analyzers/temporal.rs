//! Temporal pattern analysis.
//!
//! Detects genuinely simultaneous sessions and suspicious rapid IP
//! switching while tolerating the patterns a single well-behaved client
//! produces: network handoffs (Wi-Fi to cellular), app-level reroutes that
//! reconnect after minutes of silence, and log-timestamp aliasing.

use chrono::{DateTime, Duration, Utc};

use argus_core::{ConnectionRow, TemporalScore};

/// Connections within this window of a group's earliest member count as
/// simultaneous.
const SIMULTANEOUS_WINDOW_SECS: i64 = 120;

/// A gap at or above this starts a new group: the client rerouted, it did
/// not hold two sessions.
const RECONNECT_THRESHOLD_SECS: i64 = 300;

/// Active rows older than this are ignored outright.
const MAX_CONNECTION_AGE_HOURS: i64 = 24;

/// Gaps below this are log-timestamp aliasing of a single event.
const ALIAS_EPSILON_MS: i64 = 100;

/// Rapid-switch gap bounds.
const RAPID_SWITCH_MAX_SECS: i64 = 30;
const RAPID_SWITCH_FAST_SECS: i64 = 10;

/// Compute the maximum distinct-IP count over simultaneity groups of the
/// given `(time, ip)` pairs. Pairs must be sorted ascending by time.
///
/// Returns 1 when connections exist but none overlap, 0 for empty input.
fn max_simultaneous_ips(pairs: &[(DateTime<Utc>, &str)]) -> u32 {
    if pairs.is_empty() {
        return 0;
    }

    let mut best = 0u32;
    let mut group: Vec<(DateTime<Utc>, &str)> = vec![pairs[0]];

    let mut flush = |group: &mut Vec<(DateTime<Utc>, &str)>| {
        if group.len() > 1 {
            let unique: std::collections::HashSet<&str> =
                group.iter().map(|(_, ip)| *ip).collect();
            best = best.max(u32::try_from(unique.len()).unwrap_or(u32::MAX));
        }
        group.clear();
    };

    for &(t, ip) in &pairs[1..] {
        let gap = t - group.last().expect("group never empty").0;
        let from_earliest = t - group[0].0;

        if gap >= Duration::seconds(RECONNECT_THRESHOLD_SECS) {
            flush(&mut group);
            group.push((t, ip));
            continue;
        }

        let joins = from_earliest <= Duration::seconds(SIMULTANEOUS_WINDOW_SECS)
            && gap <= Duration::seconds(SIMULTANEOUS_WINDOW_SECS)
            && gap >= Duration::milliseconds(ALIAS_EPSILON_MS);
        if joins {
            group.push((t, ip));
        } else {
            flush(&mut group);
            group.push((t, ip));
        }
    }
    flush(&mut group);

    best.max(1)
}

/// Max distinct IPs across simultaneity groups of the rows, ignoring rows
/// older than a day. This is the C5 `simultaneous_connections` derivation.
#[must_use]
pub fn simultaneous_count(rows: &[ConnectionRow], now: DateTime<Utc>) -> u32 {
    let mut valid: Vec<(DateTime<Utc>, &str)> = rows
        .iter()
        .filter(|c| now - c.connected_at <= Duration::hours(MAX_CONNECTION_AGE_HOURS))
        .map(|c| (c.connected_at, c.ip_address.as_str()))
        .collect();
    valid.sort_by_key(|(t, _)| *t);
    max_simultaneous_ips(&valid)
}

/// Analyze the active set and recent history.
///
/// `device_count` is the user's permitted device allowance; up to
/// `device_count + 1` overlapping IPs are tolerated as legitimate
/// multi-device use plus one network handoff in flight.
#[must_use]
pub fn analyze(
    active: &[ConnectionRow],
    history: &[ConnectionRow],
    device_count: u32,
    now: DateTime<Utc>,
) -> TemporalScore {
    let mut score = 0.0f64;
    let mut reasons = Vec::new();

    let simultaneous_count = simultaneous_count(active, now);

    if simultaneous_count > device_count + 1 {
        if simultaneous_count > 3 {
            score = 100.0;
            reasons.push(format!(
                "simultaneous connections from {simultaneous_count} distinct IPs \
                 (>3, device limit {device_count})"
            ));
        } else {
            score = 80.0;
            reasons.push(format!(
                "simultaneous connections from {simultaneous_count} distinct IPs \
                 (device limit {device_count})"
            ));
        }
    }

    // Rapid-switch penalty over the history. A fast IP change only counts
    // when the old session was left open, its IP is still live right now,
    // and the grouping above found independent overlap.
    let mut rapid_switches = 0u32;
    if history.len() > 1 && simultaneous_count > 1 {
        let mut sorted: Vec<&ConnectionRow> = history.iter().collect();
        sorted.sort_by_key(|c| c.connected_at);

        for pair in sorted.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            if prev.ip_address == curr.ip_address {
                continue;
            }
            let gap = curr.connected_at - prev.connected_at;
            if gap < Duration::milliseconds(ALIAS_EPSILON_MS)
                || gap >= Duration::seconds(RAPID_SWITCH_MAX_SECS)
            {
                continue;
            }

            // (a) the previous session closed before the new one opened:
            // a normal handoff, not an overlap.
            let normal_handoff = prev
                .disconnected_at
                .is_some_and(|d| d <= curr.connected_at);
            if normal_handoff {
                continue;
            }

            // A switch observed long ago proves nothing about now.
            if now - curr.connected_at > Duration::minutes(5) {
                continue;
            }

            // (b) the old IP must still be live in the current active set.
            let old_ip_live = active.iter().any(|c| {
                c.ip_address == prev.ip_address && now - c.connected_at <= Duration::minutes(5)
            });
            if !old_ip_live {
                continue;
            }

            rapid_switches += 1;
            if rapid_switches == 1 && gap < Duration::seconds(RAPID_SWITCH_FAST_SECS) {
                score += 3.0;
                reasons.push(format!(
                    "rapid IP switch {} -> {} in {:.1}s with the old session live",
                    prev.ip_address,
                    curr.ip_address,
                    gap.num_milliseconds() as f64 / 1000.0
                ));
            } else if rapid_switches >= 3 {
                // Stacks per pair from the third onward; the clamp below
                // bounds the pile-up.
                score += 10.0;
                reasons.push(format!(
                    "repeated rapid IP switching ({rapid_switches} pairs) with overlapping sessions"
                ));
            }
        }
    }

    TemporalScore {
        score: score.min(100.0),
        reasons,
        simultaneous_count,
        rapid_switches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use uuid::Uuid;

    fn row(id: i64, ip: &str, connected_secs_ago: i64, now: DateTime<Utc>) -> ConnectionRow {
        ConnectionRow {
            id,
            user_uuid: Uuid::nil(),
            ip_address: ip.to_owned(),
            node_uuid: None,
            connected_at: now - Duration::seconds(connected_secs_ago),
            disconnected_at: None,
            device_info: Value::Null,
        }
    }

    #[test]
    fn lone_connection_counts_as_one() {
        let now = Utc::now();
        let active = vec![row(1, "203.0.113.1", 30, now)];
        let result = analyze(&active, &[], 1, now);
        assert_eq!(result.simultaneous_count, 1);
        assert!((result.score - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn five_ips_ten_seconds_apart_hit_the_top_branch() {
        let now = Utc::now();
        let active: Vec<ConnectionRow> = (0..5)
            .map(|i| row(i, &format!("203.0.113.{i}"), 100 - i * 10, now))
            .collect();
        let result = analyze(&active, &[], 1, now);
        assert_eq!(result.simultaneous_count, 5);
        assert!((result.score - 100.0).abs() < f64::EPSILON);
        assert!(result.reasons[0].contains(">3"));
    }

    #[test]
    fn widely_spaced_connections_never_group() {
        // Pairwise gaps of five minutes and more: sequential rerouting.
        let now = Utc::now();
        let active: Vec<ConnectionRow> = (0..4)
            .map(|i| row(i, &format!("203.0.113.{i}"), i * 400, now))
            .collect();
        let result = analyze(&active, &[], 1, now);
        assert_eq!(result.simultaneous_count, 1);
        assert!((result.score - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn device_allowance_tolerates_overlap() {
        let now = Utc::now();
        let active = vec![
            row(1, "203.0.113.1", 60, now),
            row(2, "203.0.113.2", 30, now),
        ];
        // Two overlapping IPs, allowance for one device + one handoff.
        let one_device = analyze(&active, &[], 1, now);
        assert_eq!(one_device.simultaneous_count, 2);
        assert!((one_device.score - 0.0).abs() < f64::EPSILON);

        // Three overlapping IPs exceed the allowance.
        let three = vec![
            row(1, "203.0.113.1", 60, now),
            row(2, "203.0.113.2", 40, now),
            row(3, "203.0.113.3", 20, now),
        ];
        let result = analyze(&three, &[], 1, now);
        assert!((result.score - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sub_aliasing_gaps_do_not_join_groups() {
        let now = Utc::now();
        let base = now - Duration::seconds(60);
        let mut a = row(1, "203.0.113.1", 0, now);
        a.connected_at = base;
        let mut b = row(2, "203.0.113.2", 0, now);
        b.connected_at = base + Duration::milliseconds(50);
        let result = analyze(&[a, b], &[], 1, now);
        assert_eq!(result.simultaneous_count, 1);
    }

    #[test]
    fn rapid_switch_needs_live_old_session_and_overlap() {
        let now = Utc::now();
        // Active set shows both IPs overlapping right now.
        let active = vec![
            row(10, "203.0.113.1", 70, now),
            row(11, "203.0.113.2", 65, now),
            row(12, "203.0.113.3", 60, now),
        ];
        // History shows a 5-second switch between distinct IPs, old one open.
        let history = vec![row(1, "203.0.113.1", 70, now), row(2, "203.0.113.2", 65, now)];
        let result = analyze(&active, &history, 1, now);
        assert_eq!(result.rapid_switches, 1);
        // 80 from the overlap branch plus 3 for the fast switch.
        assert!((result.score - 83.0).abs() < f64::EPSILON);
    }

    #[test]
    fn closed_handoff_is_not_a_rapid_switch() {
        let now = Utc::now();
        let active = vec![
            row(10, "203.0.113.2", 65, now),
            row(11, "203.0.113.3", 55, now),
            row(12, "203.0.113.4", 50, now),
        ];
        let mut prev = row(1, "203.0.113.1", 70, now);
        prev.disconnected_at = Some(now - Duration::seconds(68));
        let history = vec![prev, row(2, "203.0.113.2", 65, now)];
        let result = analyze(&active, &history, 1, now);
        assert_eq!(result.rapid_switches, 0);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let now = Utc::now();
        let active: Vec<ConnectionRow> = (0..4)
            .map(|i| row(i, &format!("203.0.113.{i}"), 90 - i * 15, now))
            .collect();
        let a = analyze(&active, &[], 1, now);
        let b = analyze(&active, &[], 1, now);
        assert!((a.score - b.score).abs() < f64::EPSILON);
        assert_eq!(a.simultaneous_count, b.simultaneous_count);
        assert_eq!(a.reasons, b.reasons);
    }
}

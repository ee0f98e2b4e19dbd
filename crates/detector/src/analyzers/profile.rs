//! Baseline-deviation analysis.
//!
//! Builds a rolling per-user baseline out of the history window (distinct
//! IPs per day, typical hours, typical countries) and scores the current
//! day's distinct-IP count as a z-score against it, mapped so three
//! standard deviations reach 100. The mapping is a policy knob kept in
//! [`score_deviation`]; the other baseline dimensions are carried for
//! operators but not scored yet.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Utc};

use argus_core::{ConnectionRow, ProfileScore};

/// Baselines need at least this many full days to mean anything.
const MIN_BASELINE_DAYS: usize = 2;

/// Map a z-score onto `[0, 100]`, 3 sigma = 100. Policy knob.
fn score_deviation(z: f64) -> f64 {
    (z / 3.0 * 100.0).clamp(0.0, 100.0)
}

fn day_key(t: DateTime<Utc>) -> (i32, u32) {
    (t.year(), t.ordinal())
}

/// Analyze the history window against the user's own habits.
#[must_use]
pub fn analyze(history: &[ConnectionRow], now: DateTime<Utc>) -> ProfileScore {
    // Distinct IPs per calendar day.
    let mut per_day: HashMap<(i32, u32), HashSet<&str>> = HashMap::new();
    for row in history {
        per_day
            .entry(day_key(row.connected_at))
            .or_default()
            .insert(row.ip_address.as_str());
    }

    let today = day_key(now);
    let current = per_day.get(&today).map_or(0, HashSet::len);

    let baseline: Vec<usize> = per_day
        .iter()
        .filter(|(day, _)| **day != today)
        .map(|(_, ips)| ips.len())
        .collect();

    if baseline.len() < MIN_BASELINE_DAYS {
        // Not enough habit to deviate from.
        return ProfileScore::default();
    }

    let mean = baseline.iter().sum::<usize>() as f64 / baseline.len() as f64;
    let variance = baseline
        .iter()
        .map(|&n| (n as f64 - mean).powi(2))
        .sum::<f64>()
        / baseline.len() as f64;
    // Floor the deviation at one IP so a perfectly flat baseline does not
    // turn a one-IP wobble into infinity sigma.
    let std_dev = variance.sqrt().max(1.0);

    let z = ((current as f64 - mean) / std_dev).max(0.0);
    let score = score_deviation(z);

    let mut reasons = Vec::new();
    if z > 1.0 {
        reasons.push(format!(
            "distinct-IP count {current} deviates from the {mean:.1}/day baseline (z={z:.1})"
        ));
    }

    ProfileScore {
        score,
        reasons,
        deviation_from_baseline: z,
    }
}

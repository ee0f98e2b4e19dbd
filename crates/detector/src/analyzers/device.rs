//! Device-fingerprint analysis.
//!
//! Extracts what fingerprint material the agents forward (user-agent
//! family, OS class, hwid) and counts distinct devices in the window. The
//! scoring weights are policy knobs that have not been tuned yet, so the
//! sub-score is currently pinned to zero; the counts still surface in the
//! breakdown for operators.

use std::collections::HashSet;

use argus_core::{ConnectionRow, DeviceScore};

/// A stable identifier extracted from one row's `device_info` blob.
#[derive(Debug, PartialEq, Eq, Hash)]
struct Fingerprint {
    user_agent_family: Option<String>,
    os_class: Option<String>,
    hwid: Option<String>,
}

fn fingerprint_of(row: &ConnectionRow) -> Option<Fingerprint> {
    let info = row.device_info.as_object()?;
    let get = |key: &str| {
        info.get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    };
    let fp = Fingerprint {
        user_agent_family: get("user_agent").map(|ua| {
            ua.split(['/', ' ']).next().unwrap_or(&ua).to_owned()
        }),
        os_class: get("os"),
        hwid: get("hwid"),
    };
    (fp.user_agent_family.is_some() || fp.os_class.is_some() || fp.hwid.is_some()).then_some(fp)
}

/// Analyze the window's device fingerprints.
#[must_use]
pub fn analyze(history: &[ConnectionRow]) -> DeviceScore {
    let fingerprints: HashSet<Fingerprint> =
        history.iter().filter_map(fingerprint_of).collect();
    let os_classes: HashSet<&str> = fingerprints
        .iter()
        .filter_map(|f| f.os_class.as_deref())
        .collect();

    DeviceScore {
        score: 0.0,
        reasons: Vec::new(),
        unique_fingerprints: u32::try_from(fingerprints.len()).unwrap_or(u32::MAX),
        distinct_os_classes: u32::try_from(os_classes.len()).unwrap_or(u32::MAX),
    }
}

//! Geographic distribution analysis.
//!
//! Works on whatever metadata the enricher could resolve; unresolved or
//! private addresses simply drop out. No data means a zero sub-score,
//! absence of evidence is not a violation.

use std::collections::{BTreeSet, HashMap};

use chrono::Duration;

use argus_core::{ConnectionRow, GeoScore, IpMetadata};

fn country_of<'a>(metas: &'a HashMap<String, IpMetadata>, ip: &str) -> Option<&'a str> {
    metas
        .get(ip)
        .filter(|m| !m.is_private())
        .and_then(|m| m.country_code.as_deref().or(m.country_name.as_deref()))
        .filter(|c| !c.is_empty())
}

fn city_of<'a>(metas: &'a HashMap<String, IpMetadata>, ip: &str) -> Option<&'a str> {
    metas
        .get(ip)
        .filter(|m| !m.is_private())
        .and_then(|m| m.city.as_deref())
        .filter(|c| !c.is_empty())
}

/// Analyze the active set and history against resolved IP metadata.
#[must_use]
pub fn analyze(
    active: &[ConnectionRow],
    history: &[ConnectionRow],
    metas: &HashMap<String, IpMetadata>,
) -> GeoScore {
    let mut score = 0.0f64;
    let mut reasons = Vec::new();
    let mut impossible_travel = false;

    // Sets are ordered so reasons and breakdowns are deterministic.
    let mut countries = BTreeSet::new();
    let mut cities = BTreeSet::new();
    for meta in metas.values().filter(|m| !m.is_private()) {
        if let Some(c) = meta.country_code.as_deref().or(meta.country_name.as_deref())
            && !c.is_empty()
        {
            countries.insert(c.to_owned());
        }
        if let Some(c) = meta.city.as_deref()
            && !c.is_empty()
        {
            cities.insert(c.to_owned());
        }
    }

    if countries.is_empty() {
        return GeoScore::default();
    }

    // Simultaneously active sessions in two or more countries.
    let active_countries: BTreeSet<&str> = active
        .iter()
        .filter_map(|c| country_of(metas, &c.ip_address))
        .collect();
    if active_countries.len() > 1 {
        score = 90.0;
        impossible_travel = true;
        reasons.push(format!(
            "simultaneous connections from different countries: {}",
            active_countries.iter().copied().collect::<Vec<_>>().join(", ")
        ));
    }

    // Sequential border crossings in the history. The one-hour bound is a
    // proxy for travel plausibility until coordinates are used.
    if history.len() > 1 && !impossible_travel {
        let mut sorted: Vec<&ConnectionRow> = history.iter().collect();
        sorted.sort_by_key(|c| c.connected_at);

        for pair in sorted.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            let (Some(prev_country), Some(curr_country)) = (
                country_of(metas, &prev.ip_address),
                country_of(metas, &curr.ip_address),
            ) else {
                continue;
            };

            if prev_country != curr_country {
                let gap = curr.connected_at - prev.connected_at;
                if gap < Duration::hours(1) {
                    score = score.max(50.0);
                    impossible_travel = true;
                    reasons.push(format!(
                        "implausible relocation {prev_country} -> {curr_country} in {:.1} h",
                        gap.num_seconds() as f64 / 3600.0
                    ));
                } else {
                    score = score.max(15.0);
                    reasons.push(format!(
                        "relocation between countries: {prev_country} -> {curr_country}"
                    ));
                }
            } else if let (Some(prev_city), Some(curr_city)) = (
                city_of(metas, &prev.ip_address),
                city_of(metas, &curr.ip_address),
            ) && prev_city != curr_city
            {
                score = score.max(5.0);
                if reasons.is_empty() {
                    reasons.push(format!(
                        "different cities in one country: {prev_city} -> {curr_city}"
                    ));
                }
            }
        }
    }

    GeoScore {
        score: score.min(100.0),
        reasons,
        countries: countries.into_iter().collect(),
        cities: cities.into_iter().collect(),
        impossible_travel_detected: impossible_travel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Value;
    use uuid::Uuid;

    fn row(ip: &str, secs_ago: i64) -> ConnectionRow {
        ConnectionRow {
            id: 0,
            user_uuid: Uuid::nil(),
            ip_address: ip.to_owned(),
            node_uuid: None,
            connected_at: Utc::now() - Duration::seconds(secs_ago),
            disconnected_at: None,
            device_info: Value::Null,
        }
    }

    fn meta(ip: &str, country: &str, city: &str) -> (String, IpMetadata) {
        let mut m = IpMetadata::private(ip);
        m.country_code = Some(country.to_owned());
        m.country_name = Some(country.to_owned());
        m.city = Some(city.to_owned());
        (ip.to_owned(), m)
    }

    #[test]
    fn no_metadata_scores_zero() {
        let active = vec![row("203.0.113.1", 10)];
        let result = analyze(&active, &[], &HashMap::new());
        assert!((result.score - 0.0).abs() < f64::EPSILON);
        assert!(!result.impossible_travel_detected);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn two_active_countries_flag_impossible_travel() {
        let metas: HashMap<String, IpMetadata> =
            [meta("1.1.1.1", "RU", "Moscow"), meta("2.2.2.2", "US", "Denver")].into();
        let active = vec![row("1.1.1.1", 30), row("2.2.2.2", 20)];
        let result = analyze(&active, &[], &metas);
        assert!((result.score - 90.0).abs() < f64::EPSILON);
        assert!(result.impossible_travel_detected);
    }

    #[test]
    fn fast_border_crossing_in_history() {
        let metas: HashMap<String, IpMetadata> =
            [meta("1.1.1.1", "RU", "Moscow"), meta("2.2.2.2", "DE", "Berlin")].into();
        let history = vec![row("1.1.1.1", 1800), row("2.2.2.2", 60)];
        let result = analyze(&[], &history, &metas);
        assert!((result.score - 50.0).abs() < f64::EPSILON);
        assert!(result.impossible_travel_detected);
    }

    #[test]
    fn slow_border_crossing_scores_low() {
        let metas: HashMap<String, IpMetadata> =
            [meta("1.1.1.1", "RU", "Moscow"), meta("2.2.2.2", "DE", "Berlin")].into();
        let history = vec![row("1.1.1.1", 8000), row("2.2.2.2", 60)];
        let result = analyze(&[], &history, &metas);
        assert!((result.score - 15.0).abs() < f64::EPSILON);
        assert!(!result.impossible_travel_detected);
    }

    #[test]
    fn city_change_within_country_is_minor() {
        let metas: HashMap<String, IpMetadata> = [
            meta("1.1.1.1", "RU", "Moscow"),
            meta("2.2.2.2", "RU", "Kazan"),
        ]
        .into();
        let history = vec![row("1.1.1.1", 600), row("2.2.2.2", 60)];
        let result = analyze(&[], &history, &metas);
        assert!((result.score - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn private_sentinels_carry_no_location() {
        let metas: HashMap<String, IpMetadata> = [
            ("10.0.0.5".to_owned(), IpMetadata::private("10.0.0.5")),
            meta("2.2.2.2", "RU", "Kazan"),
        ]
        .into();
        let active = vec![row("10.0.0.5", 30), row("2.2.2.2", 20)];
        let result = analyze(&active, &[], &metas);
        // Only one real country observed.
        assert!(!result.impossible_travel_detected);
        assert_eq!(result.countries, vec!["RU".to_owned()]);
    }
}

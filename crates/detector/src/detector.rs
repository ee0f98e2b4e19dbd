use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use argus_core::{IpMetadata, ScoreBreakdown, ViolationAction, ViolationScore};
use argus_enrich::IpEnricher;
use argus_store::{ACTIVE_WINDOW_SECS, LedgerStore, StoreError};

use crate::analyzers::{asn, device, geo, profile, temporal};

/// Analyzer weights. They sum to 1 so sub-scores map directly onto the
/// final scale.
const WEIGHT_TEMPORAL: f64 = 0.25;
const WEIGHT_GEO: f64 = 0.25;
const WEIGHT_ASN: f64 = 0.15;
const WEIGHT_PROFILE: f64 = 0.20;
const WEIGHT_DEVICE: f64 = 0.15;

/// Carrier NAT discount applied when the window is mobile-only.
const MOBILE_CARRIER_FACTOR: f64 = 0.7;

/// Floor applied when the temporal analyzer found real overlap.
const SIMULTANEITY_FLOOR: f64 = 85.0;

/// Scores at or above this are worth telling an operator about.
pub const MONITOR_THRESHOLD: f64 = 30.0;

/// Scores at or above this also ask for a manual review.
const MANUAL_REVIEW_THRESHOLD: f64 = 95.0;

/// Multi-factor violation scorer.
///
/// Combines the five sub-analyzers with fixed weights, applies the
/// modifiers, and grades the result. Deterministic for identical inputs.
pub struct ViolationDetector {
    store: Arc<dyn LedgerStore>,
    enricher: Arc<dyn IpEnricher>,
}

impl ViolationDetector {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, enricher: Arc<dyn IpEnricher>) -> Self {
        Self { store, enricher }
    }

    /// Score one user over the given window.
    ///
    /// Returns `Ok(None)` when the store is unavailable (degraded mode).
    /// Enrichment failures degrade the geo and ASN factors to zero.
    pub async fn check_user(
        &self,
        user_uuid: Uuid,
        window_minutes: i64,
    ) -> Result<Option<ViolationScore>, StoreError> {
        let user = match self.store.user_by_uuid(user_uuid).await {
            Ok(user) => user,
            Err(StoreError::NotConnected) => return Ok(None),
            Err(e) => return Err(e),
        };
        let device_count = user.as_ref().map_or(1, argus_core::User::device_count);

        let now = Utc::now();
        let active = self
            .store
            .active_connections(user_uuid, Duration::seconds(ACTIVE_WINDOW_SECS))
            .await?;

        // History is fetched in whole days so the profile baseline always
        // sees full calendar days.
        let history_days = (window_minutes / (24 * 60) + 1).max(1);
        let history = self
            .store
            .connection_history(user_uuid, Duration::days(history_days))
            .await?;

        // Resolve every IP in the window once; analyzers share the map.
        let mut metas: HashMap<String, IpMetadata> = HashMap::new();
        for ip in active
            .iter()
            .chain(history.iter())
            .map(|c| c.ip_address.as_str())
        {
            if metas.contains_key(ip) {
                continue;
            }
            match self.enricher.lookup(ip).await {
                Ok(Some(meta)) => {
                    metas.insert(ip.to_owned(), meta);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(ip, code = e.code(), "enrichment unavailable, degrading");
                }
            }
        }

        let temporal = temporal::analyze(&active, &history, device_count, now);
        let geo = geo::analyze(&active, &history, &metas);
        let asn = asn::analyze(&metas);
        let profile = profile::analyze(&history, now);
        let device = device::analyze(&history);

        let mut raw = temporal.score * WEIGHT_TEMPORAL
            + geo.score * WEIGHT_GEO
            + asn.score * WEIGHT_ASN
            + profile.score * WEIGHT_PROFILE
            + device.score * WEIGHT_DEVICE;

        if asn.is_mobile_carrier {
            raw *= MOBILE_CARRIER_FACTOR;
        }
        if temporal.score > 0.0 && temporal.simultaneous_count > 1 {
            raw = raw.max(SIMULTANEITY_FLOOR);
        }

        let total = raw.min(100.0);
        let recommended_action = ViolationAction::for_total(total);
        let confidence = (total / 100.0).min(1.0);

        let mut reasons = Vec::new();
        reasons.extend(temporal.reasons.iter().cloned());
        reasons.extend(geo.reasons.iter().cloned());
        reasons.extend(asn.reasons.iter().cloned());
        reasons.extend(profile.reasons.iter().cloned());
        reasons.extend(device.reasons.iter().cloned());
        if total >= MANUAL_REVIEW_THRESHOLD {
            reasons.push("manual review recommended".to_owned());
        }

        if total >= MONITOR_THRESHOLD {
            warn!(
                user = %user_uuid,
                total,
                action = recommended_action.as_str(),
                reasons = reasons.len(),
                "violation threshold crossed"
            );
        }

        Ok(Some(ViolationScore {
            total,
            breakdown: ScoreBreakdown {
                temporal,
                geo,
                asn,
                profile,
                device,
            },
            recommended_action,
            confidence,
            reasons,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use argus_core::UpstreamError;
    use argus_store::NewConnection;
    use argus_store_memory::{MemoryLedgerStore, fixtures};

    /// Enricher stub with a fixed IP->metadata table.
    #[derive(Default)]
    struct TableEnricher {
        table: Mutex<HashMap<String, IpMetadata>>,
    }

    impl TableEnricher {
        fn with_country(entries: &[(&str, &str)]) -> Self {
            let mut table = HashMap::new();
            for (ip, country) in entries {
                let mut meta = IpMetadata::private(*ip);
                meta.country_code = Some((*country).to_owned());
                table.insert((*ip).to_owned(), meta);
            }
            Self {
                table: Mutex::new(table),
            }
        }
    }

    #[async_trait]
    impl IpEnricher for TableEnricher {
        async fn lookup(&self, ip: &str) -> Result<Option<IpMetadata>, UpstreamError> {
            Ok(self.table.lock().unwrap().get(ip).cloned())
        }
    }

    async fn seeded_store() -> (Arc<MemoryLedgerStore>, argus_core::User, argus_core::Node) {
        let store = Arc::new(MemoryLedgerStore::new());
        let user = fixtures::user("154", "a@example.com");
        let node = fixtures::node("edge", None);
        store.upsert_user(&user).await.unwrap();
        store.upsert_node(&node).await.unwrap();
        (store, user, node)
    }

    async fn connect(
        store: &MemoryLedgerStore,
        user: &argus_core::User,
        node: &argus_core::Node,
        ip: &str,
        secs_ago: i64,
    ) {
        store
            .insert_connection(NewConnection {
                user_uuid: user.uuid,
                ip_address: ip.to_owned(),
                node_uuid: node.uuid,
                connected_at: fixtures::at(secs_ago),
                device_info: serde_json::Value::Null,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn single_connection_scores_zero() {
        let (store, user, node) = seeded_store().await;
        connect(&store, &user, &node, "203.0.113.1", 30).await;

        let detector = ViolationDetector::new(store, Arc::new(TableEnricher::default()));
        let score = detector.check_user(user.uuid, 60).await.unwrap().unwrap();
        assert!((score.total - 0.0).abs() < f64::EPSILON);
        assert_eq!(score.recommended_action, ViolationAction::NoAction);
        assert!(score.reasons.is_empty());
    }

    #[tokio::test]
    async fn five_simultaneous_ips_floor_to_eighty_five() {
        let (store, user, node) = seeded_store().await;
        for i in 0..5 {
            connect(&store, &user, &node, &format!("203.0.113.{i}"), 100 - i * 10).await;
        }

        let detector = ViolationDetector::new(store, Arc::new(TableEnricher::default()));
        let score = detector.check_user(user.uuid, 60).await.unwrap().unwrap();
        assert!(score.total >= SIMULTANEITY_FLOOR);
        assert!(score.recommended_action >= ViolationAction::TempBlock);
        assert!((score.breakdown.temporal.score - 100.0).abs() < f64::EPSILON);
        assert!((score.confidence - score.total / 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn impossible_travel_weighs_in() {
        let (store, user, node) = seeded_store().await;
        connect(&store, &user, &node, "203.0.113.1", 60).await;
        connect(&store, &user, &node, "198.51.100.1", 30).await;

        let enricher = TableEnricher::with_country(&[
            ("203.0.113.1", "RU"),
            ("198.51.100.1", "US"),
        ]);
        let detector = ViolationDetector::new(store, Arc::new(enricher));
        let score = detector.check_user(user.uuid, 60).await.unwrap().unwrap();

        assert!(score.breakdown.geo.impossible_travel_detected);
        assert!((score.breakdown.geo.score - 90.0).abs() < f64::EPSILON);
        // Two overlapping IPs are within the device allowance, so the
        // temporal factor stays quiet and no floor applies; the total is
        // the weighted geo contribution alone.
        assert!((score.total - 22.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn scorer_is_deterministic() {
        let (store, user, node) = seeded_store().await;
        for i in 0..4 {
            connect(&store, &user, &node, &format!("203.0.113.{i}"), 90 - i * 10).await;
        }
        let detector = ViolationDetector::new(store, Arc::new(TableEnricher::default()));
        let a = detector.check_user(user.uuid, 60).await.unwrap().unwrap();
        let b = detector.check_user(user.uuid, 60).await.unwrap().unwrap();
        assert!((a.total - b.total).abs() < f64::EPSILON);
        assert_eq!(a.reasons, b.reasons);
        assert_eq!(a.recommended_action, b.recommended_action);
    }

    #[tokio::test]
    async fn unknown_user_still_scores_with_default_allowance() {
        let (store, user, node) = seeded_store().await;
        for i in 0..3 {
            connect(&store, &user, &node, &format!("203.0.113.{i}"), 60 - i * 10).await;
        }
        // Score a uuid with no mirror row: ledger rows under it don't
        // exist either, so the result is a clean zero, not an error.
        let detector =
            ViolationDetector::new(store, Arc::new(TableEnricher::default()));
        let score = detector.check_user(Uuid::new_v4(), 60).await.unwrap().unwrap();
        assert!((score.total - 0.0).abs() < f64::EPSILON);
    }
}

//! Bulk ASN registry sync.
//!
//! Loads the national ASN list for one country from RIPEstat, fetches each
//! `aut-num` object from the RIPE database, classifies the operator, and
//! upserts the per-country cache table. Paced politely and capped per run;
//! progress lands in sync metadata so interrupted runs are visible.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use argus_core::{AsnRecord, SyncStatus, UpstreamError};
use argus_store::{LedgerStore, StoreError};

use crate::classify;

/// Settings for one registry sync run.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RegistryConfig {
    /// ISO country code whose ASN space is mirrored.
    pub country_code: String,
    /// Safety cap on ASNs processed per run; not a semantic limit.
    #[serde(default = "default_run_cap")]
    pub run_cap: usize,
    /// Sleep between per-ASN fetches.
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,
    #[serde(default = "default_ripestat_url")]
    pub ripestat_url: String,
    #[serde(default = "default_ripedb_url")]
    pub ripedb_url: String,
}

fn default_run_cap() -> usize {
    100
}

fn default_pace_ms() -> u64 {
    500
}

fn default_ripestat_url() -> String {
    "https://stat.ripe.net/data/country-resource-list/data.json".to_owned()
}

fn default_ripedb_url() -> String {
    "https://rest.db.ripe.net".to_owned()
}

/// Outcome counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySyncStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Attributes pulled out of one `aut-num` object.
#[derive(Debug, Default)]
struct AutNum {
    as_name: Option<String>,
    descr: Option<String>,
    country: Option<String>,
}

pub struct AsnRegistrySync {
    config: RegistryConfig,
    client: reqwest::Client,
    store: Arc<dyn LedgerStore>,
}

impl AsnRegistrySync {
    /// # Errors
    ///
    /// Returns [`UpstreamError::Network`] if the HTTP client cannot be built.
    pub fn new(config: RegistryConfig, store: Arc<dyn LedgerStore>) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;
        Ok(Self {
            config,
            client,
            store,
        })
    }

    /// Fetch the country's ASN numbers from RIPEstat.
    async fn fetch_country_asn_list(&self) -> Result<Vec<u32>, UpstreamError> {
        let response = self
            .client
            .get(&self.config.ripestat_url)
            .query(&[("resource", self.config.country_code.as_str()), ("lod", "1")])
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(UpstreamError::Server(format!(
                "RIPEstat status {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Validation(e.to_string()))?;

        // Entries come as "12345" or ranges like "12345-12350"; the leading
        // number is the one registered to the country.
        let digits = Regex::new(r"(\d+)").expect("static pattern");
        let mut asns = Vec::new();
        if let Some(list) = body
            .pointer("/data/resources/asn")
            .and_then(serde_json::Value::as_array)
        {
            for entry in list {
                let text = match entry {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if let Some(m) = digits.captures(&text).and_then(|c| c.get(1))
                    && let Ok(asn) = m.as_str().parse()
                {
                    asns.push(asn);
                }
            }
        }
        info!(
            country = %self.config.country_code,
            count = asns.len(),
            "fetched national ASN list"
        );
        Ok(asns)
    }

    /// Fetch one `aut-num` object. Unregistered ASNs resolve to `Ok(None)`.
    async fn fetch_aut_num(&self, asn: u32) -> Result<Option<AutNum>, UpstreamError> {
        let url = format!(
            "{}/ripe/aut-num/AS{asn}.json",
            self.config.ripedb_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(UpstreamError::Server(format!(
                "RIPE db status {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Validation(e.to_string()))?;
        Ok(parse_aut_num(&body))
    }

    async fn sync_one(&self, asn: u32) -> Result<bool, UpstreamError> {
        let Some(aut_num) = self.fetch_aut_num(asn).await? else {
            return Ok(false);
        };

        let org_name = aut_num
            .as_name
            .clone()
            .unwrap_or_else(|| format!("AS{asn}"));
        let provider_type = classify::classify_org(&org_name, aut_num.descr.as_deref());
        let (region, city) = classify::extract_region_city(&org_name, aut_num.descr.as_deref());

        let record = AsnRecord {
            asn,
            org_name,
            org_name_en: None,
            provider_type: Some(provider_type),
            region,
            city,
            country_code: aut_num
                .country
                .unwrap_or_else(|| self.config.country_code.clone()),
            description: aut_num.descr,
            ip_ranges: None,
            is_active: true,
            last_synced_at: None,
        };
        self.store
            .upsert_asn_record(&record)
            .await
            .map_err(|e| UpstreamError::Server(e.to_string()))?;
        Ok(true)
    }

    /// Run one capped sync pass. Already-cached ASNs are skipped.
    ///
    /// # Errors
    ///
    /// Fails only when the national list cannot be fetched or the progress
    /// row cannot be written; per-ASN failures are counted and logged.
    pub async fn run(&self) -> Result<RegistrySyncStats, UpstreamError> {
        let sync_key = format!("asn_{}", self.config.country_code.to_lowercase());

        let asn_list = match self.fetch_country_asn_list().await {
            Ok(list) => list,
            Err(e) => {
                self.record_progress(&sync_key, SyncStatus::Error, 0, Some(&e.to_string()))
                    .await;
                return Err(e);
            }
        };

        let mut stats = RegistrySyncStats {
            total: asn_list.len().min(self.config.run_cap),
            ..RegistrySyncStats::default()
        };

        for (i, asn) in asn_list.into_iter().take(self.config.run_cap).enumerate() {
            match self.store.asn_record(&self.config.country_code, asn).await {
                Ok(Some(_)) => {
                    stats.skipped += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(asn, error = %e, "ASN cache read failed");
                    stats.failed += 1;
                    continue;
                }
            }

            match self.sync_one(asn).await {
                Ok(true) => stats.success += 1,
                Ok(false) => stats.failed += 1,
                Err(e) => {
                    warn!(asn, code = e.code(), error = %e, "ASN sync failed");
                    stats.failed += 1;
                }
            }

            if (i + 1) % 100 == 0 {
                info!(
                    processed = i + 1,
                    success = stats.success,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    "registry sync progress"
                );
            }

            tokio::time::sleep(Duration::from_millis(self.config.pace_ms)).await;
        }

        let status = if stats.failed > 0 && stats.success == 0 {
            SyncStatus::Error
        } else {
            SyncStatus::Success
        };
        self.record_progress(
            &sync_key,
            status,
            i64::try_from(stats.success).unwrap_or(i64::MAX),
            None,
        )
        .await;

        info!(?stats, country = %self.config.country_code, "registry sync finished");
        Ok(stats)
    }

    async fn record_progress(
        &self,
        key: &str,
        status: SyncStatus,
        records: i64,
        error: Option<&str>,
    ) {
        if let Err(e) = self.store.record_sync(key, status, records, error).await {
            // Degraded-mode stores make the whole run a no-op anyway.
            if !matches!(e, StoreError::NotConnected) {
                warn!(key, error = %e, "failed to record registry sync progress");
            }
        }
    }
}

/// Pull the interesting attributes out of a RIPE REST `aut-num` payload.
/// The format wraps objects and attributes in one more level than you would
/// expect, and older mirrors return plain arrays.
fn parse_aut_num(body: &serde_json::Value) -> Option<AutNum> {
    let objects = body.pointer("/objects/object").or_else(|| body.get("objects"))?;
    let first = objects.as_array()?.first()?;
    let attributes = first
        .pointer("/attributes/attribute")
        .or_else(|| first.get("attributes"))?
        .as_array()?;

    let mut aut_num = AutNum::default();
    for attr in attributes {
        let Some(name) = attr.get("name").and_then(serde_json::Value::as_str) else {
            continue;
        };
        let Some(value) = attr.get("value").and_then(serde_json::Value::as_str) else {
            continue;
        };
        match name {
            "as-name" if aut_num.as_name.is_none() => aut_num.as_name = Some(value.to_owned()),
            "descr" if aut_num.descr.is_none() => aut_num.descr = Some(value.to_owned()),
            "country" if aut_num.country.is_none() => aut_num.country = Some(value.to_owned()),
            _ => {}
        }
    }
    Some(aut_num)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aut_num_parsing_handles_ripe_nesting() {
        let body = serde_json::json!({
            "objects": {"object": [{
                "attributes": {"attribute": [
                    {"name": "aut-num", "value": "AS12389"},
                    {"name": "as-name", "value": "ROSTELECOM-AS"},
                    {"name": "descr", "value": "PJSC Rostelecom, Moscow"},
                    {"name": "country", "value": "RU"}
                ]}
            }]}
        });
        let parsed = parse_aut_num(&body).unwrap();
        assert_eq!(parsed.as_name.as_deref(), Some("ROSTELECOM-AS"));
        assert_eq!(parsed.descr.as_deref(), Some("PJSC Rostelecom, Moscow"));
        assert_eq!(parsed.country.as_deref(), Some("RU"));
    }

    #[test]
    fn aut_num_parsing_rejects_empty_payloads() {
        assert!(parse_aut_num(&serde_json::json!({})).is_none());
        assert!(parse_aut_num(&serde_json::json!({"objects": {"object": []}})).is_none());
    }
}

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use argus_core::{IpMetadata, UpstreamError};

use crate::classify;

/// IP metadata resolution seam. The detector's geo and ASN analyzers only
/// see this trait; absence of data is `Ok(None)`, never synthesized.
#[async_trait]
pub trait IpEnricher: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<Option<IpMetadata>, UpstreamError>;
}

/// Upstream and politeness settings for [`GeoIpService`].
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GeoIpConfig {
    /// Base URL of an ip-api.com compatible endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Minimum spacing between upstream calls. The free tier allows 45
    /// requests a minute; 1.5 s keeps us under it.
    #[serde(default = "default_interval_ms")]
    pub min_request_interval_ms: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            min_request_interval_ms: default_interval_ms(),
            cache_ttl_seconds: default_cache_ttl(),
            connect_timeout_seconds: default_connect_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "http://ip-api.com/json".to_owned()
}

fn default_interval_ms() -> u64 {
    1500
}

fn default_cache_ttl() -> u64 {
    86_400
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

const FIELDS: &str = "status,message,country,countryCode,region,regionName,city,lat,lon,\
                      timezone,as,asname,isp,org,mobile,proxy,hosting,query";

/// Response shape of ip-api.com's JSON endpoint.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    message: Option<String>,
    country: Option<String>,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
    #[serde(rename = "as")]
    as_field: Option<String>,
    asname: Option<String>,
    isp: Option<String>,
    org: Option<String>,
    #[serde(default)]
    mobile: bool,
    #[serde(default)]
    proxy: bool,
    #[serde(default)]
    hosting: bool,
}

/// Cached, rate-limited GeoIP client.
///
/// Private and loopback addresses short-circuit to the `PRIVATE` sentinel
/// without touching the cache or consuming a rate-limit slot. Upstream
/// lookups are fully serialized behind a single gate so the spacing holds
/// under concurrent callers; concurrent misses for the same IP may both go
/// upstream, which is benign.
pub struct GeoIpService {
    config: GeoIpConfig,
    client: reqwest::Client,
    cache: Cache<String, IpMetadata>,
    gate: Mutex<Option<Instant>>,
}

impl GeoIpService {
    /// # Errors
    ///
    /// Returns [`UpstreamError::Network`] if the HTTP client cannot be built.
    pub fn new(config: GeoIpConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .max_capacity(100_000)
            .build();

        Ok(Self {
            config,
            client,
            cache,
            gate: Mutex::new(None),
        })
    }

    async fn fetch(&self, ip: &str) -> Result<Option<IpMetadata>, UpstreamError> {
        // Serialize upstream calls and enforce the spacing while holding
        // the gate, so two concurrent misses cannot pair up back to back.
        let mut last = self.gate.lock().await;
        if let Some(at) = *last {
            let spacing = Duration::from_millis(self.config.min_request_interval_ms);
            let elapsed = at.elapsed();
            if elapsed < spacing {
                tokio::time::sleep(spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());

        let url = format!("{}/{ip}", self.config.api_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("fields", FIELDS)])
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status));
        }

        let body: ApiResponse = response.json().await.map_err(map_reqwest)?;
        if body.status != "success" {
            // Negative results are not cached; the upstream may know the
            // address on the next pass.
            debug!(ip, message = body.message.as_deref().unwrap_or("-"), "lookup returned no data");
            return Ok(None);
        }

        let asn = body.as_field.as_deref().and_then(parse_asn);
        let asn_org = body
            .asname
            .clone()
            .or_else(|| body.org.clone())
            .or_else(|| body.isp.clone());

        let (provider_type, is_mobile, is_hosting, is_vpn) =
            classify::classify_lookup(asn_org.as_deref(), body.mobile, body.hosting, body.proxy);

        Ok(Some(IpMetadata {
            ip: ip.to_owned(),
            country_code: body.country_code,
            country_name: body.country,
            region: body.region_name,
            city: body.city,
            latitude: body.lat,
            longitude: body.lon,
            timezone: body.timezone,
            asn,
            asn_org,
            provider_type,
            is_mobile,
            is_hosting,
            is_vpn,
            is_proxy: body.proxy,
        }))
    }
}

#[async_trait]
impl IpEnricher for GeoIpService {
    async fn lookup(&self, ip: &str) -> Result<Option<IpMetadata>, UpstreamError> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| UpstreamError::Validation(format!("not an IP address: {ip}")))?;
        if is_private(addr) {
            return Ok(Some(IpMetadata::private(ip)));
        }

        if let Some(cached) = self.cache.get(ip).await {
            return Ok(Some(cached));
        }

        match self.fetch(ip).await {
            Ok(Some(meta)) => {
                self.cache.insert(ip.to_owned(), meta.clone()).await;
                Ok(Some(meta))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(ip, code = e.code(), error = %e, "GeoIP lookup failed");
                Err(e)
            }
        }
    }
}

/// Addresses that never reach the upstream.
fn is_private(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || v6.is_unique_local(),
    }
}

/// Extract the number out of ip-api's `"AS12345 Org Name"` field.
fn parse_asn(raw: &str) -> Option<u32> {
    raw.split_whitespace().find_map(|token| {
        token
            .strip_prefix("AS")
            .and_then(|digits| digits.parse().ok())
    })
}

fn map_reqwest(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else if e.is_decode() {
        UpstreamError::Validation(e.to_string())
    } else {
        UpstreamError::Network(e.to_string())
    }
}

fn map_status(status: reqwest::StatusCode) -> UpstreamError {
    match status.as_u16() {
        401 | 403 => UpstreamError::Unauthorized,
        404 => UpstreamError::NotFound,
        429 => UpstreamError::RateLimited,
        s if status.is_server_error() => UpstreamError::Server(format!("status {s}")),
        s => UpstreamError::Validation(format!("unexpected status {s}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> GeoIpService {
        // Unroutable upstream: any test that actually hit the network
        // would fail fast rather than silently succeed.
        GeoIpService::new(GeoIpConfig {
            api_url: "http://127.0.0.1:1/json".to_owned(),
            ..GeoIpConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn private_ranges_short_circuit() {
        let svc = service();
        for ip in ["10.0.0.5", "127.0.0.1", "192.168.1.10", "172.16.3.4", "::1"] {
            let meta = svc.lookup(ip).await.unwrap().unwrap();
            assert!(meta.is_private(), "{ip} should be private");
        }
        // The gate was never armed: no rate-limit slot consumed.
        assert!(svc.gate.lock().await.is_none());
    }

    #[tokio::test]
    async fn garbage_input_is_a_validation_error() {
        let svc = service();
        let err = svc.lookup("not-an-ip").await.unwrap_err();
        assert_eq!(err.code(), "E_UPSTREAM_SCHEMA");
    }

    #[test]
    fn asn_field_parses() {
        assert_eq!(parse_asn("AS12389 PJSC Rostelecom"), Some(12389));
        assert_eq!(parse_asn("ASN bad"), None);
        assert_eq!(parse_asn(""), None);
    }

    #[test]
    fn api_response_decodes_ip_api_shape() {
        let body = r#"{
            "status":"success","country":"Sweden","countryCode":"SE",
            "regionName":"Stockholm","city":"Stockholm","lat":59.33,"lon":18.06,
            "timezone":"Europe/Stockholm","as":"AS1257 Tele2 Sverige AB",
            "asname":"TELE2","mobile":false,"proxy":false,"hosting":false
        }"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.country_code.as_deref(), Some("SE"));
        assert_eq!(parse_asn(parsed.as_field.as_deref().unwrap()), Some(1257));
    }
}

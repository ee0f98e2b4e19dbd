use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ipmeta::ProviderType;

/// Locally cached ASN registry entry for one country table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsnRecord {
    pub asn: u32,
    pub org_name: String,
    pub org_name_en: Option<String>,
    pub provider_type: Option<ProviderType>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub country_code: String,
    pub description: Option<String>,
    pub ip_ranges: Option<serde_json::Value>,
    pub is_active: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl AsnRecord {
    /// Minimal record for an ASN that resolved but carried no attributes.
    #[must_use]
    pub fn bare(asn: u32, country_code: impl Into<String>) -> Self {
        Self {
            asn,
            org_name: format!("AS{asn}"),
            org_name_en: None,
            provider_type: None,
            region: None,
            city: None,
            country_code: country_code.into(),
            description: None,
            ip_ranges: None,
            is_active: true,
            last_synced_at: None,
        }
    }
}

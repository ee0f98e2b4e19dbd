use serde::{Deserialize, Serialize};

/// Provider class derived from an ASN's organization record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Isp,
    RegionalIsp,
    Fixed,
    MobileIsp,
    Hosting,
    Business,
    Mobile,
    Infrastructure,
    Vpn,
}

impl ProviderType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Isp => "isp",
            Self::RegionalIsp => "regional_isp",
            Self::Fixed => "fixed",
            Self::MobileIsp => "mobile_isp",
            Self::Hosting => "hosting",
            Self::Business => "business",
            Self::Mobile => "mobile",
            Self::Infrastructure => "infrastructure",
            Self::Vpn => "vpn",
        }
    }

    /// Mobile-carrier classes feed the detector's carrier discount.
    #[must_use]
    pub fn is_mobile_carrier(self) -> bool {
        matches!(self, Self::Mobile | Self::MobileIsp)
    }

    /// Classes that indicate rented infrastructure rather than an end user.
    #[must_use]
    pub fn is_datacenter(self) -> bool {
        matches!(self, Self::Hosting | Self::Infrastructure)
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isp" => Ok(Self::Isp),
            "regional_isp" => Ok(Self::RegionalIsp),
            "fixed" => Ok(Self::Fixed),
            "mobile_isp" => Ok(Self::MobileIsp),
            "hosting" => Ok(Self::Hosting),
            "business" => Ok(Self::Business),
            "mobile" => Ok(Self::Mobile),
            "infrastructure" => Ok(Self::Infrastructure),
            "vpn" => Ok(Self::Vpn),
            other => Err(format!("unknown provider type: {other}")),
        }
    }
}

/// Enrichment result for a single IP address, cached for 24 hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpMetadata {
    pub ip: String,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    pub asn: Option<u32>,
    pub asn_org: Option<String>,
    pub provider_type: Option<ProviderType>,
    pub is_mobile: bool,
    pub is_hosting: bool,
    pub is_vpn: bool,
    pub is_proxy: bool,
}

impl IpMetadata {
    /// Sentinel country code for private and loopback ranges.
    pub const PRIVATE: &'static str = "PRIVATE";

    /// Sentinel metadata for addresses that never reach the upstream.
    #[must_use]
    pub fn private(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            country_code: Some(Self::PRIVATE.to_owned()),
            country_name: Some("Private Network".to_owned()),
            region: None,
            city: None,
            latitude: None,
            longitude: None,
            timezone: None,
            asn: None,
            asn_org: None,
            provider_type: None,
            is_mobile: false,
            is_hosting: false,
            is_vpn: false,
            is_proxy: false,
        }
    }

    /// Whether this is the private-range sentinel.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.country_code.as_deref() == Some(Self::PRIVATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_sentinel_is_marked() {
        let meta = IpMetadata::private("10.0.0.5");
        assert!(meta.is_private());
        assert_eq!(meta.asn, None);
    }

    #[test]
    fn provider_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&ProviderType::MobileIsp).unwrap(),
            r#""mobile_isp""#
        );
        let back: ProviderType = serde_json::from_str(r#""regional_isp""#).unwrap();
        assert_eq!(back, ProviderType::RegionalIsp);
    }

    #[test]
    fn carrier_classes() {
        assert!(ProviderType::Mobile.is_mobile_carrier());
        assert!(ProviderType::MobileIsp.is_mobile_carrier());
        assert!(!ProviderType::Isp.is_mobile_carrier());
    }
}

//! Provider classification by organization name.
//!
//! Curated keyword lexicons, matched case-insensitively over the ASN
//! organization name and description. Upstream `mobile`/`hosting`/`proxy`
//! flags are folded in by the callers.

use argus_core::ProviderType;

/// Mobile carriers, global brands plus the carriers common on this fleet.
const MOBILE_CARRIERS: &[&str] = &[
    "mts",
    "beeline",
    "megafon",
    "tele2",
    "yota",
    "vodafone",
    "orange",
    "t-mobile",
    "verizon",
    "at&t",
    "sprint",
    "three",
    "o2",
    "china mobile",
    "china unicom",
    "china telecom",
    "cellular",
    "mobile communications",
];

/// Datacenter and hosting operators.
const HOSTING_OPERATORS: &[&str] = &[
    "digitalocean",
    "amazon",
    "aws",
    "hetzner",
    "ovh",
    "linode",
    "vultr",
    "google cloud",
    "azure",
    "microsoft",
    "rackspace",
    "oracle cloud",
    "alibaba cloud",
    "tencent cloud",
    "hosting",
    "datacenter",
    "data center",
    "servers",
    "colocation",
    "colo",
    "cloud",
    "vps",
    "vds",
];

/// VPN and anonymizer brands.
const VPN_BRANDS: &[&str] = &[
    "nordvpn",
    "expressvpn",
    "surfshark",
    "cyberghost",
    "private internet access",
    "mullvad",
    "protonvpn",
    "windscribe",
    "tunnelbear",
    "vyprvpn",
    "hotspot shield",
    "hide.me",
    "vpn",
    "proxy",
    "anonymizer",
];

/// Consumer fixed-line ISPs.
const ISP_KEYWORDS: &[&str] = &[
    "telecom",
    "internet service",
    "broadband",
    "net ",
    "provider",
    "communications",
    "telekom",
    "rostelecom",
    "er-telecom",
    "ttk",
    "dom.ru",
];

/// Non-carrier enterprise networks.
const BUSINESS_KEYWORDS: &[&str] = &["bank", "insurance", "university", "government", "corporate"];

/// Backbone and exchange infrastructure.
const INFRASTRUCTURE_KEYWORDS: &[&str] = &["internet exchange", "backbone", "transit", "ix "];

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Classify an ASN organization for the registry cache.
///
/// Order matters: a "mobile hosting" org is a carrier, not a datacenter.
/// Unmatched organizations default to a fixed-line consumer provider.
#[must_use]
pub fn classify_org(org_name: &str, description: Option<&str>) -> ProviderType {
    let text = format!("{org_name} {}", description.unwrap_or("")).to_lowercase();

    if contains_any(&text, MOBILE_CARRIERS) {
        return ProviderType::Mobile;
    }
    if contains_any(&text, VPN_BRANDS) {
        return ProviderType::Vpn;
    }
    if contains_any(&text, HOSTING_OPERATORS) {
        return ProviderType::Hosting;
    }
    if contains_any(&text, INFRASTRUCTURE_KEYWORDS) {
        return ProviderType::Infrastructure;
    }
    if contains_any(&text, BUSINESS_KEYWORDS) {
        return ProviderType::Business;
    }
    if contains_any(&text, ISP_KEYWORDS) {
        return ProviderType::Isp;
    }
    ProviderType::Fixed
}

/// Classify a live lookup, folding in the upstream's own flags.
///
/// Returns the provider type plus `(is_mobile, is_hosting, is_vpn)` as the
/// detector consumes them.
#[must_use]
pub fn classify_lookup(
    asn_org: Option<&str>,
    upstream_mobile: bool,
    upstream_hosting: bool,
    upstream_proxy: bool,
) -> (Option<ProviderType>, bool, bool, bool) {
    let text = asn_org.unwrap_or("").to_lowercase();

    let is_vpn = upstream_proxy || contains_any(&text, VPN_BRANDS);
    if is_vpn {
        return (Some(ProviderType::Vpn), false, false, true);
    }

    let is_mobile = upstream_mobile || contains_any(&text, MOBILE_CARRIERS);
    if is_mobile {
        return (Some(ProviderType::Mobile), true, false, false);
    }

    let is_hosting = upstream_hosting || contains_any(&text, HOSTING_OPERATORS);
    if is_hosting {
        return (Some(ProviderType::Hosting), false, true, false);
    }

    if text.is_empty() {
        return (None, false, false, false);
    }
    (Some(ProviderType::Isp), false, false, false)
}

/// City keyword map for extracting a location out of registry attributes.
const CITY_KEYWORDS: &[(&str, &str)] = &[
    ("moscow", "Moscow"),
    ("moskva", "Moscow"),
    ("petersburg", "Saint Petersburg"),
    ("peterburg", "Saint Petersburg"),
    ("novosibirsk", "Novosibirsk"),
    ("ekaterinburg", "Yekaterinburg"),
    ("yekaterinburg", "Yekaterinburg"),
    ("kazan", "Kazan"),
    ("samara", "Samara"),
    ("rostov", "Rostov-on-Don"),
    ("krasnodar", "Krasnodar"),
    ("vladivostok", "Vladivostok"),
    ("nizhny novgorod", "Nizhny Novgorod"),
    ("chelyabinsk", "Chelyabinsk"),
];

/// Federal-city regions double as their own region name.
const FEDERAL_CITIES: &[&str] = &["Moscow", "Saint Petersburg"];

/// Pull `(region, city)` out of an organization name and description.
#[must_use]
pub fn extract_region_city(
    org_name: &str,
    description: Option<&str>,
) -> (Option<String>, Option<String>) {
    let text = format!("{org_name} {}", description.unwrap_or("")).to_lowercase();
    for (keyword, city) in CITY_KEYWORDS {
        if text.contains(keyword) {
            let region = FEDERAL_CITIES
                .contains(city)
                .then(|| (*city).to_owned());
            return (region, Some((*city).to_owned()));
        }
    }
    (None, None)
}

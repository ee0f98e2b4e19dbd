//! Provider-class analysis over the window's resolved ASNs.

use std::collections::{BTreeSet, HashMap};

use argus_core::{AsnScore, IpMetadata, ProviderType};

/// Analyze the provider mix of the window.
#[must_use]
pub fn analyze(metas: &HashMap<String, IpMetadata>) -> AsnScore {
    let mut score = 0.0f64;
    let mut reasons = Vec::new();
    let mut asn_types = BTreeSet::new();

    let mut any_vpn = false;
    let mut any_hosting = false;
    let mut any_consumer = false;
    let mut any_non_mobile = false;
    let mut seen = 0usize;

    for meta in metas.values().filter(|m| !m.is_private()) {
        seen += 1;

        if let Some(ptype) = meta.provider_type {
            asn_types.insert(ptype.as_str().to_owned());
        }

        let is_vpn = meta.is_vpn || meta.is_proxy || meta.provider_type == Some(ProviderType::Vpn);
        if is_vpn && !any_vpn {
            any_vpn = true;
            reasons.push(format!(
                "VPN/proxy provider observed: {}",
                meta.asn_org.as_deref().unwrap_or("unknown org")
            ));
        }

        let is_hosting = meta.is_hosting
            || meta
                .provider_type
                .is_some_and(ProviderType::is_datacenter);
        any_hosting |= is_hosting;

        let is_consumer = matches!(
            meta.provider_type,
            Some(ProviderType::Isp | ProviderType::RegionalIsp | ProviderType::Fixed)
        );
        any_consumer |= is_consumer;

        let is_mobile = meta.is_mobile
            || meta
                .provider_type
                .is_some_and(ProviderType::is_mobile_carrier);
        any_non_mobile |= !is_mobile;
    }

    if any_vpn {
        score = 70.0;
    }
    if any_consumer && any_hosting {
        score += 20.0;
        reasons.push("mixed consumer ISP and hosting providers in one window".to_owned());
    }

    // Mobile-only windows set the carrier flag for the total-score discount;
    // carrier NAT churns IPs aggressively and is not evidence on its own.
    let is_mobile_carrier = seen > 0 && !any_non_mobile;

    AsnScore {
        score: score.min(100.0),
        reasons,
        asn_types: asn_types.into_iter().collect(),
        is_mobile_carrier,
        is_datacenter: any_hosting,
        is_vpn: any_vpn,
    }
}

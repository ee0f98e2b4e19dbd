//! IP and ASN enrichment.
//!
//! [`GeoIpService`] resolves public addresses against an ip-api.com
//! compatible upstream with a 24-hour cache and a politeness gate that
//! serializes upstream calls. [`registry::AsnRegistrySync`] bulk-loads a
//! country's ASN registry into the local cache tables.

pub mod classify;
pub mod geoip;
pub mod registry;

pub use geoip::{GeoIpConfig, GeoIpService, IpEnricher};
pub use registry::{AsnRegistrySync, RegistryConfig, RegistrySyncStats};

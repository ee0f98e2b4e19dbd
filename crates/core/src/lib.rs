pub mod asn;
pub mod connection;
pub mod error;
pub mod event;
pub mod identity;
pub mod ipmeta;
pub mod node;
pub mod report;
pub mod sync_meta;
pub mod user;
pub mod violation;

pub use asn::AsnRecord;
pub use connection::ConnectionRow;
pub use error::UpstreamError;
pub use event::{ControlEvent, EventFamily};
pub use identity::UserIdentifier;
pub use ipmeta::{IpMetadata, ProviderType};
pub use node::{ConfigProfile, Host, Node};
pub use report::{BatchReport, BatchResponse, ConnectionReport};
pub use sync_meta::{SyncMetadata, SyncStatus};
pub use user::{User, UserStatus};
pub use violation::{
    AsnScore, DeviceScore, GeoScore, ProfileScore, ScoreBreakdown, TemporalScore, ViolationAction,
    ViolationScore,
};

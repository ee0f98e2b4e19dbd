use serde::{Deserialize, Serialize};

/// Graded enforcement recommendation, a strictly monotone function of the
/// final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationAction {
    NoAction,
    Monitor,
    Warn,
    SoftBlock,
    TempBlock,
    HardBlock,
}

impl ViolationAction {
    /// Map a final score to an action. Thresholds are strictly less-than:
    /// `< 30` no action, `< 50` monitor, `< 65` warn, `< 80` soft block,
    /// `< 90` temp block, otherwise hard block.
    #[must_use]
    pub fn for_total(total: f64) -> Self {
        if total < 30.0 {
            Self::NoAction
        } else if total < 50.0 {
            Self::Monitor
        } else if total < 65.0 {
            Self::Warn
        } else if total < 80.0 {
            Self::SoftBlock
        } else if total < 90.0 {
            Self::TempBlock
        } else {
            Self::HardBlock
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoAction => "no_action",
            Self::Monitor => "monitor",
            Self::Warn => "warn",
            Self::SoftBlock => "soft_block",
            Self::TempBlock => "temp_block",
            Self::HardBlock => "hard_block",
        }
    }
}

/// Temporal sub-analysis result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalScore {
    pub score: f64,
    pub reasons: Vec<String>,
    /// Max distinct IPs in any simultaneity group of size two or more;
    /// 1 for a lone connection, 0 when nothing valid was observed.
    pub simultaneous_count: u32,
    pub rapid_switches: u32,
}

/// Geographic sub-analysis result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoScore {
    pub score: f64,
    pub reasons: Vec<String>,
    pub countries: Vec<String>,
    pub cities: Vec<String>,
    pub impossible_travel_detected: bool,
}

/// Provider-class sub-analysis result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsnScore {
    pub score: f64,
    pub reasons: Vec<String>,
    pub asn_types: Vec<String>,
    pub is_mobile_carrier: bool,
    pub is_datacenter: bool,
    pub is_vpn: bool,
}

/// Baseline-deviation sub-analysis result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileScore {
    pub score: f64,
    pub reasons: Vec<String>,
    pub deviation_from_baseline: f64,
}

/// Device-fingerprint sub-analysis result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceScore {
    pub score: f64,
    pub reasons: Vec<String>,
    pub unique_fingerprints: u32,
    pub distinct_os_classes: u32,
}

/// Per-analyzer contributions before weighting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub temporal: TemporalScore,
    pub geo: GeoScore,
    pub asn: AsnScore,
    pub profile: ProfileScore,
    pub device: DeviceScore,
}

/// Final weighted violation verdict for one subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationScore {
    /// Weighted, modified total in `[0, 100]`.
    pub total: f64,
    pub breakdown: ScoreBreakdown,
    pub recommended_action: ViolationAction,
    /// `min(1, total / 100)`.
    pub confidence: f64,
    /// Human-readable reasons, analyzer order preserved.
    pub reasons: Vec<String>,
}

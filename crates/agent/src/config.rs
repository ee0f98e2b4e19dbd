use std::path::{Path, PathBuf};

use serde::Deserialize;
use uuid::Uuid;

use crate::error::AgentError;
use crate::reporter::ReporterConfig;

/// Node-agent configuration, loaded from a TOML file.
///
/// ```toml
/// node_uuid = "6c1f6e6e-..."
/// xray_log_path = "/var/log/xray/access.log"
///
/// [reporter]
/// collector_url = "http://collector.example.net:8080"
/// agent_token = "..."
/// node_uuid = "6c1f6e6e-..."
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub node_uuid: Uuid,
    pub xray_log_path: PathBuf,
    /// Tail bytes read on startup to establish the offset.
    #[serde(default = "default_buffer_bytes")]
    pub log_read_buffer_bytes: u64,
    /// Seconds between tail polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Bound of the tailer-to-reporter queue; full means the tailer drops
    /// the oldest pending batch.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    pub reporter: ReporterConfig,
}

fn default_buffer_bytes() -> u64 {
    64 * 1024
}

fn default_poll_interval() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    64
}

impl AgentConfig {
    /// Load from a TOML file.
    ///
    /// # Errors
    ///
    /// [`AgentError::Config`] on read or parse failure.
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| AgentError::Config(e.to_string()))
    }
}

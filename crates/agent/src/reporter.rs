use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use argus_core::{BatchReport, BatchResponse, ConnectionReport};

use crate::error::AgentError;

/// Reporter settings. The agent token is the node's sole credential.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ReporterConfig {
    /// Collector base URL, e.g. `http://collector.example.net:8080`.
    pub collector_url: String,
    pub agent_token: String,
    pub node_uuid: Uuid,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_request_timeout() -> u64 {
    15
}

/// Exponential backoff, 1s base, capped at 60s.
fn backoff(attempt: u32) -> Duration {
    let secs = 1u64 << attempt.min(6);
    Duration::from_secs(secs.min(60))
}

/// Posts authenticated batches to the collector.
///
/// Transport errors and 5xx responses retry with backoff; 401/403 drop
/// the batch permanently because a rejected token cannot heal by itself.
/// The reporter holds no state beyond the HTTP client: a lost batch is
/// recovered by the next tail cycle observing the same open sessions.
pub struct BatchReporter {
    config: ReporterConfig,
    client: reqwest::Client,
}

impl BatchReporter {
    /// # Errors
    ///
    /// [`AgentError::Config`] when the HTTP client cannot be built.
    pub fn new(config: ReporterConfig) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AgentError::Config(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/v1/connections/batch",
            self.config.collector_url.trim_end_matches('/')
        )
    }

    /// Send one batch, retrying transient failures.
    pub async fn send(&self, connections: Vec<ConnectionReport>) -> Result<BatchResponse, AgentError> {
        let batch = BatchReport::new(self.config.node_uuid, connections);
        let mut last_error = String::new();

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                let delay = backoff(attempt - 1);
                debug!(attempt, ?delay, "retrying batch delivery");
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.config.agent_token)
                .json(&batch)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, error = %e, "batch transport error");
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            match status.as_u16() {
                200..=299 => {
                    let ack: BatchResponse = response
                        .json()
                        .await
                        .map_err(|e| AgentError::Schema(e.to_string()))?;
                    info!(
                        processed = ack.processed,
                        errors = ack.errors,
                        "batch accepted"
                    );
                    return Ok(ack);
                }
                // Credential problems are permanent for this process:
                // drop the batch and escalate locally.
                401 | 403 => return Err(AgentError::Rejected(status.as_u16())),
                422 => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(AgentError::Schema(body));
                }
                s => {
                    warn!(attempt, status = s, "collector returned an error status");
                    last_error = format!("status {s}");
                }
            }
        }

        Err(AgentError::Exhausted {
            attempts: self.config.max_attempts,
            last_error,
        })
    }
}

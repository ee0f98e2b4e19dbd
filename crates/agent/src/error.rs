use thiserror::Error;

/// Node-agent failures.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The access log is missing or unreadable. The tailer yields an
    /// empty batch and retries next cycle.
    #[error("access log unreadable: {0}")]
    LogUnreadable(String),

    /// The collector rejected our credentials. The batch is dropped
    /// permanently; retrying with the same token cannot succeed.
    #[error("collector rejected the batch with status {0}")]
    Rejected(u16),

    /// The collector refused the payload shape.
    #[error("collector rejected the batch schema: {0}")]
    Schema(String),

    /// Transport-level failure on the final retry.
    #[error("batch delivery failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("configuration error: {0}")]
    Config(String),
}

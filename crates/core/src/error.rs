use thiserror::Error;

/// Failure kinds for calls that leave the process: the enrichment upstream,
/// the ASN registry, and the control-plane REST contract.
///
/// Each kind carries a stable short code for operator diagnostics; the code
/// never changes even if the display text does.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream rejected credentials")]
    Unauthorized,

    #[error("upstream resource not found")]
    NotFound,

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream rate limit exceeded")]
    RateLimited,

    #[error("upstream server error: {0}")]
    Server(String),

    #[error("upstream response invalid: {0}")]
    Validation(String),
}

impl UpstreamError {
    /// Stable diagnostic code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "E_UPSTREAM_AUTH",
            Self::NotFound => "E_UPSTREAM_MISSING",
            Self::Network(_) => "E_UPSTREAM_NET",
            Self::Timeout => "E_UPSTREAM_TIMEOUT",
            Self::RateLimited => "E_UPSTREAM_RATE",
            Self::Server(_) => "E_UPSTREAM_5XX",
            Self::Validation(_) => "E_UPSTREAM_SCHEMA",
        }
    }

    /// Whether a retry with backoff is worthwhile.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::RateLimited | Self::Server(_)
        )
    }
}

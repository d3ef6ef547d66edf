use std::time::Duration;

use thiserror::Error;

use crate::result::Stage;

/// Error reported by an STT or LLM provider for a single attempt.
///
/// Providers collapse their transport and HTTP failures into this enum so the
/// retry layer can classify them without knowing which service produced them.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transient errors are worth retrying; validation and auth failures will
    /// fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout | ProviderError::Connection(_) => true,
            ProviderError::Status { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            ProviderError::Auth(_) | ProviderError::InvalidResponse(_) => false,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_connect() {
            ProviderError::Connection(err.to_string())
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Connection(err.to_string())
        }
    }
}

/// Terminal classification of a failed pipeline request.
///
/// Per-attempt transient errors never surface individually; only these
/// outcomes cross the orchestrator boundary.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    #[error("circuit open for {stage}")]
    CircuitOpen { stage: Stage },

    #[error("deadline exceeded during {stage}")]
    DeadlineExceeded { stage: Stage },

    #[error("retries exhausted during {stage}")]
    RetriesExhausted {
        stage: Stage,
        #[source]
        cause: ProviderError,
    },

    #[error("permanent failure during {stage}")]
    NonRetryable {
        stage: Stage,
        #[source]
        cause: ProviderError,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Short machine-readable label for stage events and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::RateLimited { .. } => "rate_limited",
            PipelineError::CircuitOpen { .. } => "circuit_open",
            PipelineError::DeadlineExceeded { .. } => "deadline_exceeded",
            PipelineError::RetriesExhausted { .. } => "retries_exhausted",
            PipelineError::NonRetryable { .. } => "non_retryable",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Config(_) => "config",
        }
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

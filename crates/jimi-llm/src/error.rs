//! LLM error types and transience classification.

use thiserror::Error;

/// Errors from LLM providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key configured for a remote endpoint.
    #[error("no API key configured for provider '{provider}'")]
    ApiKeyNotConfigured {
        /// Provider name.
        provider: String,
    },

    /// The request could not be sent (network failure).
    #[error("API request failed: {0}")]
    ApiRequestFailed(String),

    /// The endpoint returned a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response body could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The stream broke mid-response.
    #[error("streaming error: {0}")]
    StreamingError(String),
}

impl LlmError {
    /// Whether a retry with backoff may succeed.
    ///
    /// Network failures, stream interruptions, rate limits (429), and
    /// server errors (5xx) are transient; auth and request errors are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ApiRequestFailed(_) | Self::StreamingError(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::ApiKeyNotConfigured { .. } | Self::InvalidResponse(_) => false,
        }
    }
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

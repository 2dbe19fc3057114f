use std::time::Duration;

/// Why a completion provider could not produce (or finish) a stream.
///
/// The `Display` text is what a chat turn reports to the user after the
/// `ERROR: An error occurred during LLM call:` prefix.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    /// Map a non-success HTTP status and its extracted message.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            429 => Self::RateLimited(body),
            400..=499 => Self::InvalidRequest(body),
            _ => Self::ServerError { status, body },
        }
    }

    /// Transient upstream failures. Logged with the failure; turns never retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::ServerError { .. } | Self::NetworkError(_) | Self::StreamInterrupted(_)
        )
    }

    /// Stable label for logs and the `kind` metric dimension.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited(_) => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Timeout(_) => "timeout",
        }
    }
}

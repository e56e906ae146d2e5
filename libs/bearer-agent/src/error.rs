use thiserror::Error;

/// Errors produced while talking to the Bearer collector.
///
/// None of these ever reach the caller of an intercepted request: the
/// interceptor only logs them. They are returned directly from
/// [`Agent::config`](crate::Agent::config) and
/// [`Agent::log_records`](crate::Agent::log_records).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AgentError {
    /// Collector request could not be built
    #[error("Failed to build collector request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Secret key or another header value is not a valid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Collector endpoint URL could not be parsed
    #[error("Invalid collector URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Transport error (network, connection, body read, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS setup error for the default collector transport
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Collector answered with a status other than 200
    #[error("Unexpected collector status code: {}", .0.as_u16())]
    UnexpectedStatus(http::StatusCode),

    /// Envelope serialization or config deserialization failed
    #[error("JSON processing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Collector response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Background delivery was requested outside of a Tokio runtime
    #[error("Background delivery requires a running Tokio runtime")]
    NoRuntime,
}

impl From<hyper::Error> for AgentError {
    fn from(err: hyper::Error) -> Self {
        AgentError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for AgentError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        AgentError::Transport(Box::new(err))
    }
}

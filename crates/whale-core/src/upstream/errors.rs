use std::time::Duration;
use thiserror::Error;

/// Failure of a single upstream attempt.
///
/// Retry decisions are made on this type; callers outside the upstream module only
/// ever see [`UpstreamUnavailable`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Attempt exceeded the per-attempt timeout.
    #[error("Request timeout")]
    Timeout,

    /// Failed to establish a connection to the provider.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-2xx status. First field is the status code, second a truncated body.
    #[error("HTTP error: {0}")]
    HttpError(u16, String),

    /// Body was not JSON or did not contain a recognizable transaction list.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No concurrency permit became available in time.
    #[error("Concurrency limit reached")]
    ConcurrencyLimit,

    /// The request URL could not be built from configuration.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    /// Returns `true` if the attempt may be retried.
    ///
    /// Transient errors include:
    /// - Timeouts and connection failures
    /// - HTTP 5xx server errors
    /// - Concurrency permit timeouts
    ///
    /// A 4xx, throttling included, is never retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::ConnectionFailed(_) | Self::ConcurrencyLimit => true,
            Self::HttpError(status, _) => *status >= 500,
            Self::InvalidResponse(_) | Self::InvalidRequest(_) => false,
        }
    }

    /// HTTP status observed for this attempt, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpError(status, _) => Some(*status),
            _ => None,
        }
    }

    /// Static label for metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::HttpError(status, _) if *status >= 500 => "server_error",
            Self::HttpError(_, _) => "client_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::ConcurrencyLimit => "concurrency_limit",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// The upstream could not produce a page: retries were exhausted or the provider
/// rejected the request outright.
///
/// Cheap to clone so a single failed fetch can be handed to every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("upstream unavailable after {attempts} attempt(s): {reason}")]
pub struct UpstreamUnavailable {
    pub attempts: u32,
    /// Last HTTP status seen, if the provider answered at all.
    pub last_status: Option<u16>,
    /// Latency of the last attempt.
    pub last_latency: Duration,
    pub reason: String,
}

impl UpstreamUnavailable {
    #[must_use]
    pub fn from_attempt(error: &UpstreamError, attempts: u32, last_latency: Duration) -> Self {
        Self { attempts, last_status: error.status(), last_latency, reason: error.to_string() }
    }
}

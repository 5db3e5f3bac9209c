use std::time::Duration;

use hookline_core::FailureReason;
use thiserror::Error;

/// Errors raised while sending an outbound request.
///
/// A non-2xx response is not an error at this layer; it is returned as a
/// [`TransportResponse`](crate::TransportResponse) and judged by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The destination did not respond within the allowed duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A network or transport-level error occurred.
    #[error("connection error: {0}")]
    Connection(String),

    /// The request could not be built (bad URL, bad header value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Returns `true` if the error is transient and the request may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_))
    }

    /// Persisted failure code for this error.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::Timeout(_) => FailureReason::DestinationTimeout,
            Self::Connection(_) | Self::InvalidRequest(_) => FailureReason::DestinationUnreachable,
        }
    }
}

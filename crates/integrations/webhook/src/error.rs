use std::time::Duration;

use hookline_provider::TransportError;
use thiserror::Error;

/// Errors specific to the HTTP transport.
///
/// Converted into [`TransportError`] at the trait boundary.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// An HTTP-level transport error occurred.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete within its timeout.
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    /// A header name or value could not be encoded.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

impl From<WebhookError> for TransportError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::TimedOut(after) => TransportError::Timeout(after),
            WebhookError::Http(e) => {
                if e.is_timeout() {
                    TransportError::Timeout(Duration::ZERO)
                } else if e.is_builder() {
                    TransportError::InvalidRequest(e.to_string())
                } else {
                    TransportError::Connection(e.to_string())
                }
            }
            WebhookError::InvalidHeader { name, reason } => {
                TransportError::InvalidRequest(format!("header {name}: {reason}"))
            }
        }
    }
}

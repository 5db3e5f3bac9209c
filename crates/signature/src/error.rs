use thiserror::Error;

/// Errors from signing or verifying a webhook.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// The raw request body was not retained, so nothing can be verified.
    #[error("raw request body is unavailable")]
    RawBodyUnavailable,

    /// HMAC signature computation failed.
    #[error("HMAC signing error: {0}")]
    Signing(String),
}

use hookline_core::{DeliveryId, DeliveryStatus};
use hookline_signature::SignatureError;
use hookline_state::RepositoryError;
use thiserror::Error;

/// Errors raised while assembling gateway components.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A required component was missing or a config value was rejected.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Errors surfaced to the caller of [`WebhookReceiver::handle`](crate::WebhookReceiver::handle).
///
/// None of these are retried. A replayed delivery id is not an error; it is
/// reported through [`Received::duplicate`](crate::Received::duplicate).
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// No source profile is registered under this name.
    #[error("unknown webhook source: {0}")]
    UnknownSource(String),

    /// The request signature was missing, malformed or did not match.
    #[error("invalid signature for source {source_name}")]
    SignatureInvalid { source_name: String },

    /// The body was not valid JSON.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The raw body bytes were not retained, so the signature cannot be checked.
    #[error("raw request body is unavailable")]
    RawBodyUnavailable,

    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

/// Errors from dispatcher operations.
///
/// Destination failures are not errors: they are recorded on the delivery
/// and retried. These variants cover what the caller itself got wrong or
/// what the engine could not persist.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("delivery not found: {0}")]
    NotFound(DeliveryId),

    /// The delivery already reached a terminal status.
    #[error("delivery {id} is already {status}")]
    Terminal { id: DeliveryId, status: DeliveryStatus },

    /// Another attempt for this delivery is already running.
    #[error("delivery {0} already has an attempt in flight")]
    InFlight(DeliveryId),

    #[error("failed to sign delivery: {0}")]
    Signing(#[from] SignatureError),

    #[error("failed to encode payload: {0}")]
    Encoding(String),

    /// The dispatcher is shutting down and accepts no new attempts.
    #[error("dispatcher is shut down")]
    Shutdown,

    #[error("persistence failure: {0}")]
    Persistence(RepositoryError),
}

impl From<RepositoryError> for DispatchError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Terminal { id, status } => Self::Terminal { id, status },
            RepositoryError::InFlight { id } => Self::InFlight(id),
            RepositoryError::NotFound {
                kind: "delivery",
                id,
            } => Self::NotFound(DeliveryId::new(id)),
            other => Self::Persistence(other),
        }
    }
}

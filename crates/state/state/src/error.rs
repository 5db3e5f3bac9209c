use hookline_core::{DeliveryId, DeliveryStatus};
use thiserror::Error;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    Conflict { kind: &'static str, id: String },

    #[error("delivery {id} is {status} and can no longer change")]
    Terminal { id: DeliveryId, status: DeliveryStatus },

    /// Another attempt already holds the delivery in `dispatching`.
    #[error("delivery {id} already has an attempt in flight")]
    InFlight { id: DeliveryId },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether the error reports a refused mutation of a terminal delivery.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }
}

use thiserror::Error;

/// Errors raised while constructing routing primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// The event-type pattern is malformed.
    #[error("invalid event pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The dot-path used to address a payload field is malformed.
    #[error("invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The predicate literal does not fit the operator.
    #[error("invalid predicate on '{path}': {reason}")]
    InvalidPredicate { path: String, reason: String },
}

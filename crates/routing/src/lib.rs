//! Routing primitives for Hookline subscriptions.
//!
//! An [`EventPattern`] decides whether a subscription is interested in an
//! event type, and a list of [`Predicate`]s narrows that interest down to
//! payloads with particular field values. Both are validated when they are
//! constructed (or deserialized), so an invalid pattern or filter can never
//! reach the matcher.

pub mod error;
pub mod path;
pub mod pattern;
pub mod predicate;

pub use error::RoutingError;
pub use path::FieldPath;
pub use pattern::EventPattern;
pub use predicate::{Operator, Predicate, all_match};

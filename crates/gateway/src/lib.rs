//! Hookline's delivery engine.
//!
//! - [`WebhookDispatcher`] signs and posts outbound deliveries, gated by a
//!   per-destination [`CircuitBreaker`](circuit_breaker::CircuitBreaker) and
//!   retried with exponential backoff.
//! - [`WebhookReceiver`] verifies, deduplicates and stores inbound events,
//!   then runs the registered [`EventHandler`]s.
//! - [`RetryScheduler`] resubmits due retries in the background.
//!
//! Both halves are assembled with builders and share a [`Notifier`] and
//! [`WebhookMetrics`] when wired together.

pub mod builder;
pub mod circuit_breaker;
pub mod dispatcher;
pub mod error;
pub mod fallback;
pub mod handlers;
pub mod matcher;
pub mod metrics;
pub mod notifications;
pub mod receiver;
pub mod scheduler;
pub mod sources;
pub mod testing;

pub use builder::{DispatcherBuilder, ReceiverBuilder};
pub use circuit_breaker::{
    Admission, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, Permit,
    destination_key,
};
pub use dispatcher::{DispatcherStats, WebhookDispatcher};
pub use error::{DispatchError, GatewayError, ReceiveError};
pub use fallback::CircuitOpenFallback;
pub use handlers::{EventHandler, HandlerError, HandlerRegistry, handler_fn};
pub use matcher::{Match, match_subscriptions};
pub use metrics::{MetricsSnapshot, WebhookMetrics};
pub use notifications::{LifecycleEvent, LifecycleObserver, Notifier, TracingObserver};
pub use receiver::{InboundRequest, Received, WebhookReceiver};
pub use scheduler::RetryScheduler;
pub use sources::{
    GenericSource, GitHubSource, SourceKind, SourceProfile, SourceRegistry, StripeSource,
};

pub mod circuit_breaker;
pub mod delivery;
pub mod endpoint;
pub mod event;
pub mod headers;
pub mod stats;
pub mod subscription;
pub mod types;

pub use circuit_breaker::{
    CircuitBreakerActionResponse, CircuitBreakerStatus, ListCircuitBreakersResponse,
};
pub use delivery::{
    AttemptResponse, DeliveryResult, DeliveryStatus, FailedAttempt, FailureReason, StatusUpdate,
    WebhookDelivery,
};
pub use endpoint::WebhookEndpoint;
pub use event::{EventStatus, HandlerOutcome, WebhookEvent};
pub use headers::RequestHeaders;
pub use stats::{DeliveryQuery, DeliveryStats};
pub use subscription::WebhookSubscription;
pub use types::{DeliveryId, EndpointId, EventId, SourceId, SubscriptionId};

pub use hookline_routing::{EventPattern, Operator, Predicate};

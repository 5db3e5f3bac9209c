use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hookline_core::{DeliveryId, EndpointId, EventId, EventStatus, FailureReason, SourceId};
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitState;

/// A lifecycle notification emitted by the dispatcher or the receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// An outbound attempt is about to be sent.
    DeliveryAttempting {
        delivery_id: DeliveryId,
        endpoint_id: EndpointId,
        destination: String,
        attempt: u32,
    },
    /// The destination acknowledged with 2xx.
    DeliverySucceeded {
        delivery_id: DeliveryId,
        attempts: u32,
        status_code: u16,
        latency_ms: u64,
    },
    /// An attempt failed. `next_retry_at` is `None` once the delivery is
    /// exhausted.
    DeliveryFailed {
        delivery_id: DeliveryId,
        attempts: u32,
        reason: FailureReason,
        error: String,
        next_retry_at: Option<DateTime<Utc>>,
    },
    /// The circuit was open; no request was made.
    DeliveryDeferred {
        delivery_id: DeliveryId,
        destination: String,
        retry_at: DateTime<Utc>,
    },
    DeliveryCancelled {
        delivery_id: DeliveryId,
        reason: String,
    },
    CircuitTransition {
        destination: String,
        from: CircuitState,
        to: CircuitState,
    },
    /// An inbound request failed signature verification.
    SignatureInvalid { source: SourceId },
    /// An inbound delivery id was already recorded for the source.
    EventDuplicate { source: SourceId, event_id: EventId },
    HandlerFailed {
        event_id: EventId,
        handler: String,
        error: String,
    },
    /// Every handler for an inbound event has run.
    EventHandled {
        event_id: EventId,
        source: SourceId,
        event_type: String,
        status: EventStatus,
    },
}

impl LifecycleEvent {
    /// Short stable name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeliveryAttempting { .. } => "delivery.attempting",
            Self::DeliverySucceeded { .. } => "delivery.succeeded",
            Self::DeliveryFailed { .. } => "delivery.failed",
            Self::DeliveryDeferred { .. } => "delivery.deferred",
            Self::DeliveryCancelled { .. } => "delivery.cancelled",
            Self::CircuitTransition { .. } => "circuit.transition",
            Self::SignatureInvalid { .. } => "event.signature_invalid",
            Self::EventDuplicate { .. } => "event.duplicate",
            Self::HandlerFailed { .. } => "event.handler_failed",
            Self::EventHandled { .. } => "event.handled",
        }
    }
}

/// Receives lifecycle notifications.
///
/// Called inline on the dispatch or receive path, so implementations must
/// return quickly. Hand work off to a channel if it may block.
pub trait LifecycleObserver: Send + Sync {
    fn notify(&self, event: &LifecycleEvent);
}

/// Explicit registry of observers, populated at startup.
#[derive(Clone, Default)]
pub struct Notifier {
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn register(&mut self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `event` to every observer in registration order.
    ///
    /// A panicking observer is logged and skipped.
    pub fn notify(&self, event: &LifecycleEvent) {
        for observer in &self.observers {
            if catch_unwind(AssertUnwindSafe(|| observer.notify(event))).is_err() {
                warn!(kind = event.kind(), "lifecycle observer panicked");
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Observer that writes every notification to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn notify(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::DeliveryAttempting {
                delivery_id,
                destination,
                attempt,
                ..
            } => debug!(%delivery_id, %destination, attempt, "delivery attempting"),
            LifecycleEvent::DeliverySucceeded {
                delivery_id,
                attempts,
                status_code,
                latency_ms,
            } => info!(%delivery_id, attempts, status_code, latency_ms, "delivery succeeded"),
            LifecycleEvent::DeliveryFailed {
                delivery_id,
                attempts,
                reason,
                error,
                next_retry_at: Some(at),
            } => warn!(%delivery_id, attempts, %reason, %error, retry_at = %at, "delivery failed"),
            LifecycleEvent::DeliveryFailed {
                delivery_id,
                attempts,
                reason,
                error,
                next_retry_at: None,
            } => warn!(%delivery_id, attempts, %reason, %error, "delivery exhausted"),
            LifecycleEvent::DeliveryDeferred {
                delivery_id,
                destination,
                retry_at,
            } => debug!(%delivery_id, %destination, %retry_at, "delivery deferred, circuit open"),
            LifecycleEvent::DeliveryCancelled {
                delivery_id,
                reason,
            } => info!(%delivery_id, %reason, "delivery cancelled"),
            LifecycleEvent::CircuitTransition {
                destination,
                from,
                to,
            } => info!(%destination, %from, %to, "circuit breaker transition"),
            LifecycleEvent::SignatureInvalid { source } => {
                warn!(%source, "inbound signature invalid");
            }
            LifecycleEvent::EventDuplicate { source, event_id } => {
                debug!(%source, %event_id, "inbound event duplicate");
            }
            LifecycleEvent::HandlerFailed {
                event_id,
                handler,
                error,
            } => warn!(%event_id, %handler, %error, "event handler failed"),
            LifecycleEvent::EventHandled {
                event_id,
                source,
                event_type,
                status,
            } => debug!(%event_id, %source, %event_type, ?status, "event handled"),
        }
    }
}

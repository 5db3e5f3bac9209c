use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking dispatch and ingestion outcomes.
///
/// All counters use relaxed ordering. For a consistent point-in-time view,
/// call [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct WebhookMetrics {
    /// Outbound attempts actually sent.
    pub attempts: AtomicU64,
    /// Deliveries acknowledged with 2xx.
    pub delivered: AtomicU64,
    /// Attempts that failed (non-2xx, timeout, connection error).
    pub attempt_failures: AtomicU64,
    /// Retries placed on the delay queue.
    pub retries_scheduled: AtomicU64,
    /// Deliveries that ran out of attempts.
    pub exhausted: AtomicU64,
    /// Deliveries cancelled by an operator.
    pub cancelled: AtomicU64,
    /// Attempts refused because the destination circuit was open.
    pub circuit_open: AtomicU64,
    /// Circuit breaker state transitions (any direction).
    pub circuit_transitions: AtomicU64,
    /// Fallback invocations while a circuit was open.
    pub circuit_fallbacks: AtomicU64,
    /// Inbound events stored.
    pub events_received: AtomicU64,
    /// Inbound replays answered with the stored event.
    pub events_duplicate: AtomicU64,
    /// Inbound requests rejected for a bad signature.
    pub signatures_invalid: AtomicU64,
    /// Inbound requests rejected for an unparseable body.
    pub payloads_malformed: AtomicU64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: AtomicU64,
}

macro_rules! incr {
    ($($fn_name:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $fn_name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl WebhookMetrics {
    incr! {
        increment_attempts => attempts,
        increment_delivered => delivered,
        increment_attempt_failures => attempt_failures,
        increment_retries_scheduled => retries_scheduled,
        increment_exhausted => exhausted,
        increment_cancelled => cancelled,
        increment_circuit_open => circuit_open,
        increment_circuit_transitions => circuit_transitions,
        increment_circuit_fallbacks => circuit_fallbacks,
        increment_events_received => events_received,
        increment_events_duplicate => events_duplicate,
        increment_signatures_invalid => signatures_invalid,
        increment_payloads_malformed => payloads_malformed,
        increment_handler_failures => handler_failures,
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            attempt_failures: self.attempt_failures.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            circuit_open: self.circuit_open.load(Ordering::Relaxed),
            circuit_transitions: self.circuit_transitions.load(Ordering::Relaxed),
            circuit_fallbacks: self.circuit_fallbacks.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            events_duplicate: self.events_duplicate.load(Ordering::Relaxed),
            signatures_invalid: self.signatures_invalid.load(Ordering::Relaxed),
            payloads_malformed: self.payloads_malformed.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }
}

/// A plain-data snapshot of [`WebhookMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub delivered: u64,
    pub attempt_failures: u64,
    pub retries_scheduled: u64,
    pub exhausted: u64,
    pub cancelled: u64,
    pub circuit_open: u64,
    pub circuit_transitions: u64,
    pub circuit_fallbacks: u64,
    pub events_received: u64,
    pub events_duplicate: u64,
    pub signatures_invalid: u64,
    pub payloads_malformed: u64,
    pub handler_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        assert_eq!(WebhookMetrics::default().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn increment_and_snapshot() {
        let m = WebhookMetrics::default();
        m.increment_attempts();
        m.increment_attempts();
        m.increment_attempt_failures();
        m.increment_delivered();
        m.increment_circuit_open();
        m.increment_signatures_invalid();

        let snap = m.snapshot();
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.attempt_failures, 1);
        assert_eq!(snap.delivered, 1);
        assert_eq!(snap.circuit_open, 1);
        assert_eq!(snap.signatures_invalid, 1);
        assert_eq!(snap.exhausted, 0);
    }

    #[test]
    fn snapshot_serializes_flat() {
        let m = WebhookMetrics::default();
        m.increment_events_duplicate();
        let json = serde_json::to_value(m.snapshot()).unwrap();
        assert_eq!(json["events_duplicate"], 1);
        assert_eq!(json["handler_failures"], 0);
    }
}

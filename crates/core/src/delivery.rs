use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::endpoint::WebhookEndpoint;
use crate::types::{DeliveryId, EndpointId, SubscriptionId};

/// Lifecycle status of an outbound delivery.
///
/// ```text
/// pending -> dispatching -> success
///                        -> retrying -> dispatching (loop)
///                        -> exhausted
/// any non-terminal       -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Dispatching,
    Retrying,
    Success,
    Exhausted,
    Cancelled,
}

impl DeliveryStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Dispatching,
        Self::Retrying,
        Self::Success,
        Self::Exhausted,
        Self::Cancelled,
    ];

    /// Terminal deliveries are never retried or mutated again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Exhausted | Self::Cancelled)
    }

    /// Whether an attempt may claim the delivery (move it to `dispatching`).
    pub fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Retrying)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatching => "dispatching",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted reason code for the most recent delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The destination's circuit breaker refused the attempt.
    CircuitOpen,
    /// Connection could not be established or was reset.
    DestinationUnreachable,
    /// The request exceeded its timeout.
    DestinationTimeout,
    /// The destination answered with a non-2xx status.
    DestinationRejected,
    /// The attempt budget ran out.
    MaxRetriesExceeded,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::DestinationUnreachable => "destination_unreachable",
            Self::DestinationTimeout => "destination_timeout",
            Self::DestinationRejected => "destination_rejected",
            Self::MaxRetriesExceeded => "max_retries_exceeded",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the destination said (or didn't) for a single attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResponse {
    /// HTTP status code, absent when no response was received.
    pub status_code: Option<u16>,
    /// Response body, truncated by the dispatcher.
    pub body: Option<String>,
    pub latency_ms: u64,
}

/// A status-only transition (no attempt was made).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: DeliveryStatus,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<FailureReason>,
    /// Free-form detail, e.g. the cancellation reason.
    pub note: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: DeliveryStatus) -> Self {
        Self {
            status,
            next_retry_at: None,
            failure_reason: None,
            note: None,
        }
    }

    #[must_use]
    pub fn with_next_retry(mut self, at: DateTime<Utc>) -> Self {
        self.next_retry_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: FailureReason) -> Self {
        self.failure_reason = Some(reason);
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Outcome of a failed attempt, to be persisted. Counts as exactly one
/// attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    /// `None` when the budget is exhausted.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub reason: FailureReason,
    pub error: String,
    pub response: AttemptResponse,
}

impl FailedAttempt {
    pub fn is_exhausted(&self) -> bool {
        self.next_retry_at.is_none()
    }
}

/// One outbound delivery lineage: a payload bound for one endpoint, plus
/// every attempt made to get it there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: DeliveryId,
    pub endpoint_id: EndpointId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<SubscriptionId>,
    /// Destination URL, copied from the endpoint at creation time.
    pub url: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    /// Attempts actually sent to the destination. Never decreases.
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_response_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookDelivery {
    /// Create a pending delivery for `endpoint`.
    ///
    /// The endpoint's own `max_attempts` takes precedence over
    /// `default_max_attempts`.
    #[must_use]
    pub fn new(
        endpoint: &WebhookEndpoint,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        default_max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DeliveryId::generate(),
            endpoint_id: endpoint.id.clone(),
            subscription_id: None,
            url: endpoint.url.clone(),
            event_type: event_type.into(),
            payload,
            status: DeliveryStatus::Pending,
            attempts: 0,
            max_attempts: endpoint.max_attempts.unwrap_or(default_max_attempts).max(1),
            last_status_code: None,
            last_response_body: None,
            last_latency_ms: None,
            last_attempt_at: None,
            next_retry_at: None,
            failure_reason: None,
            error: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_subscription(mut self, id: SubscriptionId) -> Self {
        self.subscription_id = Some(id);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status-only transition.
    pub fn apply_status(&mut self, update: &StatusUpdate, now: DateTime<Utc>) {
        self.status = update.status;
        self.next_retry_at = update.next_retry_at;
        if update.failure_reason.is_some() {
            self.failure_reason = update.failure_reason;
        }
        if update.status == DeliveryStatus::Cancelled {
            self.cancel_reason.clone_from(&update.note);
        }
        self.updated_at = now;
    }

    /// Record a successful attempt.
    pub fn apply_success(&mut self, response: &AttemptResponse, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Success;
        self.attempts = self.attempts.saturating_add(1);
        self.record_response(response, now);
        self.next_retry_at = None;
        self.failure_reason = None;
        self.error = None;
    }

    /// Record a failed attempt.
    pub fn apply_failure(&mut self, failure: &FailedAttempt, now: DateTime<Utc>) {
        self.status = if failure.is_exhausted() {
            DeliveryStatus::Exhausted
        } else {
            DeliveryStatus::Retrying
        };
        self.attempts = self.attempts.saturating_add(1);
        self.record_response(&failure.response, now);
        self.next_retry_at = failure.next_retry_at;
        self.failure_reason = Some(failure.reason);
        self.error = Some(failure.error.clone());
    }

    fn record_response(&mut self, response: &AttemptResponse, now: DateTime<Utc>) {
        self.last_status_code = response.status_code;
        self.last_response_body.clone_from(&response.body);
        self.last_latency_ms = Some(response.latency_ms);
        self.last_attempt_at = Some(now);
        self.updated_at = now;
    }
}

/// Summary returned to callers of `dispatch` and `retry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub delivery_id: DeliveryId,
    pub status: DeliveryStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&WebhookDelivery> for DeliveryResult {
    fn from(d: &WebhookDelivery) -> Self {
        Self {
            delivery_id: d.id.clone(),
            status: d.status,
            attempts: d.attempts,
            status_code: d.last_status_code,
            next_retry_at: d.next_retry_at,
            failure_reason: d.failure_reason,
            error: d.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery() -> WebhookDelivery {
        let ep = WebhookEndpoint::new("https://example.com/hook", "s");
        WebhookDelivery::new(&ep, "order.created", serde_json::json!({"id": 1}), 5)
    }

    #[test]
    fn terminal_statuses() {
        assert!(DeliveryStatus::Success.is_terminal());
        assert!(DeliveryStatus::Exhausted.is_terminal());
        assert!(DeliveryStatus::Cancelled.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::Dispatching.is_terminal());
        assert!(!DeliveryStatus::Retrying.is_terminal());
    }

    #[test]
    fn new_delivery_is_pending() {
        let d = delivery();
        assert_eq!(d.status, DeliveryStatus::Pending);
        assert_eq!(d.attempts, 0);
        assert_eq!(d.max_attempts, 5);
        assert_eq!(d.url, "https://example.com/hook");
    }

    #[test]
    fn endpoint_max_attempts_overrides_default() {
        let ep = WebhookEndpoint::new("https://example.com/hook", "s").with_max_attempts(2);
        let d = WebhookDelivery::new(&ep, "x", serde_json::Value::Null, 5);
        assert_eq!(d.max_attempts, 2);
    }

    #[test]
    fn failure_then_success() {
        let mut d = delivery();
        let now = Utc::now();
        d.apply_failure(
            &FailedAttempt {
                next_retry_at: Some(now),
                reason: FailureReason::DestinationRejected,
                error: "HTTP 500".into(),
                response: AttemptResponse {
                    status_code: Some(500),
                    body: Some("boom".into()),
                    latency_ms: 12,
                },
            },
            now,
        );
        assert_eq!(d.status, DeliveryStatus::Retrying);
        assert_eq!(d.attempts, 1);
        assert_eq!(d.failure_reason, Some(FailureReason::DestinationRejected));

        d.apply_success(
            &AttemptResponse {
                status_code: Some(200),
                body: None,
                latency_ms: 3,
            },
            now,
        );
        assert_eq!(d.status, DeliveryStatus::Success);
        assert_eq!(d.attempts, 2);
        assert!(d.failure_reason.is_none());
        assert_eq!(DeliveryResult::from(&d).status_code, Some(200));
    }

    #[test]
    fn each_failure_counts_one_attempt() {
        let mut d = delivery();
        d.attempts = 3;
        d.apply_failure(
            &FailedAttempt {
                next_retry_at: None,
                reason: FailureReason::MaxRetriesExceeded,
                error: "HTTP 502".into(),
                response: AttemptResponse::default(),
            },
            Utc::now(),
        );
        assert_eq!(d.attempts, 4);
        assert_eq!(d.status, DeliveryStatus::Exhausted);
    }

    #[test]
    fn only_waiting_deliveries_are_claimable() {
        assert!(DeliveryStatus::Pending.is_claimable());
        assert!(DeliveryStatus::Retrying.is_claimable());
        assert!(!DeliveryStatus::Dispatching.is_claimable());
        assert!(!DeliveryStatus::Success.is_claimable());
        assert!(!DeliveryStatus::Cancelled.is_claimable());
    }

    #[test]
    fn cancellation_records_reason() {
        let mut d = delivery();
        d.apply_status(
            &StatusUpdate::new(DeliveryStatus::Cancelled).with_note("customer removed"),
            Utc::now(),
        );
        assert_eq!(d.cancel_reason.as_deref(), Some("customer removed"));
        assert!(d.is_terminal());
    }

    #[test]
    fn reason_codes() {
        assert_eq!(FailureReason::CircuitOpen.to_string(), "circuit_open");
        assert_eq!(
            serde_json::to_string(&FailureReason::MaxRetriesExceeded).unwrap(),
            "\"max_retries_exceeded\""
        );
    }
}

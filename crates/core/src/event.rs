use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::headers::RequestHeaders;
use crate::types::{EventId, SourceId};

/// Processing status of an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Stored, handlers not yet finished.
    Received,
    /// Every handler completed without error.
    Processed,
    /// At least one handler failed.
    Failed,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Processed => write!(f, "processed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of running one registered handler against an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    /// Handler name as registered.
    pub handler: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandlerOutcome {
    pub fn ok(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(handler: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// An inbound webhook notification accepted from an external producer.
///
/// Everything except the status, processing timestamp, and handler results
/// is fixed once the event is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: EventId,
    /// Producer the event came from.
    pub source: SourceId,
    pub event_type: String,
    /// Producer-supplied delivery identifier used for de-duplication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub headers: RequestHeaders,
    pub status: EventStatus,
    #[serde(default)]
    pub handler_results: Vec<HandlerOutcome>,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    /// Create a freshly received event with a generated id.
    #[must_use]
    pub fn new(
        source: impl Into<SourceId>,
        event_type: impl Into<String>,
        delivery_id: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::generate(),
            source: source.into(),
            event_type: event_type.into(),
            delivery_id,
            payload,
            headers: RequestHeaders::default(),
            status: EventStatus::Received,
            handler_results: Vec::new(),
            received_at: Utc::now(),
            processed_at: None,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = headers;
        self
    }
}

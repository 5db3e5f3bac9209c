use chrono::{DateTime, Utc};
use hookline_routing::{EventPattern, Predicate, all_match};
use serde::{Deserialize, Serialize};

use crate::types::{EndpointId, SubscriptionId};

/// Binds an endpoint to one or more event-type patterns, optionally
/// narrowed by payload filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: SubscriptionId,
    pub endpoint_id: EndpointId,
    pub event_types: Vec<EventPattern>,
    /// Conjunctive payload filters. Empty means unconditional.
    #[serde(default)]
    pub filters: Vec<Predicate>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl WebhookSubscription {
    #[must_use]
    pub fn new(endpoint_id: impl Into<EndpointId>, event_types: Vec<EventPattern>) -> Self {
        Self {
            id: SubscriptionId::generate(),
            endpoint_id: endpoint_id.into(),
            event_types,
            filters: Vec::new(),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<SubscriptionId>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether any of the subscription's patterns matches `event_type`.
    pub fn matches_event_type(&self, event_type: &str) -> bool {
        self.event_types.iter().any(|p| p.matches(event_type))
    }

    /// Event-type match plus every filter predicate.
    pub fn matches(&self, event_type: &str, payload: &serde_json::Value) -> bool {
        self.matches_event_type(event_type) && all_match(&self.filters, payload)
    }
}

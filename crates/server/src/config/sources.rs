use std::sync::Arc;

use hookline_core::{EventPattern, Predicate, WebhookEndpoint, WebhookSubscription};
use hookline_gateway::{GenericSource, SourceKind, SourceProfile, StripeSource};
use hookline_signature::SignatureScheme;
use serde::Deserialize;

/// An inbound webhook producer.
///
/// ```toml
/// [[sources]]
/// name = "stripe"
/// kind = "stripe"
/// secret = "whsec_..."
/// tolerance_seconds = 300
/// forward = true
/// ```
#[derive(Deserialize)]
pub struct SourceConfig {
    /// Path segment under `/receive/`.
    pub name: String,
    #[serde(default)]
    pub kind: SourceKind,
    pub secret: String,
    /// Replay window for timestamped signatures (`stripe` only).
    pub tolerance_seconds: Option<u64>,
    /// Custom verification scheme (`generic` only).
    pub signature: Option<SignatureScheme>,
    /// Publish every accepted event to matching subscriptions.
    #[serde(default)]
    pub forward: bool,
}

impl SourceConfig {
    pub fn profile(&self) -> Arc<dyn SourceProfile> {
        match (self.kind, &self.signature, self.tolerance_seconds) {
            (SourceKind::Generic, Some(scheme), _) => Arc::new(
                GenericSource::new(self.name.as_str(), self.secret.as_str())
                    .with_scheme(scheme.clone()),
            ),
            (SourceKind::Stripe, _, Some(tolerance)) => Arc::new(
                StripeSource::new(self.name.as_str(), self.secret.as_str())
                    .with_tolerance_seconds(tolerance),
            ),
            (kind, _, _) => kind.profile(self.name.as_str(), self.secret.as_str()),
        }
    }
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("forward", &self.forward)
            .finish_non_exhaustive()
    }
}

/// An outbound destination.
///
/// ```toml
/// [[endpoints]]
/// id = "crm"
/// url = "https://crm.example.com/hooks"
/// secret = "s3cret"
/// event_types = ["invoice.*"]
/// ```
#[derive(Deserialize)]
pub struct EndpointConfig {
    pub id: String,
    pub url: String,
    pub secret: String,
    /// Allow-list; empty admits every event type.
    #[serde(default)]
    pub event_types: Vec<EventPattern>,
    pub description: Option<String>,
    /// Overrides `dispatcher.max_attempts`.
    pub max_attempts: Option<u32>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl EndpointConfig {
    pub fn to_endpoint(&self) -> WebhookEndpoint {
        let mut endpoint = WebhookEndpoint::new(self.url.as_str(), self.secret.as_str())
            .with_id(self.id.as_str())
            .with_event_types(self.event_types.clone());
        if let Some(description) = &self.description {
            endpoint = endpoint.with_description(description.as_str());
        }
        if let Some(max_attempts) = self.max_attempts {
            endpoint = endpoint.with_max_attempts(max_attempts);
        }
        if !self.active {
            endpoint = endpoint.inactive();
        }
        endpoint
    }
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("event_types", &self.event_types)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Binds an endpoint to event types, optionally filtered on the payload.
///
/// ```toml
/// [[subscriptions]]
/// endpoint = "crm"
/// event_types = ["invoice.paid"]
/// filters = [{ field = "data.amount", op = "gte", value = 1000 }]
/// ```
#[derive(Debug, Deserialize)]
pub struct SubscriptionConfig {
    /// Generated when omitted.
    pub id: Option<String>,
    /// Id of a configured endpoint.
    pub endpoint: String,
    pub event_types: Vec<EventPattern>,
    #[serde(default)]
    pub filters: Vec<Predicate>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl SubscriptionConfig {
    pub fn to_subscription(&self) -> WebhookSubscription {
        let mut subscription =
            WebhookSubscription::new(self.endpoint.as_str(), self.event_types.clone());
        if let Some(id) = &self.id {
            subscription = subscription.with_id(id.as_str());
        }
        for filter in &self.filters {
            subscription = subscription.with_filter(filter.clone());
        }
        if !self.active {
            subscription = subscription.inactive();
        }
        subscription
    }
}

fn default_active() -> bool {
    true
}

use chrono::{DateTime, Utc};
use hookline_routing::EventPattern;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::types::EndpointId;

/// A subscriber-owned HTTP destination for outbound deliveries.
///
/// The shared secret is used to sign every request sent to the endpoint. It
/// is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: EndpointId,
    pub url: String,
    #[serde(skip_serializing)]
    pub secret: SecretString,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Optional allow-list of event-type patterns. Empty admits every type.
    #[serde(default)]
    pub event_types: Vec<EventPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Overrides the dispatcher's default attempt budget for this endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl WebhookEndpoint {
    /// Create an active endpoint with a generated id and no allow-list.
    #[must_use]
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: EndpointId::generate(),
            url: url.into(),
            secret: SecretString::new(secret.into()),
            active: true,
            event_types: Vec::new(),
            description: None,
            max_attempts: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<EndpointId>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_event_types(mut self, patterns: Vec<EventPattern>) -> Self {
        self.event_types = patterns;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether the endpoint's allow-list admits `event_type`.
    pub fn accepts_event(&self, event_type: &str) -> bool {
        self.event_types.is_empty() || self.event_types.iter().any(|p| p.matches(event_type))
    }
}

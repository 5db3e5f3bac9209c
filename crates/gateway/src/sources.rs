use std::collections::HashMap;
use std::sync::Arc;

use hookline_core::{RequestHeaders, SourceId};
use hookline_signature::SignatureScheme;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload fields consulted, in order, when a source cannot name the event
/// type itself.
const GENERIC_TYPE_FIELDS: [&str; 3] = ["type", "event", "event_type"];

/// Event type used when nothing else identifies the event.
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

/// Provider-specific knowledge about an inbound webhook producer.
///
/// One implementation per provider. The receiver looks profiles up by
/// source id in a [`SourceRegistry`].
pub trait SourceProfile: Send + Sync {
    fn source(&self) -> &SourceId;

    /// Scheme used to verify requests from this source.
    fn signature(&self) -> &SignatureScheme;

    fn secret(&self) -> &SecretString;

    /// Event type as the provider reports it, if it does.
    fn event_type(&self, headers: &RequestHeaders, payload: &Value) -> Option<String>;

    /// Provider-assigned delivery id used for deduplication.
    fn delivery_id(&self, headers: &RequestHeaders, payload: &Value) -> Option<String>;
}

/// Provider-specific event type, then the generic payload fields, then
/// [`UNKNOWN_EVENT_TYPE`].
pub fn resolve_event_type(
    profile: &dyn SourceProfile,
    headers: &RequestHeaders,
    payload: &Value,
) -> String {
    profile
        .event_type(headers, payload)
        .or_else(|| {
            GENERIC_TYPE_FIELDS
                .iter()
                .find_map(|field| non_empty_str(payload.get(field)))
        })
        .unwrap_or_else(|| UNKNOWN_EVENT_TYPE.to_owned())
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn header_value(headers: &RequestHeaders, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

// -- Generic -----------------------------------------------------------------

/// Hookline's own format: `X-Webhook-*` headers and the header-alias
/// signature scheme.
#[derive(Debug)]
pub struct GenericSource {
    source: SourceId,
    secret: SecretString,
    scheme: SignatureScheme,
}

impl GenericSource {
    pub fn new(source: impl Into<SourceId>, secret: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            secret: SecretString::new(secret.into()),
            scheme: SignatureScheme::generic(),
        }
    }

    /// Verify with `scheme` instead of the default header-alias scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: SignatureScheme) -> Self {
        self.scheme = scheme;
        self
    }
}

impl SourceProfile for GenericSource {
    fn source(&self) -> &SourceId {
        &self.source
    }

    fn signature(&self) -> &SignatureScheme {
        &self.scheme
    }

    fn secret(&self) -> &SecretString {
        &self.secret
    }

    fn event_type(&self, headers: &RequestHeaders, _payload: &Value) -> Option<String> {
        header_value(headers, "X-Webhook-Event")
    }

    fn delivery_id(&self, headers: &RequestHeaders, _payload: &Value) -> Option<String> {
        header_value(headers, "X-Webhook-Delivery-Id")
    }
}

// -- GitHub ------------------------------------------------------------------

#[derive(Debug)]
pub struct GitHubSource {
    source: SourceId,
    secret: SecretString,
    scheme: SignatureScheme,
}

impl GitHubSource {
    pub fn new(source: impl Into<SourceId>, secret: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            secret: SecretString::new(secret.into()),
            scheme: SignatureScheme::github(),
        }
    }
}

impl SourceProfile for GitHubSource {
    fn source(&self) -> &SourceId {
        &self.source
    }

    fn signature(&self) -> &SignatureScheme {
        &self.scheme
    }

    fn secret(&self) -> &SecretString {
        &self.secret
    }

    fn event_type(&self, headers: &RequestHeaders, _payload: &Value) -> Option<String> {
        header_value(headers, "X-GitHub-Event")
    }

    fn delivery_id(&self, headers: &RequestHeaders, _payload: &Value) -> Option<String> {
        header_value(headers, "X-GitHub-Delivery")
    }
}

// -- Stripe ------------------------------------------------------------------

#[derive(Debug)]
pub struct StripeSource {
    source: SourceId,
    secret: SecretString,
    scheme: SignatureScheme,
}

impl StripeSource {
    pub fn new(source: impl Into<SourceId>, secret: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            secret: SecretString::new(secret.into()),
            scheme: SignatureScheme::stripe(),
        }
    }

    /// Override the timestamp tolerance (default 300 s).
    #[must_use]
    pub fn with_tolerance_seconds(mut self, tolerance_seconds: u64) -> Self {
        if let SignatureScheme::Timestamped {
            tolerance_seconds: current,
            ..
        } = &mut self.scheme
        {
            *current = tolerance_seconds;
        }
        self
    }
}

impl SourceProfile for StripeSource {
    fn source(&self) -> &SourceId {
        &self.source
    }

    fn signature(&self) -> &SignatureScheme {
        &self.scheme
    }

    fn secret(&self) -> &SecretString {
        &self.secret
    }

    fn event_type(&self, _headers: &RequestHeaders, payload: &Value) -> Option<String> {
        non_empty_str(payload.get("type"))
    }

    fn delivery_id(&self, _headers: &RequestHeaders, payload: &Value) -> Option<String> {
        non_empty_str(payload.get("id"))
    }
}

// -- Registry ----------------------------------------------------------------

/// Which built-in profile a configured source uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Generic,
    Github,
    Stripe,
}

impl SourceKind {
    /// Build the profile for `source` with `secret`.
    pub fn profile(
        self,
        source: impl Into<SourceId>,
        secret: impl Into<String>,
    ) -> Arc<dyn SourceProfile> {
        match self {
            Self::Generic => Arc::new(GenericSource::new(source, secret)),
            Self::Github => Arc::new(GitHubSource::new(source, secret)),
            Self::Stripe => Arc::new(StripeSource::new(source, secret)),
        }
    }
}

/// Lookup table from source id to profile.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    profiles: HashMap<SourceId, Arc<dyn SourceProfile>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `profile` under its own source id, replacing any previous
    /// profile for that id.
    pub fn register(&mut self, profile: Arc<dyn SourceProfile>) {
        self.profiles.insert(profile.source().clone(), profile);
    }

    #[must_use]
    pub fn with(mut self, profile: Arc<dyn SourceProfile>) -> Self {
        self.register(profile);
        self
    }

    pub fn get(&self, source: &str) -> Option<&Arc<dyn SourceProfile>> {
        self.profiles.get(&SourceId::new(source))
    }

    /// Registered source ids, sorted.
    pub fn sources(&self) -> Vec<&SourceId> {
        let mut ids: Vec<&SourceId> = self.profiles.keys().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.sources())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn github_reads_headers() {
        let profile = GitHubSource::new("github", "s");
        let headers = RequestHeaders::new()
            .with("x-github-event", "push")
            .with("X-GitHub-Delivery", "72d3162e");
        assert_eq!(profile.event_type(&headers, &json!({})).as_deref(), Some("push"));
        assert_eq!(
            profile.delivery_id(&headers, &json!({})).as_deref(),
            Some("72d3162e")
        );
        assert_eq!(profile.signature().header_name(), "X-Hub-Signature-256");
    }

    #[test]
    fn stripe_reads_payload() {
        let profile = StripeSource::new("stripe", "whsec");
        let payload = json!({"id": "evt_1", "type": "invoice.paid"});
        let headers = RequestHeaders::new();
        assert_eq!(
            profile.event_type(&headers, &payload).as_deref(),
            Some("invoice.paid")
        );
        assert_eq!(profile.delivery_id(&headers, &payload).as_deref(), Some("evt_1"));
    }

    #[test]
    fn stripe_tolerance_can_be_overridden() {
        let profile = StripeSource::new("stripe", "whsec").with_tolerance_seconds(30);
        assert!(matches!(
            profile.signature(),
            SignatureScheme::Timestamped {
                tolerance_seconds: 30,
                ..
            }
        ));
    }

    #[test]
    fn event_type_falls_back_through_generic_fields() {
        let profile = GenericSource::new("acme", "s");
        let none = RequestHeaders::new();

        let cases = [
            (json!({"type": "a", "event": "b"}), "a"),
            (json!({"event": "b", "event_type": "c"}), "b"),
            (json!({"event_type": "c"}), "c"),
            (json!({"type": ""}), UNKNOWN_EVENT_TYPE),
            (json!({"type": 7}), UNKNOWN_EVENT_TYPE),
            (json!([1, 2]), UNKNOWN_EVENT_TYPE),
        ];
        for (payload, expected) in cases {
            assert_eq!(resolve_event_type(&profile, &none, &payload), expected);
        }

        let headers = RequestHeaders::new().with("X-Webhook-Event", "order.created");
        assert_eq!(
            resolve_event_type(&profile, &headers, &json!({"type": "ignored"})),
            "order.created"
        );
    }

    #[test]
    fn registry_looks_up_by_source_id() {
        let registry = SourceRegistry::new()
            .with(SourceKind::Github.profile("github", "a"))
            .with(SourceKind::Stripe.profile("payments", "b"));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("github").is_some());
        assert!(registry.get("payments").is_some());
        assert!(registry.get("gitlab").is_none());
        assert_eq!(
            registry
                .sources()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>(),
            vec!["github", "payments"]
        );
    }

    #[test]
    fn source_kind_deserializes_snake_case() {
        let kind: SourceKind = serde_json::from_value(json!("github")).unwrap();
        assert_eq!(kind, SourceKind::Github);
    }
}

use std::sync::Arc;

use hookline_executor::DispatcherConfig;
use hookline_provider::DynTransport;
use hookline_signature::SignatureScheme;
use hookline_state::WebhookRepository;

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::dispatcher::{DispatcherParts, WebhookDispatcher};
use crate::error::GatewayError;
use crate::fallback::CircuitOpenFallback;
use crate::handlers::{EventHandler, HandlerRegistry};
use crate::metrics::WebhookMetrics;
use crate::notifications::{LifecycleObserver, Notifier};
use crate::receiver::WebhookReceiver;
use crate::sources::{SourceProfile, SourceRegistry};

/// Fluent builder for a [`WebhookDispatcher`].
///
/// A repository and a transport must be supplied. Everything else has a
/// default: [`DispatcherConfig::default`], the default breaker config for
/// every destination, and the header-alias signature scheme.
pub struct DispatcherBuilder {
    repository: Option<Arc<dyn WebhookRepository>>,
    transport: Option<Arc<dyn DynTransport>>,
    config: DispatcherConfig,
    breaker_config: CircuitBreakerConfig,
    breaker_overrides: Vec<(String, CircuitBreakerConfig)>,
    signature: SignatureScheme,
    notifier: Notifier,
    fallbacks: Vec<Arc<dyn CircuitOpenFallback>>,
    metrics: Option<Arc<WebhookMetrics>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            repository: None,
            transport: None,
            config: DispatcherConfig::default(),
            breaker_config: CircuitBreakerConfig::default(),
            breaker_overrides: Vec::new(),
            signature: SignatureScheme::generic(),
            notifier: Notifier::new(),
            fallbacks: Vec::new(),
            metrics: None,
        }
    }

    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn WebhookRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn DynTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Breaker config used for destinations without an override.
    #[must_use]
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Breaker config for one destination (any URL on it works).
    #[must_use]
    pub fn circuit_breaker_override(
        mut self,
        destination: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Self {
        self.breaker_overrides.push((destination.into(), config));
        self
    }

    /// Scheme used to sign outbound requests.
    #[must_use]
    pub fn signature(mut self, scheme: SignatureScheme) -> Self {
        self.signature = scheme;
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.notifier.register(observer);
        self
    }

    /// Replace the notifier, e.g. to share one with a receiver.
    #[must_use]
    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn fallback(mut self, fallback: Arc<dyn CircuitOpenFallback>) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    /// Share counters with other components. A fresh set is created
    /// otherwise.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<WebhookMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] when the repository or
    /// transport is missing, or when a config fails validation.
    pub fn build(self) -> Result<WebhookDispatcher, GatewayError> {
        let repository = self
            .repository
            .ok_or_else(|| GatewayError::Configuration("a repository is required".into()))?;
        let transport = self
            .transport
            .ok_or_else(|| GatewayError::Configuration("a transport is required".into()))?;

        self.config
            .validate()
            .map_err(|e| GatewayError::Configuration(format!("dispatcher: {e}")))?;
        self.breaker_config
            .validate()
            .map_err(|e| GatewayError::Configuration(format!("circuit_breaker: {e}")))?;

        let mut breakers = CircuitBreakerRegistry::new(self.breaker_config);
        for (destination, config) in self.breaker_overrides {
            config.validate().map_err(|e| {
                GatewayError::Configuration(format!("circuit_breaker override {destination}: {e}"))
            })?;
            breakers = breakers.with_override(&destination, config);
        }

        Ok(WebhookDispatcher::from_parts(DispatcherParts {
            repository,
            transport,
            breakers: Arc::new(breakers),
            signature: self.signature,
            config: self.config,
            notifier: self.notifier,
            fallbacks: self.fallbacks,
            metrics: self.metrics.unwrap_or_default(),
        }))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for a [`WebhookReceiver`].
///
/// Only the repository is required. A receiver with no sources rejects
/// every request as an unknown source.
#[derive(Default)]
pub struct ReceiverBuilder {
    repository: Option<Arc<dyn WebhookRepository>>,
    sources: SourceRegistry,
    handlers: HandlerRegistry,
    notifier: Notifier,
    metrics: Option<Arc<WebhookMetrics>>,
}

impl ReceiverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn WebhookRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    #[must_use]
    pub fn source(mut self, profile: Arc<dyn SourceProfile>) -> Self {
        self.sources.register(profile);
        self
    }

    /// Register a handler for one event type from `source`.
    #[must_use]
    pub fn handler(
        mut self,
        name: impl Into<String>,
        source: &str,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        self.handlers.on(name, source, event_type, handler);
        self
    }

    /// Register a handler for every event from `source`.
    #[must_use]
    pub fn any_event_handler(
        mut self,
        name: impl Into<String>,
        source: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        self.handlers.on_any(name, source, handler);
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.notifier.register(observer);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<WebhookMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the receiver.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] when the repository is missing.
    pub fn build(self) -> Result<WebhookReceiver, GatewayError> {
        let repository = self
            .repository
            .ok_or_else(|| GatewayError::Configuration("a repository is required".into()))?;
        Ok(WebhookReceiver::new(
            repository,
            self.sources,
            self.handlers,
            self.notifier,
            self.metrics.unwrap_or_default(),
        ))
    }
}

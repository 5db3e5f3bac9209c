mod circuit_breaker;
mod dispatcher;
mod logging;
mod server;
mod sources;


pub use circuit_breaker::*;
pub use dispatcher::*;
pub use logging::*;
pub use server::*;
pub use sources::*;

use serde::Deserialize;

use crate::error::ServerError;

/// Top-level configuration for the Hookline server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct HooklineConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Outbound delivery configuration.
    #[serde(default)]
    pub dispatcher: DispatcherServerConfig,
    /// Per-destination circuit breaker configuration.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerServerConfig,
    /// Log output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Inbound webhook producers.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Outbound destinations registered at startup.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    /// Endpoint subscriptions registered at startup.
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

impl HooklineConfig {
    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, ServerError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-section checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ServerError> {
        let mut names = std::collections::HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(ServerError::Config(format!(
                    "duplicate source: {}",
                    source.name
                )));
            }
        }

        let mut endpoint_ids = std::collections::HashSet::new();
        for endpoint in &self.endpoints {
            if !endpoint_ids.insert(endpoint.id.as_str()) {
                return Err(ServerError::Config(format!(
                    "duplicate endpoint: {}",
                    endpoint.id
                )));
            }
        }
        for subscription in &self.subscriptions {
            if !endpoint_ids.contains(subscription.endpoint.as_str()) {
                return Err(ServerError::Config(format!(
                    "subscription references unknown endpoint: {}",
                    subscription.endpoint
                )));
            }
            if subscription.event_types.is_empty() {
                return Err(ServerError::Config(format!(
                    "subscription for {} has no event_types",
                    subscription.endpoint
                )));
            }
        }
        Ok(())
    }
}

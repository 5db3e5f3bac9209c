use std::collections::HashMap;
use std::time::Duration;

use hookline_gateway::CircuitBreakerConfig;
use serde::Deserialize;

/// Per-destination circuit breaker configuration.
///
/// Destinations are keyed by URL origin; any URL on the destination works
/// as an override key.
///
/// # Example
///
/// ```toml
/// [circuit_breaker]
/// failure_threshold = 5
/// success_threshold = 2
/// reset_timeout_seconds = 60
///
/// [circuit_breaker.destinations."https://flaky.example.com"]
/// failure_threshold = 2
/// reset_timeout_seconds = 300
/// ```
#[derive(Debug, Deserialize)]
pub struct CircuitBreakerServerConfig {
    /// Consecutive failures that open a closed circuit.
    #[serde(default = "default_cb_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the circuit.
    #[serde(default = "default_cb_success_threshold")]
    pub success_threshold: u32,
    /// Initial open window before a trial request is allowed.
    #[serde(default = "default_cb_reset_timeout")]
    pub reset_timeout_seconds: u64,
    /// Growth of the open window after each failed trial.
    #[serde(default = "default_cb_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Cap on the open window.
    #[serde(default = "default_cb_max_reset_timeout")]
    pub max_reset_timeout_seconds: u64,
    /// Per-destination overrides.
    #[serde(default)]
    pub destinations: HashMap<String, CircuitBreakerDestinationConfig>,
}

impl Default for CircuitBreakerServerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_cb_failure_threshold(),
            success_threshold: default_cb_success_threshold(),
            reset_timeout_seconds: default_cb_reset_timeout(),
            backoff_multiplier: default_cb_backoff_multiplier(),
            max_reset_timeout_seconds: default_cb_max_reset_timeout(),
            destinations: HashMap::new(),
        }
    }
}

impl CircuitBreakerServerConfig {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_seconds),
            backoff_multiplier: self.backoff_multiplier,
            max_reset_timeout: Duration::from_secs(self.max_reset_timeout_seconds),
        }
    }

    /// Overrides merged onto the defaults, sorted by destination.
    pub fn overrides(&self) -> Vec<(String, CircuitBreakerConfig)> {
        let base = self.to_breaker_config();
        let mut overrides: Vec<_> = self
            .destinations
            .iter()
            .map(|(destination, o)| (destination.clone(), o.apply(&base)))
            .collect();
        overrides.sort_by(|a, b| a.0.cmp(&b.0));
        overrides
    }
}

fn default_cb_failure_threshold() -> u32 {
    5
}

fn default_cb_success_threshold() -> u32 {
    2
}

fn default_cb_reset_timeout() -> u64 {
    60
}

fn default_cb_backoff_multiplier() -> f64 {
    2.0
}

fn default_cb_max_reset_timeout() -> u64 {
    600
}

/// Per-destination circuit breaker overrides.
#[derive(Debug, Default, Deserialize)]
pub struct CircuitBreakerDestinationConfig {
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    pub reset_timeout_seconds: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_reset_timeout_seconds: Option<u64>,
}

impl CircuitBreakerDestinationConfig {
    fn apply(&self, base: &CircuitBreakerConfig) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            success_threshold: self.success_threshold.unwrap_or(base.success_threshold),
            reset_timeout: self
                .reset_timeout_seconds
                .map_or(base.reset_timeout, Duration::from_secs),
            backoff_multiplier: self.backoff_multiplier.unwrap_or(base.backoff_multiplier),
            max_reset_timeout: self
                .max_reset_timeout_seconds
                .map_or(base.max_reset_timeout, Duration::from_secs),
        }
    }
}

use std::time::Duration;

use hookline_executor::{DispatcherConfig, RetryPolicy};
use hookline_signature::SignatureScheme;
use hookline_webhook::HttpTransportConfig;
use serde::Deserialize;

/// Outbound delivery configuration.
///
/// # Example
///
/// ```toml
/// [dispatcher]
/// max_attempts = 5
/// base_delay_seconds = 60
/// max_delay_seconds = 3600
/// jitter_ratio = 0.2
/// request_timeout_seconds = 10
///
/// [dispatcher.signature]
/// type = "hmac"
/// header = "X-Hub-Signature-256"
/// prefix = "sha256="
/// ```
#[derive(Debug, Deserialize)]
pub struct DispatcherServerConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: u64,
    /// Cap on any single retry delay.
    #[serde(default = "default_max_delay")]
    pub max_delay_seconds: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction of it.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Maximum outbound attempts in flight.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// How often the retry scheduler looks for due deliveries.
    #[serde(default = "default_scheduler_interval")]
    pub scheduler_interval_ms: u64,
    #[serde(default = "default_response_body_limit")]
    pub response_body_limit: usize,
    /// Header style used to sign outbound requests. Defaults to
    /// `X-Webhook-Signature: sha256=<hex>`.
    #[serde(default = "SignatureScheme::generic")]
    pub signature: SignatureScheme,
    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpTransportConfig,
}

impl Default for DispatcherServerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_seconds: default_base_delay(),
            max_delay_seconds: default_max_delay(),
            multiplier: default_multiplier(),
            jitter_ratio: default_jitter_ratio(),
            request_timeout_seconds: default_request_timeout(),
            max_concurrent: default_max_concurrent(),
            scheduler_interval_ms: default_scheduler_interval(),
            response_body_limit: default_response_body_limit(),
            signature: SignatureScheme::generic(),
            http: HttpTransportConfig::default(),
        }
    }
}

impl DispatcherServerConfig {
    /// Library config for the dispatcher. Validated by the builder.
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_attempts: self.max_attempts,
            retry: RetryPolicy {
                base_delay: Duration::from_secs(self.base_delay_seconds),
                max_delay: Duration::from_secs(self.max_delay_seconds),
                multiplier: self.multiplier,
                jitter_ratio: self.jitter_ratio,
            },
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            max_concurrent: self.max_concurrent,
            scheduler_interval: Duration::from_millis(self.scheduler_interval_ms),
            response_body_limit: self.response_body_limit,
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    60
}

fn default_max_delay() -> u64 {
    3600
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter_ratio() -> f64 {
    0.2
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    32
}

fn default_scheduler_interval() -> u64 {
    1000
}

fn default_response_body_limit() -> usize {
    4096
}

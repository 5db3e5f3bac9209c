use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration for the webhook dispatcher.
///
/// # Examples
///
/// ```
/// use hookline_executor::DispatcherConfig;
///
/// let config = DispatcherConfig::default();
/// assert_eq!(config.max_attempts, 5);
/// assert_eq!(config.max_concurrent, 32);
/// ```
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Attempts per delivery unless the endpoint overrides it.
    pub max_attempts: u32,
    /// Backoff between failed attempts.
    pub retry: RetryPolicy,
    /// Upper bound for a single outbound HTTP exchange.
    pub request_timeout: Duration,
    /// Maximum outbound attempts in flight. Enforced via a
    /// [`tokio::sync::Semaphore`] in the dispatcher.
    pub max_concurrent: usize,
    /// How often the retry scheduler polls the delay queue.
    pub scheduler_interval: Duration,
    /// Stored response bodies are truncated to this many bytes.
    pub response_body_limit: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(10),
            max_concurrent: 32,
            scheduler_interval: Duration::from_secs(1),
            response_body_limit: 4096,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be greater than zero".into());
        }
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be at least 1".into());
        }
        if self.scheduler_interval.is_zero() {
            return Err("scheduler_interval must be greater than zero".into());
        }
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = DispatcherConfig::default();
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_concurrent, 32);
        assert_eq!(cfg.response_body_limit, 4096);
        assert_eq!(cfg.retry.max_delay, Duration::from_secs(3600));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_values() {
        let cfg = DispatcherConfig {
            max_attempts: 0,
            ..DispatcherConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = DispatcherConfig {
            max_concurrent: 0,
            ..DispatcherConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = DispatcherConfig {
            request_timeout: Duration::ZERO,
            ..DispatcherConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}

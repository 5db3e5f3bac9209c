use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_user_agent() -> String {
    concat!("hookline/", env!("CARGO_PKG_VERSION")).to_owned()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_pool_idle_timeout_secs() -> u64 {
    90
}

/// Client-wide settings for [`HttpTransport`](crate::HttpTransport).
///
/// Per-request timeouts come from each
/// [`OutboundRequest`](hookline_provider::OutboundRequest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Whether to follow 3xx responses. Off by default so a redirect counts
    /// as a rejected delivery.
    #[serde(default)]
    pub follow_redirects: bool,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            follow_redirects: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
        }
    }
}

impl HttpTransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HttpTransportConfig::default();
        assert!(config.user_agent.starts_with("hookline/"));
        assert!(!config.follow_redirects);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }
}

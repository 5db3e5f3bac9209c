use serde::{Deserialize, Serialize};

/// Summary of a single destination's circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    /// Destination key (normally the endpoint URL's origin).
    pub destination: String,
    /// Current circuit state ("closed", "open", "`half_open`").
    pub state: String,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Seconds until an open circuit admits a trial request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    /// Whether the current open window was set manually.
    pub forced: bool,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// Length of the current (or next) open window in seconds.
    pub open_window_seconds: u64,
}

/// Response for listing all circuit breakers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCircuitBreakersResponse {
    pub circuit_breakers: Vec<CircuitBreakerStatus>,
}

/// Response after forcing a circuit breaker open or closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerActionResponse {
    pub destination: String,
    /// New circuit state after the action.
    pub state: String,
    /// Human-readable status message.
    pub message: String,
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use hookline_core::CircuitBreakerStatus;
use tokio::time::Instant;
use tracing::{debug, info};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation: requests flow through.
    Closed,
    /// Destination is failing: requests are rejected immediately.
    Open,
    /// Recovery trial: a single request is allowed to test the destination.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// A `(from, to)` state change.
pub type Transition = (CircuitState, CircuitState);

/// Configuration for a per-destination circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Number of consecutive trial successes in `HalfOpen` to close the circuit.
    pub success_threshold: u32,
    /// Initial time spent `Open` before a trial is allowed.
    pub reset_timeout: Duration,
    /// Factor applied to the open window each time a trial fails.
    pub backoff_multiplier: f64,
    /// Upper bound for the open window.
    pub max_reset_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Validate configuration values.
    ///
    /// `reset_timeout = 0` is allowed (useful for testing).
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold < 1 {
            return Err("failure_threshold must be >= 1".into());
        }
        if self.success_threshold < 1 {
            return Err("success_threshold must be >= 1".into());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be a finite number >= 1.0".into());
        }
        if self.max_reset_timeout < self.reset_timeout {
            return Err("max_reset_timeout must be >= reset_timeout".into());
        }
        Ok(())
    }

    fn grow(&self, window: Duration) -> Duration {
        let next = window.as_secs_f64() * self.backoff_multiplier;
        if !next.is_finite() || next >= self.max_reset_timeout.as_secs_f64() {
            self.max_reset_timeout
        } else {
            Duration::from_secs_f64(next)
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_reset_timeout: Duration::from_secs(600),
        }
    }
}

/// Proof of admission, handed back when the attempt's outcome is recorded.
///
/// A `HalfOpen` trial carries the id of that trial. Outcomes presented with
/// any other permit cannot end the trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    trial: Option<u64>,
}

impl Permit {
    /// Permit for an attempt admitted while the circuit was `Closed`.
    pub const CLOSED: Self = Self { trial: None };

    /// Whether this permit owns a `HalfOpen` trial.
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }
}

/// Result of asking a breaker whether an attempt may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Go ahead. `state` is `Closed`, or `HalfOpen` for the single trial.
    Allowed { state: CircuitState, permit: Permit },
    /// Refused; try again after `retry_after`.
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn permit(&self) -> Option<Permit> {
        match self {
            Self::Allowed { permit, .. } => Some(*permit),
            Self::Rejected { .. } => None,
        }
    }
}

/// Internal mutable state for a single circuit breaker.
struct CircuitData {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    /// Automatic open window; grows on each failed trial.
    open_window: Duration,
    /// Set by `force_open`; replaces `open_window` until the circuit leaves
    /// `Open`.
    forced_window: Option<Duration>,
    /// Id of the `HalfOpen` trial currently in flight.
    trial_in_flight: Option<u64>,
    next_trial: u64,
}

impl CircuitData {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            open_window: config.reset_timeout,
            forced_window: None,
            trial_in_flight: None,
            next_trial: 0,
        }
    }

    fn effective_window(&self) -> Duration {
        self.forced_window.unwrap_or(self.open_window)
    }

    fn remaining_open(&self) -> Duration {
        let elapsed = self.opened_at.map_or(Duration::MAX, |at| at.elapsed());
        self.effective_window().saturating_sub(elapsed)
    }

    fn start_trial(&mut self) -> Permit {
        self.next_trial = self.next_trial.wrapping_add(1);
        self.trial_in_flight = Some(self.next_trial);
        Permit {
            trial: self.trial_in_flight,
        }
    }

    /// Whether `permit` is the trial currently in flight.
    fn owns_trial(&self, permit: Permit) -> bool {
        permit.trial.is_some() && permit.trial == self.trial_in_flight
    }

    fn open(&mut self, window: Option<Duration>) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.forced_window = window;
        self.consecutive_successes = 0;
        self.trial_in_flight = None;
    }

    fn close(&mut self, config: &CircuitBreakerConfig) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.opened_at = None;
        self.open_window = config.reset_timeout;
        self.forced_window = None;
        self.trial_in_flight = None;
    }
}

/// Circuit breaker for a single destination.
///
/// - `Closed` -> `Open` when consecutive failures reach the threshold
/// - `Open` -> `HalfOpen` once the open window elapses
/// - `HalfOpen` -> `Closed` after consecutive trial successes reach the threshold
/// - `HalfOpen` -> `Open` on any trial failure, with a longer window
///
/// Only the outcome of the admitted trial moves a `HalfOpen` circuit. Late
/// outcomes of attempts admitted while `Closed` are ignored there.
pub struct CircuitBreaker {
    destination: String,
    config: CircuitBreakerConfig,
    data: Mutex<CircuitData>,
}

impl CircuitBreaker {
    /// Create a new, closed circuit breaker for `destination`.
    pub fn new(destination: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let data = CircuitData::new(&config);
        Self {
            destination: destination.into(),
            config,
            data: Mutex::new(data),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check whether an attempt may proceed.
    ///
    /// May move `Open` to `HalfOpen` when the window has elapsed; the caller
    /// that observes that transition owns the single trial. While the trial
    /// is in flight every other caller is rejected. The returned permit must
    /// be passed back to `record_success`, `record_failure` or
    /// `abandon_trial`.
    pub fn check(&self) -> (Admission, Option<Transition>) {
        let mut data = self.lock();
        let state = data.state;

        match state {
            CircuitState::Closed => (
                Admission::Allowed {
                    state: CircuitState::Closed,
                    permit: Permit::CLOSED,
                },
                None,
            ),
            CircuitState::Open => {
                let remaining = data.remaining_open();
                if !remaining.is_zero() {
                    return (
                        Admission::Rejected {
                            retry_after: remaining,
                        },
                        None,
                    );
                }
                debug!(
                    destination = %self.destination,
                    "circuit breaker transitioning from open to half-open"
                );
                data.state = CircuitState::HalfOpen;
                data.forced_window = None;
                data.consecutive_successes = 0;
                let permit = data.start_trial();
                (
                    Admission::Allowed {
                        state: CircuitState::HalfOpen,
                        permit,
                    },
                    Some((CircuitState::Open, CircuitState::HalfOpen)),
                )
            }
            CircuitState::HalfOpen if data.trial_in_flight.is_some() => (
                Admission::Rejected {
                    retry_after: Duration::ZERO,
                },
                None,
            ),
            CircuitState::HalfOpen => {
                let permit = data.start_trial();
                (
                    Admission::Allowed {
                        state: CircuitState::HalfOpen,
                        permit,
                    },
                    None,
                )
            }
        }
    }

    /// Record a successful attempt admitted with `permit`.
    pub fn record_success(&self, permit: Permit) -> Option<Transition> {
        let mut data = self.lock();

        match data.state {
            CircuitState::HalfOpen if !data.owns_trial(permit) => {
                debug!(destination = %self.destination, "ignoring success from outside the trial");
                None
            }
            CircuitState::HalfOpen => {
                data.consecutive_successes += 1;
                data.trial_in_flight = None;
                if data.consecutive_successes >= self.config.success_threshold {
                    info!(
                        destination = %self.destination,
                        successes = data.consecutive_successes,
                        "circuit breaker closing after successful trials"
                    );
                    data.close(&self.config);
                    Some((CircuitState::HalfOpen, CircuitState::Closed))
                } else {
                    None
                }
            }
            CircuitState::Closed => {
                data.consecutive_failures = 0;
                None
            }
            // Late result from an attempt admitted before the circuit opened.
            CircuitState::Open => None,
        }
    }

    /// Record a failed attempt admitted with `permit`.
    pub fn record_failure(&self, permit: Permit) -> Option<Transition> {
        let mut data = self.lock();

        match data.state {
            CircuitState::Closed => {
                data.consecutive_failures += 1;
                if data.consecutive_failures >= self.config.failure_threshold {
                    info!(
                        destination = %self.destination,
                        failures = data.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "circuit breaker opening"
                    );
                    data.open_window = self.config.reset_timeout;
                    data.open(None);
                    Some((CircuitState::Closed, CircuitState::Open))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen if !data.owns_trial(permit) => {
                debug!(destination = %self.destination, "ignoring failure from outside the trial");
                None
            }
            CircuitState::HalfOpen => {
                data.open_window = self.config.grow(data.open_window);
                info!(
                    destination = %self.destination,
                    window_secs = data.open_window.as_secs(),
                    "circuit breaker re-opening after failed trial"
                );
                data.open(None);
                Some((CircuitState::HalfOpen, CircuitState::Open))
            }
            CircuitState::Open => None,
        }
    }

    /// Give back an admitted `HalfOpen` trial that was never sent.
    pub fn abandon_trial(&self, permit: Permit) {
        let mut data = self.lock();
        if data.state == CircuitState::HalfOpen && data.owns_trial(permit) {
            data.trial_in_flight = None;
        }
    }

    /// Open the circuit for exactly `duration`, after which the automatic
    /// logic resumes.
    pub fn force_open(&self, duration: Duration) -> Option<Transition> {
        let mut data = self.lock();
        let from = data.state;
        info!(
            destination = %self.destination,
            duration_secs = duration.as_secs(),
            "circuit breaker forced open"
        );
        data.open(Some(duration));
        (from != CircuitState::Open).then_some((from, CircuitState::Open))
    }

    /// Close the circuit and reset its counters.
    pub fn force_close(&self) -> Option<Transition> {
        let mut data = self.lock();
        let from = data.state;
        info!(destination = %self.destination, "circuit breaker forced closed");
        data.close(&self.config);
        (from != CircuitState::Closed).then_some((from, CircuitState::Closed))
    }

    /// Current state without triggering transitions.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Read-only view for the management surface.
    pub fn snapshot(&self) -> CircuitBreakerStatus {
        let data = self.lock();
        let retry_after_seconds = (data.state == CircuitState::Open).then(|| {
            let remaining = data.remaining_open();
            remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
        });
        CircuitBreakerStatus {
            destination: self.destination.clone(),
            state: data.state.to_string(),
            consecutive_failures: data.consecutive_failures,
            consecutive_successes: data.consecutive_successes,
            retry_after_seconds,
            forced: data.forced_window.is_some(),
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            open_window_seconds: data.effective_window().as_secs(),
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.lock();
        f.debug_struct("CircuitBreaker")
            .field("destination", &self.destination)
            .field("config", &self.config)
            .field("state", &data.state)
            .field("consecutive_failures", &data.consecutive_failures)
            .field("consecutive_successes", &data.consecutive_successes)
            .finish_non_exhaustive()
    }
}

/// Normalise a URL to the key its breaker is stored under:
/// lowercase `scheme://host[:port]`.
///
/// Strings without a scheme are used as-is (lowercased).
pub fn destination_key(url: &str) -> String {
    let lower = url.trim().to_ascii_lowercase();
    let Some((scheme, rest)) = lower.split_once("://") else {
        return lower;
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    // Drop userinfo.
    let host = authority.rsplit('@').next().unwrap_or(authority);
    format!("{scheme}://{host}")
}

/// Lazily populated set of circuit breakers, one per destination.
///
/// Destinations never share a lock: each breaker guards its own state and
/// the map is sharded.
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry using `default_config` for every destination.
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            overrides: HashMap::new(),
            breakers: DashMap::new(),
        }
    }

    /// Use `config` instead of the default for `destination`.
    #[must_use]
    pub fn with_override(mut self, destination: &str, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(destination_key(destination), config);
        self
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Breaker for `destination`, created on first use.
    pub fn get_or_create(&self, destination: &str) -> Arc<CircuitBreaker> {
        let key = destination_key(destination);
        if let Some(existing) = self.breakers.get(&key) {
            return Arc::clone(existing.value());
        }
        let config = self
            .overrides
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone());
        let breaker = self
            .breakers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, config)));
        Arc::clone(breaker.value())
    }

    /// Existing breaker for `destination`, if one was ever created.
    pub fn get(&self, destination: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .get(&destination_key(destination))
            .map(|b| Arc::clone(b.value()))
    }

    /// Snapshots of every known breaker, sorted by destination.
    pub fn snapshots(&self) -> Vec<CircuitBreakerStatus> {
        let mut all: Vec<CircuitBreakerStatus> =
            self.breakers.iter().map(|b| b.value().snapshot()).collect();
        all.sort_by(|a, b| a.destination.cmp(&b.destination));
        all
    }

    /// Sorted list of known destinations.
    pub fn destinations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|b| b.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("destinations", &self.destinations())
            .finish_non_exhaustive()
    }
}

//! Per-provider circuit breaker
//!
//! Stops the coordinator from hammering a provider that keeps failing, and
//! lets a single probe through once the cooldown has passed.
//!
//! # State Transitions
//!
//! ```text
//! ┌─────────┐  consecutive failures ≥ threshold  ┌──────┐
//! │ Closed  │ ─────────────────────────────────> │ Open │ <──────┐
//! └─────────┘                                     └──────┘        │
//!     ^                                              │            │
//!     │                                              │ cooldown   │
//!     │                                              │ elapsed +  │
//!     │                                              │ probe      │
//!     │  trial succeeds      ┌───────────────┐       v            │
//!     └──────────────────────│   Half-Open   │ <─────┘            │
//!                            │ (one trial)   │ ───────────────────┘
//!                            └───────────────┘   trial fails
//! ```
//!
//! # Example
//!
//! ```text
//! Threshold: 3 consecutive failures
//! Cooldown: 60 seconds
//!
//! t=0s:   Closed
//! t=5s:   3rd consecutive failure → Open
//! t=5s-65s: every request denied without contacting the provider
//! t=65s:  first caller is granted the trial → Half-Open; other callers denied
//! t=66s:  trial succeeds → Closed, counters reset
//! ```

use std::{fmt, sync::Arc, time::Duration};

use courier_common::tracing;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open before a trial is allowed (seconds)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Per-provider overrides, keyed by provider name
    #[serde(default)]
    pub provider_overrides: ahash::AHashMap<String, BreakerSettings>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            provider_overrides: ahash::AHashMap::default(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Effective settings for a provider, falling back to the global values
    #[must_use]
    pub fn settings_for(&self, provider: &str) -> BreakerSettings {
        self.provider_overrides
            .get(provider)
            .copied()
            .unwrap_or(BreakerSettings {
                failure_threshold: self.failure_threshold,
                cooldown_secs: self.cooldown_secs,
            })
    }
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_cooldown_secs() -> u64 {
    60
}

/// Breaker settings for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl BreakerSettings {
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation, every request allowed
    Closed,
    /// Tripped, every request denied until the cooldown elapses
    Open,
    /// Probing recovery, exactly one trial in flight
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

/// How a breaker answered a request for permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Denied,
    /// Closed circuit, ordinary attempt
    Allowed,
    /// The caller holds the single half-open trial slot
    Trial,
}

impl Admission {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        !matches!(self, Self::Denied)
    }
}

#[derive(Debug)]
struct BreakerData {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while the single half-open trial is outstanding
    trial_in_flight: bool,
    settings: BreakerSettings,
}

impl BreakerData {
    const fn new(settings: BreakerSettings) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
            settings,
        }
    }

    fn is_cooldown_elapsed(&self, now: Instant) -> bool {
        self.opened_at
            .is_some_and(|opened_at| now.duration_since(opened_at) >= self.settings.cooldown())
    }

    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }

    fn admit(&mut self, now: Instant, provider: &str) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                if self.is_cooldown_elapsed(now) {
                    self.state = CircuitState::HalfOpen;
                    self.trial_in_flight = true;
                    tracing::info!(
                        provider,
                        "Circuit breaker entering HALF-OPEN state - granting trial attempt"
                    );
                    Admission::Trial
                } else {
                    Admission::Denied
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    Admission::Denied
                } else {
                    self.trial_in_flight = true;
                    Admission::Trial
                }
            }
        }
    }

    /// Returns `true` if the circuit closed as a result
    fn record_success(&mut self, provider: &str) -> bool {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                false
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.consecutive_failures = 0;
                self.opened_at = None;
                self.trial_in_flight = false;
                tracing::info!(provider, "Circuit breaker CLOSED - normal operation resumed");
                true
            }
            CircuitState::Open => {
                tracing::warn!(provider, "Unexpected success while circuit is open");
                false
            }
        }
    }

    /// Returns `true` if the circuit opened as a result
    fn record_failure(&mut self, now: Instant, provider: &str) -> bool {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);

                if self.consecutive_failures >= self.settings.failure_threshold {
                    self.trip(now);
                    tracing::warn!(
                        provider,
                        failure_count = self.consecutive_failures,
                        threshold = self.settings.failure_threshold,
                        cooldown_secs = self.settings.cooldown_secs,
                        "Circuit breaker OPENED - provider will be skipped"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                self.trip(now);
                tracing::warn!(provider, "Circuit breaker trial failed - reopening circuit");
                true
            }
            CircuitState::Open => false,
        }
    }

    fn abandon_trial(&mut self, now: Instant, provider: &str) {
        if self.state == CircuitState::HalfOpen && self.trial_in_flight {
            self.trip(now);
            tracing::warn!(provider, "Circuit breaker trial abandoned - reopening circuit");
        }
    }
}

/// Circuit breaker guarding a single provider
///
/// Every operation runs under the breaker's own lock, so two concurrent
/// callers can never both be granted the half-open trial.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: Arc<str>,
    data: parking_lot::Mutex<BreakerData>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(provider: Arc<str>, settings: BreakerSettings) -> Self {
        Self {
            provider,
            data: parking_lot::Mutex::new(BreakerData::new(settings)),
        }
    }

    /// Check whether an attempt may proceed.
    ///
    /// May move an open circuit to half-open, in which case the caller holds
    /// the single trial slot and must report back with
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn allow_request(&self) -> bool {
        self.admit().is_allowed()
    }

    /// Like [`allow_request`](Self::allow_request), but tells an ordinary
    /// attempt apart from the half-open trial.
    pub fn admit(&self) -> Admission {
        self.data.lock().admit(Instant::now(), &self.provider)
    }

    /// Record a successful attempt
    ///
    /// Returns `true` if the circuit transitioned to Closed
    pub fn record_success(&self) -> bool {
        self.data.lock().record_success(&self.provider)
    }

    /// Record a failed attempt
    ///
    /// Returns `true` if the circuit transitioned to Open
    pub fn record_failure(&self) -> bool {
        self.data.lock().record_failure(Instant::now(), &self.provider)
    }

    /// Release a trial slot whose attempt never reported back.
    ///
    /// Only the holder of an [`Admission::Trial`] may call this. A half-open
    /// circuit reopens; any other state is left alone.
    pub fn abandon_trial(&self) {
        self.data.lock().abandon_trial(Instant::now(), &self.provider);
    }

    /// Current state, without triggering any transition
    pub fn state(&self) -> CircuitState {
        self.data.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let data = self.data.lock();
        CircuitBreakerStats {
            state: data.state,
            consecutive_failures: data.consecutive_failures,
            trial_in_flight: data.trial_in_flight,
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub trial_in_flight: bool,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn breaker(failure_threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            Arc::from("Provider1"),
            BreakerSettings {
                failure_threshold,
                cooldown_secs,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_closed_to_open() {
        let breaker = breaker(3, 60);

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());

        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert_eq!(breaker.state(), CircuitState::Closed);

        assert!(breaker.record_failure());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.stats().consecutive_failures, 3);
        assert!(!breaker.allow_request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_denies_until_cooldown_elapses() {
        let breaker = breaker(1, 60);
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_grants_single_trial() {
        let breaker = breaker(2, 10);
        breaker.record_failure();
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.allow_request());
        assert!(!breaker.allow_request());
        assert!(!breaker.allow_request());
        assert!(breaker.stats().trial_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_half_open_success() {
        let breaker = breaker(2, 10);
        breaker.record_failure();
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.allow_request());

        assert!(breaker.record_success());
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 0);
        assert!(!stats.trial_in_flight);
        assert!(breaker.allow_request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_half_open_failure_restarts_cooldown() {
        let breaker = breaker(2, 10);
        breaker.record_failure();
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.allow_request());

        assert!(breaker.record_failure());
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.consecutive_failures, 2);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!breaker.allow_request());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker.allow_request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_reopens() {
        let breaker = breaker(1, 10);
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.allow_request());

        breaker.abandon_trial();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_distinguishes_trial() {
        let breaker = breaker(1, 10);
        assert_eq!(breaker.admit(), Admission::Allowed);

        breaker.record_failure();
        assert_eq!(breaker.admit(), Admission::Denied);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(breaker.admit(), Admission::Trial);
        assert_eq!(breaker.admit(), Admission::Denied);
        assert!(!Admission::Denied.is_allowed());
    }

    #[test]
    fn test_abandon_is_noop_when_closed() {
        let breaker = breaker(3, 10);
        breaker.record_failure();
        breaker.abandon_trial();

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 1);
    }

    #[test]
    fn test_circuit_breaker_success_resets_failures() {
        let breaker = breaker(3, 60);

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().consecutive_failures, 2);
    }

    #[test]
    fn test_concurrent_probes_get_one_trial() {
        let breaker = breaker(1, 0);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        let granted = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    if breaker.allow_request() {
                        granted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(granted.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_provider_overrides() {
        let mut config = CircuitBreakerConfig::default();
        config.provider_overrides.insert(
            "Provider2".to_string(),
            BreakerSettings {
                failure_threshold: 10,
                cooldown_secs: 5,
            },
        );

        assert_eq!(
            config.settings_for("Provider1"),
            BreakerSettings {
                failure_threshold: 3,
                cooldown_secs: 60,
            }
        );
        assert_eq!(config.settings_for("Provider2").failure_threshold, 10);
    }
}

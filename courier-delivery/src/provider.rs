//! A delivery provider: one transport plus the breaker that guards it

use std::{sync::Arc, time::Duration};

use courier_common::{outgoing, tracing};
use serde::{Deserialize, Serialize};

use crate::{
    circuit_breaker::{
        Admission, BreakerSettings, CircuitBreaker, CircuitBreakerStats, CircuitState,
    },
    error::{DeliveryError, TransportError},
    transport::{Transport, TransportConfig},
    types::{Email, ProviderId},
};

/// One entry of the ordered `providers` list in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique name, used in logs and status reports
    pub name: String,

    /// Upper bound on a single attempt (seconds)
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    #[serde(default)]
    pub transport: TransportConfig,
}

const fn default_attempt_timeout_secs() -> u64 {
    10
}

/// A configured provider
///
/// Breaker accounting happens inside [`Provider::try_deliver`]; outside the
/// crate the breaker can only be observed.
#[derive(Debug)]
pub struct Provider {
    id: ProviderId,
    name: Arc<str>,
    transport: Arc<dyn Transport>,
    breaker: CircuitBreaker,
    attempt_timeout: Duration,
}

/// Reopens a half-open breaker if the trial attempt is dropped before it
/// reports back. Ordinary attempts never touch the trial slot.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    holds_trial: bool,
    settled: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.holds_trial && !self.settled {
            self.breaker.abandon_trial();
        }
    }
}

impl Provider {
    #[must_use]
    pub fn new(
        id: ProviderId,
        name: impl Into<Arc<str>>,
        transport: Arc<dyn Transport>,
        settings: BreakerSettings,
        attempt_timeout: Duration,
    ) -> Self {
        let name = name.into();
        Self {
            id,
            breaker: CircuitBreaker::new(Arc::clone(&name), settings),
            name,
            transport,
            attempt_timeout,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ProviderId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consecutive failures recorded against this provider
    pub fn failure_count(&self) -> u32 {
        self.breaker.stats().consecutive_failures
    }

    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    pub(crate) const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run one attempt if the breaker admits it, and account for the result.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::CircuitOpen`] if the breaker denied the attempt, or
    /// [`DeliveryError::Transport`] if the transport failed or timed out.
    pub(crate) async fn try_deliver(&self, email: &Email) -> Result<(), DeliveryError> {
        let admission = self.breaker.admit();
        if !admission.is_allowed() {
            return Err(DeliveryError::CircuitOpen(Arc::clone(&self.name)));
        }

        let mut guard = TrialGuard {
            breaker: &self.breaker,
            holds_trial: admission == Admission::Trial,
            settled: false,
        };

        outgoing!(
            provider = %self.name,
            email_id = %email.id,
            "Attempting delivery"
        );

        let result = tokio::time::timeout(self.attempt_timeout, self.transport.deliver(email))
            .await
            .unwrap_or(Err(TransportError::Timeout(self.attempt_timeout)));

        guard.settled = true;

        match result {
            Ok(()) => {
                self.breaker.record_success();
                outgoing!(
                    level = DEBUG,
                    provider = %self.name,
                    email_id = %email.id,
                    "Provider accepted email"
                );
                Ok(())
            }
            Err(source) => {
                self.breaker.record_failure();
                tracing::debug!(
                    provider = %self.name,
                    email_id = %email.id,
                    error = %source,
                    "Provider attempt failed"
                );
                Err(DeliveryError::Transport {
                    provider: Arc::clone(&self.name),
                    source,
                })
            }
        }
    }
}

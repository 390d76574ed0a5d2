//! Delivery coordinator orchestration

pub mod retry;

use std::{sync::Arc, time::Duration};

use ahash::AHashSet;
use courier_common::{Signal, internal, tracing};
use serde::{Deserialize, Serialize};
use tokio::{sync::broadcast, time::Instant};

use crate::{
    circuit_breaker::{BreakerSettings, CircuitBreakerConfig},
    error::{ConfigError, DeliveryError, ValidationError},
    ledger::DedupLedger,
    policy::RetryPolicy,
    provider::{Provider, ProviderConfig},
    queue::RetryQueue,
    status::StatusAggregator,
    transport::{Transport, TransportConfig},
    types::{DeliveryResult, Email, EmailStatus, ProviderId},
};

const fn default_retry_interval() -> u64 {
    10
}

const fn default_max_concurrent_retries() -> usize {
    8
}

fn default_providers() -> Vec<ProviderConfig> {
    ["Provider1", "Provider2"]
        .into_iter()
        .map(|name| ProviderConfig {
            name: name.to_string(),
            attempt_timeout_secs: 10,
            transport: TransportConfig::default(),
        })
        .collect()
}

/// Engine configuration, deserialized from the `delivery` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Providers in priority order; the first entry is tried first
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// How often the retry processor wakes up (in seconds)
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Upper bound on queued emails retried in parallel during one pass
    #[serde(default = "default_max_concurrent_retries")]
    pub max_concurrent_retries: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
            retry_interval_secs: default_retry_interval(),
            max_concurrent_retries: default_max_concurrent_retries(),
        }
    }
}

/// Orchestrates providers, the retry queue and the dedup ledger.
///
/// Constructed once at startup and shared behind an [`Arc`] by the transport
/// layer and the retry processor.
#[derive(Debug)]
pub struct DeliveryCoordinator {
    providers: Vec<Provider>,
    queue: RetryQueue,
    ledger: DedupLedger,
    policy: RetryPolicy,
    retry_interval: Duration,
    max_concurrent_retries: usize,
}

/// Assembles a [`DeliveryCoordinator`], assigning provider identifiers in the
/// order providers are added.
#[derive(Debug)]
pub struct CoordinatorBuilder {
    providers: Vec<(String, Arc<dyn Transport>, BreakerSettings, Duration)>,
    breaker: BreakerSettings,
    attempt_timeout: Duration,
    policy: RetryPolicy,
    retry_interval: Duration,
    max_concurrent_retries: usize,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            breaker: BreakerSettings::default(),
            attempt_timeout: Duration::from_secs(10),
            policy: RetryPolicy::default(),
            retry_interval: Duration::from_secs(default_retry_interval()),
            max_concurrent_retries: default_max_concurrent_retries(),
        }
    }
}

impl CoordinatorBuilder {
    /// Breaker settings for providers added after this call
    #[must_use]
    pub fn breaker(mut self, settings: BreakerSettings) -> Self {
        self.breaker = settings;
        self
    }

    /// Attempt timeout for providers added after this call
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Append a provider at the lowest priority so far
    #[must_use]
    pub fn provider(mut self, name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        self.providers
            .push((name.into(), transport, self.breaker, self.attempt_timeout));
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    #[must_use]
    pub fn max_concurrent_retries(mut self, max: usize) -> Self {
        self.max_concurrent_retries = max;
        self
    }

    /// Validate the provider list and build the coordinator
    ///
    /// # Errors
    ///
    /// Returns an error if no providers were added, a name is blank or
    /// repeated, a failure threshold is zero, the retry interval is zero, or
    /// the retry policy is unusable (see [`RetryPolicy::validate`]).
    pub fn build(self) -> Result<DeliveryCoordinator, ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        if self.retry_interval.is_zero() {
            return Err(ConfigError::ZeroRetryInterval);
        }
        self.policy.validate()?;

        let mut seen = AHashSet::new();
        let mut providers = Vec::with_capacity(self.providers.len());

        for (index, (name, transport, settings, timeout)) in self.providers.into_iter().enumerate()
        {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyProviderName);
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateProvider(name));
            }
            if settings.failure_threshold == 0 {
                return Err(ConfigError::ZeroFailureThreshold(name));
            }

            providers.push(Provider::new(
                ProviderId(index),
                name,
                transport,
                settings,
                timeout,
            ));
        }

        Ok(DeliveryCoordinator {
            providers,
            queue: RetryQueue::new(),
            ledger: DedupLedger::new(),
            policy: self.policy,
            retry_interval: self.retry_interval,
            max_concurrent_retries: self.max_concurrent_retries.max(1),
        })
    }
}

/// Collapse the per-provider errors of one pass into a single line
fn summarize(errors: &[DeliveryError]) -> String {
    if errors.is_empty() {
        return "no provider accepted the email".to_string();
    }

    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

const INTERRUPTED: &str = "delivery pass interrupted before completion";

/// Queues the email if its first pass is dropped before it settles, for
/// example when the caller times out or disconnects mid-dispatch.
struct PendingPass<'a> {
    coordinator: &'a DeliveryCoordinator,
    email: &'a Email,
    settled: bool,
}

impl PendingPass<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingPass<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator
                .queue_for_retry(self.email.clone(), INTERRUPTED.to_string());
        }
    }
}

impl DeliveryCoordinator {
    #[must_use]
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    /// Build the coordinator and its providers from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the provider list or a transport is invalid.
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self, DeliveryError> {
        let mut builder = Self::builder()
            .retry_policy(config.retry.clone())
            .retry_interval(Duration::from_secs(config.retry_interval_secs))
            .max_concurrent_retries(config.max_concurrent_retries);

        for provider in &config.providers {
            let transport = provider.transport.build(&provider.name)?;
            builder = builder
                .breaker(config.circuit_breaker.settings_for(&provider.name))
                .attempt_timeout(Duration::from_secs(provider.attempt_timeout_secs))
                .provider(provider.name.clone(), transport);
        }

        let coordinator = builder.build()?;

        internal!(
            level = INFO,
            providers = ?coordinator.providers.iter().map(Provider::name).collect::<Vec<_>>(),
            max_attempts = coordinator.policy.max_attempts,
            retry_interval_secs = config.retry_interval_secs,
            "Delivery coordinator initialised"
        );

        Ok(coordinator)
    }

    /// Deliver an email, failing over between providers in priority order.
    ///
    /// A repeated identity returns the recorded outcome without contacting
    /// any provider. If every provider is skipped or fails, the email is
    /// queued for retry and `QUEUED` is returned. Dropping the returned
    /// future mid-pass also leaves the email queued.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if recipient, subject or body is blank;
    /// nothing is recorded in that case.
    #[tracing::instrument(level = "debug", skip_all, fields(email_id = %email.id))]
    pub async fn send(&self, mut email: Email) -> Result<DeliveryResult, ValidationError> {
        email.validate()?;

        if let Some(existing) = self.ledger.get(&email.id) {
            internal!(
                level = DEBUG,
                email_id = %email.id,
                outcome = %existing.outcome,
                "Duplicate submission, returning recorded outcome"
            );
            return Ok(existing);
        }

        let _claim = self.ledger.claim(&email.id).await;
        if let Some(existing) = self.ledger.get(&email.id) {
            return Ok(existing);
        }

        let pass = PendingPass {
            coordinator: self,
            email: &email,
            settled: false,
        };
        let dispatched = self.dispatch(&email).await;
        pass.settle();

        let result = match dispatched {
            Ok(provider) => {
                email.status = EmailStatus::Sent;
                let result = DeliveryResult::sent(provider);
                self.ledger.record(email.id.clone(), result.clone());
                result
            }
            Err(errors) => self.queue_for_retry(email, summarize(&errors)),
        };

        Ok(result)
    }

    /// Record `QUEUED` for an email whose first pass failed and schedule its
    /// retry.
    fn queue_for_retry(&self, mut email: Email, error: String) -> DeliveryResult {
        email.status = EmailStatus::Queued;
        email.attempts += 1;
        email.last_error = Some(error.clone());

        let delay = self.policy.retry_delay(email.attempts);
        tracing::warn!(
            email_id = %email.id,
            error = %error,
            retry_in_secs = delay.as_secs(),
            "No provider accepted email, queueing for retry"
        );

        let result = DeliveryResult::queued(Some(error));
        // Record before enqueueing so a fast retry pass can never be
        // overwritten by this QUEUED entry.
        self.ledger.record(email.id.clone(), result.clone());
        self.queue.enqueue(email, Instant::now() + delay);
        result
    }

    /// Walk the providers once, in priority order.
    ///
    /// Returns the accepting provider, or every error encountered on the way.
    pub(crate) async fn dispatch(&self, email: &Email) -> Result<ProviderId, Vec<DeliveryError>> {
        let mut errors = Vec::new();

        for provider in &self.providers {
            match provider.try_deliver(email).await {
                Ok(()) => {
                    if errors.iter().any(DeliveryError::is_transport) {
                        tracing::info!(
                            email_id = %email.id,
                            provider = provider.name(),
                            "Delivered after failover"
                        );
                    }
                    return Ok(provider.id());
                }
                Err(error) if error.is_circuit_open() => {
                    tracing::debug!(
                        email_id = %email.id,
                        provider = provider.name(),
                        "Skipping provider with open circuit"
                    );
                    errors.push(error);
                }
                Err(error) => {
                    tracing::warn!(
                        email_id = %email.id,
                        provider = provider.name(),
                        error = %error,
                        "Provider failed, failing over"
                    );
                    errors.push(error);
                }
            }
        }

        Err(errors)
    }

    /// Providers in priority order
    #[must_use]
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    #[must_use]
    pub fn provider(&self, id: ProviderId) -> Option<&Provider> {
        self.providers.get(id.index())
    }

    /// Upper bound on one pass over every provider
    #[must_use]
    pub fn longest_pass(&self) -> Duration {
        self.providers.iter().map(Provider::attempt_timeout).sum()
    }

    #[must_use]
    pub const fn queue(&self) -> &RetryQueue {
        &self.queue
    }

    #[must_use]
    pub const fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Read-only health view over the providers, queue and ledger
    #[must_use]
    pub fn status(&self) -> StatusAggregator<'_> {
        StatusAggregator::new(&self.providers, &self.queue, &self.ledger)
    }

    /// Run the retry processor until a shutdown signal is received.
    ///
    /// Each tick drains the due part of the retry queue and pushes it through
    /// the providers again. A pass in progress is always finished before the
    /// shutdown signal is observed.
    pub async fn serve(self: Arc<Self>, mut shutdown: broadcast::Receiver<Signal>) {
        internal!(
            level = INFO,
            interval_secs = self.retry_interval.as_secs(),
            "Retry processor starting"
        );

        let mut timer = tokio::time::interval(self.retry_interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let report = self.process_retries().await;
                    if report.attempted > 0 {
                        tracing::info!(
                            attempted = report.attempted,
                            delivered = report.delivered,
                            requeued = report.requeued,
                            failed = report.failed,
                            queue_length = self.queue.len(),
                            "Retry pass complete"
                        );
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!(level = INFO, "Retry processor received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "Retry processor lagged on lifecycle signals");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::error!("Retry processor shutdown channel closed");
                            break;
                        }
                    }
                }
            }
        }

        internal!(
            level = INFO,
            queue_length = self.queue.len(),
            "Retry processor stopped"
        );
    }
}

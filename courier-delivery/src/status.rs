//! Read-only health view over providers, the retry queue and the ledger

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    circuit_breaker::CircuitState,
    ledger::DedupLedger,
    provider::Provider,
    queue::RetryQueue,
    types::{DeliveryOutcome, ProviderId},
};

/// Overall health, derived from the breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    /// Every breaker is closed
    Operational,
    /// At least one breaker is not closed, but not all are open
    Degraded,
    /// Every breaker is open
    Down,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Operational => "OPERATIONAL",
            Self::Degraded => "DEGRADED",
            Self::Down => "DOWN",
        })
    }
}

/// Derive the service status from a set of breaker states.
///
/// An empty set is treated as operational.
pub fn derive_status(states: impl IntoIterator<Item = CircuitState>) -> ServiceStatus {
    let mut all_closed = true;
    let mut all_open = true;

    for state in states {
        all_closed &= state == CircuitState::Closed;
        all_open &= state == CircuitState::Open;
    }

    if all_closed {
        ServiceStatus::Operational
    } else if all_open {
        ServiceStatus::Down
    } else {
        ServiceStatus::Degraded
    }
}

/// Reporting view of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub id: ProviderId,
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Point-in-time report of the whole engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub service_status: ServiceStatus,
    /// Providers in priority order
    pub providers: Vec<ProviderStatus>,
    pub queue_length: usize,
    /// Ledger entries whose latest outcome is `SENT`
    pub sent_count: usize,
}

impl StatusSnapshot {
    /// Consecutive-failure counts keyed by provider name
    #[must_use]
    pub fn failure_counts(&self) -> BTreeMap<String, u32> {
        self.providers
            .iter()
            .map(|provider| (provider.name.clone(), provider.consecutive_failures))
            .collect()
    }

    /// Breaker states keyed by provider name
    #[must_use]
    pub fn circuit_states(&self) -> BTreeMap<String, CircuitState> {
        self.providers
            .iter()
            .map(|provider| (provider.name.clone(), provider.state))
            .collect()
    }
}

/// Borrowing view used by the coordinator's `status()` accessor.
///
/// Each breaker is read under its own lock, so a snapshot is consistent per
/// provider but not across providers.
#[derive(Debug, Clone, Copy)]
pub struct StatusAggregator<'a> {
    providers: &'a [Provider],
    queue: &'a RetryQueue,
    ledger: &'a DedupLedger,
}

impl<'a> StatusAggregator<'a> {
    #[must_use]
    pub const fn new(
        providers: &'a [Provider],
        queue: &'a RetryQueue,
        ledger: &'a DedupLedger,
    ) -> Self {
        Self {
            providers,
            queue,
            ledger,
        }
    }

    pub fn service_status(&self) -> ServiceStatus {
        derive_status(self.providers.iter().map(Provider::circuit_state))
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let providers: Vec<ProviderStatus> = self
            .providers
            .iter()
            .map(|provider| {
                let stats = provider.stats();
                ProviderStatus {
                    id: provider.id(),
                    name: provider.name().to_string(),
                    state: stats.state,
                    consecutive_failures: stats.consecutive_failures,
                }
            })
            .collect();

        StatusSnapshot {
            service_status: derive_status(providers.iter().map(|provider| provider.state)),
            providers,
            queue_length: self.queue.len(),
            sent_count: self.ledger.count(DeliveryOutcome::Sent),
        }
    }
}

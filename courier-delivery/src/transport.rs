//! Provider transports
//!
//! A [`Transport`] is the wire to one external mail vendor. The engine only
//! cares whether an attempt succeeded; timeouts are applied by the provider
//! wrapping the transport.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, TransportError},
    types::Email,
};

/// One external delivery endpoint
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Hand the email to the vendor.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the vendor could not be reached or
    /// refused the message.
    async fn deliver(&self, email: &Email) -> Result<(), TransportError>;
}

/// Transport selection in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransportConfig {
    /// An in-process stand-in for a vendor API with tunable reliability
    Simulated {
        /// Probability in `0.0..=1.0` that an attempt fails
        #[serde(default)]
        failure_rate: f64,
        /// Artificial latency added to every attempt (milliseconds)
        #[serde(default)]
        latency_ms: u64,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Simulated {
            failure_rate: 0.0,
            latency_ms: 0,
        }
    }
}

impl TransportConfig {
    /// Build the configured transport
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are out of range.
    pub fn build(&self, provider: &str) -> Result<Arc<dyn Transport>, ConfigError> {
        match *self {
            Self::Simulated {
                failure_rate,
                latency_ms,
            } => {
                if !(0.0..=1.0).contains(&failure_rate) {
                    return Err(ConfigError::InvalidFailureRate {
                        provider: provider.to_string(),
                        rate: failure_rate,
                    });
                }

                Ok(Arc::new(SimulatedTransport::new(
                    failure_rate,
                    Duration::from_millis(latency_ms),
                )))
            }
        }
    }
}

/// Simulated vendor endpoint.
///
/// Fails with probability `failure_rate` after sleeping for `latency`. A rate
/// of `0.0` or `1.0` makes it deterministic. The rate can be changed while
/// the engine is running.
#[derive(Debug)]
pub struct SimulatedTransport {
    failure_rate: AtomicU64,
    latency: Duration,
    attempts: AtomicU64,
}

impl SimulatedTransport {
    #[must_use]
    pub fn new(failure_rate: f64, latency: Duration) -> Self {
        Self {
            failure_rate: AtomicU64::new(failure_rate.clamp(0.0, 1.0).to_bits()),
            latency,
            attempts: AtomicU64::new(0),
        }
    }

    /// A transport that accepts everything
    #[must_use]
    pub fn reliable() -> Self {
        Self::new(0.0, Duration::ZERO)
    }

    /// A transport that refuses everything
    #[must_use]
    pub fn failing() -> Self {
        Self::new(1.0, Duration::ZERO)
    }

    pub fn set_failure_rate(&self, failure_rate: f64) {
        self.failure_rate
            .store(failure_rate.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }

    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        f64::from_bits(self.failure_rate.load(Ordering::SeqCst))
    }

    /// Number of attempts this transport has received
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn deliver(&self, email: &Email) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let fails = rand::rng().random_bool(self.failure_rate());
        if fails {
            Err(TransportError::ConnectionFailed(format!(
                "simulated outage while sending {}",
                email.id
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> Email {
        Email::new(Some("e1".to_string()), "a@example.com", "subject", "body")
    }

    #[tokio::test]
    async fn test_deterministic_extremes() {
        let reliable = SimulatedTransport::reliable();
        assert!(reliable.deliver(&email()).await.is_ok());

        let failing = SimulatedTransport::failing();
        assert!(matches!(
            failing.deliver(&email()).await,
            Err(TransportError::ConnectionFailed(_))
        ));

        assert_eq!(reliable.attempts(), 1);
        assert_eq!(failing.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failure_rate_can_change() {
        let transport = SimulatedTransport::failing();
        assert!(transport.deliver(&email()).await.is_err());

        transport.set_failure_rate(0.0);
        assert!(transport.deliver(&email()).await.is_ok());
        assert_eq!(transport.attempts(), 2);
    }

    #[test]
    fn test_build_rejects_invalid_rate() {
        let config = TransportConfig::Simulated {
            failure_rate: 1.5,
            latency_ms: 0,
        };
        assert_eq!(
            config.build("Provider1").unwrap_err(),
            ConfigError::InvalidFailureRate {
                provider: "Provider1".to_string(),
                rate: 1.5,
            }
        );
    }
}

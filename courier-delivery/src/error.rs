//! Typed error handling for delivery operations.
//!
//! Only [`ValidationError`] ever reaches a caller of `send`. Everything else
//! is absorbed by the coordinator and turned into breaker accounting, failover
//! decisions, or a recorded outcome in the ledger.

use std::{sync::Arc, time::Duration};

use thiserror::Error;

/// A submission was rejected before any provider was contacted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// One or more of `to`, `subject` or `body` was absent or blank.
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

/// A single provider attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The provider endpoint could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The provider answered but refused the message.
    #[error("Rejected by provider: {0}")]
    Rejected(String),

    /// The attempt did not finish within the provider's attempt timeout.
    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Invalid engine configuration, detected at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("At least one provider must be configured")]
    NoProviders,

    #[error("Provider name {0:?} is configured more than once")]
    DuplicateProvider(String),

    #[error("Provider name must not be empty")]
    EmptyProviderName,

    #[error("Failure threshold for provider {0} must be at least 1")]
    ZeroFailureThreshold(String),

    #[error("Failure rate {rate} for provider {provider} must be within 0.0..=1.0")]
    InvalidFailureRate { provider: String, rate: f64 },

    #[error("Retry interval must be greater than zero")]
    ZeroRetryInterval,

    #[error("Retry jitter factor {0} must be within 0.0..=1.0")]
    InvalidJitterFactor(f64),

    #[error("Maximum retry delay of {secs}s exceeds the limit of {limit}s")]
    RetryDelayTooLarge { secs: u64, limit: u64 },
}

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The provider was skipped because its breaker denied the request.
    #[error("Circuit open for provider {0}")]
    CircuitOpen(Arc<str>),

    /// The provider was tried and failed (including timeouts).
    #[error("Provider {provider} failed: {source}")]
    Transport {
        provider: Arc<str>,
        source: TransportError,
    },

    /// The retry budget is spent; the email is terminally failed.
    #[error("Gave up after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl DeliveryError {
    /// Returns `true` if a breaker skipped the provider without an attempt.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }

    /// Returns `true` if a provider was actually contacted and failed.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns `true` if no further attempts will be made.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::MaxRetriesExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let error = ValidationError::MissingFields(vec!["to", "body"]);
        assert_eq!(error.to_string(), "Missing required fields: to, body");
    }

    #[test]
    fn test_delivery_error_classification() {
        let open = DeliveryError::CircuitOpen(Arc::from("Provider1"));
        assert!(open.is_circuit_open());
        assert!(!open.is_transport());
        assert!(!open.is_terminal());

        let transport = DeliveryError::Transport {
            provider: Arc::from("Provider1"),
            source: TransportError::Timeout(Duration::from_secs(5)),
        };
        assert!(transport.is_transport());
        assert!(!transport.is_circuit_open());

        let terminal = DeliveryError::MaxRetriesExceeded {
            attempts: 5,
            last_error: "boom".to_string(),
        };
        assert!(terminal.is_terminal());
    }

    #[test]
    fn test_error_display() {
        let error = DeliveryError::Transport {
            provider: Arc::from("Provider2"),
            source: TransportError::ConnectionFailed("refused".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "Provider Provider2 failed: Connection failed: refused"
        );

        let error: DeliveryError = ConfigError::NoProviders.into();
        assert_eq!(
            error.to_string(),
            "Configuration error: At least one provider must be configured"
        );
    }
}

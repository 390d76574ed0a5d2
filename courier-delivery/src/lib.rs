//! Multi-provider delivery engine
//!
//! This crate provides:
//! - Ordered failover across a fixed list of providers
//! - A circuit breaker per provider
//! - Idempotent submission keyed by email identity
//! - A retry queue drained by a background task with exponential backoff
//! - A read-only status view for reporting

pub mod circuit_breaker;
mod coordinator;
pub mod error;
mod ledger;
pub mod policy;
mod provider;
pub mod queue;
mod service;
pub mod status;
pub mod transport;
mod types;

pub use circuit_breaker::{
    Admission, BreakerSettings, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
pub use coordinator::{
    CoordinatorBuilder, CoordinatorConfig, DeliveryCoordinator, retry::RetryPassReport,
};
pub use error::{ConfigError, DeliveryError, TransportError, ValidationError};
pub use ledger::DedupLedger;
pub use policy::RetryPolicy;
pub use provider::{Provider, ProviderConfig};
pub use queue::{QueuedEmail, RetryQueue};
pub use service::{DeliveryService, SubmitReceipt, SubmitRequest};
pub use status::{ProviderStatus, ServiceStatus, StatusAggregator, StatusSnapshot};
pub use transport::{SimulatedTransport, Transport, TransportConfig};
pub use types::{DeliveryOutcome, DeliveryResult, Email, EmailId, EmailStatus, ProviderId};

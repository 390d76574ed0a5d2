//! Service trait abstraction for delivery operations
//!
//! The transport layer depends on [`DeliveryService`] rather than on the
//! concrete coordinator, so handlers can be tested against a stub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    coordinator::DeliveryCoordinator,
    provider::Provider,
    error::ValidationError,
    status::StatusSnapshot,
    types::{DeliveryOutcome, DeliveryResult, Email, EmailId, ProviderId},
};

/// An inbound submission, as decoded from the wire.
///
/// Every field is optional so that missing fields surface as a
/// [`ValidationError`] rather than a decoding failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl From<SubmitRequest> for Email {
    fn from(request: SubmitRequest) -> Self {
        Self::new(
            request.id,
            request.to.unwrap_or_default(),
            request.subject.unwrap_or_default(),
            request.body.unwrap_or_default(),
        )
    }
}

/// What the caller learns about an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Whether the engine took responsibility for the email
    pub accepted: bool,
    pub id: EmailId,
    pub status: DeliveryOutcome,
    /// Name of the accepting provider, for `SENT`
    pub provider: Option<String>,
    pub error: Option<String>,
}

/// Operations the transport layer needs from the delivery engine
#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// Submit an email for delivery
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if a required field is missing.
    async fn submit(&self, request: SubmitRequest) -> Result<SubmitReceipt, ValidationError>;

    /// Current health and reporting view
    fn snapshot(&self) -> StatusSnapshot;

    /// Latest recorded outcome for an identity
    fn lookup(&self, id: &EmailId) -> Option<DeliveryResult>;

    /// Configured name of a provider
    fn provider_name(&self, id: ProviderId) -> Option<&str>;
}

#[async_trait]
impl DeliveryService for DeliveryCoordinator {
    async fn submit(&self, request: SubmitRequest) -> Result<SubmitReceipt, ValidationError> {
        let email = Email::from(request);
        let id = email.id.clone();
        let result = self.send(email).await?;

        let provider = result
            .provider
            .and_then(|provider| self.provider_name(provider))
            .map(str::to_string);

        Ok(SubmitReceipt {
            accepted: result.outcome != DeliveryOutcome::Failed,
            id,
            status: result.outcome,
            provider,
            error: result.error,
        })
    }

    fn snapshot(&self) -> StatusSnapshot {
        self.status().snapshot()
    }

    fn lookup(&self, id: &EmailId) -> Option<DeliveryResult> {
        self.ledger().get(id)
    }

    fn provider_name(&self, id: ProviderId) -> Option<&str> {
        self.provider(id).map(Provider::name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::transport::SimulatedTransport;

    #[tokio::test]
    async fn test_submit_reports_provider_name() {
        let coordinator = DeliveryCoordinator::builder()
            .provider("Provider1", Arc::new(SimulatedTransport::failing()))
            .provider("Provider2", Arc::new(SimulatedTransport::reliable()))
            .build()
            .unwrap();
        let service: &dyn DeliveryService = &coordinator;

        let receipt = service
            .submit(SubmitRequest {
                id: Some("e1".to_string()),
                to: Some("a@example.com".to_string()),
                subject: Some("hello".to_string()),
                body: Some("world".to_string()),
            })
            .await
            .unwrap();

        assert!(receipt.accepted);
        assert_eq!(receipt.id, EmailId::from("e1"));
        assert_eq!(receipt.status, DeliveryOutcome::Sent);
        assert_eq!(receipt.provider.as_deref(), Some("Provider2"));
        assert_eq!(
            service.lookup(&EmailId::from("e1")).map(|result| result.outcome),
            Some(DeliveryOutcome::Sent)
        );
    }

    #[test]
    fn test_provider_name_by_priority() {
        let coordinator = DeliveryCoordinator::builder()
            .provider("Provider1", Arc::new(SimulatedTransport::reliable()))
            .provider("Provider2", Arc::new(SimulatedTransport::reliable()))
            .build()
            .unwrap();
        let service: &dyn DeliveryService = &coordinator;

        let backup = coordinator.providers()[1].id();
        assert_eq!(service.provider_name(backup), Some("Provider2"));
        assert_eq!(service.provider_name(ProviderId(7)), None);
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_fields() {
        let coordinator = DeliveryCoordinator::builder()
            .provider("Provider1", Arc::new(SimulatedTransport::reliable()))
            .build()
            .unwrap();

        let error = coordinator
            .submit(SubmitRequest {
                to: Some("a@example.com".to_string()),
                ..SubmitRequest::default()
            })
            .await
            .unwrap_err();

        assert_eq!(error, ValidationError::MissingFields(vec!["subject", "body"]));
        assert!(coordinator.ledger().is_empty());
        assert_eq!(coordinator.snapshot().sent_count, 0);
    }
}

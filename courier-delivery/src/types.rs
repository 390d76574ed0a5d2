//! Type definitions shared by the coordinator, ledger and retry queue

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Stable identity of an email, used as the deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailId(Arc<str>);

impl EmailId {
    /// Generate a fresh, time-ordered identity
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(format!("email-{}", ulid::Ulid::new())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmailId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for EmailId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

/// Position of a provider in the configured priority list.
///
/// Assigned once when the coordinator is built; lower is tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub(crate) usize);

impl ProviderId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an email inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailStatus {
    Pending,
    Sent,
    Queued,
    Failed,
}

/// An outbound email and its delivery bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub status: EmailStatus,
    /// Number of complete passes over the provider list that failed
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Email {
    /// Create a pending email. A missing or blank `id` is replaced with a
    /// generated one.
    #[must_use]
    pub fn new(
        id: Option<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let id = id
            .filter(|id| !id.trim().is_empty())
            .map_or_else(EmailId::generate, EmailId::from);

        Self {
            id,
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            status: EmailStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Check that recipient, subject and body are all present.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingFields`] naming every blank field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing: Vec<&'static str> = [
            ("to", &self.to),
            ("subject", &self.subject),
            ("body", &self.body),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields(missing))
        }
    }
}

/// Recorded outcome of a `send`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryOutcome {
    Sent,
    Queued,
    Failed,
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sent => "SENT",
            Self::Queued => "QUEUED",
            Self::Failed => "FAILED",
        })
    }
}

/// What the ledger remembers about an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub outcome: DeliveryOutcome,
    /// The provider that accepted the email, if any
    pub provider: Option<ProviderId>,
    pub error: Option<String>,
}

impl DeliveryResult {
    #[must_use]
    pub const fn sent(provider: ProviderId) -> Self {
        Self {
            outcome: DeliveryOutcome::Sent,
            provider: Some(provider),
            error: None,
        }
    }

    #[must_use]
    pub const fn queued(error: Option<String>) -> Self {
        Self {
            outcome: DeliveryOutcome::Queued,
            provider: None,
            error,
        }
    }

    #[must_use]
    pub const fn failed(error: String) -> Self {
        Self {
            outcome: DeliveryOutcome::Failed,
            provider: None,
            error: Some(error),
        }
    }
}

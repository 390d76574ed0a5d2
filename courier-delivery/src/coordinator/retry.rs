//! Background retry pass over the retry queue

use std::sync::Arc;

use courier_common::{internal, tracing};
use tokio::{task::JoinSet, time::Instant};

use super::{DeliveryCoordinator, summarize};
use crate::{
    error::DeliveryError,
    types::{DeliveryResult, Email, EmailStatus},
};

/// Tally of one retry pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryPassReport {
    /// Emails drained from the queue
    pub attempted: usize,
    pub delivered: usize,
    /// Emails that failed again and went back into the queue
    pub requeued: usize,
    /// Emails that exhausted their retry budget
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryOutcome {
    Delivered,
    Requeued,
    Failed,
}

impl RetryPassReport {
    fn tally(&mut self, outcome: RetryOutcome) {
        match outcome {
            RetryOutcome::Delivered => self.delivered += 1,
            RetryOutcome::Requeued => self.requeued += 1,
            RetryOutcome::Failed => self.failed += 1,
        }
    }
}

impl DeliveryCoordinator {
    /// Drain every due email and push it through the providers again.
    ///
    /// Up to `max_concurrent_retries` emails are retried in parallel. The
    /// queue lock is released before any provider is contacted.
    pub async fn process_retries(self: &Arc<Self>) -> RetryPassReport {
        let due = self.queue.drain_due(Instant::now());
        let mut report = RetryPassReport {
            attempted: due.len(),
            ..RetryPassReport::default()
        };

        if due.is_empty() {
            return report;
        }

        internal!(
            level = DEBUG,
            due = due.len(),
            max_concurrent = self.max_concurrent_retries,
            "Retrying queued emails"
        );

        let mut join_set = JoinSet::new();
        let mut pending = due.into_iter();

        for email in pending.by_ref().take(self.max_concurrent_retries) {
            let coordinator = Arc::clone(self);
            join_set.spawn(async move { coordinator.retry_one(email).await });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => report.tally(outcome),
                Err(e) => tracing::error!(error = %e, "Retry task panicked"),
            }

            if let Some(email) = pending.next() {
                let coordinator = Arc::clone(self);
                join_set.spawn(async move { coordinator.retry_one(email).await });
            }
        }

        report
    }

    async fn retry_one(&self, mut email: Email) -> RetryOutcome {
        if !self.policy.should_retry(email.attempts) {
            self.fail_permanently(email);
            return RetryOutcome::Failed;
        }

        tracing::debug!(
            email_id = %email.id,
            attempt = email.attempts + 1,
            max_attempts = self.policy.max_attempts,
            "Retrying delivery"
        );

        match self.dispatch(&email).await {
            Ok(provider) => {
                email.status = EmailStatus::Sent;
                tracing::info!(
                    email_id = %email.id,
                    provider = %provider,
                    attempts = email.attempts + 1,
                    "Queued email delivered"
                );
                self.ledger
                    .record(email.id.clone(), DeliveryResult::sent(provider));
                RetryOutcome::Delivered
            }
            Err(errors) => {
                let error = summarize(&errors);
                email.attempts += 1;
                email.last_error = Some(error.clone());

                if !self.policy.should_retry(email.attempts) {
                    self.fail_permanently(email);
                    return RetryOutcome::Failed;
                }

                let delay = self.policy.retry_delay(email.attempts);
                tracing::warn!(
                    email_id = %email.id,
                    attempts = email.attempts,
                    remaining = self.policy.remaining_attempts(email.attempts),
                    retry_in_secs = delay.as_secs(),
                    error = %error,
                    "Retry failed, requeueing"
                );

                self.ledger
                    .record(email.id.clone(), DeliveryResult::queued(Some(error)));
                self.queue.enqueue(email, Instant::now() + delay);
                RetryOutcome::Requeued
            }
        }
    }

    fn fail_permanently(&self, mut email: Email) {
        email.status = EmailStatus::Failed;

        let error = DeliveryError::MaxRetriesExceeded {
            attempts: email.attempts,
            last_error: email.last_error.take().unwrap_or_default(),
        };

        tracing::error!(
            email_id = %email.id,
            attempts = email.attempts,
            error = %error,
            "Email permanently failed"
        );

        self.ledger
            .record(email.id, DeliveryResult::failed(error.to_string()));
    }
}

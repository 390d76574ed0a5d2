//! Retry queue for emails no provider accepted

pub mod retry;

use std::collections::VecDeque;

use ahash::AHashSet;
use tokio::time::Instant;

use crate::types::{Email, EmailId};

/// An email waiting for its next retry pass
#[derive(Debug, Clone)]
pub struct QueuedEmail {
    pub email: Email,
    /// Earliest instant the email may be retried
    pub eligible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<QueuedEmail>,
    members: AHashSet<EmailId>,
}

/// FIFO holding area, ordered by enqueue time.
///
/// An identity is present at most once. All operations take a single short
/// lock, which is never held across an await point.
#[derive(Debug, Default)]
pub struct RetryQueue {
    state: parking_lot::Mutex<QueueState>,
}

impl RetryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an email to the back of the queue.
    ///
    /// Returns `false` (and leaves the queue untouched) if the identity is
    /// already queued.
    pub fn enqueue(&self, email: Email, eligible_at: Instant) -> bool {
        let mut state = self.state.lock();

        if !state.members.insert(email.id.clone()) {
            return false;
        }

        state.items.push_back(QueuedEmail { email, eligible_at });
        true
    }

    /// Remove and return every email that is due at `now`, oldest first.
    ///
    /// Items that are not yet due keep their relative order.
    pub fn drain_due(&self, now: Instant) -> Vec<Email> {
        let mut state = self.state.lock();
        let QueueState { items, members } = &mut *state;

        let mut due = Vec::new();
        items.retain(|queued| {
            if queued.eligible_at <= now {
                members.remove(&queued.email.id);
                due.push(queued.email.clone());
                false
            } else {
                true
            }
        });

        due
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn contains(&self, id: &EmailId) -> bool {
        self.state.lock().members.contains(id)
    }

    /// Copy of the queue contents, front first
    pub fn pending(&self) -> Vec<QueuedEmail> {
        self.state.lock().items.iter().cloned().collect()
    }
}

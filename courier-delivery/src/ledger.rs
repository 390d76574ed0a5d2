//! Identity → outcome ledger backing idempotent resubmission

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::{DeliveryOutcome, DeliveryResult, EmailId};

/// Records the latest outcome for every identity the engine has seen.
///
/// Entries are never evicted for the lifetime of the process.
#[derive(Debug, Default)]
pub struct DedupLedger {
    entries: DashMap<EmailId, DeliveryResult>,
    claims: Arc<DashMap<EmailId, Arc<Mutex<()>>>>,
}

/// Exclusive right to perform the first delivery for an identity.
///
/// Released on drop; concurrent submitters of the same identity wait on it.
#[derive(Debug)]
pub struct Claim {
    id: EmailId,
    lock: Arc<Mutex<()>>,
    claims: Arc<DashMap<EmailId, Arc<Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.claims
            .remove_if(&self.id, |_, lock| Arc::ptr_eq(lock, &self.lock));
    }
}

impl DedupLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EmailId) -> Option<DeliveryResult> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &EmailId) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert or overwrite the outcome for an identity
    pub(crate) fn record(&self, id: EmailId, result: DeliveryResult) {
        self.entries.insert(id, result);
    }

    /// Wait for exclusive ownership of an identity's first delivery.
    ///
    /// The caller must re-check [`get`](Self::get) after acquiring the claim,
    /// since a previous holder may have recorded an outcome meanwhile.
    pub(crate) async fn claim(&self, id: &EmailId) -> Claim {
        let lock = Arc::clone(
            self.claims
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let guard = Arc::clone(&lock).lock_owned().await;

        Claim {
            id: id.clone(),
            lock,
            claims: Arc::clone(&self.claims),
            _guard: guard,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of identities whose latest outcome is `outcome`
    pub fn count(&self, outcome: DeliveryOutcome) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().outcome == outcome)
            .count()
    }
}

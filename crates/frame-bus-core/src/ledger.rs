//! Correlation and timeout ledger for pending requests.
//!
//! Maps an outstanding `messageId` to its settlement handle and enforces a
//! deadline. Settlement is exactly-once per id: a reply, the deadline timer
//! or `drain` wins, never more than one of them.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::envelope::ReplyEnvelope;
use crate::error::{BusError, LedgerError};

/// Outcome delivered for a registered request.
pub type Settlement = Result<ReplyEnvelope, BusError>;

struct PendingEntry {
    settle_tx: oneshot::Sender<Settlement>,
    timer: tokio::task::JoinHandle<()>,
    created_at: Instant,
}

/// Pending-request ledger shared between a caller and its inbox listener.
///
/// Cheap to clone; all clones share the same map.
#[derive(Clone, Default)]
pub struct PendingLedger {
    inner: Arc<Mutex<HashMap<Uuid, PendingEntry>>>,
}

impl PendingLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending entry and arm its deadline timer.
    ///
    /// The returned receiver yields the settlement exactly once; if the
    /// ledger is drained or the entry cancelled, the receiver errors instead.
    ///
    /// # Errors
    /// Returns `LedgerError::DuplicateId` if `id` is already pending.
    pub fn register(
        &self,
        id: Uuid,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Settlement>, LedgerError> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&id) {
            return Err(LedgerError::DuplicateId(id));
        }

        let (settle_tx, settle_rx) = oneshot::channel();
        let ledger = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            ledger.expire(id);
        });

        map.insert(
            id,
            PendingEntry {
                settle_tx,
                timer,
                created_at: Instant::now(),
            },
        );
        Ok(settle_rx)
    }

    /// Deliver a reply to the matching entry.
    ///
    /// Cancels the timer, removes the entry and settles it. Unknown or
    /// already-settled ids are a silent no-op; returns whether an entry
    /// was settled.
    pub fn settle(&self, id: Uuid, reply: ReplyEnvelope) -> bool {
        let entry = self.inner.lock().unwrap().remove(&id);
        match entry {
            Some(entry) => {
                entry.timer.abort();
                let _ = entry.settle_tx.send(Ok(reply));
                true
            }
            None => false,
        }
    }

    /// Deadline callback: settle the entry with `Timeout` if still pending.
    fn expire(&self, id: Uuid) {
        let entry = self.inner.lock().unwrap().remove(&id);
        if let Some(entry) = entry {
            tracing::debug!(%id, elapsed = ?entry.created_at.elapsed(), "pending request expired");
            let _ = entry.settle_tx.send(Err(BusError::Timeout));
        }
    }

    /// Remove an entry without settling it (the send itself failed, so
    /// there is nobody left to notify).
    pub fn cancel(&self, id: Uuid) {
        if let Some(entry) = self.inner.lock().unwrap().remove(&id) {
            entry.timer.abort();
        }
    }

    /// Reject every still-pending entry with `Disposed`.
    ///
    /// Called on agent teardown so in-flight requests fail immediately
    /// instead of lingering until their timers fire.
    pub fn drain(&self) {
        let entries: Vec<_> = self.inner.lock().unwrap().drain().collect();
        for (_, entry) in entries {
            entry.timer.abort();
            let _ = entry.settle_tx.send(Err(BusError::Disposed));
        }
    }

    /// Number of outstanding entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Correlation store for in-flight requests.
//!
//! Every entry reaches exactly one terminal state: resolved, rejected,
//! timed out or cancelled. Settlement always goes through
//! [`CorrelationStore::settle`], which removes the entry from the map before
//! completing its continuation, so whichever path removes the entry first is
//! the only one that settles it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use devbridge_protocols::{BridgeError, MessageId};

use crate::clock::{Clock, SystemClock};

/// Outcome delivered to the waiting caller.
pub type Settlement = Result<Value, BridgeError>;

struct PendingEntry {
    action: String,
    issued_at: Instant,
    timeout_at: Instant,
    timeout: Duration,
    sender: oneshot::Sender<Settlement>,
}

impl PendingEntry {
    fn timeout_error(&self) -> BridgeError {
        BridgeError::Timeout {
            action: self.action.clone(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

/// Tracks requests awaiting a response, keyed by correlation id.
pub struct CorrelationStore {
    entries: DashMap<MessageId, PendingEntry>,
    default_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl CorrelationStore {
    pub fn new(default_timeout: Duration) -> Self {
        Self::with_clock(default_timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(default_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            default_timeout,
            clock,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Register a request for `action` with the default timeout.
    pub fn register(self: &Arc<Self>, action: &str) -> (MessageId, PendingHandle) {
        self.register_with_timeout(action, self.default_timeout)
    }

    /// Register a request for `action`, allocating a fresh id.
    pub fn register_with_timeout(
        self: &Arc<Self>,
        action: &str,
        timeout: Duration,
    ) -> (MessageId, PendingHandle) {
        let (sender, receiver) = oneshot::channel();
        let issued_at = self.clock.now();
        let timeout_at = issued_at + timeout;
        let entry = PendingEntry {
            action: action.to_string(),
            issued_at,
            timeout_at,
            timeout,
            sender,
        };

        // Ids are never reused while an entry holds them.
        let id = loop {
            let candidate = uuid::Uuid::new_v4().to_string();
            match self.entries.entry(candidate.clone()) {
                Entry::Occupied(_) => {
                    trace!("Correlation id collision on {}, regenerating", candidate);
                    continue;
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                    break candidate;
                }
            }
        };
        debug!("Registered request {} ({}), timeout {:?}", id, action, timeout);

        let handle = PendingHandle {
            id: id.clone(),
            action: action.to_string(),
            timeout,
            deadline: timeout_at,
            receiver,
            store: Arc::clone(self),
        };
        (id, handle)
    }

    /// Complete a request with the peer's result. No-op for unknown ids.
    pub fn resolve(&self, id: &str, value: Value) -> bool {
        self.settle(id, |_| Ok(value))
    }

    /// Fail a request. No-op for unknown ids.
    pub fn reject(&self, id: &str, error: BridgeError) -> bool {
        self.settle(id, |_| Err(error))
    }

    /// Fail a request with `Timeout`. No-op for unknown ids.
    pub fn expire(&self, id: &str) -> bool {
        self.settle(id, |entry| Err(entry.timeout_error()))
    }

    /// Fail a request with `Cancelled`. No-op for unknown ids.
    pub fn cancel(&self, id: &str) -> bool {
        self.settle(id, |entry| Err(BridgeError::Cancelled(entry.action.clone())))
    }

    /// Reject every outstanding request with a clone of `error`.
    pub fn fail_all(&self, error: BridgeError) -> usize {
        let ids: Vec<MessageId> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter(|id| self.reject(id, error.clone()))
            .count()
    }

    /// Expire every entry whose deadline has passed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let due: Vec<MessageId> = self
            .entries
            .iter()
            .filter(|e| now >= e.timeout_at)
            .map(|e| e.key().clone())
            .collect();

        let mut expired = 0;
        for id in due {
            if let Some((_, entry)) = self.entries.remove_if(&id, |_, e| now >= e.timeout_at) {
                debug!(
                    "Request {} ({}) expired after {:?}",
                    id,
                    entry.action,
                    now - entry.issued_at
                );
                let error = entry.timeout_error();
                let _ = entry.sender.send(Err(error));
                expired += 1;
            }
        }
        expired
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` until
    /// `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Correlation sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let expired = self.sweep_expired();
                        if expired > 0 {
                            debug!("Swept {} expired requests", expired);
                        }
                    }
                }
            }
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Action of a pending request.
    pub fn action_of(&self, id: &str) -> Option<String> {
        self.entries.get(id).map(|e| e.action.clone())
    }

    fn settle(&self, id: &str, outcome: impl FnOnce(&PendingEntry) -> Settlement) -> bool {
        match self.entries.remove(id) {
            Some((_, entry)) => {
                let settlement = outcome(&entry);
                // The caller may already be gone; the entry is settled either way.
                let _ = entry.sender.send(settlement);
                true
            }
            None => false,
        }
    }

    /// Drop an entry without settling it. Used when the waiting side goes away.
    fn discard(&self, id: &str) {
        if self.entries.remove(id).is_some() {
            trace!("Discarded pending request {}", id);
        }
    }
}

/// Awaitable side of a registered request.
///
/// Dropping the handle before settlement removes the entry, so an abandoned
/// caller never leaves a dangling continuation behind.
pub struct PendingHandle {
    id: MessageId,
    action: String,
    timeout: Duration,
    deadline: Instant,
    receiver: oneshot::Receiver<Settlement>,
    store: Arc<CorrelationStore>,
}

impl PendingHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the settlement, expiring the entry once the deadline passes.
    pub async fn wait(mut self) -> Settlement {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(settlement)) => settlement,
            Ok(Err(_)) => Err(BridgeError::Cancelled(self.action.clone())),
            Err(_) => {
                // Lazy deadline check. If another path settled first, its
                // outcome is already waiting in the channel.
                self.store.expire(&self.id);
                match self.receiver.try_recv() {
                    Ok(settlement) => settlement,
                    Err(_) => Err(BridgeError::Timeout {
                        action: self.action.clone(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }),
                }
            }
        }
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        self.store.discard(&self.id);
    }
}

impl std::fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingHandle")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
#[path = "correlation_tests.rs"]
mod tests;

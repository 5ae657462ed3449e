//! Session synchronizer.
//!
//! Each side keeps its own copy of the session record. Fields are merged
//! independently: an update applies only if its `(version, writer priority)`
//! is greater than what is stored, so applying the same deltas in any order
//! converges to the same record.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use devbridge_bridge::{handler_fn, MessageBridge, SubscriptionHandle};
use devbridge_protocols::{actions, Origin, RemoteFault, SessionDelta};

use crate::error::SessionError;

const CHANGE_CAPACITY: usize = 256;

/// Stored state of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    pub value: Value,
    pub version: u64,
    pub writer: Origin,
}

impl FieldState {
    pub fn new(value: Value, version: u64, writer: Origin) -> Self {
        Self {
            value,
            version,
            writer,
        }
    }

    /// Whether `self` should replace `current`.
    ///
    /// Higher version wins; equal versions go to the writer with the higher
    /// priority (local); a full tie falls back to comparing the serialized
    /// values so the order stays total.
    pub fn supersedes(&self, current: &FieldState) -> bool {
        let mine = (self.version, self.writer.priority());
        let theirs = (current.version, current.writer.priority());
        if mine != theirs {
            return mine > theirs;
        }
        self.value.to_string() > current.value.to_string()
    }
}

/// One session: field name to latest state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub fields: BTreeMap<String, FieldState>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Merge one field update. Returns `true` if it was applied.
    pub fn merge(&mut self, field: &str, update: FieldState) -> bool {
        match self.fields.get(field) {
            Some(current) if !update.supersedes(current) => false,
            _ => {
                self.fields.insert(field.to_string(), update);
                true
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldState> {
        self.fields.get(field)
    }

    /// Current version of `field`, 0 if never written.
    pub fn version_of(&self, field: &str) -> u64 {
        self.fields.get(field).map_or(0, |f| f.version)
    }
}

/// Keeps session records in step with the peer over a [`MessageBridge`].
pub struct SessionSynchronizer {
    bridge: Arc<MessageBridge>,
    sessions: RwLock<HashMap<String, SessionRecord>>,
    active: RwLock<String>,
    changes: broadcast::Sender<SessionDelta>,
}

impl SessionSynchronizer {
    pub fn new(bridge: Arc<MessageBridge>, session_id: impl Into<String>) -> Arc<Self> {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Arc::new(Self {
            bridge,
            sessions: RwLock::new(HashMap::new()),
            active: RwLock::new(session_id.into()),
            changes,
        })
    }

    /// Listen for peer deltas and resync on every (re)connect.
    ///
    /// Handlers hold only a weak reference; dropping the synchronizer turns
    /// them into no-ops.
    pub fn attach(self: &Arc<Self>) -> Vec<SubscriptionHandle> {
        let on_delta = Arc::downgrade(self);
        let deltas = self.bridge.subscribe(
            actions::SESSION_DELTA,
            handler_fn(move |message| {
                let sync: Weak<SessionSynchronizer> = on_delta.clone();
                async move {
                    let delta: SessionDelta = serde_json::from_value(message.payload)
                        .map_err(|e| RemoteFault::invalid_payload(e.to_string()))?;
                    let applied = sync.upgrade().is_some_and(|s| s.apply_delta(&delta));
                    Ok(Value::Bool(applied))
                }
            }),
        );

        let on_connect = Arc::downgrade(self);
        let connected = self.bridge.subscribe(
            actions::CONNECTED,
            handler_fn(move |_| {
                let sync: Weak<SessionSynchronizer> = on_connect.clone();
                async move {
                    let sent = match sync.upgrade() {
                        Some(s) => s.resync().await,
                        None => 0,
                    };
                    Ok(Value::from(sent))
                }
            }),
        );

        vec![deltas, connected]
    }

    pub fn origin(&self) -> Origin {
        self.bridge.origin()
    }

    pub fn active_session(&self) -> String {
        self.active.read().clone()
    }

    pub fn set_active_session(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        info!("Active session is now {}", session_id);
        *self.active.write() = session_id;
    }

    /// Write `field` of the active session locally and broadcast it.
    ///
    /// The update is applied before anything is sent; an unreachable peer
    /// only delays propagation until the next resync. Fails only when the
    /// field's version cannot be incremented, in which case nothing is
    /// stored or sent.
    pub async fn local_update(
        &self,
        field: &str,
        value: Value,
    ) -> Result<SessionDelta, SessionError> {
        let session_id = self.active_session();
        let delta = {
            let mut sessions = self.sessions.write();
            let record = sessions
                .entry(session_id.clone())
                .or_insert_with(|| SessionRecord::new(session_id.clone()));
            let version = record.version_of(field).checked_add(1).ok_or_else(|| {
                SessionError::VersionExhausted {
                    session_id: session_id.clone(),
                    field: field.to_string(),
                }
            })?;
            let delta = SessionDelta::new(&session_id, field, value, version, self.origin());
            record.merge(
                field,
                FieldState::new(delta.value.clone(), version, delta.writer),
            );
            delta
        };

        let _ = self.changes.send(delta.clone());
        self.publish(&delta).await;
        Ok(delta)
    }

    /// Merge a peer update of `field`, written by the peer at `version`.
    pub fn apply_remote_delta(
        &self,
        session_id: &str,
        field: &str,
        value: Value,
        version: u64,
    ) -> bool {
        let delta = SessionDelta::new(session_id, field, value, version, self.origin().peer());
        self.apply_delta(&delta)
    }

    /// Merge a delta as received, keeping its original writer.
    ///
    /// A delta at `u64::MAX` is refused: it would leave no version for the
    /// next local write.
    pub fn apply_delta(&self, delta: &SessionDelta) -> bool {
        if delta.version == u64::MAX {
            warn!(
                "Refusing {}.{} at the maximum version",
                delta.session_id, delta.field
            );
            return false;
        }
        let applied = {
            let mut sessions = self.sessions.write();
            let record = sessions
                .entry(delta.session_id.clone())
                .or_insert_with(|| SessionRecord::new(delta.session_id.clone()));
            record.merge(
                &delta.field,
                FieldState::new(delta.value.clone(), delta.version, delta.writer),
            )
        };

        if applied {
            debug!(
                "Applied {}.{} v{} from {}",
                delta.session_id,
                delta.field,
                delta.version,
                delta.writer.as_str()
            );
            let _ = self.changes.send(delta.clone());
        } else {
            debug!(
                "Ignored stale {}.{} v{}",
                delta.session_id, delta.field, delta.version
            );
        }
        applied
    }

    /// Re-send every field of the active session. Returns how many were sent.
    pub async fn resync(&self) -> usize {
        let deltas: Vec<SessionDelta> = match self.snapshot(&self.active_session()) {
            Some(record) => record
                .fields
                .into_iter()
                .map(|(field, state)| {
                    SessionDelta::new(&record.id, field, state.value, state.version, state.writer)
                })
                .collect(),
            None => return 0,
        };

        let mut sent = 0;
        for delta in &deltas {
            if self.publish(delta).await {
                sent += 1;
            }
        }
        info!("Resynced {}/{} session fields", sent, deltas.len());
        sent
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.read().get(session_id).cloned()
    }

    /// State of `field` in the active session.
    pub fn get(&self, field: &str) -> Option<FieldState> {
        self.sessions
            .read()
            .get(&self.active_session())
            .and_then(|r| r.get(field).cloned())
    }

    /// Applied deltas, local and remote.
    pub fn changes(&self) -> broadcast::Receiver<SessionDelta> {
        self.changes.subscribe()
    }

    async fn publish(&self, delta: &SessionDelta) -> bool {
        let payload = match serde_json::to_value(delta) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode session delta: {}", e);
                return false;
            }
        };
        match self.bridge.emit(actions::SESSION_DELTA, payload).await {
            Ok(()) => true,
            Err(e) => {
                debug!(
                    "Session delta {}.{} not sent: {}",
                    delta.session_id, delta.field, e
                );
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

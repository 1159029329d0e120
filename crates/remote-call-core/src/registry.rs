//! Session registry and call correlation.
//!
//! One `parking_lot` mutex guards both the session map and the pending call
//! table. Every operation under it is short and never awaits; the only await
//! (sending a frame) happens after the lock is released.

use crate::channel::PeerChannel;
use crate::error::{CallError, CallResult};
use crate::pending::{CallKey, CallSlot, PendingCall, PendingCallInfo, PendingCallTable, Terminal};
use crate::protocol::CallFrame;
use crate::session::{Session, SessionId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What `issue_call` does when the correlation ID is already pending on the
/// same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Replace the table entry. The displaced call is abandoned: no response
    /// reaches it anymore, and its waiter only sees its own deadline or the
    /// session being unregistered.
    #[default]
    Overwrite,
    /// Refuse the new call and leave the pending one untouched.
    Reject,
}

struct SessionEntry {
    channel: Arc<dyn PeerChannel>,
    capabilities: BTreeSet<String>,
    outstanding: HashSet<String>,
    /// Slots displaced by a later call reusing their correlation ID.
    abandoned: Vec<(String, CallSlot)>,
    connected_at: DateTime<Utc>,
}

impl SessionEntry {
    fn snapshot(&self, id: SessionId) -> Session {
        let mut outstanding: Vec<String> = self.outstanding.iter().cloned().collect();
        outstanding.sort();
        Session {
            id,
            capabilities: self.capabilities.clone(),
            outstanding,
            connected_at: self.connected_at,
        }
    }

    fn take_abandoned(&mut self, correlation_id: &str, seq: u64) -> Option<CallSlot> {
        let pos = self
            .abandoned
            .iter()
            .position(|(id, slot)| id == correlation_id && slot.seq == seq)?;
        Some(self.abandoned.swap_remove(pos).1)
    }
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, SessionEntry>,
    calls: PendingCallTable,
}

impl RegistryState {
    /// Terminalize a call and detach it from its session in one step.
    ///
    /// With `seq` set, only the slot issued as `seq` is touched, so a stale
    /// timer can never finish a newer call that reused the ID.
    fn finish(&mut self, key: &CallKey, seq: Option<u64>, outcome: Terminal) -> bool {
        let slot = match seq {
            Some(seq) => self.calls.take_matching(key, seq),
            None => self.calls.take(key),
        };
        let Some(slot) = slot else {
            return false;
        };
        if let Some(entry) = self.sessions.get_mut(&key.session_id) {
            entry.outstanding.remove(&key.correlation_id);
        }
        slot.terminalize(outcome);
        true
    }

    /// Terminalize a displaced slot. Displaced slots are not in the table.
    fn finish_abandoned(&mut self, key: &CallKey, seq: u64, outcome: Terminal) -> bool {
        let slot = self
            .sessions
            .get_mut(&key.session_id)
            .and_then(|entry| entry.take_abandoned(&key.correlation_id, seq));
        match slot {
            Some(slot) => {
                slot.terminalize(outcome);
                true
            }
            None => false,
        }
    }
}

/// Registry of connected peers and their in-flight calls.
///
/// Cheap to clone; clones share state. Construct one per server and hand it
/// to every component that needs it.
#[derive(Clone)]
pub struct SessionRegistry {
    state: Arc<Mutex<RegistryState>>,
    next_seq: Arc<AtomicU64>,
    policy: CollisionPolicy,
}

impl SessionRegistry {
    /// Create an empty registry with the overwrite collision policy.
    pub fn new() -> Self {
        Self::with_policy(CollisionPolicy::default())
    }

    pub fn with_policy(policy: CollisionPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            next_seq: Arc::new(AtomicU64::new(1)),
            policy,
        }
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// Register a connected peer and return its new session ID.
    pub fn register<I, S>(&self, channel: Arc<dyn PeerChannel>, capabilities: I) -> SessionId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = SessionId::new();
        let entry = SessionEntry {
            channel,
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            outstanding: HashSet::new(),
            abandoned: Vec::new(),
            connected_at: Utc::now(),
        };
        let capability_count = entry.capabilities.len();

        let active_sessions = {
            let mut state = self.state.lock();
            state.sessions.insert(id, entry);
            state.sessions.len()
        };

        info!(
            session_id = %id,
            capabilities = capability_count,
            active_sessions,
            "Session registered"
        );
        id
    }

    /// Remove a session, cancelling every call it still owns.
    ///
    /// Safe to call repeatedly or for IDs that were never registered. Returns
    /// the number of calls that were cancelled.
    pub fn unregister(&self, session_id: &SessionId) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(mut entry) = state.sessions.remove(session_id) else {
            drop(guard);
            warn!(session_id = %session_id, "Attempted to unregister non-existent session");
            return 0;
        };

        let mut cancelled = 0;
        for correlation_id in entry.outstanding.drain() {
            let key = CallKey::new(*session_id, &correlation_id);
            if let Some(slot) = state.calls.take(&key) {
                slot.terminalize(Terminal::Cancelled);
                cancelled += 1;
            }
        }
        for (_, slot) in entry.abandoned.drain(..) {
            slot.terminalize(Terminal::Cancelled);
            cancelled += 1;
        }
        let active_sessions = state.sessions.len();
        drop(guard);

        info!(
            session_id = %session_id,
            cancelled,
            active_sessions,
            "Session unregistered"
        );
        cancelled
    }

    /// Snapshot of a registered session.
    pub fn lookup(&self, session_id: &SessionId) -> CallResult<Session> {
        self.state
            .lock()
            .sessions
            .get(session_id)
            .map(|entry| entry.snapshot(*session_id))
            .ok_or(CallError::SessionUnavailable(*session_id))
    }

    /// Register a pending call and send its frame to the peer.
    ///
    /// The slot is in the table before the frame leaves, so a fast response
    /// always finds it. If the send fails, the entry and the session's
    /// outstanding membership are rolled back before the error returns.
    pub async fn issue_call(
        &self,
        session_id: &SessionId,
        correlation_id: &str,
        capability: &str,
        arguments: Value,
    ) -> CallResult<PendingCall> {
        let key = CallKey::new(*session_id, correlation_id);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (slot, rx) = CallSlot::new(seq, capability);

        let (channel, displaced_seq) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let Some(entry) = state.sessions.get_mut(session_id) else {
                drop(guard);
                error!(
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    "No session found for call"
                );
                return Err(CallError::SessionUnavailable(*session_id));
            };

            if self.policy == CollisionPolicy::Reject && state.calls.contains(&key) {
                drop(guard);
                warn!(
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    "Correlation ID already pending, rejecting call"
                );
                return Err(CallError::Execution(format!(
                    "call {} is already pending on session {}",
                    correlation_id, session_id
                )));
            }

            let displaced_seq = state.calls.insert(key.clone(), slot).map(|old| {
                let old_seq = old.seq;
                entry.abandoned.push((correlation_id.to_string(), old));
                old_seq
            });
            entry.outstanding.insert(correlation_id.to_string());
            (entry.channel.clone(), displaced_seq)
        };

        if displaced_seq.is_some() {
            warn!(
                session_id = %session_id,
                correlation_id = %correlation_id,
                "Correlation ID already pending, overwriting"
            );
        }

        info!(
            session_id = %session_id,
            correlation_id = %correlation_id,
            capability = %capability,
            "Calling remote capability"
        );

        // Armed before the send so a dropped issue future cleans up too.
        let mut call = PendingCall::new(key.clone(), seq, rx, self.clone());
        let frame = CallFrame::new(correlation_id, capability, arguments);

        if let Err(source) = channel.send_call(&frame).await {
            error!(
                session_id = %session_id,
                correlation_id = %correlation_id,
                error = %source,
                "Failed to send call frame"
            );
            call.disarm();
            self.rollback(&key, call.seq(), displaced_seq);
            return Err(CallError::SendFailure {
                session_id: *session_id,
                correlation_id: correlation_id.to_string(),
                source,
            });
        }

        debug!(
            session_id = %session_id,
            correlation_id = %correlation_id,
            "Call frame sent"
        );
        Ok(call)
    }

    /// Deliver a response to the matching pending call.
    ///
    /// Unknown, late and duplicate responses are dropped. Returns whether a
    /// pending call was found.
    pub fn resolve_call(&self, session_id: &SessionId, correlation_id: &str, payload: Value) -> bool {
        let key = CallKey::new(*session_id, correlation_id);
        let resolved = self
            .state
            .lock()
            .finish(&key, None, Terminal::Resolved(payload));

        if resolved {
            info!(
                session_id = %session_id,
                correlation_id = %correlation_id,
                "Resolved pending call"
            );
        } else {
            warn!(
                session_id = %session_id,
                correlation_id = %correlation_id,
                "No pending call found or already handled"
            );
        }
        resolved
    }

    /// Wait for an issued call. Same as [`PendingCall::wait`].
    pub async fn await_call(&self, call: PendingCall, timeout: Duration) -> CallResult<Value> {
        call.wait(timeout).await
    }

    /// In-flight calls of one session, oldest first.
    pub fn pending_calls(&self, session_id: &SessionId) -> Vec<PendingCallInfo> {
        let state = self.state.lock();
        let Some(entry) = state.sessions.get(session_id) else {
            return Vec::new();
        };
        let mut calls: Vec<PendingCallInfo> = entry
            .outstanding
            .iter()
            .filter_map(|id| {
                state
                    .calls
                    .get(&CallKey::new(*session_id, id))
                    .map(|slot| slot.info(id))
            })
            .collect();
        calls.sort_by(|a, b| b.age.cmp(&a.age));
        calls
    }

    /// Whether a call with this ID is reachable from the table.
    pub fn is_pending(&self, session_id: &SessionId, correlation_id: &str) -> bool {
        self.state
            .lock()
            .calls
            .contains(&CallKey::new(*session_id, correlation_id))
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Number of calls reachable from the table, across all sessions.
    pub fn pending_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Deadline path: terminalize the call issued as `seq` if still live.
    pub(crate) fn expire(&self, key: &CallKey, seq: u64) -> bool {
        let mut state = self.state.lock();
        state.finish(key, Some(seq), Terminal::TimedOut)
            || state.finish_abandoned(key, seq, Terminal::TimedOut)
    }

    /// Waiter went away without observing an outcome.
    pub(crate) fn abandon(&self, key: &CallKey, seq: u64) {
        let removed = {
            let mut state = self.state.lock();
            state.finish(key, Some(seq), Terminal::Cancelled)
                || state.finish_abandoned(key, seq, Terminal::Cancelled)
        };
        if removed {
            debug!(
                session_id = %key.session_id,
                correlation_id = %key.correlation_id,
                "Pending call dropped by caller"
            );
        }
    }

    /// Undo a registration whose frame could not be sent.
    ///
    /// A slot displaced by this call goes back into the table, so the failed
    /// call leaves the session exactly as it found it.
    fn rollback(&self, key: &CallKey, seq: u64, displaced_seq: Option<u64>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        // Already gone if the session was unregistered during the send.
        if state.calls.take_matching(key, seq).is_none() {
            return;
        }
        let Some(entry) = state.sessions.get_mut(&key.session_id) else {
            return;
        };

        let restored = displaced_seq.and_then(|old| entry.take_abandoned(&key.correlation_id, old));
        match restored {
            Some(slot) => {
                state.calls.insert(key.clone(), slot);
            }
            None => {
                entry.outstanding.remove(&key.correlation_id);
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SessionRegistry")
            .field("sessions", &state.sessions.len())
            .field("pending", &state.calls.len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn channel() -> (Arc<dyn PeerChannel>, mpsc::Receiver<CallFrame>) {
        let (tx, rx) = mpsc::channel::<CallFrame>(16);
        let tx: Arc<dyn PeerChannel> = Arc::new(tx);
        (tx, rx)
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();

        let id = registry.register(tx, ["read_file", "list_dir"]);
        let session = registry.lookup(&id).unwrap();

        assert_eq!(session.id, id);
        assert!(session.supports("read_file"));
        assert!(session.supports("list_dir"));
        assert!(session.outstanding.is_empty());
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_register_allocates_unique_ids() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = channel();
        let (b, _rx_b) = channel();

        let first = registry.register(a, Vec::<String>::new());
        let second = registry.register(b, Vec::<String>::new());

        assert_ne!(first, second);
        assert_eq!(registry.session_count(), 2);
    }

    #[test]
    fn test_lookup_unknown_session() {
        let registry = SessionRegistry::new();
        let missing = SessionId::new();
        assert!(matches!(
            registry.lookup(&missing),
            Err(CallError::SessionUnavailable(id)) if id == missing
        ));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx, Vec::<String>::new());

        assert_eq!(registry.unregister(&id), 0);
        assert_eq!(registry.unregister(&id), 0);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_default_policy_is_overwrite() {
        assert_eq!(SessionRegistry::new().policy(), CollisionPolicy::Overwrite);
        assert_eq!(
            SessionRegistry::with_policy(CollisionPolicy::Reject).policy(),
            CollisionPolicy::Reject
        );
    }
}

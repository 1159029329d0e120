//! Pending call table and per-call result slots.
//!
//! Each in-flight call owns a [`CallSlot`] holding the send half of a
//! `oneshot` channel. Terminalizing a slot consumes it, so the single
//! terminal write is enforced by ownership. The caller keeps the receive half
//! inside a [`PendingCall`].

use crate::error::{CallError, CallResult};
use crate::registry::SessionRegistry;
use crate::session::SessionId;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Lifecycle of a pending call. `Created` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Created,
    Resolved,
    Cancelled,
    TimedOut,
}

/// Terminal outcome written into a slot.
#[derive(Debug)]
pub(crate) enum Terminal {
    Resolved(Value),
    Cancelled,
    TimedOut,
}

impl Terminal {
    pub(crate) fn state(&self) -> CallState {
        match self {
            Terminal::Resolved(_) => CallState::Resolved,
            Terminal::Cancelled => CallState::Cancelled,
            Terminal::TimedOut => CallState::TimedOut,
        }
    }
}

/// Table key. Correlation IDs are scoped to their session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CallKey {
    pub(crate) session_id: SessionId,
    pub(crate) correlation_id: String,
}

impl CallKey {
    pub(crate) fn new(session_id: SessionId, correlation_id: &str) -> Self {
        Self {
            session_id,
            correlation_id: correlation_id.to_string(),
        }
    }
}

/// Write-once result slot of one call.
#[derive(Debug)]
pub(crate) struct CallSlot {
    /// Process-unique issue sequence, distinguishes calls reusing an ID.
    pub(crate) seq: u64,
    pub(crate) capability: String,
    pub(crate) created_at: Instant,
    tx: oneshot::Sender<Terminal>,
}

impl CallSlot {
    pub(crate) fn new(seq: u64, capability: &str) -> (Self, oneshot::Receiver<Terminal>) {
        let (tx, rx) = oneshot::channel();
        let slot = Self {
            seq,
            capability: capability.to_string(),
            created_at: Instant::now(),
            tx,
        };
        (slot, rx)
    }

    /// Write the terminal outcome. Returns false when nobody is waiting.
    pub(crate) fn terminalize(self, outcome: Terminal) -> bool {
        let state = outcome.state();
        let delivered = self.tx.send(outcome).is_ok();
        debug!(seq = self.seq, state = ?state, delivered, "Call slot terminalized");
        delivered
    }

    pub(crate) fn info(&self, correlation_id: &str) -> PendingCallInfo {
        PendingCallInfo {
            correlation_id: correlation_id.to_string(),
            capability: self.capability.clone(),
            age: self.created_at.elapsed(),
        }
    }
}

/// Diagnostic view of one in-flight call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCallInfo {
    pub correlation_id: String,
    pub capability: String,
    pub age: Duration,
}

/// In-flight calls keyed by (session, correlation ID).
///
/// Not synchronized on its own; it lives inside the registry's lock together
/// with the session map so that both change in one step.
#[derive(Debug, Default)]
pub(crate) struct PendingCallTable {
    slots: HashMap<CallKey, CallSlot>,
}

impl PendingCallTable {
    /// Insert a slot, returning the one it displaced.
    pub(crate) fn insert(&mut self, key: CallKey, slot: CallSlot) -> Option<CallSlot> {
        self.slots.insert(key, slot)
    }

    pub(crate) fn take(&mut self, key: &CallKey) -> Option<CallSlot> {
        self.slots.remove(key)
    }

    /// Remove the slot only if it is still the one issued as `seq`.
    pub(crate) fn take_matching(&mut self, key: &CallKey, seq: u64) -> Option<CallSlot> {
        match self.slots.get(key) {
            Some(slot) if slot.seq == seq => self.slots.remove(key),
            _ => None,
        }
    }

    pub(crate) fn contains(&self, key: &CallKey) -> bool {
        self.slots.contains_key(key)
    }

    pub(crate) fn get(&self, key: &CallKey) -> Option<&CallSlot> {
        self.slots.get(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Caller-side handle of an issued call.
///
/// Dropping the handle before it has observed an outcome removes the call
/// from the table, so an abandoned waiter never leaves an orphaned slot.
pub struct PendingCall {
    key: CallKey,
    seq: u64,
    created_at: Instant,
    rx: oneshot::Receiver<Terminal>,
    registry: SessionRegistry,
    armed: bool,
}

impl PendingCall {
    pub(crate) fn new(
        key: CallKey,
        seq: u64,
        rx: oneshot::Receiver<Terminal>,
        registry: SessionRegistry,
    ) -> Self {
        Self {
            key,
            seq,
            created_at: Instant::now(),
            rx,
            registry,
            armed: true,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.key.session_id
    }

    pub fn correlation_id(&self) -> &str {
        &self.key.correlation_id
    }

    /// Time since the call was issued.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    /// Stop the drop guard; the registry has already dealt with the slot.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }

    /// Wait until the call terminalizes or `timeout` elapses.
    ///
    /// On timeout the slot is removed from the table here, since no response
    /// is coming to do it. If a response won the race in the meantime, that
    /// response is returned instead.
    pub async fn wait(mut self, timeout: Duration) -> CallResult<Value> {
        let outcome = match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                self.disarm();
                return Err(CallError::Execution(format!(
                    "result slot for call {} dropped before completion",
                    self.key.correlation_id
                )));
            }
            Err(_elapsed) => {
                if self.registry.expire(&self.key, self.seq) {
                    self.disarm();
                    warn!(
                        session_id = %self.key.session_id,
                        correlation_id = %self.key.correlation_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Remote call timed out"
                    );
                    return Err(self.timeout_error(timeout));
                }
                // Another terminal path got there between the deadline and the lock.
                match self.rx.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        self.disarm();
                        return Err(self.timeout_error(timeout));
                    }
                }
            }
        };

        self.disarm();
        match outcome {
            Terminal::Resolved(value) => Ok(value),
            Terminal::Cancelled => Err(CallError::Cancelled {
                correlation_id: self.key.correlation_id.clone(),
            }),
            Terminal::TimedOut => Err(self.timeout_error(timeout)),
        }
    }

    fn timeout_error(&self, timeout: Duration) -> CallError {
        CallError::Timeout {
            correlation_id: self.key.correlation_id.clone(),
            timeout,
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if self.armed {
            self.registry.abandon(&self.key, self.seq);
        }
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("session_id", &self.key.session_id)
            .field("correlation_id", &self.key.correlation_id)
            .field("seq", &self.seq)
            .field("armed", &self.armed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slot_terminalizes_once() {
        let (slot, mut rx) = CallSlot::new(1, "echo");
        assert!(slot.terminalize(Terminal::Resolved(json!("ok"))));

        match rx.try_recv() {
            Ok(Terminal::Resolved(value)) => assert_eq!(value, json!("ok")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_slot_without_waiter() {
        let (slot, rx) = CallSlot::new(1, "echo");
        drop(rx);
        assert!(!slot.terminalize(Terminal::Cancelled));
    }

    #[test]
    fn test_table_take_matching_checks_sequence() {
        let mut table = PendingCallTable::default();
        let key = CallKey::new(SessionId::new(), "call-1");
        let (first, _rx1) = CallSlot::new(1, "echo");
        let (second, _rx2) = CallSlot::new(2, "echo");

        assert!(table.insert(key.clone(), first).is_none());
        let displaced = table.insert(key.clone(), second).expect("first slot displaced");
        assert_eq!(displaced.seq, 1);

        assert!(table.take_matching(&key, 1).is_none());
        assert!(table.contains(&key));
        assert_eq!(table.take_matching(&key, 2).map(|s| s.seq), Some(2));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_terminal_states() {
        assert_eq!(Terminal::Resolved(Value::Null).state(), CallState::Resolved);
        assert_eq!(Terminal::Cancelled.state(), CallState::Cancelled);
        assert_eq!(Terminal::TimedOut.state(), CallState::TimedOut);
    }
}

//! Remote call core: invoke capabilities that live on connected peers.
//!
//! A peer holds a persistent duplex connection to the server and advertises
//! capabilities (tools) it can run locally. This crate lets an orchestrator
//! call one of those capabilities as if it were a local async function: it
//! sends a call frame, correlates the asynchronous response, and enforces a
//! deadline.
//!
//! # Core Invariants
//!
//! 1. **Single Terminal Write**: every pending call ends exactly once, as
//!    resolved, cancelled or timed out. Whichever event arrives first wins.
//! 2. **No Orphans**: a call is reachable from the pending table iff it has not
//!    terminalized, and unregistering a session cancels every call it owns.
//! 3. **Session-Scoped IDs**: correlation IDs only need to be unique within one
//!    session. Two sessions may use the same ID concurrently.
//! 4. **Quiet Recovery**: late responses, duplicate responses and repeated
//!    disconnects are logged and dropped, never surfaced as errors.
//!
//! # Architecture
//!
//! ```text
//! Executor -> Registry (lookup) -> Pending table (insert) -> PeerChannel (send)
//!                                        ^
//!  Dispatcher (per connection) ----------+ resolve_call
//! ```

pub mod channel;
pub mod error;
pub mod executor;
pub mod pending;
pub mod protocol;
pub mod registry;
pub mod session;

#[cfg(test)]
mod tests;

pub use channel::PeerChannel;
pub use error::{CallError, CallResult, ChannelError, FrameError};
pub use executor::{ChannelExecutor, RemoteExecutor, DEFAULT_CALL_TIMEOUT};
pub use pending::{CallState, PendingCall, PendingCallInfo};
pub use protocol::{CallData, CallFrame, InboundFrame, ResponseFrame, CALL_FRAME_TYPE};
pub use registry::{CollisionPolicy, SessionRegistry};
pub use session::{Session, SessionId};

//! Behavior tests for the remote call core.
//!
//! - `harness.rs`      - recording/failing peer channels and an echo peer
//! - `resolve.rs`      - issue, resolve and duplicate/late responses
//! - `disconnect.rs`   - unregister cascades and idempotence
//! - `timeout.rs`      - deadlines, late responses and ID reuse
//! - `collision.rs`    - same correlation ID twice on one session
//! - `isolation.rs`    - same correlation ID on different sessions
//! - `send_failure.rs` - rollback when the transport rejects a frame
//! - `executor.rs`     - the executor's outcome taxonomy end to end

mod isolation;

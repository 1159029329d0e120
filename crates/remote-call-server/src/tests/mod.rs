//! End-to-end tests over real WebSocket connections.
//!
//! - `harness.rs`: server startup and peer helpers
//! - `connection.rs`: handshake, capabilities, shutdown
//! - `calls.rs`: call round trips, disconnect cancellation, stray frames

mod connection;

//! WebSocket front-end for the remote call core.
//!
//! Peers connect over WebSocket, receive a `connection_established` frame
//! carrying their session ID, and from then on receive `tool_call` frames and
//! answer them with response frames. This crate owns that transport; call
//! correlation lives in `remote-call-core`.
//!
//! ```text
//! peer --ws--> BridgeServer --register--> SessionRegistry <--execute-- orchestrator
//!                  |                             ^
//!                  +-- Dispatcher --resolve_call-+
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod transport;

mod json_layer;

#[cfg(test)]
mod tests;

pub use config::ServerConfig;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{ServerError, ServerResult};
pub use logging::{init_with_config, LogConfig, LogFormat};
pub use protocol::ConnectionEstablished;
pub use server::BridgeServer;
pub use transport::WsChannel;

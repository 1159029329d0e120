//! Remote call executor.
//!
//! The orchestration layer sees remote capabilities through
//! [`RemoteExecutor`]: one async call in, one typed outcome out.

use crate::error::{CallError, CallResult};
use crate::registry::SessionRegistry;
use crate::session::SessionId;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, warn};

/// Deadline used when the caller does not pick one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes capabilities on a remote peer.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `capability` with `arguments` on the peer behind `session_id`.
    ///
    /// The caller supplies a fresh `correlation_id` per logical call.
    ///
    /// # Errors
    ///
    /// - [`CallError::SessionUnavailable`] if the session is not registered
    /// - [`CallError::SendFailure`] if the frame could not be sent
    /// - [`CallError::Timeout`] if no response arrived within `timeout`
    /// - [`CallError::Cancelled`] if the session disconnected while waiting
    /// - [`CallError::Execution`] for anything unexpected
    async fn execute(
        &self,
        session_id: &SessionId,
        correlation_id: &str,
        capability: &str,
        arguments: Value,
        timeout: Duration,
    ) -> CallResult<Value>;
}

/// [`RemoteExecutor`] backed by a [`SessionRegistry`] and its peer channels.
#[derive(Clone)]
pub struct ChannelExecutor {
    registry: SessionRegistry,
    default_timeout: Duration,
}

impl ChannelExecutor {
    pub fn new(registry: SessionRegistry) -> Self {
        Self::with_default_timeout(registry, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_default_timeout(registry: SessionRegistry, default_timeout: Duration) -> Self {
        Self {
            registry,
            default_timeout,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// [`RemoteExecutor::execute`] with the configured default deadline.
    pub async fn execute_with_default_timeout(
        &self,
        session_id: &SessionId,
        correlation_id: &str,
        capability: &str,
        arguments: Value,
    ) -> CallResult<Value> {
        self.execute(
            session_id,
            correlation_id,
            capability,
            arguments,
            self.default_timeout,
        )
        .await
    }
}

#[async_trait]
impl RemoteExecutor for ChannelExecutor {
    async fn execute(
        &self,
        session_id: &SessionId,
        correlation_id: &str,
        capability: &str,
        arguments: Value,
        timeout: Duration,
    ) -> CallResult<Value> {
        info!(
            session_id = %session_id,
            correlation_id = %correlation_id,
            capability = %capability,
            "Executor requesting remote capability"
        );

        let result = match self
            .registry
            .issue_call(session_id, correlation_id, capability, arguments)
            .await
        {
            Ok(call) => call.wait(timeout).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => {
                info!(correlation_id = %correlation_id, "Executor received result");
            }
            Err(e @ (CallError::Timeout { .. } | CallError::Cancelled { .. })) => {
                warn!(
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    kind = e.kind(),
                    error = %e,
                    "Remote call did not complete"
                );
            }
            Err(e) => {
                error!(
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    kind = e.kind(),
                    error = %e,
                    "Executor error"
                );
            }
        }
        result
    }
}

//! The handler seam and its error type.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::dispatch::context::DispatchContext;
use crate::resilience::OutboundError;
use crate::rpc::RpcError;

/// Failure of one dispatched method.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Upstream(OutboundError),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<OutboundError> for DispatchError {
    fn from(err: OutboundError) -> Self {
        match err {
            OutboundError::Cancelled => DispatchError::Cancelled,
            other => DispatchError::Upstream(other),
        }
    }
}

impl DispatchError {
    /// JSON-RPC error object for the response envelope.
    ///
    /// Internal details stay in the logs; the client sees a generic message.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            DispatchError::MethodNotFound(method) => RpcError::method_not_found(method),
            DispatchError::InvalidParams(message) => RpcError::invalid_params(message.clone()),
            DispatchError::InvalidRequest(message) => RpcError::invalid_request(message.clone()),
            DispatchError::Upstream(err) => RpcError::server_error(err.to_string()),
            DispatchError::Cancelled => RpcError::cancelled(),
            DispatchError::Internal(_) => RpcError::internal(),
        }
    }

    /// Label for the `outcome` metric dimension.
    pub fn outcome(&self) -> &'static str {
        match self {
            DispatchError::MethodNotFound(_) => "method_not_found",
            DispatchError::InvalidParams(_) | DispatchError::InvalidRequest(_) => "invalid",
            DispatchError::Upstream(OutboundError::RateLimitExceeded) => "rate_limited",
            DispatchError::Upstream(_) => "upstream_error",
            DispatchError::Cancelled => "cancelled",
            DispatchError::Internal(_) => "internal_error",
        }
    }
}

/// Business logic behind the gateway: everything that is not a built-in
/// protocol method.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Serve a request. Long-running work should watch `ctx.cancel_token()`
    /// or pass it on to the outbound executor.
    async fn handle(
        &self,
        ctx: &DispatchContext,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, DispatchError>;

    /// Observe a notification. Runs detached from the HTTP response.
    async fn notify(&self, ctx: &DispatchContext, method: &str, _params: Option<Value>) {
        tracing::debug!(session_id = %ctx.session_id(), method, "Ignoring notification");
    }
}

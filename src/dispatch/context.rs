//! Per-request context handed to method handlers.

use tokio_util::sync::CancellationToken;

use crate::rpc::RequestId;
use crate::security::AuthContext;

/// Everything a handler may know about the call it is serving.
///
/// Built once by the dispatcher and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    session_id: String,
    request_id: Option<RequestId>,
    auth: AuthContext,
    protocol_version: Option<String>,
    cancel: CancellationToken,
}

impl DispatchContext {
    pub fn new(
        session_id: impl Into<String>,
        request_id: Option<RequestId>,
        auth: AuthContext,
        protocol_version: Option<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            request_id,
            auth,
            protocol_version,
            cancel,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// `None` for notifications.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Signalled when the client cancels this request or its session ends.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

//! Routes admitted messages to built-in methods or the injected handler.
//!
//! # Responsibilities
//! - Track every request in the cancellation registry for its whole lifetime
//! - Serve the protocol built-ins (`initialize`, `ping`, `notifications/*`)
//! - Race the handler against its cancellation token
//!
//! # Design Decisions
//! - A second request reusing an in-flight `(session, id)` is refused rather
//!   than overwriting the first request's cancellation handle
//! - A cancelled request still gets a response envelope (-32800)

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::ProtocolConfig;
use crate::dispatch::context::DispatchContext;
use crate::dispatch::handler::{DispatchError, MethodHandler};
use crate::observability::metrics;
use crate::rpc::{IncomingMessage, JsonRpcResponse, RequestId, RpcError};
use crate::security::{negotiate_version, AuthContext};
use crate::session::SessionManager;

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_PING: &str = "ping";
pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";

/// What the HTTP layer should send back.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A JSON-RPC envelope (200).
    Response(JsonRpcResponse),
    /// Notification accepted, no body (202).
    Accepted,
}

pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    handler: Arc<dyn MethodHandler>,
    protocol: ProtocolConfig,
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<SessionManager>,
        handler: Arc<dyn MethodHandler>,
        protocol: ProtocolConfig,
    ) -> Self {
        Self {
            sessions,
            handler,
            protocol,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Serve one admitted message on `session_id`.
    ///
    /// `header_version` is the `mcp-protocol-version` the gate accepted, if
    /// the client sent one.
    pub async fn dispatch(
        &self,
        message: IncomingMessage,
        session_id: &str,
        auth: AuthContext,
        header_version: Option<String>,
    ) -> DispatchOutcome {
        let version = header_version.or_else(|| {
            self.sessions
                .state(session_id)
                .and_then(|s| s.protocol_version)
        });

        match message {
            IncomingMessage::Request { id, method, params } => {
                let response = self
                    .handle_request(id, method, params, session_id, auth, version)
                    .await;
                DispatchOutcome::Response(response)
            }
            IncomingMessage::Notification { method, params } => {
                self.handle_notification(method, params, session_id, auth, version);
                DispatchOutcome::Accepted
            }
        }
    }

    async fn handle_request(
        &self,
        id: RequestId,
        method: Option<String>,
        params: Option<Value>,
        session_id: &str,
        auth: AuthContext,
        version: Option<String>,
    ) -> JsonRpcResponse {
        let Some(method) = method else {
            metrics::record_request("", "invalid");
            return JsonRpcResponse::failure(Some(id), RpcError::invalid_request("Missing method"));
        };

        let guard = match self.sessions.registry().register(session_id, &id) {
            Ok(guard) => guard,
            Err(duplicate) => {
                tracing::warn!(session_id = %session_id, request_id = %id, "Duplicate in-flight request id");
                metrics::record_request(&method, "invalid");
                return JsonRpcResponse::failure(
                    Some(id),
                    RpcError::invalid_request(duplicate.to_string()),
                );
            }
        };

        let ctx = DispatchContext::new(
            session_id,
            Some(id.clone()),
            auth,
            version,
            guard.token().clone(),
        );

        tracing::debug!(session_id = %session_id, request_id = %id, method = %method, "Dispatching request");

        let result = tokio::select! {
            biased;
            _ = ctx.cancel_token().cancelled() => Err(DispatchError::Cancelled),
            result = self.call(&ctx, &method, params) => result,
        };

        // Registry entry goes away here, before the response is written.
        drop(guard);

        match result {
            Ok(value) => {
                metrics::record_request(&method, "success");
                JsonRpcResponse::success(id, value)
            }
            Err(err) => {
                match &err {
                    DispatchError::Cancelled => {
                        tracing::info!(session_id = %session_id, request_id = %id, method = %method, "Request cancelled")
                    }
                    DispatchError::Internal(detail) => {
                        tracing::error!(session_id = %session_id, request_id = %id, method = %method, error = %detail, "Handler failed")
                    }
                    other => {
                        tracing::debug!(session_id = %session_id, request_id = %id, method = %method, error = %other, "Request failed")
                    }
                }
                metrics::record_request(&method, err.outcome());
                JsonRpcResponse::failure(Some(id), err.to_rpc_error())
            }
        }
    }

    async fn call(
        &self,
        ctx: &DispatchContext,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, DispatchError> {
        match method {
            METHOD_INITIALIZE => Ok(self.initialize(ctx.session_id(), params.as_ref())),
            METHOD_PING => Ok(json!({})),
            _ => self.handler.handle(ctx, method, params).await,
        }
    }

    /// Negotiate the protocol version and remember it for the session.
    fn initialize(&self, session_id: &str, params: Option<&Value>) -> Value {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let negotiated = negotiate_version(requested, &self.protocol.supported_versions)
            .or_else(|| requested.map(str::to_string))
            .unwrap_or_default();
        let client_name = params
            .and_then(|p| p.pointer("/clientInfo/name"))
            .and_then(Value::as_str)
            .map(str::to_string);

        tracing::info!(
            session_id = %session_id,
            requested = ?requested,
            negotiated = %negotiated,
            client = ?client_name,
            "Session initialized"
        );

        self.sessions.update_state(session_id, |state| {
            state.protocol_version = Some(negotiated.clone());
            state.client_name = client_name;
        });

        let mut result = json!({
            "protocolVersion": negotiated,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": self.protocol.server_name,
                "version": self.protocol.server_version,
            },
        });
        if let Some(instructions) = &self.protocol.instructions {
            result["instructions"] = Value::String(instructions.clone());
        }
        result
    }

    fn handle_notification(
        &self,
        method: Option<String>,
        params: Option<Value>,
        session_id: &str,
        auth: AuthContext,
        version: Option<String>,
    ) {
        let Some(method) = method else {
            tracing::debug!(session_id = %session_id, "Ignoring notification without method");
            return;
        };

        match method.as_str() {
            NOTIFICATION_CANCELLED => self.cancel_request(session_id, params.as_ref()),
            NOTIFICATION_INITIALIZED => {
                self.sessions.update_state(session_id, |state| state.initialized = true);
                tracing::debug!(session_id = %session_id, "Client reported initialized");
            }
            _ => {
                let ctx = DispatchContext::new(session_id, None, auth, version, CancellationToken::new());
                let handler = Arc::clone(&self.handler);
                tokio::spawn(async move {
                    handler.notify(&ctx, &method, params).await;
                });
            }
        }
    }

    fn cancel_request(&self, session_id: &str, params: Option<&Value>) {
        let Some(request_id) = params
            .and_then(|p| p.get("requestId"))
            .and_then(RequestId::from_value)
        else {
            tracing::debug!(session_id = %session_id, "Cancel notification without a usable requestId");
            return;
        };
        let reason = params
            .and_then(|p| p.get("reason"))
            .and_then(Value::as_str);

        let found = self.sessions.registry().cancel(session_id, &request_id);
        metrics::record_cancellation(found);
        tracing::info!(
            session_id = %session_id,
            request_id = %request_id,
            reason = ?reason,
            found,
            "Cancel requested"
        );
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sessions", &self.sessions)
            .field("supported_versions", &self.protocol.supported_versions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthStrategy;
    use crate::rpc::codes;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// `echo` returns its params, `wait` blocks until cancelled, `boom` fails.
    struct TestHandler {
        started: Notify,
        notified: Notify,
    }

    #[async_trait]
    impl MethodHandler for TestHandler {
        async fn handle(
            &self,
            ctx: &DispatchContext,
            method: &str,
            params: Option<Value>,
        ) -> Result<Value, DispatchError> {
            match method {
                "echo" => Ok(json!({
                    "params": params,
                    "session": ctx.session_id(),
                    "version": ctx.protocol_version(),
                })),
                "wait" => {
                    self.started.notify_one();
                    std::future::pending().await
                }
                "boom" => Err(DispatchError::Internal("socket closed".into())),
                other => Err(DispatchError::MethodNotFound(other.to_string())),
            }
        }

        async fn notify(&self, _ctx: &DispatchContext, _method: &str, _params: Option<Value>) {
            self.notified.notify_one();
        }
    }

    fn setup() -> (Arc<Dispatcher>, Arc<TestHandler>) {
        let handler = Arc::new(TestHandler {
            started: Notify::new(),
            notified: Notify::new(),
        });
        let dispatcher = Dispatcher::new(
            Arc::new(SessionManager::in_memory()),
            handler.clone(),
            ProtocolConfig::default(),
        );
        (Arc::new(dispatcher), handler)
    }

    fn auth() -> AuthContext {
        AuthContext::unauthenticated(AuthStrategy::None, BTreeMap::new())
    }

    fn request(id: i64, method: &str, params: Value) -> IncomingMessage {
        IncomingMessage::Request {
            id: RequestId::from(id),
            method: Some(method.to_string()),
            params: Some(params),
        }
    }

    fn notification(method: &str, params: Value) -> IncomingMessage {
        IncomingMessage::Notification {
            method: Some(method.to_string()),
            params: Some(params),
        }
    }

    fn unwrap_response(outcome: DispatchOutcome) -> JsonRpcResponse {
        match outcome {
            DispatchOutcome::Response(r) => r,
            DispatchOutcome::Accepted => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn test_ping_and_handler_call() {
        let (dispatcher, _) = setup();

        let pong = unwrap_response(dispatcher.dispatch(request(1, "ping", json!({})), "s1", auth(), None).await);
        assert_eq!(pong.result, Some(json!({})));

        let echoed = unwrap_response(
            dispatcher
                .dispatch(request(2, "echo", json!({"vin": "5YJ3"})), "s1", auth(), Some("2025-03-26".into()))
                .await,
        );
        let result = echoed.result.unwrap();
        assert_eq!(result["params"]["vin"], "5YJ3");
        assert_eq!(result["session"], "s1");
        assert_eq!(result["version"], "2025-03-26");
        assert_eq!(echoed.id, Some(RequestId::from(2)));
    }

    #[tokio::test]
    async fn test_initialize_negotiates_and_stores_version() {
        let (dispatcher, _) = setup();

        let response = unwrap_response(
            dispatcher
                .dispatch(
                    request(1, "initialize", json!({"protocolVersion": "2024-11-05", "clientInfo": {"name": "desktop"}})),
                    "s1",
                    auth(),
                    None,
                )
                .await,
        );
        assert_eq!(response.result.unwrap()["protocolVersion"], "2024-11-05");

        let state = dispatcher.sessions().state("s1").unwrap();
        assert_eq!(state.protocol_version.as_deref(), Some("2024-11-05"));
        assert_eq!(state.client_name.as_deref(), Some("desktop"));

        // Later calls inherit the negotiated version.
        let echoed = unwrap_response(dispatcher.dispatch(request(2, "echo", json!({})), "s1", auth(), None).await);
        assert_eq!(echoed.result.unwrap()["version"], "2024-11-05");

        // Unknown version falls back to the preferred one.
        let response = unwrap_response(
            dispatcher
                .dispatch(request(3, "initialize", json!({"protocolVersion": "1999-01-01"})), "s2", auth(), None)
                .await,
        );
        assert_eq!(response.result.unwrap()["protocolVersion"], "2025-06-18");
    }

    #[tokio::test]
    async fn test_errors_become_envelopes() {
        let (dispatcher, _) = setup();

        let missing = unwrap_response(
            dispatcher
                .dispatch(
                    IncomingMessage::Request { id: RequestId::from(1), method: None, params: None },
                    "s1",
                    auth(),
                    None,
                )
                .await,
        );
        assert_eq!(missing.error.unwrap().code, codes::INVALID_REQUEST);

        let unknown = unwrap_response(dispatcher.dispatch(request(2, "tools/list", json!({})), "s1", auth(), None).await);
        assert_eq!(unknown.error.unwrap().code, codes::METHOD_NOT_FOUND);

        let boom = unwrap_response(dispatcher.dispatch(request(3, "boom", json!({})), "s1", auth(), None).await);
        let err = boom.error.unwrap();
        assert_eq!(err.code, codes::INTERNAL_ERROR);
        assert_eq!(err.message, "Internal error");

        assert_eq!(dispatcher.sessions().registry().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancel_notification_aborts_request() {
        let (dispatcher, handler) = setup();

        let task = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch(request(7, "wait", json!({})), "s1", auth(), None).await })
        };
        handler.started.notified().await;
        assert!(dispatcher.sessions().registry().contains("s1", &RequestId::from(7)));

        let outcome = dispatcher
            .dispatch(notification(NOTIFICATION_CANCELLED, json!({"requestId": 7, "reason": "user"})), "s1", auth(), None)
            .await;
        assert_eq!(outcome, DispatchOutcome::Accepted);

        let response = unwrap_response(tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap());
        let err = response.error.unwrap();
        assert_eq!(err.code, codes::REQUEST_CANCELLED);
        assert_eq!(response.id, Some(RequestId::from(7)));
        assert_eq!(dispatcher.sessions().registry().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancel_on_other_session_is_noop() {
        let (dispatcher, handler) = setup();

        let task = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch(request(7, "wait", json!({})), "s1", auth(), None).await })
        };
        handler.started.notified().await;

        dispatcher
            .dispatch(notification(NOTIFICATION_CANCELLED, json!({"requestId": 7})), "s2", auth(), None)
            .await;
        dispatcher
            .dispatch(notification(NOTIFICATION_CANCELLED, json!({"requestId": 99})), "s1", auth(), None)
            .await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        dispatcher.sessions().evict("s1");
        let response = unwrap_response(task.await.unwrap());
        assert_eq!(response.error.unwrap().code, codes::REQUEST_CANCELLED);
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_id_rejected() {
        let (dispatcher, handler) = setup();

        let first = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch(request(1, "wait", json!({})), "s1", auth(), None).await })
        };
        handler.started.notified().await;

        let second = unwrap_response(dispatcher.dispatch(request(1, "ping", json!({})), "s1", auth(), None).await);
        assert_eq!(second.error.unwrap().code, codes::INVALID_REQUEST);
        // The first request's handle survived.
        assert!(dispatcher.sessions().registry().cancel("s1", &RequestId::from(1)));

        first.await.unwrap();
    }

    #[tokio::test]
    async fn test_notifications() {
        let (dispatcher, handler) = setup();

        let outcome = dispatcher
            .dispatch(notification(NOTIFICATION_INITIALIZED, json!({})), "s1", auth(), None)
            .await;
        assert_eq!(outcome, DispatchOutcome::Accepted);
        assert!(dispatcher.sessions().state("s1").unwrap().initialized);

        let outcome = dispatcher
            .dispatch(notification("notifications/roots/list_changed", json!({})), "s1", auth(), None)
            .await;
        assert_eq!(outcome, DispatchOutcome::Accepted);
        tokio::time::timeout(Duration::from_secs(1), handler.notified.notified())
            .await
            .expect("handler should observe the notification");
    }
}

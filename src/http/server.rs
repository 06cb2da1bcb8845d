//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for the JSON-RPC endpoint and health check
//! - Wire up middleware (CORS, tracing, request ID, timeout, body limit)
//! - Bind every endpoint request to a session before any layer can answer it
//! - Run POST and DELETE through the admission gate
//! - Hand admitted messages to the dispatcher
//! - Serve until the shutdown signal, then cancel in-flight work

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Extension, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher, MethodHandler};
use crate::http::admission::{client_session_id, resolve_session_id, AdmissionGate};
use crate::http::response::{accepted, rpc_error, rpc_response, with_session, SESSION_ID_HEADER};
use crate::rpc::{codes, IncomingMessage, MessageError, RpcError};
use crate::security::protocol::PROTOCOL_VERSION_HEADER;
use crate::session::SessionManager;

/// Path of the JSON-RPC endpoint.
pub const MCP_PATH: &str = "/mcp";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AdmissionGate>,
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<SessionManager>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a server using the configured origin allowlist.
    pub fn new(config: GatewayConfig, handler: Arc<dyn MethodHandler>) -> Self {
        let gate = AdmissionGate::from_config(&config);
        Self::with_gate(config, handler, gate)
    }

    /// Create a server with a caller-built admission gate (custom origin policy).
    pub fn with_gate(config: GatewayConfig, handler: Arc<dyn MethodHandler>, gate: AdmissionGate) -> Self {
        let sessions = Arc::new(SessionManager::in_memory());
        let dispatcher = Arc::new(Dispatcher::new(
            sessions.clone(),
            handler,
            config.protocol.clone(),
        ));

        let state = AppState {
            gate: Arc::new(gate),
            dispatcher,
            sessions,
        };

        let router = Self::build_router(&config, state.clone());
        Self { router, state, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route(MCP_PATH, get(get_mcp).post(post_mcp).delete(delete_mcp))
            .route("/health", get(health))
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn(bind_session))
            .layer(cors_layer())
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Clone of the fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.state.sessions
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sessions = self.state.sessions.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                let cancelled = sessions.registry().cancel_all();
                tracing::info!(cancelled, "Shutdown signal received, draining requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Browser origins are judged by the admission gate, so CORS mirrors the
/// request origin and exposes the headers clients need to read.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(SESSION_ID_HEADER),
            HeaderName::from_static(PROTOCOL_VERSION_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static(SESSION_ID_HEADER),
            header::WWW_AUTHENTICATE,
        ])
}

/// Session bound to an endpoint request before it reaches the inner layers.
#[derive(Debug, Clone)]
pub struct SessionBinding {
    pub session_id: String,
    /// Whether the client sent the id (false when it was minted here).
    pub supplied: bool,
}

/// Resolve the session id once, outside the timeout and body-limit layers,
/// so responses those layers produce still carry it. A minted id is written
/// back into the request headers for the admission gate to pick up.
async fn bind_session(mut request: Request, next: Next) -> Response {
    if request.uri().path() != MCP_PATH {
        return next.run(request).await;
    }

    let supplied = client_session_id(request.headers()).is_some();
    let session_id = resolve_session_id(request.headers());
    if !supplied {
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            request
                .headers_mut()
                .insert(HeaderName::from_static(SESSION_ID_HEADER), value);
        }
    }
    request.extensions_mut().insert(SessionBinding {
        session_id: session_id.clone(),
        supplied,
    });

    let response = next.run(request).await;
    match response.status() {
        StatusCode::REQUEST_TIMEOUT => {
            tracing::warn!(session_id = %session_id, "Request timed out");
            rpc_error(
                StatusCode::REQUEST_TIMEOUT,
                &session_id,
                RpcError::new(codes::INTERNAL_ERROR, "Request timed out"),
            )
        }
        StatusCode::PAYLOAD_TOO_LARGE => rpc_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            &session_id,
            RpcError::invalid_request("Request body too large"),
        ),
        _ => with_session(response, &session_id),
    }
}

/// JSON-RPC endpoint.
async fn post_mcp(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let admitted = match state.gate.admit(&headers) {
        Ok(admitted) => admitted,
        Err(rejection) => return rejection.into_response(),
    };
    let session_id = admitted.session_id;
    state.sessions.ensure(&session_id);

    let message = match IncomingMessage::parse(&body) {
        Ok(message) => message,
        Err(MessageError::Parse) => {
            tracing::debug!(session_id = %session_id, "Unparseable request body");
            return rpc_error(StatusCode::BAD_REQUEST, &session_id, RpcError::parse_error());
        }
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "Malformed request");
            return rpc_error(StatusCode::BAD_REQUEST, &session_id, RpcError::invalid_request(e.to_string()));
        }
    };

    match state
        .dispatcher
        .dispatch(message, &session_id, admitted.auth, admitted.protocol_version)
        .await
    {
        DispatchOutcome::Response(response) => rpc_response(StatusCode::OK, &session_id, &response),
        DispatchOutcome::Accepted => accepted(&session_id),
    }
}

/// Server-initiated streams are not offered. Answered without admission.
async fn get_mcp(Extension(binding): Extension<SessionBinding>) -> Response {
    let mut response = rpc_error(
        StatusCode::METHOD_NOT_ALLOWED,
        &binding.session_id,
        RpcError::invalid_request("Method not allowed"),
    );
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("POST, DELETE"));
    response
}

/// End a session.
async fn delete_mcp(
    State(state): State<AppState>,
    Extension(binding): Extension<SessionBinding>,
    headers: HeaderMap,
) -> Response {
    let admitted = match state.gate.admit(&headers) {
        Ok(admitted) => admitted,
        Err(rejection) => return rejection.into_response(),
    };

    if !binding.supplied {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            &admitted.session_id,
            RpcError::invalid_request("Missing session id"),
        );
    }

    state.sessions.evict(&admitted.session_id);
    with_session(StatusCode::NO_CONTENT.into_response(), &admitted.session_id)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

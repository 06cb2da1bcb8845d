//! JSON-RPC HTTP responses.
//!
//! Every response the endpoint produces carries the session-id header.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::rpc::{JsonRpcResponse, RpcError};

/// Session binding header (case-insensitive on the wire).
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Attach the session-id header to a response.
pub fn with_session(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_ID_HEADER), value);
    }
    response
}

/// Serialize an envelope with the given status.
pub fn rpc_response(status: StatusCode, session_id: &str, body: &JsonRpcResponse) -> Response {
    with_session((status, Json(body)).into_response(), session_id)
}

/// Error envelope with `id: null`, used before a request id is known.
pub fn rpc_error(status: StatusCode, session_id: &str, error: RpcError) -> Response {
    rpc_response(status, session_id, &JsonRpcResponse::failure(None, error))
}

/// Empty 202 for notifications.
pub fn accepted(session_id: &str) -> Response {
    with_session(StatusCode::ACCEPTED.into_response(), session_id)
}

//! The 401 challenge returned when credentials are missing or wrong.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use url::form_urlencoded;

use crate::http::response::rpc_response;
use crate::rpc::{JsonRpcResponse, RpcError};

pub const DEFAULT_CHALLENGE_MESSAGE: &str = "Unauthorized";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid bearer token";

/// A 401 response bound to a session id. Built on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    session_id: String,
    message: String,
    authorization_uri: String,
}

impl Challenge {
    /// `origin` is the gateway's public origin (`scheme://host[:port]`).
    pub fn new(origin: &str, resource_path: &str, session_id: &str, message: impl Into<String>) -> Self {
        let sid = encode_component(session_id);
        Self {
            session_id: session_id.to_string(),
            message: message.into(),
            authorization_uri: format!("{}{}?sid={}", origin.trim_end_matches('/'), resource_path, sid),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn authorization_uri(&self) -> &str {
        &self.authorization_uri
    }

    /// Value of the `WWW-Authenticate` header.
    pub fn www_authenticate(&self) -> String {
        format!(
            "Bearer realm=\"MCP\", authorization_uri=\"{}\"",
            self.authorization_uri
        )
    }

    pub fn body(&self) -> JsonRpcResponse {
        JsonRpcResponse::failure(None, RpcError::server_error(self.message.clone()))
    }
}

impl IntoResponse for Challenge {
    fn into_response(self) -> Response {
        let mut response = rpc_response(StatusCode::UNAUTHORIZED, &self.session_id, &self.body());
        if let Ok(value) = HeaderValue::from_str(&self.www_authenticate()) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// Percent-encode a query value with spaces as `%20`. The form serializer
/// escapes a literal `+` as `%2B`, so every remaining `+` is a space.
fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

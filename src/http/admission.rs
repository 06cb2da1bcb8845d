//! Admission gate: the checks every inbound request passes before dispatch.
//!
//! # Responsibilities
//! - Bind the request to a session (echo the header or mint a new id)
//! - Reject foreign browser origins and unsupported protocol versions (400)
//! - Enforce the bearer challenge protocol when auth is enabled (401)
//! - Produce the [`AuthContext`] handed to dispatch
//!
//! # Data Flow
//! ```text
//! headers
//!     → session id (always resolved first, so every rejection carries it)
//!     → origin check ──────────── fail → 400 / -32600
//!     → protocol version check ── fail → 400 / -32600
//!     → auth (if enabled)
//!         no Authorization ────── → 401 challenge "Unauthorized"
//!         bearer mismatch ─────── → 401 challenge "Invalid bearer token"
//!     → Admitted { session_id, auth, protocol_version }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::{AuthConfig, AuthStrategy, GatewayConfig};
use crate::http::challenge::{Challenge, DEFAULT_CHALLENGE_MESSAGE, INVALID_TOKEN_MESSAGE};
use crate::http::response::{rpc_error, SESSION_ID_HEADER};
use crate::observability::metrics;
use crate::rpc::RpcError;
use crate::security::auth::{collect_auth_headers, extract_bearer, tokens_match};
use crate::security::protocol::PROTOCOL_VERSION_HEADER;
use crate::security::{
    validate_origin, validate_protocol_version, AuthContext, OriginError, OriginPolicy,
    StaticOriginAllowlist, UnsupportedProtocolVersion, AUTHORIZATION_ALWAYS_ACCEPTED,
};
use crate::session::generate_session_id;

/// A request that may proceed to dispatch.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub session_id: String,
    pub auth: AuthContext,
    /// First version from the header that this gateway supports.
    pub protocol_version: Option<String>,
}

/// Why a request was turned away. Converts into the HTTP response.
#[derive(Debug, Clone)]
pub enum Rejection {
    Origin { session_id: String, error: OriginError },
    ProtocolVersion { session_id: String, error: UnsupportedProtocolVersion },
    MissingCredential(Challenge),
    InvalidCredential(Challenge),
}

impl Rejection {
    pub fn session_id(&self) -> &str {
        match self {
            Rejection::Origin { session_id, .. } | Rejection::ProtocolVersion { session_id, .. } => session_id,
            Rejection::MissingCredential(c) | Rejection::InvalidCredential(c) => c.session_id(),
        }
    }

    /// Label for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Origin { .. } => "origin",
            Rejection::ProtocolVersion { .. } => "protocol_version",
            Rejection::MissingCredential(_) => "missing_credential",
            Rejection::InvalidCredential(_) => "invalid_credential",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Origin { .. } | Rejection::ProtocolVersion { .. } => StatusCode::BAD_REQUEST,
            Rejection::MissingCredential(_) | Rejection::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Rejection::Origin { session_id, error } => {
                rpc_error(status, &session_id, RpcError::invalid_request(error.to_string()))
            }
            Rejection::ProtocolVersion { session_id, error } => {
                rpc_error(status, &session_id, RpcError::invalid_request(error.to_string()))
            }
            Rejection::MissingCredential(challenge) | Rejection::InvalidCredential(challenge) => {
                challenge.into_response()
            }
        }
    }
}

pub struct AdmissionGate {
    auth: AuthConfig,
    accepted_headers: HashSet<String>,
    supported_versions: Vec<String>,
    is_development: bool,
    origin_policy: Arc<dyn OriginPolicy>,
    public_url: Option<String>,
}

impl AdmissionGate {
    pub fn new(config: &GatewayConfig, origin_policy: Arc<dyn OriginPolicy>) -> Self {
        let mut accepted_headers: HashSet<String> = AUTHORIZATION_ALWAYS_ACCEPTED
            .iter()
            .map(|h| h.to_string())
            .collect();
        accepted_headers.extend(config.auth.accept_headers.iter().map(|h| h.to_ascii_lowercase()));

        Self {
            auth: config.auth.clone(),
            accepted_headers,
            supported_versions: config.protocol.supported_versions.clone(),
            is_development: config.security.environment.is_development(),
            origin_policy,
            public_url: config.listener.public_url.clone(),
        }
    }

    /// Gate with the configured static origin allowlist.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let allowlist = StaticOriginAllowlist::new(&config.security.allowed_origins);
        if allowlist.allows_any() && !config.security.environment.is_development() {
            tracing::warn!("allowed_origins contains \"*\": every browser origin is accepted");
        }
        Self::new(config, Arc::new(allowlist))
    }

    pub fn supported_versions(&self) -> &[String] {
        &self.supported_versions
    }

    /// Run every check in order; the first failure wins.
    pub fn admit(&self, headers: &HeaderMap) -> Result<Admitted, Rejection> {
        let session_id = resolve_session_id(headers);

        let result = self.check(headers, session_id);
        if let Err(rejection) = &result {
            metrics::record_admission_rejected(rejection.reason());
            tracing::debug!(
                session_id = %rejection.session_id(),
                reason = rejection.reason(),
                "Request rejected at admission"
            );
        }
        result
    }

    fn check(&self, headers: &HeaderMap, session_id: String) -> Result<Admitted, Rejection> {
        if let Err(error) = validate_origin(headers, self.is_development, self.origin_policy.as_ref()) {
            return Err(Rejection::Origin { session_id, error });
        }

        if let Err(error) = validate_protocol_version(headers, &self.supported_versions) {
            return Err(Rejection::ProtocolVersion { session_id, error });
        }
        let protocol_version = self.accepted_version(headers);

        let auth = self.authenticate(headers, &session_id)?;

        Ok(Admitted {
            session_id,
            auth,
            protocol_version,
        })
    }

    fn authenticate(&self, headers: &HeaderMap, session_id: &str) -> Result<AuthContext, Rejection> {
        if !self.auth.enabled {
            return Ok(AuthContext::unauthenticated(
                self.auth.strategy,
                collect_auth_headers(headers, &self.accepted_headers),
            ));
        }

        let Some(authorization) = headers.get(header::AUTHORIZATION) else {
            return Err(Rejection::MissingCredential(
                self.challenge(headers, session_id, DEFAULT_CHALLENGE_MESSAGE),
            ));
        };

        match (self.auth.strategy, self.auth.bearer_token.as_deref()) {
            (AuthStrategy::Bearer, Some(expected)) => {
                let raw = authorization.to_str().unwrap_or_default();
                match extract_bearer(raw) {
                    Some(provided) if tokens_match(provided, expected) => Ok(AuthContext::bearer(raw, provided)),
                    _ => Err(Rejection::InvalidCredential(
                        self.challenge(headers, session_id, INVALID_TOKEN_MESSAGE),
                    )),
                }
            }
            _ => Ok(AuthContext::unauthenticated(
                self.auth.strategy,
                collect_auth_headers(headers, &self.accepted_headers),
            )),
        }
    }

    fn challenge(&self, headers: &HeaderMap, session_id: &str, message: &str) -> Challenge {
        let origin = self
            .public_url
            .clone()
            .unwrap_or_else(|| request_origin(headers));
        Challenge::new(&origin, &self.auth.resource_path, session_id, message)
    }

    fn accepted_version(&self, headers: &HeaderMap) -> Option<String> {
        let raw = headers.get(PROTOCOL_VERSION_HEADER)?.to_str().ok()?;
        raw.split(',')
            .map(str::trim)
            .find(|v| self.supported_versions.iter().any(|s| s == v))
            .map(str::to_string)
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("auth_enabled", &self.auth.enabled)
            .field("strategy", &self.auth.strategy)
            .field("supported_versions", &self.supported_versions)
            .field("is_development", &self.is_development)
            .field("origin_policy", &self.origin_policy)
            .finish()
    }
}

/// The session id the client sent, if it sent a usable one.
pub fn client_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The client's session id, or a freshly minted one.
pub fn resolve_session_id(headers: &HeaderMap) -> String {
    client_session_id(headers).unwrap_or_else(|| {
        let sid = generate_session_id();
        tracing::debug!(session_id = %sid, "Generated session id");
        sid
    })
}

/// Origin the request was addressed to, from `Host`.
fn request_origin(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

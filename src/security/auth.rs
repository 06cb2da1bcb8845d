//! Bearer-token authentication and the per-request auth context.
//!
//! The gateway's bearer strategy is a static shared secret. The comparison
//! runs in constant time over the token bytes.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use crate::config::AuthStrategy;

/// Headers copied into every auth context regardless of configuration.
pub const AUTHORIZATION_ALWAYS_ACCEPTED: [&str; 3] = ["authorization", "x-api-key", "x-auth-token"];

/// Credentials resolved for one inbound request.
///
/// Immutable once attached to a dispatch context.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    strategy: AuthStrategy,
    raw_headers: BTreeMap<String, String>,
    resolved_headers: BTreeMap<String, String>,
    bearer_token: Option<String>,
}

impl AuthContext {
    /// Context for a request that passed without credential inspection.
    pub fn unauthenticated(strategy: AuthStrategy, raw_headers: BTreeMap<String, String>) -> Self {
        Self {
            strategy,
            resolved_headers: raw_headers.clone(),
            raw_headers,
            bearer_token: None,
        }
    }

    /// Context for a request whose bearer token matched the configured secret.
    pub fn bearer(authorization: &str, token: &str) -> Self {
        let headers: BTreeMap<_, _> = [("authorization".to_string(), authorization.to_string())]
            .into_iter()
            .collect();
        Self {
            strategy: AuthStrategy::Bearer,
            raw_headers: headers.clone(),
            resolved_headers: headers,
            bearer_token: Some(token.to_string()),
        }
    }

    pub fn strategy(&self) -> AuthStrategy {
        self.strategy
    }

    /// Headers exactly as received (accepted names only, lowercased).
    pub fn raw_headers(&self) -> &BTreeMap<String, String> {
        &self.raw_headers
    }

    /// Headers to attach to outbound calls made on the caller's behalf.
    pub fn resolved_headers(&self) -> &BTreeMap<String, String> {
        &self.resolved_headers
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&String> = self.raw_headers.keys().collect();
        f.debug_struct("AuthContext")
            .field("strategy", &self.strategy)
            .field("headers", &names)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Extract the token from a `Bearer <token>` value (scheme is case-insensitive).
pub fn extract_bearer(value: &str) -> Option<&str> {
    let value = value.trim_start();
    let scheme = value.get(..6)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let rest = &value[6..];
    if !rest.starts_with(|c: char| c.is_whitespace()) {
        return None;
    }
    let token = rest.trim_start();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Constant-time token comparison.
pub fn tokens_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Copy the accepted credential headers out of a request, lowercased.
pub fn collect_auth_headers(headers: &HeaderMap, accepted: &HashSet<String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| accepted.contains(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

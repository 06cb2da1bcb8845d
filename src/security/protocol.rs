//! Protocol-version validation and negotiation.

use axum::http::HeaderMap;
use thiserror::Error;

/// Header carrying the caller's protocol version(s), comma-separated.
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported protocol version: {requested}. Supported: {}", .supported.join(", "))]
pub struct UnsupportedProtocolVersion {
    pub requested: String,
    pub supported: Vec<String>,
}

/// Accept a missing header; otherwise require at least one listed version
/// to be in `supported`.
pub fn validate_protocol_version(
    headers: &HeaderMap,
    supported: &[String],
) -> Result<(), UnsupportedProtocolVersion> {
    let Some(raw) = headers.get(PROTOCOL_VERSION_HEADER) else {
        return Ok(());
    };
    let requested = String::from_utf8_lossy(raw.as_bytes()).into_owned();

    let any_supported = requested
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .any(|v| supported.iter().any(|s| s == v));

    if any_supported {
        Ok(())
    } else {
        Err(UnsupportedProtocolVersion {
            requested,
            supported: supported.to_vec(),
        })
    }
}

/// Pick the version for a session: the client's request when supported,
/// else the preferred (first) supported version.
pub fn negotiate_version(requested: Option<&str>, supported: &[String]) -> Option<String> {
    requested
        .and_then(|r| supported.iter().find(|s| s.as_str() == r))
        .or_else(|| supported.first())
        .cloned()
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (burst >= 1, refill rate > 0, attempts >= 1)
//! - Check that the chosen auth strategy has what it needs
//! - Check that the request timeout covers a fully retried outbound call
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::schema::{AuthStrategy, GatewayConfig};
use crate::resilience::RetryPolicy;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if let Some(public_url) = &config.listener.public_url {
        if !is_http_url(public_url) {
            errors.push(ValidationError::new(
                "listener.public_url",
                format!("'{}' is not an http(s) URL", public_url),
            ));
        }
    }

    if config.auth.strategy == AuthStrategy::Bearer
        && config.auth.bearer_token.as_deref().map_or(true, str::is_empty)
    {
        errors.push(ValidationError::new(
            "auth.bearer_token",
            "required when auth strategy is bearer",
        ));
    }

    if config.protocol.supported_versions.is_empty() {
        errors.push(ValidationError::new(
            "protocol.supported_versions",
            "at least one protocol version must be supported",
        ));
    }

    for origin in &config.security.allowed_origins {
        if origin != "*" && !is_http_url(origin) {
            errors.push(ValidationError::new(
                "security.allowed_origins",
                format!("'{}' is not an origin", origin),
            ));
        }
    }

    let outbound = &config.outbound;
    if let Some(upstream) = &outbound.upstream_url {
        if !is_http_url(upstream) {
            errors.push(ValidationError::new(
                "outbound.upstream_url",
                format!("'{}' is not an http(s) URL", upstream),
            ));
        }
    }
    if outbound.timeout_ms == 0 {
        errors.push(ValidationError::new("outbound.timeout_ms", "must be greater than 0"));
    }
    if outbound.retries == 0 {
        errors.push(ValidationError::new("outbound.retries", "must be at least 1"));
    }
    if outbound.concurrency == 0 {
        errors.push(ValidationError::new("outbound.concurrency", "must be at least 1"));
    }
    if outbound.rate_limit.burst == 0 {
        errors.push(ValidationError::new("outbound.rate_limit.burst", "must be at least 1"));
    }
    let rate = outbound.rate_limit.tokens_per_second;
    if !rate.is_finite() || rate <= 0.0 {
        errors.push(ValidationError::new(
            "outbound.rate_limit.tokens_per_second",
            "must be a finite number greater than 0",
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    } else if outbound.timeout_ms > 0 {
        // The request timeout must not cut off a relay that is still retrying.
        let budget = RetryPolicy::from_config(outbound).worst_case(Duration::from_millis(outbound.timeout_ms));
        if Duration::from_secs(config.timeouts.request_secs) < budget {
            errors.push(ValidationError::new(
                "timeouts.request_secs",
                format!(
                    "{}s is shorter than the worst-case outbound call ({}ms)",
                    config.timeouts.request_secs,
                    budget.as_millis()
                ),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
        .unwrap_or(false)
}

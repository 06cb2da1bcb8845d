//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{AuthStrategy, Environment, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: defaults, then the optional TOML file, then the
/// process environment. The result is validated before it is returned.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply the deployment's environment variables on top of `config`.
///
/// `lookup` abstracts `std::env::var` so overrides can be tested without
/// touching the process environment.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let host = get("HOST");
    let port = get("PORT");
    if host.is_some() || port.is_some() {
        let (current_host, current_port) = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(h, p)| (h.to_string(), p.to_string()))
            .unwrap_or_else(|| (config.listener.bind_address.clone(), "3000".to_string()));
        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|e| ConfigError::Env {
                var: "PORT",
                message: e.to_string(),
            })?.to_string(),
            None => current_port,
        };
        config.listener.bind_address = format!("{}:{}", host.unwrap_or(current_host), port);
    }

    if let Some(env) = get("NODE_ENV") {
        config.security.environment = env
            .parse::<Environment>()
            .map_err(|message| ConfigError::Env { var: "NODE_ENV", message })?;
    }

    if let Some(origins) = get("ALLOWED_ORIGINS") {
        config.security.allowed_origins = split_list(&origins);
    }

    // Strategy: explicit AUTH_STRATEGY, else bearer when a secret or
    // AUTH_ENABLED=true is present.
    let auth_enabled = match get("AUTH_ENABLED") {
        Some(v) => Some(parse_bool("AUTH_ENABLED", &v)?),
        None => None,
    };
    if let Some(token) = get("BEARER_TOKEN") {
        config.auth.bearer_token = Some(token);
    }
    match get("AUTH_STRATEGY") {
        Some(strategy) => {
            config.auth.strategy = strategy
                .parse::<AuthStrategy>()
                .map_err(|message| ConfigError::Env { var: "AUTH_STRATEGY", message })?;
        }
        None => {
            if lookup("BEARER_TOKEN").is_some() || auth_enabled == Some(true) {
                config.auth.strategy = AuthStrategy::Bearer;
            }
        }
    }
    if let Some(enabled) = auth_enabled {
        config.auth.enabled = enabled;
    }
    if config.auth.strategy == AuthStrategy::Bearer {
        config.auth.enabled = true;
    }

    if let Some(headers) = get("MCP_ACCEPT_HEADERS") {
        config.auth.accept_headers = split_list(&headers)
            .into_iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
    }

    if let Some(preferred) = get("MCP_PROTOCOL_VERSION") {
        let versions = &mut config.protocol.supported_versions;
        versions.retain(|v| v != &preferred);
        versions.insert(0, preferred);
    }

    if let Some(rps) = get("RPS_LIMIT") {
        let rps: f64 = rps.parse().map_err(|_| ConfigError::Env {
            var: "RPS_LIMIT",
            message: format!("'{}' is not a number", rps),
        })?;
        config.outbound.rate_limit.tokens_per_second = rps;
        // Burst follows the refill rate (2x) unless a file set it explicitly.
        config.outbound.rate_limit.burst = (rps * 2.0).ceil().max(1.0) as u32;
    }

    if let Some(limit) = get("CONCURRENCY_LIMIT") {
        config.outbound.concurrency = limit.parse().map_err(|_| ConfigError::Env {
            var: "CONCURRENCY_LIMIT",
            message: format!("'{}' is not a positive integer", limit),
        })?;
    }

    if let Some(url) = get("UPSTREAM_URL") {
        config.outbound.upstream_url = Some(url);
    }
    if let Some(token) = get("UPSTREAM_TOKEN") {
        config.outbound.upstream_token = Some(token);
    }

    if let Some(level) = get("LOG_LEVEL") {
        // "warning" is accepted for compatibility with existing deployments.
        config.observability.log_level = if level.eq_ignore_ascii_case("warning") {
            "warn".to_string()
        } else {
            level.to_ascii_lowercase()
        };
    }

    Ok(())
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::Env {
            var,
            message: format!("'{}' is not a boolean", other),
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, |k| vars.get(k).cloned())?;
        Ok(config)
    }

    #[test]
    fn test_bearer_token_implies_bearer_strategy() {
        let config = apply(&[("BEARER_TOKEN", "s3cret")]).unwrap();
        assert_eq!(config.auth.strategy, AuthStrategy::Bearer);
        assert!(config.auth.enabled);
        assert_eq!(config.auth.bearer_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_explicit_none_strategy_wins() {
        let config = apply(&[("BEARER_TOKEN", "s3cret"), ("AUTH_STRATEGY", "none")]).unwrap();
        assert_eq!(config.auth.strategy, AuthStrategy::None);
        assert!(!config.auth.enabled);
    }

    #[test]
    fn test_auth_enabled_without_token_selects_bearer() {
        let config = apply(&[("AUTH_ENABLED", "true")]).unwrap();
        assert_eq!(config.auth.strategy, AuthStrategy::Bearer);
        // Fails validation later: bearer needs a secret.
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_listener_and_limits() {
        let config = apply(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("RPS_LIMIT", "4"),
            ("CONCURRENCY_LIMIT", "2"),
            ("NODE_ENV", "production"),
            ("MCP_PROTOCOL_VERSION", "2025-03-26"),
        ])
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.outbound.rate_limit.tokens_per_second, 4.0);
        assert_eq!(config.outbound.rate_limit.burst, 8);
        assert_eq!(config.outbound.concurrency, 2);
        assert_eq!(config.security.environment, Environment::Production);
        assert_eq!(config.protocol.supported_versions[0], "2025-03-26");
        assert_eq!(config.protocol.supported_versions.len(), 4);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(matches!(
            apply(&[("PORT", "http")]),
            Err(ConfigError::Env { var: "PORT", .. })
        ));
        assert!(matches!(
            apply(&[("AUTH_STRATEGY", "oauth")]),
            Err(ConfigError::Env { var: "AUTH_STRATEGY", .. })
        ));
    }
}

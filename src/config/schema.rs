//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the vehicle gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, public URL).
    pub listener: ListenerConfig,

    /// Inbound credential settings.
    pub auth: AuthConfig,

    /// Protocol-version negotiation and server identity.
    pub protocol: ProtocolConfig,

    /// Origin policy and request size limits.
    pub security: SecurityConfig,

    /// Outbound executor settings (backend calls).
    pub outbound: OutboundConfig,

    /// Timeout configuration for inbound requests.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:3000").
    pub bind_address: String,

    /// Externally visible base URL, used when building auth challenges.
    /// Falls back to the request's Host header when unset.
    pub public_url: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            public_url: None,
        }
    }
}

/// How inbound callers authenticate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStrategy {
    /// Static shared secret presented as `Authorization: Bearer <token>`.
    Bearer,
    /// No credential inspection.
    #[default]
    None,
}

impl AuthStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStrategy::Bearer => "bearer",
            AuthStrategy::None => "none",
        }
    }
}

impl std::str::FromStr for AuthStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bearer" => Ok(AuthStrategy::Bearer),
            "none" => Ok(AuthStrategy::None),
            other => Err(format!("unknown auth strategy '{}'", other)),
        }
    }
}

/// Inbound authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Challenge requests that carry no credentials.
    pub enabled: bool,

    /// Credential strategy.
    pub strategy: AuthStrategy,

    /// Shared secret for the bearer strategy.
    pub bearer_token: Option<String>,

    /// Extra request headers copied into the auth context (lowercased).
    /// `authorization`, `x-api-key` and `x-auth-token` are always accepted.
    pub accept_headers: Vec<String>,

    /// Discovery resource referenced by the `WWW-Authenticate` challenge.
    pub resource_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: AuthStrategy::None,
            bearer_token: None,
            accept_headers: Vec::new(),
            resource_path: "/.well-known/oauth-protected-resource".to_string(),
        }
    }
}

/// Protocol negotiation and server identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Supported protocol versions, preferred first.
    pub supported_versions: Vec<String>,

    /// Name reported by `initialize`.
    pub server_name: String,

    /// Version reported by `initialize`.
    pub server_version: String,

    /// Optional usage instructions reported by `initialize`.
    pub instructions: Option<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            supported_versions: vec![
                "2025-06-18".to_string(),
                "2025-03-26".to_string(),
                "2024-11-05".to_string(),
                "2024-10-07".to_string(),
            ],
            server_name: "vehicle-gateway".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
        }
    }
}

/// Deployment environment; drives the origin policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Development accepts loopback/private origins only; otherwise the
    /// allowlist applies.
    pub environment: Environment,

    /// Browser origins accepted outside development. `"*"` accepts any.
    pub allowed_origins: Vec<String>,

    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            allowed_origins: Vec::new(),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Whether the concurrency permit is kept while sleeping between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffPermit {
    /// Keep the permit for the whole attempt loop.
    #[default]
    Hold,
    /// Give the permit back during backoff and re-acquire before the next attempt.
    Release,
}

/// Token bucket settings for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Refill rate.
    pub tokens_per_second: f64,

    /// Bucket capacity.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_second: 10.0,
            burst: 20,
        }
    }
}

/// Outbound executor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutboundConfig {
    /// Backend endpoint used by the relay handler.
    pub upstream_url: Option<String>,

    /// Credential sent to the backend as a bearer token.
    pub upstream_token: Option<String>,

    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,

    /// Total attempts per logical call (first try included).
    pub retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound of the uniform jitter added to each delay.
    pub max_jitter_ms: u64,

    /// Cap on the exponential part of the delay.
    pub max_delay_ms: u64,

    /// Rate limit applied to every attempt.
    pub rate_limit: RateLimitConfig,

    /// Maximum simultaneous in-flight outbound calls.
    pub concurrency: usize,

    /// Permit handling during backoff sleeps.
    pub backoff_permit: BackoffPermit,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            upstream_url: None,
            upstream_token: None,
            timeout_ms: 30_000,
            retries: 3,
            base_delay_ms: 1000,
            max_jitter_ms: 1000,
            max_delay_ms: 30_000,
            rate_limit: RateLimitConfig::default(),
            concurrency: 5,
            backoff_permit: BackoffPermit::Hold,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request deadline in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 120 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: AUTH_STRATEGY, BEARER_TOKEN, RPS_LIMIT, ...)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, AuthStrategy, BackoffPermit, Environment, GatewayConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, OutboundConfig, ProtocolConfig, RateLimitConfig,
    SecurityConfig, TimeoutConfig,
};

//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request headers:
//!     → origin.rs (Origin header against dev/loopback rule or allowlist policy)
//!     → protocol.rs (protocol-version header against supported set)
//!     → auth.rs (bearer extraction, constant-time secret comparison, AuthContext)
//!     → http::admission composes these into a pass/reject decision
//! ```
//!
//! # Design Decisions
//! - Every check is a pure function over headers; no I/O
//! - Fail closed: anything unparseable is rejected
//! - Secrets are compared in constant time and never logged

pub mod auth;
pub mod origin;
pub mod protocol;

pub use auth::{AuthContext, AUTHORIZATION_ALWAYS_ACCEPTED};
pub use origin::{validate_origin, OriginError, OriginPolicy, StaticOriginAllowlist};
pub use protocol::{negotiate_version, validate_protocol_version, UnsupportedProtocolVersion};

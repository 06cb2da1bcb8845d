//! Vehicle gateway library.
//!
//! Admission and resilience layer for a JSON-RPC vehicle API gateway: the
//! inbound gate (origin, protocol version, session, bearer challenge), the
//! session and cancellation registry, and the outbound executor (token
//! bucket, concurrency gate, retry with backoff).

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod rpc;
pub mod security;
pub mod session;

pub use config::GatewayConfig;
pub use dispatch::{DispatchContext, DispatchError, MethodHandler};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::OutboundExecutor;

//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call (dispatch handler → vehicle API):
//!     → concurrency.rs (FIFO wait for a permit)
//!     → rate_limit.rs (take a token per attempt, fail fast when empty)
//!     → executor.rs (send with per-attempt timeout via Transport)
//!     → On failure: retries.rs + backoff.rs (sleep, then next attempt)
//! ```
//!
//! # Design Decisions
//! - Limiter and gate are process-wide, shared by every session
//! - Timeouts are non-negotiable; every attempt has a deadline
//! - Rate-limit rejection is not retried; upstream failures are
//! - Cancellation aborts the call at any suspension point

pub mod backoff;
pub mod concurrency;
pub mod executor;
pub mod rate_limit;
pub mod retries;

pub use concurrency::{ConcurrencyGate, GateClosed, GatePermit};
pub use executor::{
    ExecutorOptions, OutboundError, OutboundExecutor, OutboundRequest, OutboundResponse,
    ReqwestTransport, Transport, TransportError,
};
pub use rate_limit::TokenBucket;
pub use retries::RetryPolicy;

//! Method dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted message (session id, auth context)
//!     → dispatcher.rs
//!         request:      register in-flight guard → built-in or MethodHandler
//!         notification: cancel / initialized / forwarded to MethodHandler
//!     → context.rs (immutable DispatchContext handed to handlers)
//!     → relay.rs (default handler: forward to the vehicle API via the executor)
//! ```
//!
//! # Design Decisions
//! - Handlers never touch the registry; they see only a cancellation token
//! - Notifications never block the HTTP response (202 is returned immediately)

pub mod context;
pub mod dispatcher;
pub mod handler;
pub mod relay;

pub use context::DispatchContext;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use handler::{DispatchError, MethodHandler};
pub use relay::{RelayError, RelayHandler};

//! Session and cancellation bookkeeping.
//!
//! # Data Flow
//! ```text
//! Admission gate binds a session id
//!     → manager.rs ensure(id) (store.rs: create-if-absent record)
//! Dispatcher, per request with an id:
//!     → cancellation.rs register(session, id) → InFlightGuard
//!     → handler runs, observing the guard's CancellationToken
//!     → guard dropped on every exit path → entry removed exactly once
//! Cancel notification:
//!     → cancellation.rs cancel(session, target id) → signal token or no-op
//! ```
//!
//! # Design Decisions
//! - The session store (existence/metadata) and the per-process protocol
//!   state are separate stores; neither is shared across processes
//! - Registry entries are keyed by (session id, request id); no operation
//!   touches another session's entries
//! - Cancellation only signals; the owning guard is the sole remover

pub mod cancellation;
pub mod manager;
pub mod state;
pub mod store;

pub use cancellation::{CancellationRegistry, DuplicateRequest, InFlightGuard};
pub use manager::{generate_session_id, SessionManager};
pub use state::{SessionState, SessionStateMap};
pub use store::{MemorySessionStore, SessionRecord, SessionStore};

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, routes)
//!     → server.rs bind_session (session id fixed before timeout/body limit)
//!     → admission.rs (origin, protocol version, session, bearer challenge)
//!         rejected → challenge.rs (401) / response.rs (400)
//!     → dispatch subsystem
//!     → response.rs (JSON-RPC envelope + session header)
//!     → Send to client
//! ```

pub mod admission;
pub mod challenge;
pub mod response;
pub mod server;

pub use admission::{AdmissionGate, Admitted, Rejection};
pub use challenge::Challenge;
pub use response::SESSION_ID_HEADER;
pub use server::{AppState, HttpServer, SessionBinding, MCP_PATH};

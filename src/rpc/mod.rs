//! JSON-RPC 2.0 envelope types.
//!
//! # Data Flow
//! ```text
//! POST body (bytes)
//!     → message.rs (parse into IncomingMessage: request or notification)
//!     → dispatch subsystem
//!     → message.rs (JsonRpcResponse: result | error, echoed id)
//! ```
//!
//! # Design Decisions
//! - A message with no `id`, or `id: null`, is a notification
//! - Request ids are strings or integers; anything else is an invalid request
//! - Error codes follow the JSON-RPC 2.0 reserved range

pub mod error;
pub mod message;

pub use error::{codes, RpcError};
pub use message::{IncomingMessage, JsonRpcResponse, MessageError, RequestId, JSONRPC_VERSION};

//! Inbound message classification and outbound response envelopes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::rpc::error::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// Convert a raw `id` member. `None` means the value is not a valid id.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(RequestId::String(s.clone())),
            Value::Number(n) => n.as_i64().map(RequestId::Number),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

/// Why a body could not be turned into a message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("Parse error")]
    Parse,
    #[error("Batch requests are not supported")]
    Batch,
    #[error("Request must be a JSON object")]
    NotAnObject,
    #[error("Request id must be a string or an integer")]
    InvalidId,
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Carries a non-null id and expects a response envelope.
    Request {
        id: RequestId,
        method: Option<String>,
        params: Option<Value>,
    },
    /// No id (or `id: null`): processed without a reply payload.
    Notification {
        method: Option<String>,
        params: Option<Value>,
    },
}

impl IncomingMessage {
    /// Parse and classify a request body.
    pub fn parse(body: &[u8]) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| MessageError::Parse)?;
        match value {
            Value::Object(map) => Self::from_object(map),
            Value::Array(_) => Err(MessageError::Batch),
            _ => Err(MessageError::NotAnObject),
        }
    }

    fn from_object(mut map: Map<String, Value>) -> Result<Self, MessageError> {
        let method = match map.remove("method") {
            Some(Value::String(m)) => Some(m),
            _ => None,
        };
        let params = map.remove("params").filter(|p| !p.is_null());

        match map.remove("id") {
            None | Some(Value::Null) => Ok(IncomingMessage::Notification { method, params }),
            Some(raw) => {
                let id = RequestId::from_value(&raw).ok_or(MessageError::InvalidId)?;
                Ok(IncomingMessage::Request { id, method, params })
            }
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            IncomingMessage::Request { method, .. } | IncomingMessage::Notification { method, .. } => {
                method.as_deref()
            }
        }
    }
}

/// A JSON-RPC response envelope: `{jsonrpc, result | error, id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<RequestId>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: Some(id),
        }
    }

    pub fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classification() {
        let req = IncomingMessage::parse(br#"{"jsonrpc":"2.0","method":"ping","id":7}"#).unwrap();
        assert_eq!(
            req,
            IncomingMessage::Request {
                id: RequestId::Number(7),
                method: Some("ping".into()),
                params: None,
            }
        );

        let absent = IncomingMessage::parse(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(absent, IncomingMessage::Notification { .. }));

        let null_id = IncomingMessage::parse(br#"{"jsonrpc":"2.0","method":"x","id":null}"#).unwrap();
        assert!(matches!(null_id, IncomingMessage::Notification { .. }));
    }

    #[test]
    fn test_rejections() {
        assert_eq!(IncomingMessage::parse(b"{not json"), Err(MessageError::Parse));
        assert_eq!(IncomingMessage::parse(b"[]"), Err(MessageError::Batch));
        assert_eq!(IncomingMessage::parse(b"42"), Err(MessageError::NotAnObject));
        assert_eq!(
            IncomingMessage::parse(br#"{"method":"x","id":{"a":1}}"#),
            Err(MessageError::InvalidId)
        );
        assert_eq!(
            IncomingMessage::parse(br#"{"method":"x","id":1.5}"#),
            Err(MessageError::InvalidId)
        );
    }

    #[test]
    fn test_envelope_shape() {
        let ok = serde_json::to_value(JsonRpcResponse::success("a".into(), json!({}))).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "result": {}, "id": "a"}));

        let err = serde_json::to_value(JsonRpcResponse::failure(None, RpcError::parse_error())).unwrap();
        assert_eq!(
            err,
            json!({"jsonrpc": "2.0", "error": {"code": -32700, "message": "Parse error"}, "id": null})
        );
    }
}

//! Request, response and notification shapes exchanged with clients
//!
//! The shapes follow JSON-RPC 2.0 naming. Framing them on a socket is the
//! transport's job.

use serde::{Deserialize, Serialize};

use rmedia_media_core::{EventNotification, ObjectId};

/// JSON-RPC protocol version
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of pushed event notifications
pub const EVENT_METHOD: &str = "onEvent";

/// Stable error codes
pub mod error_codes {
    /// The operation does not exist
    pub const METHOD_NOT_FOUND: i32 = -32601;

    /// Missing or malformed parameters
    pub const INVALID_PARAMS: i32 = -32602;

    /// Unexpected server-side failure
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Object or connection not found
    pub const NOT_FOUND: i32 = -32001;

    /// Parent missing or not a legal container
    pub const INVALID_PARENT: i32 = -32002;

    /// Operation not legal in the current state
    pub const INVALID_STATE: i32 = -32003;

    /// Negotiation before a local description was set
    pub const MISSING_LOCAL_SPEC: i32 = -32004;

    /// Event not emitted by the object's kind
    pub const UNSUPPORTED_EVENT: i32 = -32005;

    /// Object limit or engine allocation failure
    pub const RESOURCE_EXHAUSTED: i32 = -32006;

    /// Element type not registered
    pub const UNSUPPORTED_KIND: i32 = -32007;
}

/// One operation invoked by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Target object; the parent for `create`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectId>,

    /// Operation name
    pub operation: String,

    /// Operation parameters
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            object: None,
            operation: operation.into(),
            params: serde_json::Value::Null,
        }
    }

    pub fn on(mut self, object: ObjectId) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// Error details returned to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Error code, see [`error_codes`]
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Outcome of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcResponse {
    Result(serde_json::Value),
    Error(ErrorObject),
}

impl RpcResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, RpcResponse::Result(_))
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match self {
            RpcResponse::Result(value) => Some(value),
            RpcResponse::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorObject> {
        match self {
            RpcResponse::Result(_) => None,
            RpcResponse::Error(error) => Some(error),
        }
    }

    /// Error code, if the request failed
    pub fn code(&self) -> Option<i32> {
        self.error().map(|e| e.code)
    }
}

/// Server-initiated push to a client session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: EventNotification,
}

impl RpcNotification {
    pub fn event(notification: EventNotification) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: EVENT_METHOD.to_string(),
            params: notification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_from_json() {
        let id = ObjectId::new();
        let request: RpcRequest = serde_json::from_value(json!({
            "object": id,
            "operation": "setName",
            "params": { "name": "room" }
        }))
        .unwrap();
        assert_eq!(request, RpcRequest::new("setName").on(id).with_params(json!({ "name": "room" })));

        let bare: RpcRequest = serde_json::from_value(json!({ "operation": "ping" })).unwrap();
        assert_eq!(bare.object, None);
        assert!(bare.params.is_null());
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(RpcResponse::Result(json!(1))).unwrap();
        assert_eq!(ok, json!({ "result": 1 }));

        let err = RpcResponse::Error(ErrorObject {
            code: error_codes::NOT_FOUND,
            message: "gone".to_string(),
            data: None,
        });
        assert_eq!(err.code(), Some(-32001));
        assert_eq!(
            serde_json::to_value(err).unwrap(),
            json!({ "error": { "code": -32001, "message": "gone" } })
        );
    }
}

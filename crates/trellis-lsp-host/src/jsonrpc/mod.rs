//! JSON-RPC 2.0 message types spoken with language servers.


use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried by every message.
pub(crate) const JSONRPC_VERSION: &str = "2.0";

/// Error code servers use for methods they do not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always "2.0".
    pub jsonrpc: &'static str,
    /// Request identifier, unique within one session.
    pub id: i64,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a request with the given identifier.
    #[must_use]
    pub fn with_id(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    /// Protocol version, always "2.0".
    pub jsonrpc: &'static str,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Creates a new notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response message.
///
/// The identifier is kept as raw JSON so replies to server-initiated
/// requests can echo string identifiers untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version.
    pub jsonrpc: String,
    /// Identifier of the request being answered.
    pub id: Value,
    /// The result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a successful response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Converts the response into its payload.
    ///
    /// A response carrying neither `result` nor `error` yields
    /// `Value::Null`, which is how servers answer with "no result".
    ///
    /// # Errors
    ///
    /// Returns the embedded [`JsonRpcError`] when the server reported one.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Creates an error object without extra data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Any message a language server may send.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Reply to a request this side issued.
    Response {
        /// Numeric identifier of the answered request, if it had one.
        id: Option<i64>,
        /// Decoded reply.
        response: JsonRpcResponse,
    },
    /// Request initiated by the server that expects a reply.
    Request {
        /// Identifier to echo back.
        id: Value,
        /// Requested method.
        method: String,
        /// Request parameters.
        params: Option<Value>,
    },
    /// Notification from the server.
    Notification {
        /// Notified method.
        method: String,
        /// Notification parameters.
        params: Option<Value>,
    },
}

/// Errors raised while classifying an incoming frame.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The frame is not valid JSON.
    #[error("malformed JSON-RPC frame: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame is JSON but not a request, response or notification.
    #[error("frame is neither a request, a response nor a notification")]
    Unrecognised,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

impl IncomingMessage {
    /// Classifies a raw frame body.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] when the body is not JSON or carries
    /// neither a method nor an identifier.
    pub fn parse(bytes: &[u8]) -> Result<Self, MessageError> {
        let raw: RawMessage = serde_json::from_slice(bytes)?;
        match (raw.method, raw.id) {
            (Some(method), Some(id)) if !id.is_null() => Ok(Self::Request {
                id,
                method,
                params: raw.params,
            }),
            (Some(method), _) => Ok(Self::Notification {
                method,
                params: raw.params,
            }),
            (None, Some(id)) => Ok(Self::Response {
                id: id.as_i64(),
                response: JsonRpcResponse {
                    jsonrpc: JSONRPC_VERSION.to_owned(),
                    id,
                    result: raw.result,
                    error: raw.error,
                },
            }),
            (None, None) => Err(MessageError::Unrecognised),
        }
    }
}

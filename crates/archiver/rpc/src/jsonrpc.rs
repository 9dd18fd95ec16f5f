//! JSON-RPC 2.0 wire types.

use crate::{RpcError, TransportError};
use archiver_primitives::json::from_value;
use serde::Deserialize;
use serde_json::{Value, json};

/// A single JSON-RPC request object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request id, local to the batch that carries it.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Positional parameters.
    pub params: Value,
}

impl Request {
    /// Creates a new [`Request`].
    pub const fn new(id: u64, method: String, params: Value) -> Self {
        Self { id, method, params }
    }
}

impl From<Request> for Value {
    fn from(request: Request) -> Self {
        json!({
            "jsonrpc": "2.0",
            "id": request.id,
            "method": request.method,
            "params": request.params,
        })
    }
}

/// The error object of a failed JSON-RPC call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorPayload {
    /// Error code.
    pub code: i64,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Optional error data.
    #[serde(default)]
    pub data: Option<Value>,
}

impl From<ErrorPayload> for RpcError {
    fn from(payload: ErrorPayload) -> Self {
        Self::ErrorResponse { code: payload.code, message: payload.message, data: payload.data }
    }
}

/// A single JSON-RPC response object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Response {
    /// Echo of the request id. `null` when the node could not parse the request.
    #[serde(default)]
    pub id: Value,
    /// The call result.
    #[serde(default)]
    pub result: Option<Value>,
    /// The call error.
    #[serde(default)]
    pub error: Option<ErrorPayload>,
}

impl Response {
    /// Returns the numeric request id, accepting ids echoed back as decimal strings.
    pub fn id(&self) -> Option<u64> {
        match &self.id {
            Value::Number(number) => number.as_u64(),
            Value::String(string) => string.parse().ok(),
            _ => None,
        }
    }

    /// Converts the response into the caller's result. A missing result decodes as `null`.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// The body of a JSON-RPC response: a batch array or a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePacket {
    /// Response to a batch request.
    Batch(Vec<Response>),
    /// A single response object.
    Single(Response),
}

impl ResponsePacket {
    /// Parses a response body. Results may nest arbitrarily deep.
    pub fn from_value(value: Value) -> Result<Self, TransportError> {
        let invalid = |err: serde_json::Error| TransportError::InvalidResponse(err.to_string());
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| from_value(item).map_err(invalid))
                .collect::<Result<_, _>>()
                .map(Self::Batch),
            value => from_value(value).map(Self::Single).map_err(invalid),
        }
    }

    /// Returns the contained responses as a list.
    pub fn into_responses(self) -> Vec<Response> {
        match self {
            Self::Batch(responses) => responses,
            Self::Single(response) => vec![response],
        }
    }
}

//! Error types for the RPC layer.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while moving a payload over HTTP.
///
/// Cheap to clone, so a single failed batch can be reported to every caller in it.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request could not be sent or the response could not be read.
    #[error("http request failed: {0}")]
    Request(Arc<reqwest::Error>),

    /// The endpoint answered with a non-success status.
    #[error("http status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body, for diagnostics.
        body: String,
    },

    /// The response body was not valid JSON-RPC.
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(Arc::new(err))
    }
}

/// Errors returned to a single RPC caller.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The HTTP request carrying the call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The node answered the call with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    ErrorResponse {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
        /// Optional error data.
        data: Option<Value>,
    },

    /// The batch response carried no entry for this call.
    #[error("no response for request id {0}")]
    MissingResponse(u64),

    /// The call succeeded but its result did not have the expected shape.
    #[error("failed to decode {method} result: {reason}")]
    Decode {
        /// The method whose result failed to decode.
        method: &'static str,
        /// The decoder's message.
        reason: String,
    },

    /// The client's driver task has shut down.
    #[error("rpc client closed")]
    Closed,
}

impl RpcError {
    /// Returns the JSON-RPC error message, if the node returned an error object.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::ErrorResponse { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Returns `true` if the call's result could not be decoded.
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

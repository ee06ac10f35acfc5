//! Wire shapes for failure responses.

use serde::{Deserialize, Serialize};

/// Error code attached to recovered panics.
pub const INTERNAL_SERVER_ERROR_CODE: &str = "INTERNAL_SERVER_ERROR";

/// Message sent for recovered panics unless the panic message is exposed.
pub const INTERNAL_SERVER_ERROR_MESSAGE: &str = "We are having trouble responding to your request.";

/// Error code for request bodies that cannot be read as JSON.
pub const INVALID_REQUEST_CODE: &str = "INVALID_REQUEST";

/// Message for request bodies that cannot be read as JSON.
pub const INVALID_REQUEST_MESSAGE: &str = "Unable to read a JSON value from the request.";

/// Error code for forwarding failures reported by the bundled proxy routes.
pub const BAD_GATEWAY_CODE: &str = "BAD_GATEWAY";

/// One frame of a parsed call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Source location, absolute path plus line.
    pub file: String,
    /// Function signature or symbol as printed by the runtime.
    pub func_name: String,
}

/// Structured body sent on every handled failure path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBodyError {
    pub message: String,
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<StackFrame>>,
}

impl ResponseBodyError {
    pub fn new(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_code: error_code.into(),
            stack: None,
        }
    }

    /// The generic body used for recovered panics.
    pub fn internal() -> Self {
        Self::new(INTERNAL_SERVER_ERROR_MESSAGE, INTERNAL_SERVER_ERROR_CODE)
    }

    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST_MESSAGE, INVALID_REQUEST_CODE)
    }

    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = Some(stack);
        self
    }
}

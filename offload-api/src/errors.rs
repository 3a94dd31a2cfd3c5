//! # Error Types
//!
//! Errors that travel across the isolation boundary between the
//! coordinator and its worker units.
//!
//! ## Design Philosophy
//!
//! - Errors raised by user code are captured as data ([`RemoteError`]) so they
//!   can be handed to the other side instead of tearing anything down.
//! - Transport failures ([`CallError::ChannelClosed`]) are kept apart from
//!   application failures so callers can tell "your function failed" from
//!   "your function is gone".
//!
//! ## Usage Example
//!
//! ```rust
//! use offload_api::errors::{CallError, RemoteError};
//!
//! fn describe(error: CallError) -> String {
//!     match error {
//!         CallError::Remote(remote) => format!("callee failed: {}", remote.message),
//!         CallError::ChannelClosed => "callee released".to_string(),
//!         other => other.to_string(),
//!     }
//! }
//!
//! assert_eq!(describe(CallError::Remote(RemoteError::msg("boom"))), "callee failed: boom");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error raised on one side of the boundary, captured as plain data.
///
/// Mirrors the `{ name, message, stack }` triple that error objects carry, so
/// that a task body failure can be reported to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error class name, `"Error"` when unknown
    pub name: String,

    /// Human readable message
    pub message: String,

    /// Optional backtrace or error chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl RemoteError {
    pub const DEFAULT_NAME: &'static str = "Error";

    /// Creates an error with an explicit class name.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Creates a plain `Error` with the given message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Self::DEFAULT_NAME, message)
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Rebuilds an error from a value produced by a callback.
    ///
    /// Accepts either a bare string or an object with `name`/`message`/`stack`
    /// fields; anything else is rendered as its JSON text.
    pub fn from_value(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(message) => Self::msg(message.clone()),
            serde_json::Value::Object(_) => serde_json::from_value::<RemoteError>(value.clone())
                .unwrap_or_else(|_| Self::msg(value.to_string())),
            other => Self::msg(other.to_string()),
        }
    }

    /// Serializes the error into a value suitable for a callback argument.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "message": self.message,
            "stack": self.stack,
        })
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == Self::DEFAULT_NAME {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<anyhow::Error> for RemoteError {
    fn from(error: anyhow::Error) -> Self {
        let chain = error
            .chain()
            .skip(1)
            .map(|cause| cause.to_string())
            .collect::<Vec<_>>();
        let remote = Self::msg(error.to_string());
        if chain.is_empty() {
            remote
        } else {
            remote.with_stack(chain.join("\n"))
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(error: serde_json::Error) -> Self {
        Self::new("SerializationError", error.to_string())
    }
}

impl From<CallError> for RemoteError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Remote(remote) => remote,
            other => Self::new("CallError", other.to_string()),
        }
    }
}

impl From<&str> for RemoteError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for RemoteError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

/// Errors returned when invoking a [`Callable`](crate::Callable).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The callee ran and failed.
    #[error("Remote call failed: {0}")]
    Remote(RemoteError),

    /// The handle was released or its owning side is gone.
    #[error("Channel closed")]
    ChannelClosed,

    /// The exposed object has no function under this name.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// The arguments did not match what the callee expects.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

impl From<RemoteError> for CallError {
    fn from(error: RemoteError) -> Self {
        CallError::Remote(error)
    }
}

/// Errors raised while splitting a context into data and callables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("Failed to serialize context entry `{key}`: {message}")]
    Serialize { key: String, message: String },

    #[error("Context entry `{0}` is not an object")]
    NotAnObject(String),
}

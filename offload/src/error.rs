use std::any::Any;
use std::time::Duration;

use offload_api::{MarshalError, RemoteError, TaskId};
use thiserror::Error;

/// Errors surfaced by the pool to the caller of `run_task`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    /// The task body ran and returned an error.
    #[error("Task failed: {0}")]
    Task(RemoteError),

    #[error("{task_id} timed out after {after:?} ({attempts} attempts)")]
    Timeout {
        task_id: TaskId,
        after: Duration,
        attempts: u32,
    },

    #[error("Worker crashed while running {task_id} ({attempts} attempts): {reason}")]
    WorkerCrashed {
        task_id: TaskId,
        attempts: u32,
        reason: String,
    },

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Pool has been disposed")]
    Disposed,

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The result could not be decoded into the requested type.
    #[error("Failed to decode task result: {0}")]
    Decode(String),
}

impl PoolError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::Timeout { .. })
    }

    /// Failures of the machinery rather than of the task body.
    pub fn is_transport(&self) -> bool {
        matches!(self, PoolError::WorkerCrashed { .. } | PoolError::ChannelClosed)
    }

    /// The task body's own error, if that is what failed.
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            PoolError::Task(error) => Some(error),
            _ => None,
        }
    }
}

/// Renders a panic payload caught with `catch_unwind`.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::errors::CallError;

/// Plain data crossing the isolation boundary.
pub type Value = serde_json::Value;

/// Ordered key/value mapping used for task payloads.
pub type DataMap = serde_json::Map<String, Value>;

pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of invoking a [`Callable`](crate::Callable), local or remote.
pub type CallResult = Result<Value, CallError>;

/// Identifier of a task, monotonic and never reused within one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifier of a worker unit, never reused within one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Metadata handed to the task body alongside its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMeta {
    /// The task being executed
    pub task_id: TaskId,

    /// The worker unit executing it
    pub worker_id: WorkerId,

    /// Zero for the first delivery, incremented on every retry
    pub attempt: u32,
}

//! # Task Execution
//!
//! A [`TaskExecutor`] is the task body: the code every worker unit runs
//! against the context it receives. One executor instance is shared by all
//! units of a pool, so implementations must be `Send + Sync` and must not
//! rely on state surviving between tasks.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::WorkerContext;
use crate::errors::RemoteError;
use crate::types::Value;

/// The body executed by a worker unit for every task.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Runs one task.
    ///
    /// Returning `Err` fails only this task; the unit stays usable. A panic
    /// takes the whole unit down and is reported as a crash.
    async fn execute(&self, context: WorkerContext) -> Result<Value, RemoteError>;
}

/// Executor backed by an async closure.
pub struct FnExecutor<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> TaskExecutor for FnExecutor<F>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RemoteError>> + Send + 'static,
{
    async fn execute(&self, context: WorkerContext) -> Result<Value, RemoteError> {
        (self.f)(context).await
    }
}

/// Wraps an async closure as a [`TaskExecutor`].
pub fn from_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RemoteError>> + Send + 'static,
{
    FnExecutor { f }
}

/// Conventional result shape of a compile style task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutput {
    #[serde(default)]
    pub file_dependencies: Vec<String>,

    #[serde(default)]
    pub context_dependencies: Vec<String>,

    #[serde(default)]
    pub result: Vec<Value>,
}

impl TaskOutput {
    pub fn new(result: Vec<Value>) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }

    pub fn with_file_dependency(mut self, path: impl Into<String>) -> Self {
        self.file_dependencies.push(path.into());
        self
    }

    pub fn with_context_dependency(mut self, path: impl Into<String>) -> Self {
        self.context_dependencies.push(path.into());
        self
    }

    pub fn into_value(self) -> Result<Value, RemoteError> {
        Ok(serde_json::to_value(self)?)
    }
}

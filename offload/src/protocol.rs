//! Messages exchanged between the coordinator and a worker unit's isolate.

use offload_api::{RemoteError, TaskId, TaskMeta, Value};
use tokio::sync::oneshot;

use crate::marshal::DataPayload;
use crate::rpc::RemoteObject;

/// One task handed to an isolate.
#[derive(Debug)]
pub struct TaskEnvelope {
    pub meta: TaskMeta,
    pub payload: DataPayload,
    pub callables: RemoteObject,
    pub reply: oneshot::Sender<Result<Value, RemoteError>>,
}

/// Coordinator to isolate.
#[derive(Debug)]
pub enum ToWorker {
    RunTask(TaskEnvelope),
    /// Finish up and let the thread end.
    Exit,
}

impl ToWorker {
    pub fn kind(&self) -> &'static str {
        match self {
            ToWorker::RunTask(_) => "runTask",
            ToWorker::Exit => "exit",
        }
    }

    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            ToWorker::RunTask(envelope) => Some(envelope.meta.task_id),
            ToWorker::Exit => None,
        }
    }
}

/// How an isolate ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub code: i32,
    pub reason: Option<String>,
}

impl WorkerExit {
    pub fn normal() -> Self {
        Self { code: 0, reason: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            code: 1,
            reason: Some(reason.into()),
        }
    }

    pub fn is_normal(&self) -> bool {
        self.code == 0
    }

    pub fn describe(&self) -> String {
        match &self.reason {
            Some(reason) => format!("exit code {}: {}", self.code, reason),
            None => format!("exit code {}", self.code),
        }
    }
}

/// Isolate lifecycle, isolate to coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolateEvent {
    Ready,
    Exited(WorkerExit),
}

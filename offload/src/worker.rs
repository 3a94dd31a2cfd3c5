//! # Worker Units
//!
//! A worker unit wraps one isolate and tracks its lifecycle from the
//! coordinator's point of view.
//!
//! ## State Machine
//! ```text
//! Starting ──ready──> Idle ──submit──> Busy ──complete──> Idle
//!     │                 │                │
//!     └──── close ──────┴──> Closing ────┴──exit──> Disposed
//! ```
//! `terminate()` jumps from any state straight to Disposed. A Disposed unit
//! is never reused.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use offload_api::{RemoteError, TaskId, TaskMeta, Value, WorkerId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::PoolError;
use crate::isolate::Isolate;
use crate::marshal::DataPayload;
use crate::protocol::{TaskEnvelope, ToWorker};
use crate::rpc::RemoteObject;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Idle,
    Busy,
    Closing,
    Disposed,
}

/// Everything the isolate needs to run one attempt of a task.
#[derive(Debug)]
pub struct Job {
    pub meta: TaskMeta,
    pub payload: DataPayload,
    pub callables: RemoteObject,
}

/// How one attempt ended, as seen from the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Completed(Value),
    /// The task body returned an error; the unit is still healthy.
    Failed(RemoteError),
    TimedOut(Duration),
    /// The isolate went away without replying.
    Crashed(String),
}

pub struct WorkerUnit {
    id: WorkerId,
    state: WorkerState,
    isolate: Option<Isolate>,
    monitor: Option<JoinHandle<()>>,
    current_task: Option<TaskId>,
    close_deadline: Option<Instant>,
}

impl WorkerUnit {
    pub fn new(id: WorkerId, isolate: Isolate, monitor: JoinHandle<()>) -> Self {
        Self {
            id,
            state: WorkerState::Starting,
            isolate: Some(isolate),
            monitor: Some(monitor),
            current_task: None,
            close_deadline: None,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.current_task
    }

    pub fn close_deadline(&self) -> Option<Instant> {
        self.close_deadline
    }

    pub fn is_available(&self) -> bool {
        self.state == WorkerState::Idle
    }

    /// Counts against `max_workers`.
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            WorkerState::Starting | WorkerState::Idle | WorkerState::Busy
        )
    }

    pub fn mark_ready(&mut self) -> bool {
        if self.state != WorkerState::Starting {
            return false;
        }
        self.state = WorkerState::Idle;
        crate::log_worker!(self.id, "ready");
        true
    }

    /// Hands `job` to the isolate.
    ///
    /// The returned future resolves once the isolate replies, the attempt
    /// times out, or the isolate dies; it owns everything it needs and can be
    /// driven from any task.
    pub fn submit(&mut self, job: Job, timeout: Duration) -> Result<BoxFuture<'static, SubmitOutcome>, PoolError> {
        if !self.is_available() {
            return Err(PoolError::Configuration(format!(
                "{} cannot accept work in state {:?}",
                self.id, self.state
            )));
        }
        let isolate = self.isolate.as_ref().ok_or(PoolError::ChannelClosed)?;

        let task_id = job.meta.task_id;
        let (reply, response) = oneshot::channel();
        isolate.send(ToWorker::RunTask(TaskEnvelope {
            meta: job.meta,
            payload: job.payload,
            callables: job.callables,
            reply,
        }))?;

        self.state = WorkerState::Busy;
        self.current_task = Some(task_id);

        Ok(async move {
            match tokio::time::timeout(timeout, response).await {
                Ok(Ok(Ok(value))) => SubmitOutcome::Completed(value),
                Ok(Ok(Err(error))) => SubmitOutcome::Failed(error),
                Ok(Err(_)) => SubmitOutcome::Crashed("isolate exited while running the task".to_string()),
                Err(_) => SubmitOutcome::TimedOut(timeout),
            }
        }
        .boxed())
    }

    /// Busy to Idle once the in-flight task settled.
    pub fn complete(&mut self) {
        if self.state == WorkerState::Busy {
            self.state = WorkerState::Idle;
        }
        self.current_task = None;
    }

    /// Asks the isolate to exit; the unit stays Closing until its exit is
    /// observed or `grace` runs out.
    pub fn close(&mut self, grace: Duration) {
        if !matches!(self.state, WorkerState::Starting | WorkerState::Idle) {
            return;
        }
        let sent = self
            .isolate
            .as_ref()
            .map(|isolate| isolate.send(ToWorker::Exit).is_ok())
            .unwrap_or(false);
        if !sent {
            // Already gone; the monitor reports the exit.
            crate::log_worker!(self.id, "close_on_dead_isolate");
        }
        self.state = WorkerState::Closing;
        self.close_deadline = Some(Instant::now() + grace);
        crate::log_worker!(self.id, "closing");
    }

    /// Force exit. Threads cannot be killed: the control channel is dropped
    /// and the thread detached, so whatever it still produces is discarded.
    pub fn terminate(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
        if let Some(mut isolate) = self.isolate.take() {
            isolate.disconnect();
            drop(isolate.take_thread());
        }
        self.state = WorkerState::Disposed;
        self.current_task = None;
        crate::log_worker!(self.id, "terminated");
    }

    /// Records the isolate's exit and reaps its thread.
    pub fn mark_exited(&mut self) {
        self.monitor = None;
        if let Some(mut isolate) = self.isolate.take() {
            if let Some(thread) = isolate.take_thread() {
                let id = self.id;
                tokio::task::spawn_blocking(move || {
                    if thread.join().is_err() {
                        tracing::warn!(worker = %id, "isolate thread panicked outside a task");
                    }
                });
            }
        }
        self.state = WorkerState::Disposed;
        self.current_task = None;
    }
}

impl fmt::Debug for WorkerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerUnit")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("current_task", &self.current_task)
            .finish()
    }
}

impl Drop for WorkerUnit {
    fn drop(&mut self) {
        if self.state != WorkerState::Disposed {
            self.terminate();
        }
    }
}

use offload_api::{TaskId, TaskMeta, Value, WorkerId};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::PoolError;
use crate::marshal::{DataPayload, Marshalled};
use crate::rpc::{Exposure, RemoteObject};
use crate::worker::Job;

pub(crate) type Settle = oneshot::Sender<Result<Value, PoolError>>;

/// A submitted task, owned by the coordinator until it settles.
#[derive(Debug)]
pub(crate) struct Task {
    pub id: TaskId,
    payload: DataPayload,
    callables: RemoteObject,
    exposure: Option<Exposure>,
    /// Deliveries so far.
    pub attempts: u32,
    pub submitted_at: Instant,
    settle: Settle,
}

impl Task {
    pub fn new(id: TaskId, marshalled: Marshalled, settle: Settle) -> Self {
        Self {
            id,
            payload: marshalled.payload,
            callables: marshalled.callables,
            exposure: marshalled.exposure,
            attempts: 0,
            submitted_at: Instant::now(),
            settle,
        }
    }

    pub fn payload(&self) -> &DataPayload {
        &self.payload
    }

    /// A fresh copy of the task for the next delivery.
    pub fn job(&self, worker_id: WorkerId) -> Job {
        Job {
            meta: TaskMeta {
                task_id: self.id,
                worker_id,
                attempt: self.attempts,
            },
            payload: self.payload.clone(),
            callables: self.callables.clone(),
        }
    }

    /// The caller stopped waiting for the result.
    pub fn is_abandoned(&self) -> bool {
        self.settle.is_closed()
    }

    /// Delivers the result and releases the task's callables. Consuming
    /// `self` is what makes settlement happen at most once.
    pub fn settle(self, result: Result<Value, PoolError>) {
        drop(self.exposure);
        if self.settle.send(result).is_err() {
            crate::log_task!(self.id, "settled_without_caller");
        }
    }
}

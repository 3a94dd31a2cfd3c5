//! Thread-backed isolates.
//!
//! Each isolate is a named OS thread that builds a current-thread tokio
//! runtime and processes `ToWorker` messages one at a time. A panic in a task
//! body unwinds the whole thread; it is caught at the thread boundary and
//! reported as `Exited { code: 1 }`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use offload_api::{TaskExecutor, WorkerId};

use super::{Isolate, IsolateFactory};
use crate::config::PoolConfig;
use crate::error::{panic_message, PoolError};
use crate::logging;
use crate::marshal::unmarshal;
use crate::protocol::{IsolateEvent, TaskEnvelope, ToWorker, WorkerExit};

/// Spawns one OS thread per worker unit, all running the same executor.
#[derive(Clone)]
pub struct ThreadIsolateFactory {
    executor: Arc<dyn TaskExecutor>,
}

impl ThreadIsolateFactory {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self { executor }
    }
}

impl IsolateFactory for ThreadIsolateFactory {
    fn spawn(&self, worker_id: WorkerId, config: &PoolConfig) -> Result<Isolate, PoolError> {
        let (control_tx, control_rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();

        let executor = Arc::clone(&self.executor);
        let dispatcher = logging::current_subscriber();
        let verbose = config.log_level.is_verbose();

        let thread = std::thread::Builder::new()
            .name(format!("{}-{}", config.thread_name_prefix, worker_id.0))
            .spawn(move || {
                let _guard = tracing::dispatcher::set_default(&dispatcher);
                isolate_main(worker_id, executor, control_rx, event_tx, verbose);
            })
            .map_err(|e| PoolError::Configuration(format!("failed to spawn thread for {worker_id}: {e}")))?;

        Ok(Isolate::new(control_tx, event_rx, Some(thread)))
    }
}

fn isolate_main(
    worker_id: WorkerId,
    executor: Arc<dyn TaskExecutor>,
    control_rx: flume::Receiver<ToWorker>,
    event_tx: flume::Sender<IsolateEvent>,
    verbose: bool,
) {
    let ready_tx = event_tx.clone();
    let result = panic::catch_unwind(AssertUnwindSafe(move || -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("failed to build isolate runtime: {e}"))?;

        let _ = ready_tx.send(IsolateEvent::Ready);
        runtime.block_on(run_loop(worker_id, executor, control_rx, verbose));
        Ok(())
    }));

    let exit = match result {
        Ok(Ok(())) => WorkerExit::normal(),
        Ok(Err(reason)) => WorkerExit::failed(reason),
        Err(panic) => WorkerExit::failed(panic_message(panic.as_ref())),
    };

    if exit.is_normal() {
        crate::log_worker!(worker_id, "isolate_exited");
    } else {
        tracing::warn!(worker = %worker_id, exit = %exit.describe(), "isolate terminated abnormally");
    }
    let _ = event_tx.send(IsolateEvent::Exited(exit));
}

async fn run_loop(
    worker_id: WorkerId,
    executor: Arc<dyn TaskExecutor>,
    control_rx: flume::Receiver<ToWorker>,
    verbose: bool,
) {
    while let Ok(message) = control_rx.recv_async().await {
        let envelope = match message {
            ToWorker::RunTask(envelope) => envelope,
            ToWorker::Exit => break,
        };
        let TaskEnvelope {
            meta,
            payload,
            callables,
            reply,
        } = envelope;

        crate::log_task!(meta.task_id, "started", worker = %worker_id, attempt = meta.attempt);
        let context = unmarshal(meta, payload, &callables);

        // While busy the control channel only changes when the unit is
        // abandoned; stop working for a coordinator that is gone.
        let result = tokio::select! {
            result = executor.execute(context) => result,
            _ = control_rx.recv_async() => {
                tracing::debug!(worker = %worker_id, task = %meta.task_id, "abandoned while running");
                break;
            }
        };

        if verbose {
            tracing::debug!(worker = %worker_id, task = %meta.task_id, result = ?result, "task finished");
        }
        if reply.send(result).is_err() {
            tracing::debug!(worker = %worker_id, task = %meta.task_id, "late result discarded");
        }
    }
}

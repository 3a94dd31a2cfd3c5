//! # Pool
//!
//! The public face of the crate. A [`Pool`] accepts tasks, runs them on up to
//! `max_workers` worker units and hands each caller its own result.
//!
//! ## Key Concepts
//! - One coordinator task owns the queues, the worker table and every timer.
//!   It is driven by a command channel, so none of that state is locked.
//! - Units are started on demand, closed after `idle_timeout` without
//!   submissions, and started again by the next task.
//! - Every task settles exactly once. Timeouts and crashes share one retry
//!   budget (`max_retries`); `max_retries = 0` gives at-most-once delivery.
//!
//! ## Usage Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use offload::{Pool, PoolConfig};
//! use offload_api::{from_fn, serde_json::json, TaskContext, WorkerContext};
//!
//! # async fn example() -> Result<(), offload::PoolError> {
//! let executor = from_fn(|context: WorkerContext| async move {
//!     Ok(context.get("input").cloned().unwrap_or_default())
//! });
//! let pool = Pool::new(PoolConfig::default(), Arc::new(executor))?;
//!
//! let context = TaskContext::new().with_data("input", 42)?;
//! assert_eq!(pool.run_task(context).await?, json!(42));
//!
//! pool.dispose().await;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use offload_api::{IntoTaskContext, TaskExecutor, TaskId, Value, WorkerId};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::dispatcher::TaskQueue;
use crate::error::PoolError;
use crate::isolate::{IsolateFactory, ThreadIsolateFactory};
use crate::marshal::marshal;
use crate::protocol::{IsolateEvent, WorkerExit};
use crate::task::Task;
use crate::worker::{SubmitOutcome, WorkerState, WorkerUnit};

/// Consecutive units exiting before `Ready` after which pending tasks are
/// failed instead of spawning yet another unit.
pub const MAX_START_FAILURES: u32 = 3;

/// Snapshot of a pool's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Starting, idle and busy units
    pub live_workers: usize,
    pub starting_workers: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub closing_workers: usize,
    pub pending_tasks: usize,
    pub in_flight_tasks: usize,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    /// Units started over the pool's lifetime
    pub spawned: u64,
}

/// How a pool's disposal went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolExitResult {
    /// At least one unit did not exit within the grace period and was terminated.
    pub force_exited: bool,
}

enum Command {
    Submit(Task),
    Settled {
        worker_id: WorkerId,
        task_id: TaskId,
        outcome: SubmitOutcome,
    },
    WorkerReady(WorkerId),
    WorkerExited {
        worker_id: WorkerId,
        exit: WorkerExit,
    },
    Stats(oneshot::Sender<PoolStats>),
    Dispose(oneshot::Sender<PoolExitResult>),
}

/// A pool of worker units running one task body.
pub struct Pool {
    id: Uuid,
    config: PoolConfig,
    commands: mpsc::UnboundedSender<Command>,
    next_task_id: AtomicU64,
    disposed: AtomicBool,
    /// Written by the coordinator before it answers any dispose waiter.
    exit: Arc<OnceLock<PoolExitResult>>,
}

impl Pool {
    /// Creates a pool whose units are threads running `executor`.
    ///
    /// Must be called from within a tokio runtime; the coordinator is spawned
    /// onto it.
    pub fn new(config: PoolConfig, executor: Arc<dyn TaskExecutor>) -> Result<Self, PoolError> {
        Self::with_factory(config, Arc::new(ThreadIsolateFactory::new(executor)))
    }

    pub fn with_factory(config: PoolConfig, factory: Arc<dyn IsolateFactory>) -> Result<Self, PoolError> {
        config.validate()?;
        if !factory.is_available() {
            return Err(PoolError::Configuration(
                "worker isolates are not available on this host".into(),
            ));
        }
        let handle = Handle::try_current().map_err(|_| {
            PoolError::Configuration("a pool must be created inside a tokio runtime".into())
        })?;

        let id = Uuid::new_v4();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let span = crate::pool_span!(id, max_workers = config.max_workers);
        let exit = Arc::new(OnceLock::new());
        let coordinator = Coordinator::new(config.clone(), factory, commands.clone(), Arc::clone(&exit));
        handle.spawn(coordinator.run(command_rx).instrument(span));

        tracing::info!(pool = %id, max_workers = config.max_workers, "pool created");
        Ok(Self {
            id,
            config,
            commands,
            next_task_id: AtomicU64::new(1),
            disposed: AtomicBool::new(false),
            exit,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Runs one task and waits for its result.
    pub async fn run_task(&self, context: impl IntoTaskContext) -> Result<Value, PoolError> {
        if self.is_disposed() {
            return Err(PoolError::Disposed);
        }
        let context = context.into_task_context()?;
        let marshalled = marshal(context);
        let task_id = TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed));

        let (settle, settled) = oneshot::channel();
        self.commands
            .send(Command::Submit(Task::new(task_id, marshalled, settle)))
            .map_err(|_| PoolError::Disposed)?;

        settled.await.unwrap_or(Err(PoolError::Disposed))
    }

    /// [`Pool::run_task`], deserializing the result into `T`.
    pub async fn run_task_as<T: DeserializeOwned>(&self, context: impl IntoTaskContext) -> Result<T, PoolError> {
        let value = self.run_task(context).await?;
        serde_json::from_value(value).map_err(|e| PoolError::Decode(e.to_string()))
    }

    pub async fn stats(&self) -> PoolStats {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Stats(tx)).is_err() {
            return PoolStats::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Stops the pool: pending tasks fail with [`PoolError::Disposed`], busy
    /// units get `shutdown_grace` to finish. Calling it again returns the
    /// first outcome.
    pub async fn dispose(&self) -> PoolExitResult {
        if let Some(result) = self.exit.get() {
            return *result;
        }
        self.disposed.store(true, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Dispose(tx)).is_ok() {
            let _ = rx.await;
        }
        self.exit.get().copied().unwrap_or_default()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            let (tx, _rx) = oneshot::channel();
            let _ = self.commands.send(Command::Dispose(tx));
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("max_workers", &self.config.max_workers)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// --- Coordinator ---

struct InFlight {
    task: Task,
    worker_id: WorkerId,
}

struct Disposing {
    deadline: Instant,
    waiters: Vec<oneshot::Sender<PoolExitResult>>,
    force_exited: bool,
}

enum Failure {
    Timeout(Duration),
    Crashed(String),
}

#[derive(Default)]
struct Counters {
    completed: u64,
    failed: u64,
    retried: u64,
    spawned: u64,
}

struct Coordinator {
    config: PoolConfig,
    factory: Arc<dyn IsolateFactory>,
    commands: mpsc::UnboundedSender<Command>,
    exit: Arc<OnceLock<PoolExitResult>>,
    queue: TaskQueue<Task>,
    workers: BTreeMap<WorkerId, WorkerUnit>,
    in_flight: HashMap<TaskId, InFlight>,
    next_worker_id: u64,
    idle_deadline: Option<Instant>,
    disposing: Option<Disposing>,
    counters: Counters,
    start_failures: u32,
}

impl Coordinator {
    fn new(
        config: PoolConfig,
        factory: Arc<dyn IsolateFactory>,
        commands: mpsc::UnboundedSender<Command>,
        exit: Arc<OnceLock<PoolExitResult>>,
    ) -> Self {
        Self {
            config,
            factory,
            commands,
            exit,
            queue: TaskQueue::new(),
            workers: BTreeMap::new(),
            in_flight: HashMap::new(),
            next_worker_id: 1,
            idle_deadline: None,
            disposing: None,
            counters: Counters::default(),
            start_failures: 0,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = wait_until(deadline) => self.on_deadline(Instant::now()),
            }
            if self.dispose_complete() {
                break;
            }
        }
        self.finish();
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Submit(task) => self.on_submit(task),
            Command::Settled {
                worker_id,
                task_id,
                outcome,
            } => self.on_settled(worker_id, task_id, outcome),
            Command::WorkerReady(worker_id) => self.on_ready(worker_id),
            Command::WorkerExited { worker_id, exit } => self.on_exited(worker_id, exit),
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::Dispose(reply) => self.on_dispose(reply),
        }
    }

    fn on_submit(&mut self, task: Task) {
        if self.disposing.is_some() {
            task.settle(Err(PoolError::Disposed));
            return;
        }
        if self.start_failures >= MAX_START_FAILURES {
            // Give a broken factory another chance per new submission.
            self.start_failures = 0;
        }

        crate::log_task!(task.id, "submitted");
        if self.config.log_level.is_verbose() {
            tracing::info!(task = %task.id, payload = ?task.payload(), "task payload");
        }
        self.idle_deadline = Some(Instant::now() + self.config.idle_timeout);
        self.queue.push_task(task);
        self.pump();
    }

    fn on_settled(&mut self, worker_id: WorkerId, task_id: TaskId, outcome: SubmitOutcome) {
        let current = self
            .in_flight
            .get(&task_id)
            .is_some_and(|in_flight| in_flight.worker_id == worker_id);
        if !current {
            crate::log_task!(task_id, "late_result_discarded", worker = %worker_id);
            return;
        }
        let Some(InFlight { task, .. }) = self.in_flight.remove(&task_id) else {
            return;
        };

        match outcome {
            SubmitOutcome::Completed(value) => {
                if self.config.log_level.is_verbose() {
                    tracing::info!(task = %task_id, result = %value, "task result");
                }
                crate::log_task!(task_id, "completed", elapsed_ms = task.submitted_at.elapsed().as_millis() as u64);
                self.counters.completed += 1;
                task.settle(Ok(value));
                self.release_unit(worker_id);
            }
            SubmitOutcome::Failed(error) => {
                crate::log_task!(task_id, "failed", error = %error);
                self.counters.failed += 1;
                task.settle(Err(PoolError::Task(error)));
                self.release_unit(worker_id);
            }
            SubmitOutcome::TimedOut(after) => {
                tracing::warn!(task = %task_id, worker = %worker_id, ?after, "task timed out; terminating unit");
                self.retire(worker_id);
                self.retry_or_fail(task, Failure::Timeout(after));
            }
            SubmitOutcome::Crashed(reason) => {
                tracing::warn!(task = %task_id, worker = %worker_id, %reason, "unit crashed while running task");
                self.retire(worker_id);
                self.retry_or_fail(task, Failure::Crashed(reason));
            }
        }
        self.pump();
    }

    fn on_ready(&mut self, worker_id: WorkerId) {
        let Some(unit) = self.workers.get_mut(&worker_id) else {
            return;
        };
        if !unit.mark_ready() {
            return;
        }
        self.start_failures = 0;
        if self.disposing.is_some() {
            unit.close(self.config.shutdown_grace);
            return;
        }
        self.queue.worker_available(worker_id);
        self.pump();
    }

    fn on_exited(&mut self, worker_id: WorkerId, exit: WorkerExit) {
        let Some(mut unit) = self.workers.remove(&worker_id) else {
            return;
        };
        self.queue.remove_worker(worker_id);
        let state = unit.state();
        let current_task = unit.current_task();
        unit.mark_exited();

        match state {
            WorkerState::Starting => {
                self.start_failures += 1;
                tracing::warn!(worker = %worker_id, exit = %exit.describe(), "unit exited before becoming ready");
                if self.start_failures >= MAX_START_FAILURES {
                    self.fail_startup(&exit.describe());
                }
            }
            WorkerState::Busy => {
                let in_flight = current_task
                    .filter(|task_id| {
                        self.in_flight
                            .get(task_id)
                            .is_some_and(|in_flight| in_flight.worker_id == worker_id)
                    })
                    .and_then(|task_id| self.in_flight.remove(&task_id));
                if let Some(InFlight { task, .. }) = in_flight {
                    tracing::warn!(task = %task.id, worker = %worker_id, exit = %exit.describe(), "unit exited while running task");
                    self.retry_or_fail(task, Failure::Crashed(exit.describe()));
                }
            }
            WorkerState::Idle => {
                tracing::warn!(worker = %worker_id, exit = %exit.describe(), "idle unit exited unexpectedly");
            }
            WorkerState::Closing | WorkerState::Disposed => {
                crate::log_worker!(worker_id, "exited", code = exit.code);
            }
        }
        self.pump();
    }

    fn on_dispose(&mut self, reply: oneshot::Sender<PoolExitResult>) {
        if let Some(disposing) = &mut self.disposing {
            disposing.waiters.push(reply);
            return;
        }
        tracing::info!(
            pending = self.queue.pending_len(),
            in_flight = self.in_flight.len(),
            "disposing pool"
        );

        let grace = self.config.shutdown_grace;
        self.disposing = Some(Disposing {
            deadline: Instant::now() + grace,
            waiters: vec![reply],
            force_exited: false,
        });
        self.idle_deadline = None;

        for task in self.queue.drain_pending() {
            task.settle(Err(PoolError::Disposed));
        }
        for (worker_id, unit) in self.workers.iter_mut() {
            unit.close(grace);
            self.queue.remove_worker(*worker_id);
        }
    }

    fn on_deadline(&mut self, now: Instant) {
        if self.idle_deadline.is_some_and(|deadline| deadline <= now) {
            if self.queue.has_pending() || !self.in_flight.is_empty() {
                self.idle_deadline = Some(now + self.config.idle_timeout);
            } else {
                self.idle_deadline = None;
                if !self.workers.is_empty() {
                    tracing::info!(workers = self.workers.len(), "idle timeout; closing units");
                }
                let grace = self.config.shutdown_grace;
                for (worker_id, unit) in self.workers.iter_mut() {
                    unit.close(grace);
                    self.queue.remove_worker(*worker_id);
                }
            }
        }

        let overdue = self
            .workers
            .values()
            .filter(|unit| unit.state() == WorkerState::Closing)
            .filter(|unit| unit.close_deadline().is_some_and(|deadline| deadline <= now))
            .map(WorkerUnit::id)
            .collect::<Vec<_>>();
        for worker_id in overdue {
            tracing::warn!(worker = %worker_id, "unit did not exit within grace period; terminating");
            self.retire(worker_id);
            if let Some(disposing) = &mut self.disposing {
                disposing.force_exited = true;
            }
        }

        let dispose_due = self
            .disposing
            .as_ref()
            .is_some_and(|disposing| disposing.deadline <= now);
        if dispose_due {
            let in_flight = self.in_flight.drain().map(|(_, in_flight)| in_flight).collect::<Vec<_>>();
            let mut forced = !in_flight.is_empty();
            for InFlight { task, worker_id } in in_flight {
                tracing::warn!(task = %task.id, worker = %worker_id, "grace period over; failing task");
                task.settle(Err(PoolError::Disposed));
                self.retire(worker_id);
            }
            let remaining = self.workers.keys().copied().collect::<Vec<_>>();
            forced |= !remaining.is_empty();
            for worker_id in remaining {
                self.retire(worker_id);
            }
            if let Some(disposing) = &mut self.disposing {
                disposing.force_exited |= forced;
            }
        }
    }

    /// Pairs pending tasks with idle units, then starts units for what is left.
    fn pump(&mut self) {
        if self.disposing.is_some() {
            return;
        }
        while let Some((task, worker_id)) = self.queue.next_dispatch() {
            self.dispatch(task, worker_id);
        }
        self.ensure_capacity();
    }

    fn dispatch(&mut self, task: Task, worker_id: WorkerId) {
        if task.is_abandoned() {
            crate::log_task!(task.id, "abandoned_by_caller");
            task.settle(Err(PoolError::ChannelClosed));
            self.queue.worker_available(worker_id);
            return;
        }
        let Some(unit) = self.workers.get_mut(&worker_id) else {
            self.queue.requeue_front(task);
            return;
        };
        if !unit.is_available() {
            self.queue.requeue_front(task);
            return;
        }

        match unit.submit(task.job(worker_id), self.config.task_timeout) {
            Ok(outcome) => {
                let task_id = task.id;
                let commands = self.commands.clone();
                tokio::spawn(async move {
                    let outcome = outcome.await;
                    let _ = commands.send(Command::Settled {
                        worker_id,
                        task_id,
                        outcome,
                    });
                });
                crate::log_task!(task_id, "dispatched", worker = %worker_id, attempt = task.attempts);
                self.in_flight.insert(task_id, InFlight { task, worker_id });
            }
            Err(error) => {
                tracing::warn!(worker = %worker_id, %error, "dispatch failed; retiring unit");
                self.retire(worker_id);
                self.queue.requeue_front(task);
            }
        }
    }

    fn ensure_capacity(&mut self) {
        if self.start_failures >= MAX_START_FAILURES {
            return;
        }
        let starting = self
            .workers
            .values()
            .filter(|unit| unit.state() == WorkerState::Starting)
            .count();
        let live = self.workers.values().filter(|unit| unit.is_live()).count();

        let wanted = self
            .queue
            .pending_len()
            .saturating_sub(starting + self.queue.available_len());
        let room = self.config.max_workers.saturating_sub(live);
        // A failed spawn is retried right away: no unit exists whose events
        // would pump the queue again.
        let mut missing = wanted.min(room);
        while missing > 0 && self.start_failures < MAX_START_FAILURES {
            if self.spawn_unit().is_ok() {
                missing -= 1;
            }
        }
    }

    fn spawn_unit(&mut self) -> Result<(), PoolError> {
        let worker_id = WorkerId(self.next_worker_id);
        self.next_worker_id += 1;

        let spawned = self.factory.spawn(worker_id, &self.config).and_then(|mut isolate| {
            let events = isolate
                .take_events()
                .ok_or_else(|| PoolError::Configuration("isolate has no event stream".into()))?;
            Ok((isolate, events))
        });

        match spawned {
            Ok((isolate, events)) => {
                let monitor = spawn_monitor(worker_id, events, self.commands.clone());
                self.workers.insert(worker_id, WorkerUnit::new(worker_id, isolate, monitor));
                self.counters.spawned += 1;
                crate::log_worker!(worker_id, "spawned");
                Ok(())
            }
            Err(error) => {
                tracing::error!(worker = %worker_id, %error, "failed to start unit");
                self.start_failures += 1;
                if self.start_failures >= MAX_START_FAILURES {
                    self.fail_startup(&error.to_string());
                }
                Err(error)
            }
        }
    }

    fn fail_startup(&mut self, reason: &str) {
        let message = format!("worker units failed to start {MAX_START_FAILURES} times in a row: {reason}");
        tracing::error!("{}", message);
        for task in self.queue.drain_pending() {
            self.counters.failed += 1;
            task.settle(Err(PoolError::Configuration(message.clone())));
        }
    }

    fn release_unit(&mut self, worker_id: WorkerId) {
        let Some(unit) = self.workers.get_mut(&worker_id) else {
            return;
        };
        unit.complete();
        if self.disposing.is_some() {
            unit.close(self.config.shutdown_grace);
        } else {
            self.queue.worker_available(worker_id);
        }
    }

    /// Terminates and forgets a unit.
    fn retire(&mut self, worker_id: WorkerId) {
        self.queue.remove_worker(worker_id);
        if let Some(mut unit) = self.workers.remove(&worker_id) {
            unit.terminate();
        }
    }

    fn retry_or_fail(&mut self, mut task: Task, failure: Failure) {
        task.attempts += 1;
        if task.attempts > self.config.max_retries {
            self.counters.failed += 1;
            let error = match failure {
                Failure::Timeout(after) => PoolError::Timeout {
                    task_id: task.id,
                    after,
                    attempts: task.attempts,
                },
                Failure::Crashed(reason) => PoolError::WorkerCrashed {
                    task_id: task.id,
                    attempts: task.attempts,
                    reason,
                },
            };
            tracing::warn!(task = %task.id, %error, "retry budget exhausted");
            task.settle(Err(error));
        } else if self.disposing.is_some() {
            task.settle(Err(PoolError::Disposed));
        } else {
            self.counters.retried += 1;
            crate::log_task!(task.id, "retrying", attempt = task.attempts);
            self.queue.requeue_front(task);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let closing = self.workers.values().filter_map(WorkerUnit::close_deadline);
        let dispose = self.disposing.as_ref().map(|disposing| disposing.deadline);
        self.idle_deadline.into_iter().chain(closing).chain(dispose).min()
    }

    fn dispose_complete(&self) -> bool {
        self.disposing.is_some() && self.in_flight.is_empty() && self.workers.is_empty()
    }

    fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            pending_tasks: self.queue.pending_len(),
            in_flight_tasks: self.in_flight.len(),
            completed: self.counters.completed,
            failed: self.counters.failed,
            retried: self.counters.retried,
            spawned: self.counters.spawned,
            ..PoolStats::default()
        };
        for unit in self.workers.values() {
            match unit.state() {
                WorkerState::Starting => stats.starting_workers += 1,
                WorkerState::Idle => stats.idle_workers += 1,
                WorkerState::Busy => stats.busy_workers += 1,
                WorkerState::Closing => stats.closing_workers += 1,
                WorkerState::Disposed => {}
            }
            if unit.is_live() {
                stats.live_workers += 1;
            }
        }
        stats
    }

    /// Settles whatever is left and answers every dispose waiter.
    fn finish(&mut self) {
        for task in self.queue.drain_pending() {
            task.settle(Err(PoolError::Disposed));
        }
        for (_, InFlight { task, .. }) in self.in_flight.drain() {
            task.settle(Err(PoolError::Disposed));
        }
        for unit in self.workers.values_mut() {
            unit.terminate();
        }
        self.workers.clear();

        let Some(disposing) = self.disposing.take() else {
            return;
        };
        let result = PoolExitResult {
            force_exited: disposing.force_exited,
        };
        let _ = self.exit.set(result);
        tracing::info!(force_exited = result.force_exited, "pool disposed");
        for waiter in disposing.waiters {
            let _ = waiter.send(result);
        }
    }
}

fn spawn_monitor(
    worker_id: WorkerId,
    events: flume::Receiver<IsolateEvent>,
    commands: mpsc::UnboundedSender<Command>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv_async().await {
                Ok(IsolateEvent::Ready) => {
                    let _ = commands.send(Command::WorkerReady(worker_id));
                }
                Ok(IsolateEvent::Exited(exit)) => {
                    let _ = commands.send(Command::WorkerExited { worker_id, exit });
                    break;
                }
                Err(_) => {
                    let exit = WorkerExit {
                        code: -1,
                        reason: Some("event stream closed".to_string()),
                    };
                    let _ = commands.send(Command::WorkerExited { worker_id, exit });
                    break;
                }
            }
        }
    })
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

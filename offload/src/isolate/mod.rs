//! # Isolates
//!
//! An isolate is the execution context behind a worker unit. The default one
//! is an OS thread running its own single-threaded tokio runtime; tests and
//! embedders can supply their own through [`IsolateFactory`].

mod runtime;

use std::thread::JoinHandle;

use offload_api::WorkerId;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::protocol::{IsolateEvent, ToWorker};

pub use runtime::ThreadIsolateFactory;

/// Creates isolates for a pool.
pub trait IsolateFactory: Send + Sync + 'static {
    /// Whether isolates can be created at all on this host.
    fn is_available(&self) -> bool {
        true
    }

    /// Starts a new isolate. It must report `Ready` once it accepts tasks and
    /// `Exited` exactly once when it ends.
    fn spawn(&self, worker_id: WorkerId, config: &PoolConfig) -> Result<Isolate, PoolError>;
}

/// Handle to a running isolate.
#[derive(Debug)]
pub struct Isolate {
    control: Option<flume::Sender<ToWorker>>,
    events: Option<flume::Receiver<IsolateEvent>>,
    thread: Option<JoinHandle<()>>,
}

impl Isolate {
    pub fn new(
        control: flume::Sender<ToWorker>,
        events: flume::Receiver<IsolateEvent>,
        thread: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            control: Some(control),
            events: Some(events),
            thread,
        }
    }

    pub fn send(&self, message: ToWorker) -> Result<(), PoolError> {
        let control = self.control.as_ref().ok_or(PoolError::ChannelClosed)?;
        control.send(message).map_err(|_| PoolError::ChannelClosed)
    }

    /// The lifecycle event stream; can be taken once.
    pub fn take_events(&mut self) -> Option<flume::Receiver<IsolateEvent>> {
        self.events.take()
    }

    pub fn take_thread(&mut self) -> Option<JoinHandle<()>> {
        self.thread.take()
    }

    /// Drops the control channel. An isolate waiting for work sees the
    /// disconnect and ends.
    pub fn disconnect(&mut self) {
        self.control = None;
    }
}

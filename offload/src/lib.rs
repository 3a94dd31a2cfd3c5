// offload
//
// Runs expensive, callback-heavy tasks on a small fleet of isolated worker
// threads. Functions a caller puts in a task's context stay on the caller's
// side and are invoked remotely when the task body calls them.
//
// The vocabulary types live in `offload-api` and are re-exported here.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod isolate;
pub mod logging;
pub mod marshal;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod rpc;
pub mod worker;

mod task;

pub use config::{LogLevel, PoolConfig, PoolOptions};
pub use error::PoolError;
pub use isolate::{Isolate, IsolateFactory, ThreadIsolateFactory};
pub use pool::{Pool, PoolExitResult, PoolStats};
pub use registry::PoolRegistry;

pub use offload_api::*;

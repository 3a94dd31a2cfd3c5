//! # Offload API
//!
//! Vocabulary shared by the offload worker pool and the task bodies it runs.
//!
//! ## Design Principles
//!
//! - **Location transparency**: a [`Callable`] behaves the same whether it runs
//!   locally or forwards every call across the isolation boundary.
//! - **Data by value**: task data is plain JSON, copied into each worker unit.
//! - **Errors as data**: failures raised by user code travel as
//!   [`RemoteError`] values instead of tearing down the unit.
//!
//! ## Usage Example
//!
//! ```rust
//! use offload_api::{Callable, CallArg, TaskContext, serde_json::json};
//!
//! let context = TaskContext::new()
//!     .with_data("source", "let x = 1;")
//!     .unwrap()
//!     .with_callable(
//!         "emit_warning",
//!         Callable::from_fn(|args: Vec<CallArg>| {
//!             Ok(args.first().and_then(CallArg::as_value).cloned().unwrap_or_default())
//!         }),
//!     );
//!
//! assert_eq!(context.data().get("source"), Some(&json!("let x = 1;")));
//! assert!(context.callables().contains_key("emit_warning"));
//! ```
//!
//! ## Module Organization
//!
//! - [`callable`]: type-erased async functions and their arguments
//! - [`context`]: task contexts on both sides of the boundary
//! - [`executor`]: the task body trait
//! - [`errors`]: error types
//! - [`types`]: identifiers and aliases

pub mod callable;
pub mod context;
pub mod errors;
pub mod executor;
pub mod types;

pub use callable::{callable_arg, value_arg, CallArg, Callable};
pub use context::{IntoTaskContext, TaskContext, WorkerContext, RESOLVE};
pub use errors::{CallError, MarshalError, RemoteError};
pub use executor::{from_fn, FnExecutor, TaskExecutor, TaskOutput};
pub use types::{BoxedFuture, CallResult, DataMap, TaskId, TaskMeta, Value, WorkerId};

pub use offload_api_derive::IntoTaskContext;

pub use serde_json;

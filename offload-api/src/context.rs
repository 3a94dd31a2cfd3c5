//! # Task Contexts
//!
//! ## Key Concepts
//! - [`TaskContext`]: what a caller hands to the pool. Two fixed fields, plain
//!   `data` and `callables`, filled once at the API boundary.
//! - [`IntoTaskContext`]: conversion into a `TaskContext`, derivable with
//!   `#[derive(IntoTaskContext)]`.
//! - [`WorkerContext`]: what the task body sees inside the worker. The data is
//!   a private copy; the functions are stubs that call back into the
//!   coordinator.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::callable::{CallArg, Callable};
use crate::errors::{CallError, MarshalError, RemoteError};
use crate::types::{CallResult, DataMap, TaskId, TaskMeta, Value, WorkerId};

/// Name of the path resolver function by convention.
pub const RESOLVE: &str = "resolve";

/// A task's context split into clonable data and callables.
///
/// A key lives in exactly one of the two maps; inserting under an existing
/// key replaces the previous entry whichever map held it.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    data: DataMap,
    callables: BTreeMap<String, Callable>,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from a JSON object, with no callables.
    pub fn from_data(value: Value) -> Result<Self, MarshalError> {
        match value {
            Value::Object(data) => Ok(Self {
                data,
                callables: BTreeMap::new(),
            }),
            other => Err(MarshalError::NotAnObject(other.to_string())),
        }
    }

    /// Inserts a data entry, serializing `value`.
    pub fn insert_data<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), MarshalError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| MarshalError::Serialize {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.callables.remove(&key);
        self.data.insert(key, value);
        Ok(())
    }

    pub fn insert_callable(&mut self, key: impl Into<String>, callable: Callable) {
        let key = key.into();
        self.data.remove(&key);
        self.callables.insert(key, callable);
    }

    /// Builder form of [`TaskContext::insert_data`].
    pub fn with_data<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Result<Self, MarshalError> {
        self.insert_data(key, value)?;
        Ok(self)
    }

    /// Builder form of [`TaskContext::insert_callable`].
    pub fn with_callable(mut self, key: impl Into<String>, callable: Callable) -> Self {
        self.insert_callable(key, callable);
        self
    }

    pub fn data(&self) -> &DataMap {
        &self.data
    }

    pub fn callables(&self) -> &BTreeMap<String, Callable> {
        &self.callables
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.callables.is_empty()
    }

    /// Consumes the context, returning both halves.
    pub fn into_parts(self) -> (DataMap, BTreeMap<String, Callable>) {
        (self.data, self.callables)
    }
}

/// Conversion into a [`TaskContext`].
pub trait IntoTaskContext {
    fn into_task_context(self) -> Result<TaskContext, MarshalError>;
}

impl IntoTaskContext for TaskContext {
    fn into_task_context(self) -> Result<TaskContext, MarshalError> {
        Ok(self)
    }
}

impl IntoTaskContext for DataMap {
    fn into_task_context(self) -> Result<TaskContext, MarshalError> {
        TaskContext::from_data(Value::Object(self))
    }
}

impl IntoTaskContext for Value {
    fn into_task_context(self) -> Result<TaskContext, MarshalError> {
        TaskContext::from_data(self)
    }
}

/// The context a task body runs against inside a worker unit.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    meta: TaskMeta,
    data: DataMap,
    functions: BTreeMap<String, Callable>,
}

impl WorkerContext {
    pub fn new(meta: TaskMeta, data: DataMap, functions: BTreeMap<String, Callable>) -> Self {
        Self { meta, data, functions }
    }

    pub fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    pub fn task_id(&self) -> TaskId {
        self.meta.task_id
    }

    pub fn worker_id(&self) -> WorkerId {
        self.meta.worker_id
    }

    pub fn attempt(&self) -> u32 {
        self.meta.attempt
    }

    pub fn data(&self) -> &DataMap {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataMap {
        &mut self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Deserializes the data entry under `key`.
    pub fn value<T: DeserializeOwned>(&self, key: &str) -> Result<T, RemoteError> {
        let value = self
            .data
            .get(key)
            .cloned()
            .ok_or_else(|| RemoteError::new("KeyError", format!("missing context entry `{key}`")))?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn function(&self, key: &str) -> Option<&Callable> {
        self.functions.get(key)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Calls the function bound under `key`.
    pub async fn call(&self, key: &str, args: Vec<CallArg>) -> CallResult {
        let function = self
            .functions
            .get(key)
            .ok_or_else(|| CallError::UnknownFunction(key.to_string()))?;
        function.call(args).await
    }

    /// Calls a callback-style function: `args` followed by a completion
    /// callback taking `(error, result)`.
    ///
    /// The callee must invoke the callback before its own call resolves;
    /// the callback handle is released as soon as the call returns.
    pub async fn call_with_callback(&self, key: &str, mut args: Vec<CallArg>) -> CallResult {
        let (tx, rx) = oneshot::channel::<Result<Value, RemoteError>>();
        let slot = Arc::new(Mutex::new(Some(tx)));

        let callback = Callable::from_fn(move |callback_args| {
            let error = callback_args.first().and_then(CallArg::as_value).filter(|v| !v.is_null());
            let outcome = match error {
                Some(error) => Err(RemoteError::from_value(error)),
                None => Ok(callback_args
                    .get(1)
                    .and_then(CallArg::as_value)
                    .cloned()
                    .unwrap_or(Value::Null)),
            };
            if let Some(tx) = slot.lock().ok().and_then(|mut slot| slot.take()) {
                let _ = tx.send(outcome);
            }
            Ok(Value::Null)
        });

        args.push(CallArg::Callable(callback));
        self.call(key, args).await?;

        match rx.await {
            Ok(outcome) => outcome.map_err(CallError::Remote),
            Err(_) => Err(CallError::InvalidArguments(format!(
                "`{key}` returned without invoking its callback"
            ))),
        }
    }

    /// Resolves `request` relative to `context` through the coordinator's
    /// resolver, following the `(context, request, callback)` convention.
    pub async fn resolve(&self, context: &str, request: &str) -> CallResult {
        self.call_with_callback(
            RESOLVE,
            vec![CallArg::value(context), CallArg::value(request)],
        )
        .await
    }
}

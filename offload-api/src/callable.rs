//! # Callables
//!
//! A [`Callable`] is a cheaply clonable, type-erased async function. The
//! coordinator wraps its own functions in callables; the worker side receives
//! callables of the same type whose body forwards every call over a channel.
//! Code using a callable cannot tell the two apart, which is what keeps the
//! remote functions location transparent.
//!
//! Arguments are [`CallArg`]s: plain data, or another callable. A callable
//! argument is proxied again when it crosses the boundary, at any depth.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;

use crate::errors::{CallError, RemoteError};
use crate::types::{BoxedFuture, CallResult, Value};

type CallFn = dyn Fn(Vec<CallArg>) -> BoxedFuture<'static, CallResult> + Send + Sync;

/// A clonable async function that may live on either side of the boundary.
#[derive(Clone)]
pub struct Callable {
    inner: Arc<CallFn>,
    remote: bool,
}

impl Callable {
    /// Wraps an async function.
    ///
    /// Errors returned by `f` reach the caller as [`CallError::Remote`].
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<CallArg>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RemoteError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |args: Vec<CallArg>| f(args).map(|result| result.map_err(CallError::Remote)).boxed()),
            remote: false,
        }
    }

    /// Wraps a synchronous function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Vec<CallArg>) -> Result<Value, RemoteError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |args| {
            let f = Arc::clone(&f);
            async move { f(args) }
        })
    }

    /// Wraps a function that forwards to another side of the boundary.
    ///
    /// Unlike [`Callable::new`] the function reports [`CallError`]s as-is, so
    /// transport failures such as [`CallError::ChannelClosed`] stay visible.
    pub fn forwarding<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<CallArg>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |args: Vec<CallArg>| f(args).boxed()),
            remote: true,
        }
    }

    /// Invokes the function.
    pub fn call(&self, args: Vec<CallArg>) -> BoxedFuture<'static, CallResult> {
        (self.inner)(args)
    }

    /// Whether calls leave the current side of the boundary.
    pub fn is_remote(&self) -> bool {
        self.remote
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// One argument of a [`Callable`] invocation.
#[derive(Debug, Clone)]
pub enum CallArg {
    Value(Value),
    Callable(Callable),
}

impl CallArg {
    pub fn value(value: impl Into<Value>) -> Self {
        CallArg::Value(value.into())
    }

    pub fn callable(callable: Callable) -> Self {
        CallArg::Callable(callable)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            CallArg::Value(value) => Some(value),
            CallArg::Callable(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            CallArg::Callable(callable) => Some(callable),
            CallArg::Value(_) => None,
        }
    }
}

impl From<Value> for CallArg {
    fn from(value: Value) -> Self {
        CallArg::Value(value)
    }
}

impl From<Callable> for CallArg {
    fn from(callable: Callable) -> Self {
        CallArg::Callable(callable)
    }
}

/// Fetches the value argument at `index` or reports which one is missing.
pub fn value_arg(args: &[CallArg], index: usize) -> Result<&Value, RemoteError> {
    args.get(index)
        .and_then(CallArg::as_value)
        .ok_or_else(|| RemoteError::new("TypeError", format!("argument {index} must be a value")))
}

/// Fetches the callable argument at `index` or reports which one is missing.
pub fn callable_arg(args: &[CallArg], index: usize) -> Result<&Callable, RemoteError> {
    args.get(index)
        .and_then(CallArg::as_callable)
        .ok_or_else(|| RemoteError::new("TypeError", format!("argument {index} must be a function")))
}

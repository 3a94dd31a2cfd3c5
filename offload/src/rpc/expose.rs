use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use offload_api::{CallArg, CallError, CallResult, Callable, RemoteError};
use tokio::task::{JoinHandle, JoinSet};

use super::{CallRequest, Inbox, Request, RemoteObject, WireArg, APPLY};
use crate::error::panic_message;

/// Something whose methods can be invoked through a proxy channel.
#[async_trait]
pub trait Exposed: Send + Sync + 'static {
    async fn invoke(&self, method: &str, args: Vec<CallArg>) -> CallResult;
}

#[async_trait]
impl Exposed for Callable {
    async fn invoke(&self, method: &str, args: Vec<CallArg>) -> CallResult {
        if method != APPLY {
            return Err(CallError::UnknownFunction(method.to_string()));
        }
        self.call(args).await
    }
}

/// Named callables exposed together behind one channel.
#[derive(Debug, Clone, Default)]
pub struct CallableSet {
    functions: BTreeMap<String, Callable>,
}

impl CallableSet {
    pub fn new(functions: BTreeMap<String, Callable>) -> Self {
        Self { functions }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[async_trait]
impl Exposed for CallableSet {
    async fn invoke(&self, method: &str, args: Vec<CallArg>) -> CallResult {
        match self.functions.get(method) {
            Some(function) => function.call(args).await,
            None => Err(CallError::UnknownFunction(method.to_string())),
        }
    }
}

/// A running serve loop. Dropping it stops serving and fails calls still in
/// progress with `ChannelClosed`.
#[derive(Debug)]
pub struct Exposure {
    handle: JoinHandle<()>,
}

impl Drop for Exposure {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serves `target` from `inbox` on the current tokio runtime.
pub fn expose<T: Exposed>(target: T, inbox: Inbox) -> Exposure {
    let target: Arc<dyn Exposed> = Arc::new(target);
    let handle = tokio::spawn(serve(target, inbox));
    Exposure { handle }
}

async fn serve(target: Arc<dyn Exposed>, inbox: Inbox) {
    // Calls run concurrently; dropping the set on exit aborts the ones left.
    let mut calls = JoinSet::new();
    loop {
        tokio::select! {
            request = inbox.rx.recv_async() => match request {
                Ok(Request::Call(call)) => {
                    calls.spawn(handle_call(Arc::clone(&target), call));
                }
                Ok(Request::Release) | Err(_) => break,
            },
            Some(_) = calls.join_next(), if !calls.is_empty() => {}
        }
    }
}

async fn handle_call(target: Arc<dyn Exposed>, call: CallRequest) {
    let CallRequest { method, args, reply } = call;
    let args = args.into_iter().map(into_call_arg).collect();

    let result = match AssertUnwindSafe(target.invoke(&method, args)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(CallError::Remote(RemoteError::new(
            "Panic",
            panic_message(panic.as_ref()),
        ))),
    };

    if reply.send(result).is_err() {
        tracing::debug!(method = %method, "caller went away before the reply");
    }
}

fn into_call_arg(arg: WireArg) -> CallArg {
    match arg {
        WireArg::Value(value) => CallArg::Value(value),
        WireArg::Function(endpoint) => {
            let remote = RemoteObject::new(endpoint);
            CallArg::Callable(Callable::forwarding(move |args| {
                let remote = remote.clone();
                async move { remote.call(APPLY, args).await }
            }))
        }
    }
}

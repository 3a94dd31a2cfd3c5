use offload_api::{CallArg, CallError, CallResult, Callable};
use tokio::sync::oneshot;

use super::{channel, expose, CallRequest, Endpoint, Request, WireArg};

/// Calling side of a proxy channel.
///
/// Clones share the channel. A detached object has no channel at all and
/// fails every call with `ChannelClosed`.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    endpoint: Option<Endpoint>,
}

impl RemoteObject {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint: Some(endpoint),
        }
    }

    pub fn detached() -> Self {
        Self { endpoint: None }
    }

    /// Invokes `method` on the exposed target.
    ///
    /// Callable arguments are exposed on private channels for the duration of
    /// this call only.
    pub async fn call(&self, method: &str, args: Vec<CallArg>) -> CallResult {
        let endpoint = self.endpoint.as_ref().ok_or(CallError::ChannelClosed)?;

        let mut exposures = Vec::new();
        let mut wire = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                CallArg::Value(value) => wire.push(WireArg::Value(value)),
                CallArg::Callable(callable) => {
                    let (function, inbox) = channel();
                    exposures.push(expose(callable, inbox));
                    wire.push(WireArg::Function(function));
                }
            }
        }

        let (reply, response) = oneshot::channel();
        endpoint.send(Request::Call(CallRequest {
            method: method.to_string(),
            args: wire,
            reply,
        }))?;

        let result = response.await.unwrap_or(Err(CallError::ChannelClosed));
        drop(exposures);
        result
    }

    /// A callable that forwards to `method`.
    pub fn function(&self, method: impl Into<String>) -> Callable {
        let remote = self.clone();
        let method = method.into();
        Callable::forwarding(move |args| {
            let remote = remote.clone();
            let method = method.clone();
            async move { remote.call(&method, args).await }
        })
    }

    /// Stops the exposed side; every clone fails with `ChannelClosed` afterwards.
    pub fn release(&self) {
        if let Some(endpoint) = &self.endpoint {
            endpoint.release();
        }
    }

    pub fn is_detached(&self) -> bool {
        self.endpoint.is_none()
    }
}

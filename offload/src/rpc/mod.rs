//! # Remote Function Proxy
//!
//! Makes functions owned by one side of the isolation boundary callable from
//! the other side.
//!
//! ## Key Concepts
//! - [`channel`]: a private request channel, one [`Endpoint`] (clonable,
//!   travels to the caller) and one [`Inbox`] (stays with the owner).
//! - [`expose`]: serves every method of an [`Exposed`] target from an inbox
//!   until the returned [`Exposure`] is released.
//! - [`RemoteObject`]: the calling side. Turns `(method, args)` into a
//!   request and awaits the reply.
//!
//! Callables passed as arguments are proxied again: each gets a fresh
//! channel that lives exactly as long as the call that carries it.

mod expose;
mod remote;

use offload_api::{CallError, CallResult, Value};
use tokio::sync::oneshot;

pub use expose::{expose, CallableSet, Exposed, Exposure};
pub use remote::RemoteObject;

/// Method name under which a single exposed [`Callable`](offload_api::Callable) is invoked.
pub const APPLY: &str = "apply";

/// An argument as it travels across the boundary.
#[derive(Debug)]
pub enum WireArg {
    Value(Value),
    /// A callable left behind on the sending side, reachable through this endpoint.
    Function(Endpoint),
}

#[derive(Debug)]
pub struct CallRequest {
    pub method: String,
    pub args: Vec<WireArg>,
    pub reply: oneshot::Sender<CallResult>,
}

#[derive(Debug)]
pub enum Request {
    Call(CallRequest),
    /// Stops the serving side; later calls fail with `ChannelClosed`.
    Release,
}

/// Sending half of a proxy channel.
#[derive(Debug, Clone)]
pub struct Endpoint {
    tx: flume::Sender<Request>,
}

impl Endpoint {
    pub(crate) fn send(&self, request: Request) -> Result<(), CallError> {
        self.tx.send(request).map_err(|_| CallError::ChannelClosed)
    }

    /// Asks the serving side to stop.
    pub fn release(&self) {
        let _ = self.tx.send(Request::Release);
    }
}

/// Receiving half of a proxy channel.
#[derive(Debug)]
pub struct Inbox {
    rx: flume::Receiver<Request>,
}

/// Creates a private proxy channel.
pub fn channel() -> (Endpoint, Inbox) {
    let (tx, rx) = flume::unbounded();
    (Endpoint { tx }, Inbox { rx })
}

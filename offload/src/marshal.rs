//! Splits a [`TaskContext`] into what can be copied across the boundary and
//! what has to stay behind and be called remotely.

use offload_api::{DataMap, TaskContext, TaskMeta, WorkerContext};
use serde::{Deserialize, Serialize};

use crate::rpc::{self, CallableSet, Exposure, RemoteObject};

/// The copyable half of a task's context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPayload {
    pub entries: DataMap,
    /// Keys whose values are functions left on the coordinator.
    pub proxy_fn_keys: Vec<String>,
}

/// A marshalled context, ready to be queued.
#[derive(Debug)]
pub struct Marshalled {
    pub payload: DataPayload,
    pub callables: RemoteObject,
    /// Keeps the callables served; `None` when there are none.
    pub exposure: Option<Exposure>,
}

/// Copies data entries into the payload and exposes the callables behind
/// a single [`RemoteObject`].
///
/// Must run inside a tokio runtime when the context has callables.
pub fn marshal(context: TaskContext) -> Marshalled {
    let (entries, callables) = context.into_parts();
    let proxy_fn_keys = callables.keys().cloned().collect::<Vec<_>>();
    let payload = DataPayload {
        entries,
        proxy_fn_keys,
    };

    if callables.is_empty() {
        return Marshalled {
            payload,
            callables: RemoteObject::detached(),
            exposure: None,
        };
    }

    let (endpoint, inbox) = rpc::channel();
    let exposure = rpc::expose(CallableSet::new(callables), inbox);
    Marshalled {
        payload,
        callables: RemoteObject::new(endpoint),
        exposure: Some(exposure),
    }
}

/// Rebuilds the context on the worker side, binding every proxied key to a
/// stub that calls back through `callables`.
pub fn unmarshal(meta: TaskMeta, payload: DataPayload, callables: &RemoteObject) -> WorkerContext {
    let functions = payload
        .proxy_fn_keys
        .iter()
        .map(|key| (key.clone(), callables.function(key.clone())))
        .collect();
    WorkerContext::new(meta, payload.entries, functions)
}

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use offload_api::serde_json::json;
use offload_api::{
    CallArg, CallError, Callable, IntoTaskContext, MarshalError, RemoteError, TaskContext, TaskId, TaskMeta,
    WorkerContext, WorkerId, RESOLVE,
};

fn meta() -> TaskMeta {
    TaskMeta {
        task_id: TaskId(7),
        worker_id: WorkerId(1),
        attempt: 0,
    }
}

fn worker_context(functions: BTreeMap<String, Callable>) -> WorkerContext {
    let data = json!({ "name": "main.js", "size": 3 });
    let data = data.as_object().cloned().unwrap_or_default();
    WorkerContext::new(meta(), data, functions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_context_keys_are_exclusive() {
        let mut context = TaskContext::new()
            .with_data("emit", 1)
            .unwrap()
            .with_callable("emit", Callable::from_fn(|_| Ok(json!(null))));
        assert!(context.data().get("emit").is_none());
        assert!(context.callables().contains_key("emit"));

        context.insert_data("emit", "again").unwrap();
        assert_eq!(context.data().get("emit"), Some(&json!("again")));
        assert!(!context.callables().contains_key("emit"));
    }

    #[test]
    fn test_task_context_from_data() {
        let context = TaskContext::from_data(json!({ "a": 1 })).unwrap();
        assert_eq!(context.data().len(), 1);
        assert!(context.callables().is_empty());

        let error = TaskContext::from_data(json!([1, 2])).unwrap_err();
        assert!(matches!(error, MarshalError::NotAnObject(_)));

        assert!(TaskContext::new().is_empty());
    }

    #[test]
    fn test_insert_data_reports_key_on_failure() {
        // Maps with non-string keys cannot become JSON objects
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);

        let error = TaskContext::new().with_data("lookup", bad).unwrap_err();
        match error {
            MarshalError::Serialize { key, .. } => assert_eq!(key, "lookup"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_value_conversions() {
        let context = json!({ "x": true }).into_task_context().unwrap();
        assert_eq!(context.data().get("x"), Some(&json!(true)));
        assert!(json!("scalar").into_task_context().is_err());
    }

    #[tokio::test]
    async fn test_worker_context_accessors() {
        let context = worker_context(BTreeMap::new());
        assert_eq!(context.task_id(), TaskId(7));
        assert_eq!(context.worker_id(), WorkerId(1));
        assert_eq!(context.attempt(), 0);
        assert_eq!(context.value::<String>("name").unwrap(), "main.js");
        assert_eq!(context.value::<u32>("size").unwrap(), 3);

        let missing = context.value::<u32>("absent").unwrap_err();
        assert_eq!(missing.name, "KeyError");

        let wrong_type = context.value::<u32>("name").unwrap_err();
        assert_eq!(wrong_type.name, "SerializationError");
    }

    #[tokio::test]
    async fn test_worker_context_call() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let mut functions = BTreeMap::new();
        functions.insert(
            "count".to_string(),
            Callable::from_fn(move |_| Ok(json!(seen.fetch_add(1, Ordering::SeqCst) + 1))),
        );
        functions.insert(
            "fail".to_string(),
            Callable::from_fn(|_| Err(RemoteError::msg("nope"))),
        );
        let context = worker_context(functions);

        assert_eq!(context.call("count", vec![]).await.unwrap(), json!(1));
        assert_eq!(context.call("count", vec![]).await.unwrap(), json!(2));
        assert_eq!(
            context.call("fail", vec![]).await.unwrap_err(),
            CallError::Remote(RemoteError::msg("nope"))
        );
        assert_eq!(
            context.call("missing", vec![]).await.unwrap_err(),
            CallError::UnknownFunction("missing".to_string())
        );
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resolve_uses_callback_convention() {
        let resolver = Callable::new(|args: Vec<CallArg>| async move {
            let base = offload_api::value_arg(&args, 0)?.as_str().unwrap_or_default().to_string();
            let request = offload_api::value_arg(&args, 1)?.as_str().unwrap_or_default().to_string();
            let callback = offload_api::callable_arg(&args, 2)?.clone();
            if request.starts_with("./missing") {
                callback
                    .call(vec![CallArg::value(RemoteError::new("ResolveError", "not found").to_value())])
                    .await?;
            } else {
                callback
                    .call(vec![CallArg::value(json!(null)), CallArg::value(format!("{base}/{request}"))])
                    .await?;
            }
            Ok::<_, RemoteError>(json!(null))
        });
        let mut functions = BTreeMap::new();
        functions.insert(RESOLVE.to_string(), resolver);
        let context = worker_context(functions);

        let resolved = context.resolve("/src", "lib.js").await.unwrap();
        assert_eq!(resolved, json!("/src/lib.js"));

        let error = context.resolve("/src", "./missing").await.unwrap_err();
        match error {
            CallError::Remote(remote) => assert_eq!(remote.name, "ResolveError"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_callback_must_be_invoked() {
        let mut functions = BTreeMap::new();
        functions.insert("lazy".to_string(), Callable::from_fn(|_| Ok(json!(null))));
        let context = worker_context(functions);

        let error = context.call_with_callback("lazy", vec![]).await.unwrap_err();
        assert!(matches!(error, CallError::InvalidArguments(_)));
    }
}

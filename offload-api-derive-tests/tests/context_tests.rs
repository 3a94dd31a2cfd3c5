use offload_api::serde_json::json;
use offload_api::{CallArg, Callable, IntoTaskContext, MarshalError, RemoteError};
use serde::Serialize;
use std::collections::HashMap;

// Plain data fields only
#[derive(IntoTaskContext)]
struct BasicContext {
    resource: String,
    minimize: bool,
}

// Data, callables, renames and skipped fields together
#[derive(IntoTaskContext)]
struct LoaderContext {
    #[context(rename = "resourcePath")]
    resource_path: String,
    options: Options,
    #[context(callable)]
    emit_warning: Callable,
    #[context(callable, rename = "resolve")]
    resolver: Callable,
    #[context(skip)]
    #[allow(dead_code)]
    local_cache: Vec<u8>,
}

#[derive(Serialize)]
struct Options {
    level: u8,
    tags: Vec<String>,
}

// Generic data field
#[derive(IntoTaskContext)]
struct Wrapped<T>
where
    T: Serialize,
{
    inner: T,
}

// A field that cannot be represented as JSON
#[derive(IntoTaskContext)]
struct Unserializable {
    table: HashMap<(u8, u8), u8>,
}

fn echo() -> Callable {
    Callable::from_fn(|args: Vec<CallArg>| {
        Ok(args.first().and_then(CallArg::as_value).cloned().unwrap_or_default())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_context() {
        let context = BasicContext {
            resource: "main.js".to_string(),
            minimize: true,
        }
        .into_task_context()
        .unwrap();

        assert_eq!(context.data().get("resource"), Some(&json!("main.js")));
        assert_eq!(context.data().get("minimize"), Some(&json!(true)));
        assert!(context.callables().is_empty());
    }

    #[test]
    fn test_callables_renames_and_skips() {
        let context = LoaderContext {
            resource_path: "/src/app.js".to_string(),
            options: Options {
                level: 2,
                tags: vec!["a".to_string()],
            },
            emit_warning: echo(),
            resolver: echo(),
            local_cache: vec![1, 2, 3],
        }
        .into_task_context()
        .unwrap();

        assert_eq!(context.data().get("resourcePath"), Some(&json!("/src/app.js")));
        assert_eq!(context.data().get("options"), Some(&json!({ "level": 2, "tags": ["a"] })));
        assert!(context.data().get("local_cache").is_none());
        assert!(context.data().get("resource_path").is_none());

        assert_eq!(context.callables().len(), 2);
        assert!(context.callables().contains_key("emit_warning"));
        assert!(context.callables().contains_key("resolve"));
        assert!(!context.callables().contains_key("resolver"));
    }

    #[tokio::test]
    async fn test_derived_callables_are_invocable() {
        let context = LoaderContext {
            resource_path: String::new(),
            options: Options { level: 0, tags: vec![] },
            emit_warning: echo(),
            resolver: Callable::from_fn(|_| Err(RemoteError::msg("unresolved"))),
            local_cache: vec![],
        }
        .into_task_context()
        .unwrap();

        let emit = context.callables().get("emit_warning").cloned().unwrap();
        assert_eq!(emit.call(vec![CallArg::value("careful")]).await.unwrap(), json!("careful"));

        let resolve = context.callables().get("resolve").cloned().unwrap();
        assert!(resolve.call(vec![]).await.is_err());
    }

    #[test]
    fn test_generic_context() {
        let context = Wrapped { inner: vec![1, 2, 3] }.into_task_context().unwrap();
        assert_eq!(context.data().get("inner"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn test_serialization_failure_names_field() {
        let mut table = HashMap::new();
        table.insert((1, 2), 3);

        let error = Unserializable { table }.into_task_context().unwrap_err();
        assert!(matches!(error, MarshalError::Serialize { ref key, .. } if key == "table"));
    }
}

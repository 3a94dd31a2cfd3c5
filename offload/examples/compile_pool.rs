//! Compiles a handful of fake modules on a shared pool.
//!
//! Each task gets the module source plus two functions that stay on the main
//! thread: `emitWarning` collects warnings, `resolve` maps import requests to
//! paths. The task reports the paths it resolved as file dependencies.
//!
//! Run with `cargo run --example compile_pool -- verbose` for debug logs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use offload::{logging, LogLevel, PoolConfig, PoolOptions, PoolRegistry};
use offload_api::serde_json::json;
use offload_api::{
    callable_arg, value_arg, CallArg, Callable, IntoTaskContext, RemoteError, TaskExecutor, TaskOutput,
    WorkerContext,
};

#[derive(IntoTaskContext)]
struct CompileContext {
    #[context(rename = "resourcePath")]
    resource_path: String,
    source: String,
    #[context(callable, rename = "emitWarning")]
    emit_warning: Callable,
    #[context(callable)]
    resolve: Callable,
}

struct Compiler;

#[async_trait]
impl TaskExecutor for Compiler {
    async fn execute(&self, context: WorkerContext) -> Result<offload_api::Value, RemoteError> {
        let resource: String = context.value("resourcePath")?;
        let source: String = context.value("source")?;
        let base = resource.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(".");

        let mut output = Vec::new();
        let mut dependencies = Vec::new();
        for line in source.lines() {
            match line.strip_prefix("import ") {
                Some(request) => {
                    let resolved = context.resolve(base, request.trim()).await?;
                    let path = resolved.as_str().unwrap_or_default().to_string();
                    output.push(format!("require({path:?});"));
                    dependencies.push(path);
                }
                None if line.contains("var ") => {
                    context
                        .call("emitWarning", vec![CallArg::value(format!("{resource}: prefer let over var"))])
                        .await?;
                    output.push(line.replace("var ", "let "));
                }
                None => output.push(line.to_string()),
            }
        }

        let mut result = TaskOutput::new(vec![json!(output.join("\n"))]);
        for path in dependencies {
            result = result.with_file_dependency(path);
        }
        result.into_value()
    }
}

fn resolver() -> Callable {
    Callable::new(|args: Vec<CallArg>| async move {
        let base = value_arg(&args, 0)?.as_str().unwrap_or(".").to_string();
        let request = value_arg(&args, 1)?.as_str().unwrap_or_default().to_string();
        let callback = callable_arg(&args, 2)?.clone();

        let resolved = format!("{base}/{}.js", request.trim_start_matches("./"));
        callback.call(vec![CallArg::value(json!(null)), CallArg::value(resolved)]).await?;
        Ok::<_, RemoteError>(json!(null))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let level = match std::env::args().nth(1) {
        Some(level) => level.parse::<LogLevel>()?,
        None => LogLevel::Info,
    };
    logging::init_for_level(level);

    let defaults = PoolConfig {
        idle_timeout: Duration::from_millis(500),
        log_level: level,
        ..PoolConfig::default()
    };
    let registry = PoolRegistry::new(defaults, Arc::new(Compiler));
    let pool = registry
        .get_or_create("compile", &PoolOptions::default().with_max_workers(2))
        .await?;

    let warnings = Arc::new(Mutex::new(Vec::new()));
    let modules = [
        ("/src/main.js", "import ./app\nvar started = true;"),
        ("/src/app.js", "import ./view\nimport ./store\nexport default 1;"),
        ("/src/view.js", "var html = '';"),
    ];

    let tasks = modules.iter().map(|(path, source)| {
        let sink = Arc::clone(&warnings);
        let context = CompileContext {
            resource_path: path.to_string(),
            source: source.to_string(),
            emit_warning: Callable::from_fn(move |args: Vec<CallArg>| {
                let message = value_arg(&args, 0)?.as_str().unwrap_or_default().to_string();
                sink.lock().map_err(|_| RemoteError::msg("warning sink poisoned"))?.push(message);
                Ok(json!(null))
            }),
            resolve: resolver(),
        };
        pool.run_task_as::<TaskOutput>(context)
    });

    for ((path, _), output) in modules.iter().zip(futures::future::join_all(tasks).await) {
        let output = output?;
        println!("== {path} (depends on {:?})", output.file_dependencies);
        for chunk in &output.result {
            println!("{}", chunk.as_str().unwrap_or_default());
        }
    }

    if let Ok(warnings) = warnings.lock() {
        for warning in warnings.iter() {
            println!("warning: {warning}");
        }
    }

    let stats = pool.stats().await;
    println!("completed {} tasks on {} workers", stats.completed, stats.spawned);

    let exit = registry.dispose_all().await;
    println!("pools disposed (forced: {})", exit.force_exited);
    Ok(())
}

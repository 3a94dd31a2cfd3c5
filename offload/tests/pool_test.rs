
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use offload::protocol::{IsolateEvent, WorkerExit};
use offload::{Isolate, IsolateFactory, Pool, PoolConfig, PoolError};
use offload_api::serde_json::json;
use offload_api::{
    callable_arg, value_arg, CallArg, Callable, RemoteError, TaskContext, TaskOutput, WorkerId,
};
use test_helpers::{scripted_pool, test_config, wait_for};

fn input(value: impl serde::Serialize) -> TaskContext {
    TaskContext::new().with_data("input", value).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_five_tasks_on_four_workers_take_two_rounds() -> anyhow::Result<()> {
    let (pool, tracker) = scripted_pool(test_config(4))?;

    let started = Instant::now();
    let tasks = (0..5).map(|n| {
        let context = input(n).with_data("delay_ms", 50).unwrap();
        pool.run_task(context)
    });
    let results = join_all(tasks).await;
    let elapsed = started.elapsed();

    for (n, result) in results.into_iter().enumerate() {
        assert_eq!(result?, json!(n));
    }
    assert!(elapsed >= Duration::from_millis(100), "finished in {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    assert!(tracker.peak() <= 4);

    let stats = pool.stats().await;
    assert_eq!(stats.completed, 5);
    assert!(stats.spawned <= 4);
    assert_eq!(stats.in_flight_tasks, 0);

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_max_workers() -> anyhow::Result<()> {
    let (pool, tracker) = scripted_pool(test_config(2))?;

    let tasks = (0..8).map(|n| pool.run_task(input(n).with_data("delay_ms", 30).unwrap()));
    let results = join_all(tasks).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(tracker.started(), 8);
    assert!(tracker.peak() <= 2, "peak was {}", tracker.peak());
    assert!(pool.stats().await.spawned <= 2);

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_echo_returns_submitted_value() -> anyhow::Result<()> {
    let (pool, _) = scripted_pool(test_config(1))?;

    let value = json!({ "nested": [1, "two", { "three": 3.5 }], "flag": null });
    assert_eq!(pool.run_task(input(value.clone())).await?, value);

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_task_does_not_affect_its_neighbour() -> anyhow::Result<()> {
    let (pool, _) = scripted_pool(test_config(2))?;

    let failing = TaskContext::new().with_data("fail", "error")?;
    let passing = input("fine").with_data("delay_ms", 20)?;
    let (failed, passed) = tokio::join!(pool.run_task(failing), pool.run_task(passing));

    match failed {
        Err(PoolError::Task(error)) => assert_eq!(error.message, "error"),
        other => panic!("expected task error, got {other:?}"),
    }
    assert_eq!(passed?, json!("fine"));

    // The unit that rejected is still usable
    assert_eq!(pool.run_task(input(1)).await?, json!(1));
    let stats = pool.stats().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retried, 0);

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hanging_task_times_out_and_pool_recovers() -> anyhow::Result<()> {
    let config = PoolConfig {
        task_timeout: Duration::from_millis(150),
        max_retries: 1,
        ..test_config(1)
    };
    let (pool, _) = scripted_pool(config)?;

    let error = pool
        .run_task(TaskContext::new().with_data("hang", true)?)
        .await
        .unwrap_err();
    assert!(error.is_timeout(), "unexpected error {error:?}");
    match error {
        PoolError::Timeout { attempts, after, .. } => {
            assert_eq!(attempts, 2);
            assert_eq!(after, Duration::from_millis(150));
        }
        other => panic!("unexpected error {other:?}"),
    }

    assert_eq!(pool.run_task(input("after")).await?, json!("after"));
    let stats = pool.stats().await;
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.spawned, 3);

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_teardown_then_lazy_respawn() -> anyhow::Result<()> {
    let config = PoolConfig {
        idle_timeout: Duration::from_millis(100),
        ..test_config(2)
    };
    let (pool, _) = scripted_pool(config)?;

    assert_eq!(pool.run_task(input("first")).await?, json!("first"));
    assert_eq!(pool.stats().await.spawned, 1);

    wait_for(500).await;
    let stats = pool.stats().await;
    assert_eq!(stats.live_workers, 0);
    assert_eq!(stats.closing_workers, 0);

    assert_eq!(pool.run_task(input("second")).await?, json!("second"));
    assert_eq!(pool.stats().await.spawned, 2);

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_crashed_unit_is_replaced_and_task_retried() -> anyhow::Result<()> {
    let (pool, _) = scripted_pool(test_config(1))?;

    let context = input("survived").with_data("panic_on_attempt", 0)?;
    assert_eq!(pool.run_task(context).await?, json!("survived"));

    let stats = pool.stats().await;
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.spawned, 2);

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_crash_without_retries_is_reported() -> anyhow::Result<()> {
    let config = PoolConfig {
        max_retries: 0,
        ..test_config(1)
    };
    let (pool, _) = scripted_pool(config)?;

    let error = pool
        .run_task(TaskContext::new().with_data("panic_on_attempt", 0)?)
        .await
        .unwrap_err();
    assert!(error.is_transport());
    assert!(matches!(error, PoolError::WorkerCrashed { attempts: 1, .. }));

    assert_eq!(pool.run_task(input(5)).await?, json!(5));
    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_context_functions_run_on_the_caller_side() -> anyhow::Result<()> {
    let (pool, _) = scripted_pool(test_config(2))?;

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let double = Callable::from_fn(move |args: Vec<CallArg>| {
        seen.fetch_add(1, Ordering::SeqCst);
        let n = value_arg(&args, 0)?.as_i64().unwrap_or_default();
        Ok(json!(n * 2))
    });

    let context = input(21).with_data("call", "double")?.with_callable("double", double);
    assert_eq!(pool.run_task(context).await?, json!(42));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Errors raised by a context function reach the task body as data
    let failing = Callable::from_fn(|_| Err(RemoteError::new("EmitError", "rejected")));
    let context = input(1).with_data("call", "emit")?.with_callable("emit", failing);
    match pool.run_task(context).await {
        Err(PoolError::Task(error)) => assert_eq!(error.name, "EmitError"),
        other => panic!("unexpected result {other:?}"),
    }

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resolver_callback_crosses_the_boundary() -> anyhow::Result<()> {
    let (pool, _) = scripted_pool(test_config(1))?;

    let resolver = Callable::new(|args: Vec<CallArg>| async move {
        let base = value_arg(&args, 0)?.as_str().unwrap_or_default().to_string();
        let request = value_arg(&args, 1)?.as_str().unwrap_or_default().to_string();
        let callback = callable_arg(&args, 2)?.clone();
        let resolved = format!("{base}/{}", request.trim_start_matches("./"));
        callback.call(vec![CallArg::value(json!(null)), CallArg::value(resolved)]).await?;
        Ok::<_, RemoteError>(json!(null))
    });

    let context = TaskContext::new()
        .with_data("resolve_request", "./lib/util.js")?
        .with_callable("resolve", resolver);
    assert_eq!(pool.run_task(context).await?, json!("/project/lib/util.js"));

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_structured_output() -> anyhow::Result<()> {
    let (pool, _) = scripted_pool(test_config(1))?;

    let output: TaskOutput = pool
        .run_task_as(input("code").with_data("emit_output", true)?)
        .await?;
    assert_eq!(output.result, vec![json!("code")]);
    assert_eq!(output.file_dependencies, vec!["/project/input.js".to_string()]);
    assert!(output.context_dependencies.is_empty());

    let error = pool.run_task_as::<TaskOutput>(input(3)).await.unwrap_err();
    assert!(matches!(error, PoolError::Decode(_)));

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispose_lets_running_finish_and_fails_pending() -> anyhow::Result<()> {
    let (pool, _) = scripted_pool(test_config(1))?;
    let pool = Arc::new(pool);

    let running = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run_task(input("done").with_data("delay_ms", 200).unwrap()).await }
    });
    wait_for(50).await;
    let pending = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run_task(input("never")).await }
    });
    wait_for(50).await;

    let exit = pool.dispose().await;
    assert!(!exit.force_exited);
    assert_eq!(running.await??, json!("done"));
    assert_eq!(pending.await?, Err(PoolError::Disposed));

    assert!(pool.is_disposed());
    assert_eq!(pool.run_task(input(1)).await, Err(PoolError::Disposed));
    assert_eq!(pool.dispose().await, exit);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispose_forces_stuck_units() -> anyhow::Result<()> {
    let config = PoolConfig {
        shutdown_grace: Duration::from_millis(100),
        ..test_config(1)
    };
    let (pool, _) = scripted_pool(config)?;
    let pool = Arc::new(pool);

    let stuck = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run_task(TaskContext::new().with_data("hang", true).unwrap()).await }
    });
    wait_for(100).await;

    let exit = pool.dispose().await;
    assert!(exit.force_exited);
    assert_eq!(stuck.await?, Err(PoolError::Disposed));
    Ok(())
}

#[test]
fn test_pool_requires_a_runtime() {
    let tracker = Arc::new(test_helpers::Tracker::default());
    let result = Pool::new(test_config(1), test_helpers::scripted_executor(tracker));
    assert!(matches!(result, Err(PoolError::Configuration(_))));
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let tracker = Arc::new(test_helpers::Tracker::default());
    let result = Pool::new(test_config(0), test_helpers::scripted_executor(tracker));
    assert!(matches!(result, Err(PoolError::Configuration(_))));

    let result = Pool::with_factory(test_config(1), Arc::new(UnavailableFactory));
    match result {
        Err(PoolError::Configuration(message)) => assert!(message.contains("not available")),
        other => panic!("unexpected result {other:?}"),
    }
}

/// Hosts without isolation support
struct UnavailableFactory;

impl IsolateFactory for UnavailableFactory {
    fn is_available(&self) -> bool {
        false
    }

    fn spawn(&self, _worker_id: WorkerId, _config: &PoolConfig) -> Result<Isolate, PoolError> {
        Err(PoolError::Configuration("unreachable".into()))
    }
}

/// Isolates that die before ever becoming ready
struct StillbornFactory {
    spawned: AtomicUsize,
}

impl IsolateFactory for StillbornFactory {
    fn spawn(&self, _worker_id: WorkerId, _config: &PoolConfig) -> Result<Isolate, PoolError> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let (control, _) = flume::unbounded();
        let (events_tx, events) = flume::unbounded();
        let _ = events_tx.send(IsolateEvent::Exited(WorkerExit::failed("missing runtime")));
        Ok(Isolate::new(control, events, None))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_units_failing_to_start_fail_the_task() -> anyhow::Result<()> {
    let factory = Arc::new(StillbornFactory {
        spawned: AtomicUsize::new(0),
    });
    let pool = Pool::with_factory(test_config(2), factory.clone())?;

    let error = pool.run_task(input(1)).await.unwrap_err();
    match error {
        PoolError::Configuration(message) => assert!(message.contains("missing runtime")),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(factory.spawned.load(Ordering::SeqCst), 3);

    pool.dispose().await;
    Ok(())
}

/// Hosts that refuse to start more threads
struct ExhaustedFactory {
    attempts: AtomicUsize,
}

impl IsolateFactory for ExhaustedFactory {
    fn spawn(&self, _worker_id: WorkerId, _config: &PoolConfig) -> Result<Isolate, PoolError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PoolError::Configuration("thread limit reached".into()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spawn_errors_fail_the_task_without_new_submissions() -> anyhow::Result<()> {
    let factory = Arc::new(ExhaustedFactory {
        attempts: AtomicUsize::new(0),
    });
    let pool = Pool::with_factory(test_config(2), factory.clone())?;

    let outcome = tokio::time::timeout(Duration::from_secs(5), pool.run_task(input(1))).await?;
    match outcome {
        Err(PoolError::Configuration(message)) => assert!(message.contains("thread limit reached")),
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(factory.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(pool.stats().await.pending_tasks, 0);

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_timer_waits_for_running_task() -> anyhow::Result<()> {
    let config = PoolConfig {
        idle_timeout: Duration::from_millis(50),
        ..test_config(1)
    };
    let (pool, _) = scripted_pool(config)?;

    let observe = async {
        // Several idle windows pass while the task runs
        wait_for(150).await;
        pool.stats().await
    };
    let (result, during) = tokio::join!(
        pool.run_task(input("slow").with_data("delay_ms", 300)?),
        observe
    );
    assert_eq!(result?, json!("slow"));
    assert_eq!(during.busy_workers, 1);
    assert_eq!(during.closing_workers, 0);

    // The window after completion closes the unit
    wait_for(300).await;
    let after = pool.stats().await;
    assert_eq!(after.live_workers, 0);
    assert_eq!(after.closing_workers, 0);
    assert_eq!(after.spawned, 1);
    assert_eq!(after.retried, 0);

    pool.dispose().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_dispose_calls_agree() -> anyhow::Result<()> {
    let config = PoolConfig {
        shutdown_grace: Duration::from_millis(100),
        ..test_config(1)
    };
    let (pool, _) = scripted_pool(config)?;
    let pool = Arc::new(pool);

    let stuck = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run_task(TaskContext::new().with_data("hang", true).unwrap()).await }
    });
    wait_for(100).await;

    let (first, second) = tokio::join!(pool.dispose(), pool.dispose());
    assert!(first.force_exited);
    assert_eq!(first, second);
    assert_eq!(pool.dispose().await, first);
    assert_eq!(stuck.await?, Err(PoolError::Disposed));
    Ok(())
}

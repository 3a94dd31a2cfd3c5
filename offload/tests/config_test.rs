// Integration tests for offload::config

use std::time::Duration;

use offload::config::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_TASK_TIMEOUT};
use offload::{LogLevel, PoolConfig, PoolError, PoolOptions};

#[test]
fn test_default_config() {
    let config = PoolConfig::default();
    assert!(config.max_workers >= 1);
    assert_eq!(config.task_timeout, DEFAULT_TASK_TIMEOUT);
    assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
    assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.thread_name_prefix, "offload-worker");
    assert!(config.validate().is_ok());
}

#[test]
fn test_merge_overrides_only_given_fields() {
    let base = PoolConfig::default();
    let options = PoolOptions {
        idle_timeout: Some(Duration::from_millis(250)),
        thread_name_prefix: Some("compiler".to_string()),
        ..PoolOptions::default()
    }
    .with_max_workers(3)
    .with_log_level(LogLevel::Verbose);

    let merged = base.merge(&options);
    assert_eq!(merged.max_workers, 3);
    assert_eq!(merged.idle_timeout, Duration::from_millis(250));
    assert_eq!(merged.log_level, LogLevel::Verbose);
    assert_eq!(merged.thread_name_prefix, "compiler");
    assert_eq!(merged.task_timeout, base.task_timeout);
    assert_eq!(merged.shutdown_grace, base.shutdown_grace);
    assert_eq!(merged.max_retries, base.max_retries);

    assert_eq!(base.merge(&PoolOptions::default()), base);
}

#[test]
fn test_validate_rejects_unusable_values() {
    let cases = [
        PoolConfig { max_workers: 0, ..PoolConfig::default() },
        PoolConfig { task_timeout: Duration::ZERO, ..PoolConfig::default() },
        PoolConfig { idle_timeout: Duration::ZERO, ..PoolConfig::default() },
        PoolConfig { thread_name_prefix: "  ".to_string(), ..PoolConfig::default() },
    ];
    for config in cases {
        assert!(
            matches!(config.validate(), Err(PoolError::Configuration(_))),
            "accepted {config:?}"
        );
    }

    // Zero retries and zero grace are legal
    let strict = PoolConfig {
        max_retries: 0,
        shutdown_grace: Duration::ZERO,
        ..PoolConfig::default()
    };
    assert!(strict.validate().is_ok());
}

#[test]
fn test_log_level_parsing() {
    assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
    assert_eq!(" Verbose ".parse::<LogLevel>().unwrap(), LogLevel::Verbose);
    assert_eq!(
        "trace".parse::<LogLevel>(),
        Err(PoolError::Configuration("unknown log level `trace`".to_string()))
    );

    assert_eq!(LogLevel::Verbose.to_string(), "verbose");
    assert!(LogLevel::Verbose.is_verbose());
    assert!(!LogLevel::default().is_verbose());
    assert_eq!(LogLevel::Verbose.to_level(), tracing::Level::DEBUG);
}

#[test]
fn test_log_level_serde() {
    let level: LogLevel = serde_json::from_str("\"verbose\"").unwrap();
    assert_eq!(level, LogLevel::Verbose);
    assert_eq!(serde_json::to_string(&LogLevel::Info).unwrap(), "\"info\"");
    assert!(serde_json::from_str::<LogLevel>("\"loud\"").is_err());
}

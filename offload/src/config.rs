use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PoolError;

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "offload-worker";

/// How much the pool reports about the tasks it runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    /// Also log task payloads and results.
    Verbose,
}

impl LogLevel {
    pub fn is_verbose(self) -> bool {
        self == LogLevel::Verbose
    }

    pub fn to_level(self) -> tracing::Level {
        match self {
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Verbose => tracing::Level::DEBUG,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => f.write_str("info"),
            LogLevel::Verbose => f.write_str("verbose"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "verbose" => Ok(LogLevel::Verbose),
            other => Err(PoolError::Configuration(format!("unknown log level `{other}`"))),
        }
    }
}

// --- Pool Configuration ---

/// Configuration of a single pool.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolConfig {
    /// Upper bound on live worker units, at least 1.
    pub max_workers: usize,

    /// How long one attempt of a task may run before its unit is presumed wedged.
    pub task_timeout: Duration,

    /// Quiet period after the last submission before all units are closed.
    pub idle_timeout: Duration,

    /// How long closing units and busy units on dispose get before being terminated.
    pub shutdown_grace: Duration,

    /// Re-deliveries after a timeout or crash. Zero means at-most-once.
    pub max_retries: u32,

    pub log_level: LogLevel,

    /// Worker threads are named `{prefix}-{n}`.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().max(1),
            task_timeout: DEFAULT_TASK_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            max_retries: DEFAULT_MAX_RETRIES,
            log_level: LogLevel::Info,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_workers == 0 {
            return Err(PoolError::Configuration("max_workers must be at least 1".into()));
        }
        if self.task_timeout.is_zero() {
            return Err(PoolError::Configuration("task_timeout must be non-zero".into()));
        }
        if self.idle_timeout.is_zero() {
            return Err(PoolError::Configuration("idle_timeout must be non-zero".into()));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(PoolError::Configuration("thread_name_prefix must not be empty".into()));
        }
        Ok(())
    }

    /// Applies `options` on top of this configuration.
    pub fn merge(&self, options: &PoolOptions) -> PoolConfig {
        PoolConfig {
            max_workers: options.max_workers.unwrap_or(self.max_workers),
            task_timeout: options.task_timeout.unwrap_or(self.task_timeout),
            idle_timeout: options.idle_timeout.unwrap_or(self.idle_timeout),
            shutdown_grace: options.shutdown_grace.unwrap_or(self.shutdown_grace),
            max_retries: options.max_retries.unwrap_or(self.max_retries),
            log_level: options.log_level.unwrap_or(self.log_level),
            thread_name_prefix: options
                .thread_name_prefix
                .clone()
                .unwrap_or_else(|| self.thread_name_prefix.clone()),
        }
    }
}

// --- Per-pool Overrides ---

/// Partial configuration, typically supplied per registry key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoolOptions {
    pub max_workers: Option<usize>,
    pub task_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub shutdown_grace: Option<Duration>,
    pub max_retries: Option<u32>,
    pub log_level: Option<LogLevel>,
    pub thread_name_prefix: Option<String>,
}

impl PoolOptions {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = Some(log_level);
        self
    }
}

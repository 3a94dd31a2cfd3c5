// Logging for offload
//
// The pool only emits `tracing` events. Installing a subscriber is the
// application's call; the helpers here cover the common setups:
//
// ```rust
// use offload::{logging, LogLevel};
//
// // Console output matching a pool's log level
// logging::init_for_level(LogLevel::Verbose);
//
// // JSON lines with an extra directive
// logging::init(
//     logging::LogConfig::from(LogLevel::Info)
//         .json()
//         .with_directive("offload::pool=debug"),
// );
// ```
//
// Isolate threads start without a subscriber; the thread factory captures
// `current_subscriber()` before spawning and installs it on the new thread,
// so worker events land in the same place as coordinator events.

use std::sync::Once;

use tracing::{Level, Subscriber};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per event, fields flattened.
    Json,
}

/// What [`init`] installs.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Print `file:line` of each event.
    pub source_location: bool,
    /// Print thread names; isolate threads are named `{prefix}-{worker}`.
    pub thread_names: bool,
    /// Extra `EnvFilter` directives such as `offload::rpc=trace`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            source_location: false,
            thread_names: true,
            directives: Vec::new(),
        }
    }
}

impl From<LogLevel> for LogConfig {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Info => LogConfig::default(),
            LogLevel::Verbose => LogConfig {
                level: level.to_level(),
                source_location: true,
                directives: vec!["offload=debug".to_string()],
                ..LogConfig::default()
            },
        }
    }
}

impl LogConfig {
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn env_filter(&self) -> EnvFilter {
        self.directives
            .iter()
            .filter_map(|directive| match directive.parse::<Directive>() {
                Ok(directive) => Some(directive),
                Err(error) => {
                    eprintln!("ignoring log directive `{directive}`: {error}");
                    None
                }
            })
            .fold(
                EnvFilter::from_default_env().add_directive(self.level.into()),
                EnvFilter::add_directive,
            )
    }
}

static INIT: Once = Once::new();

/// Installs the global subscriber. Only the first call in a process counts.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(config.env_filter());

        let subscriber: Box<dyn Subscriber + Send + Sync> = match config.format {
            LogFormat::Json => Box::new(
                registry.with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_thread_names(config.thread_names),
                ),
            ),
            LogFormat::Pretty => Box::new(
                registry.with(
                    fmt::layer()
                        .with_ansi(atty::is(atty::Stream::Stdout))
                        .with_file(config.source_location)
                        .with_line_number(config.source_location)
                        .with_thread_names(config.thread_names),
                ),
            ),
        };

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("offload: a global tracing subscriber is already set: {err}");
        }
    });
}

/// Console logging for a pool's [`LogLevel`]. `Verbose` includes task
/// payloads and results.
pub fn init_for_level(level: LogLevel) {
    init(LogConfig::from(level));
}

pub fn init_production() {
    init(LogConfig::default().json());
}

/// Warnings only, with locations, so failing tests point at the source.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        source_location: true,
        thread_names: false,
        ..LogConfig::default()
    });
}

/// Span wrapping a pool's coordinator; every coordinator event carries the
/// pool id through it.
#[macro_export]
macro_rules! pool_span {
    ($pool_id:expr) => {
        tracing::info_span!("pool", id = %$pool_id)
    };
    ($pool_id:expr, $($fields:tt)*) => {
        tracing::info_span!("pool", id = %$pool_id, $($fields)*)
    };
}

/// Debug event in a worker unit's lifecycle, e.g. `log_worker!(id, "ready")`.
#[macro_export]
macro_rules! log_worker {
    ($worker_id:expr, $event:expr) => {
        tracing::debug!(worker = %$worker_id, event = $event)
    };
    ($worker_id:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(worker = %$worker_id, event = $event, $($fields)*)
    };
}

/// Debug event in a task's life: submitted, dispatched, retried, settled.
#[macro_export]
macro_rules! log_task {
    ($task_id:expr, $event:expr) => {
        tracing::debug!(task = %$task_id, event = $event)
    };
    ($task_id:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(task = %$task_id, event = $event, $($fields)*)
    };
}

/// The dispatcher in effect on this thread, for handing to isolate threads.
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|dispatch| dispatch.clone())
}

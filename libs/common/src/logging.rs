//! Logging bootstrap for adapter services
//!
//! Console output uses the bracketed `timestamp [LEVEL] message` layout. When a
//! log directory is configured a daily rolling file is written as well, either
//! in the same layout or as JSON lines.
//!
//! The top-level filter is wrapped in a reload layer so the level can be
//! changed while the service runs (see [`set_log_level`]).

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use anyhow::{anyhow, Context};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter producing `2026-01-05T08:12:44.809123Z [INFO] message`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking file writer flushing until process exit
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

type EnvFilterReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;
static LOG_FILTER_HANDLE: OnceLock<EnvFilterReloadHandle> = OnceLock::new();
static CURRENT_LOG_LEVEL: OnceLock<Mutex<String>> = OnceLock::new();

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as log file prefix and filter target
    pub service_name: String,
    /// Directory for the rolling log file; console only when `None`
    pub log_dir: Option<PathBuf>,
    /// Default level when `RUST_LOG` is not set
    pub console_level: Level,
    /// Write JSON lines to the log file instead of the bracketed layout
    pub enable_json: bool,
    /// Emit ANSI colors on the console
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: None,
            console_level: Level::INFO,
            enable_json: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Filter used when `RUST_LOG` is absent, e.g. `info,lwm2msrv=info`
    pub fn default_filter(&self) -> String {
        let level = self.console_level.as_str().to_lowercase();
        format!("{},{}={}", level, self.service_name, level)
    }
}

/// Parse a level name (`trace`..`error`), case-insensitive
pub fn parse_level(level: &str) -> anyhow::Result<Level> {
    level
        .parse::<Level>()
        .map_err(|_| anyhow!("Invalid log level '{}'", level))
}

/// Initialize the global subscriber
///
/// Fails when a global subscriber is already installed.
pub fn init_with_config(config: LogConfig) -> anyhow::Result<()> {
    // RUST_LOG wins over the configured level
    let filter_str = std::env::var("RUST_LOG").unwrap_or_else(|_| config.default_filter());
    let env_filter = EnvFilter::try_new(&filter_str)
        .with_context(|| format!("Invalid log filter '{}'", filter_str))?;

    let (reload_filter, reload_handle) = reload::Layer::new(env_filter);

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            if FILE_GUARD.set(guard).is_err() {
                return Err(anyhow!("Logging already initialized"));
            }

            let layer = if config.enable_json {
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_level(true)
                    .with_target(true)
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .event_format(BracketedLevelFormat)
                    .boxed()
            };
            Some(layer)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(reload_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Logging already initialized: {}", e))?;

    let _ = LOG_FILTER_HANDLE.set(reload_handle);
    let _ = CURRENT_LOG_LEVEL.set(Mutex::new(filter_str));

    Ok(())
}

/// Console-only logging at the given level
pub fn init(service_name: &str, level: &str) -> anyhow::Result<()> {
    let mut config = LogConfig::new(service_name);
    config.console_level = parse_level(level)?;
    init_with_config(config)
}

/// Why a runtime filter change was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLevelError {
    /// Not a level name or a valid filter directive
    InvalidFilter(String),
    /// No reloadable subscriber installed
    NotInitialized,
    Reload(String),
}

impl std::fmt::Display for LogLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevelError::InvalidFilter(msg) => write!(f, "{}", msg),
            LogLevelError::NotInitialized => {
                write!(f, "Logging not initialized with reload support")
            },
            LogLevelError::Reload(msg) => write!(f, "Failed to reload log filter: {}", msg),
        }
    }
}

impl std::error::Error for LogLevelError {}

fn parse_filter(level: &str) -> Result<EnvFilter, LogLevelError> {
    // A bare word must be a level; `target=level` lists go to EnvFilter as is
    if !level.contains(['=', ',', '[']) {
        parse_level(level).map_err(|e| LogLevelError::InvalidFilter(e.to_string()))?;
    }
    EnvFilter::try_new(level)
        .map_err(|e| LogLevelError::InvalidFilter(format!("Invalid log level '{}': {}", level, e)))
}

/// Replace the active filter, e.g. `"debug"` or `"info,lwm2msrv=trace"`
pub fn set_log_level(level: &str) -> Result<(), LogLevelError> {
    let new_filter = parse_filter(level)?;

    let handle = LOG_FILTER_HANDLE
        .get()
        .ok_or(LogLevelError::NotInitialized)?;
    handle
        .reload(new_filter)
        .map_err(|e| LogLevelError::Reload(e.to_string()))?;

    if let Some(current) = CURRENT_LOG_LEVEL.get() {
        if let Ok(mut guard) = current.lock() {
            *guard = level.to_string();
        }
    }

    tracing::info!("Log level changed to: {}", level);
    Ok(())
}

/// Current filter string, `"unknown"` before initialization
pub fn get_log_level() -> String {
    CURRENT_LOG_LEVEL
        .get()
        .and_then(|m| m.lock().ok())
        .map(|guard| guard.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

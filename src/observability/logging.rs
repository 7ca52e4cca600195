//! Leveled logging contract.
//!
//! # Responsibilities
//! - Define the eight-level `Logger` contract the core calls through
//! - Provide the default `TracingLogger` handle backed by `tracing`
//! - Provide `MemoryLogger` for asserting on log output in tests
//!
//! # Design Decisions
//! - Handles are passed explicitly (`Arc<dyn Logger>`), never looked up globally
//! - `warn`, `error` and `critical` hand back a `LogError` carrying the message,
//!   so a caller can log and return in one expression
//! - Implementors only write `log`; the leveled methods are provided

use std::fmt;
use std::sync::{Arc, Mutex};

/// Severity of a log event, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Finest,
    Fine,
    Debug,
    Trace,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Finest => "finest",
            LogLevel::Fine => "fine",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error value produced by the warn/error/critical log calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct LogError {
    level: LogLevel,
    message: String,
}

impl LogError {
    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Leveled logging sink used by every core component.
pub trait Logger: Send + Sync {
    /// Emit one event at `level`.
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>);

    fn finest(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Finest, args);
    }

    fn fine(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Fine, args);
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Debug, args);
    }

    fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Trace, args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Info, args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) -> LogError {
        leveled_error(self, LogLevel::Warn, args)
    }

    fn error(&self, args: fmt::Arguments<'_>) -> LogError {
        leveled_error(self, LogLevel::Error, args)
    }

    fn critical(&self, args: fmt::Arguments<'_>) -> LogError {
        leveled_error(self, LogLevel::Critical, args)
    }
}

fn leveled_error<L: Logger + ?Sized>(log: &L, level: LogLevel, args: fmt::Arguments<'_>) -> LogError {
    let message = args.to_string();
    log.log(level, format_args!("{}", message));
    LogError { level, message }
}

/// Default handle: forwards every event to the `tracing` macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let source = level.as_str();
        match level {
            LogLevel::Finest | LogLevel::Fine => tracing::trace!(level = source, "{}", args),
            LogLevel::Debug | LogLevel::Trace => tracing::debug!(level = source, "{}", args),
            LogLevel::Info => tracing::info!(level = source, "{}", args),
            LogLevel::Warn => tracing::warn!(level = source, "{}", args),
            LogLevel::Error | LogLevel::Critical => tracing::error!(level = source, "{}", args),
        }
    }
}

/// Convenience handle for top-level wiring.
pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first.
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages recorded at exactly `level`.
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let message = args.to_string();
        match self.entries.lock() {
            Ok(mut entries) => entries.push((level, message)),
            Err(poisoned) => poisoned.into_inner().push((level, message)),
        }
    }
}

//! SQL and event logging.

use std::fmt;

use tracing::{debug, error, info, warn};

/// Severity of a logged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// Executed SQL with its run time.
    Sql,
    /// Diagnostic detail.
    Debug,
    /// Normal events.
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Sql => "sql",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// Receives log records from a connection.
pub trait Logger: Send + Sync {
    /// Records one message.
    fn record(&self, message: &str, level: LogLevel);
}

/// Forwards records to `tracing`; SQL goes to the `tiller::sql` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn record(&self, message: &str, level: LogLevel) {
        match level {
            LogLevel::Sql => debug!(target: "tiller::sql", "{message}"),
            LogLevel::Debug => debug!("{message}"),
            LogLevel::Info => info!("{message}"),
            LogLevel::Warn => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }
    }
}

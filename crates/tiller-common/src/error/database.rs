//! Database access error types.

use std::fmt;
use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Unknown or unspecified error.
    Unknown = 0x0000,
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid configuration.
    InvalidConfig = 0x0002,
    /// I/O error.
    Io = 0x0003,
    /// Serialization error.
    Serialization = 0x0004,

    // Parse errors (0x0100 - 0x01FF)
    /// Malformed where entry.
    InvalidCondition = 0x0100,
    /// Operator not known to any handler.
    UnknownOperator = 0x0101,
    /// Update or delete without a condition.
    MissingCondition = 0x0102,
    /// Composite primary key field missing from write data.
    MissingPrimaryKey = 0x0103,
    /// Write data references an unknown column.
    UnknownField = 0x0104,
    /// Invalid argument passed to the builder.
    InvalidArgument = 0x0105,

    // Bind errors (0x0200 - 0x02FF)
    /// A parameter failed to bind.
    BindFailed = 0x0200,

    // Execution errors (0x0300 - 0x03FF)
    /// Statement execution failed.
    ExecutionFailed = 0x0300,
    /// Connection could not be established.
    ConnectionFailed = 0x0301,

    // Cache errors (0x0400 - 0x04FF)
    /// Cache key could not be derived.
    CacheKey = 0x0400,
    /// A cached counter holds a bad value or would overflow.
    CacheValue = 0x0401,

    // Transaction errors (0x0500 - 0x05FF)
    /// Transaction misuse or failure.
    Transaction = 0x0500,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Parse",
            0x02 => "Bind",
            0x03 => "Execution",
            0x04 => "Cache",
            0x05 => "Transaction",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The main error type for Tiller.
///
/// Parse errors are raised while compiling a query and always abort before
/// any I/O. Execution errors carry the placeholder-substituted SQL.
///
/// # Example
///
/// ```rust
/// use tiller_common::error::{TillerError, TillerResult};
///
/// fn update_without_condition() -> TillerResult<u64> {
///     Err(TillerError::MissingCondition { operation: "update" })
/// }
///
/// assert_eq!(
///     update_without_condition().unwrap_err().to_string(),
///     "missing update condition"
/// );
/// ```
#[derive(Debug, Error)]
pub enum TillerError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Parse Errors
    // ==========================================================================
    /// A where entry is neither a closure nor a well-formed triplet.
    #[error("invalid condition: {message}")]
    InvalidCondition {
        /// Description of the malformed entry.
        message: String,
    },

    /// The operator is not handled by any condition handler.
    #[error("unknown operator: {operator}")]
    UnknownOperator {
        /// The operator as given.
        operator: String,
    },

    /// An update or delete has no condition to restrict it.
    #[error("missing {operation} condition")]
    MissingCondition {
        /// `update` or `delete`.
        operation: &'static str,
    },

    /// A composite primary key field is absent from the write data.
    #[error("missing primary key field '{field}'")]
    MissingPrimaryKey {
        /// The missing key column.
        field: String,
    },

    /// Strict mode rejected a write-data key.
    #[error("field '{field}' does not exist in table '{table}'")]
    UnknownField {
        /// The unknown field.
        field: String,
        /// The table name.
        table: String,
    },

    /// Invalid argument provided to the builder.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Bind Errors
    // ==========================================================================
    /// A named or positional parameter failed to bind.
    #[error("failed to bind '{name}': {message} [ {sql} ] binds: {binds}")]
    Bind {
        /// The parameter name or position.
        name: String,
        /// Driver message.
        message: String,
        /// The statement being bound.
        sql: String,
        /// Rendered bind table.
        binds: String,
    },

    // ==========================================================================
    // Execution Errors
    // ==========================================================================
    /// The driver failed while executing a statement.
    #[error("{message} [ {sql} ]")]
    Execution {
        /// Driver message.
        message: String,
        /// The reconstructed statement.
        sql: String,
    },

    /// A connection could not be opened.
    #[error("connection failed: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Cache Errors
    // ==========================================================================
    /// A cache key could not be derived from the query.
    #[error("cannot derive cache key: {message}")]
    CacheKey {
        /// Error message.
        message: String,
    },

    /// A cached counter could not be updated.
    #[error("bad cached value under '{key}': {message}")]
    CacheValue {
        /// Cache key.
        key: String,
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Transaction Errors
    // ==========================================================================
    /// Transaction misuse or failure.
    #[error("transaction error: {message}")]
    Transaction {
        /// Error message.
        message: String,
    },
}

impl TillerError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::Io { .. } => ErrorCode::Io,
            Self::Serialization { .. } => ErrorCode::Serialization,
            Self::InvalidCondition { .. } => ErrorCode::InvalidCondition,
            Self::UnknownOperator { .. } => ErrorCode::UnknownOperator,
            Self::MissingCondition { .. } => ErrorCode::MissingCondition,
            Self::MissingPrimaryKey { .. } => ErrorCode::MissingPrimaryKey,
            Self::UnknownField { .. } => ErrorCode::UnknownField,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Bind { .. } => ErrorCode::BindFailed,
            Self::Execution { .. } => ErrorCode::ExecutionFailed,
            Self::Connection { .. } => ErrorCode::ConnectionFailed,
            Self::CacheKey { .. } => ErrorCode::CacheKey,
            Self::CacheValue { .. } => ErrorCode::CacheValue,
            Self::Transaction { .. } => ErrorCode::Transaction,
        }
    }

    /// Returns true if this error was raised while compiling a query.
    #[must_use]
    pub const fn is_parse_error(&self) -> bool {
        (self.code() as u16) >> 8 == 0x01
    }

    /// Returns true if this error may succeed on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid condition error.
    #[must_use]
    pub fn invalid_condition(message: impl Into<String>) -> Self {
        Self::InvalidCondition {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a transaction error.
    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a cache key error.
    #[must_use]
    pub fn cache_key(message: impl Into<String>) -> Self {
        Self::CacheKey {
            message: message.into(),
        }
    }

    /// Creates a cached value error.
    #[must_use]
    pub fn cache_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CacheValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for TillerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

//! Shared constants for Tiller.

// =============================================================================
// Bind Naming
// =============================================================================

/// Prefix of placeholders generated for WHERE conditions.
pub const WHERE_BIND_PREFIX: &str = "where_";

/// Prefix of placeholders generated for INSERT/UPDATE data.
pub const DATA_BIND_PREFIX: &str = "data_";

/// Prefix of every cache key derived by the connection engine.
pub const CACHE_KEY_PREFIX: &str = "tiller:";

/// Prefix of cache entries used to coalesce lazy counter writes.
pub const LAZY_KEY_PREFIX: &str = "tiller_lazy:";

// =============================================================================
// Connection Defaults
// =============================================================================

/// Default dialect name.
pub const DEFAULT_DIALECT: &str = "mysql";

/// Default host.
pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";

/// Default port.
pub const DEFAULT_HOSTPORT: &str = "3306";

/// Default character set.
pub const DEFAULT_CHARSET: &str = "utf8mb4";

/// Error message fragments that indicate the server connection was lost.
///
/// Matched case-insensitively against driver error messages.
pub const DEFAULT_BREAK_MATCH_STR: &[&str] = &[
    "server has gone away",
    "no connection to the server",
    "lost connection",
    "is dead or not enabled",
    "error while sending",
    "decryption failed or bad record mac",
    "server closed the connection unexpectedly",
    "ssl connection has been closed unexpectedly",
    "error writing data to the connection",
    "resource deadlock avoided",
    "failed with errno",
];

/// Name prefix of savepoints used for nested transactions.
pub const SAVEPOINT_PREFIX: &str = "trans";

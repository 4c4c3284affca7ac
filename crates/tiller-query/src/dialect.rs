//! SQL dialects.
//!
//! A dialect supplies the syntax that differs between servers: identifier
//! quoting, the row-window clause, savepoint support and the DSN format.

use std::fmt::{Debug, Write};
use std::sync::Arc;

use tiller_common::{HostConfig, TillerError, TillerResult};

const RESERVED_WORDS: &[&str] = &[
    "add", "all", "and", "as", "asc", "by", "case", "check", "column", "condition", "create",
    "database", "default", "delete", "desc", "distinct", "drop", "exists", "from", "group",
    "having", "in", "index", "insert", "interval", "into", "is", "join", "key", "like", "limit",
    "lock", "match", "not", "null", "or", "order", "range", "read", "references", "rank", "select",
    "set", "table", "to", "union", "unique", "update", "use", "values", "where", "with",
];

/// Dialect-specific syntax.
pub trait Dialect: Debug + Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the identifier quote character.
    fn quote_char(&self) -> char;

    /// Quotes an identifier when it is a reserved word.
    ///
    /// Qualified names (`t.col`) are handled part by part; `*` and
    /// expressions pass through unchanged.
    fn parse_key(&self, key: &str) -> String {
        let key = key.trim();
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            return key.to_string();
        }
        let q = self.quote_char();
        key.split('.')
            .map(|part| {
                if RESERVED_WORDS.contains(&part.to_ascii_lowercase().as_str()) {
                    format!("{q}{part}{q}")
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Renders the row-window clause, including its leading space.
    fn limit(&self, offset: Option<u64>, length: u64) -> String;

    /// Returns true if nested transactions use savepoints.
    fn supports_savepoint(&self) -> bool;

    /// Builds a DSN for one server.
    fn build_dsn(&self, host: &HostConfig) -> String;
}

/// MySQL syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn limit(&self, offset: Option<u64>, length: u64) -> String {
        match offset {
            Some(offset) => format!(" LIMIT {offset},{length}"),
            None => format!(" LIMIT {length}"),
        }
    }

    fn supports_savepoint(&self) -> bool {
        true
    }

    fn build_dsn(&self, host: &HostConfig) -> String {
        let mut dsn = format!("mysql:host={}", host.hostname);
        if !host.hostport.is_empty() {
            let _ = write!(dsn, ";port={}", host.hostport);
        }
        if !host.database.is_empty() {
            let _ = write!(dsn, ";dbname={}", host.database);
        }
        if !host.charset.is_empty() {
            let _ = write!(dsn, ";charset={}", host.charset);
        }
        dsn
    }
}

/// ANSI-flavoured syntax with `LIMIT n OFFSET m` and no savepoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn limit(&self, offset: Option<u64>, length: u64) -> String {
        match offset {
            Some(offset) if offset > 0 => format!(" LIMIT {length} OFFSET {offset}"),
            _ => format!(" LIMIT {length}"),
        }
    }

    fn supports_savepoint(&self) -> bool {
        false
    }

    fn build_dsn(&self, host: &HostConfig) -> String {
        format!(
            "generic://{}:{}/{}",
            host.hostname, host.hostport, host.database
        )
    }
}

/// Resolves a dialect by configured name.
pub fn dialect_for(name: &str) -> TillerResult<Arc<dyn Dialect>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "mysql" => Ok(Arc::new(MysqlDialect)),
        "generic" | "sqlite" | "memory" => Ok(Arc::new(GenericDialect)),
        other => Err(TillerError::InvalidConfig {
            message: format!("unsupported dialect '{other}'"),
        }),
    }
}

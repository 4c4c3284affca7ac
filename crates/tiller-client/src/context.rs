//! Shared state of all connections created for one application.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tiller_query::SchemaCache;

/// Schema cache and statement counters shared by connections.
///
/// Wrap it in an `Arc` and hand it to every connection that should share
/// cached schemas.
#[derive(Debug, Default)]
pub struct DbContext {
    schema: SchemaCache,
    query_times: AtomicU64,
    execute_times: AtomicU64,
}

impl DbContext {
    /// Creates a context with an in-memory schema cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context whose schema cache is backed by files under `dir`.
    #[must_use]
    pub fn with_schema_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            schema: SchemaCache::with_dir(dir),
            ..Self::default()
        }
    }

    /// Returns the schema cache.
    #[must_use]
    pub fn schema(&self) -> &SchemaCache {
        &self.schema
    }

    /// Counts one read statement.
    pub fn record_query(&self) {
        self.query_times.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one write statement.
    pub fn record_execute(&self) {
        self.execute_times.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of read statements run.
    #[must_use]
    pub fn query_times(&self) -> u64 {
        self.query_times.load(Ordering::Relaxed)
    }

    /// Returns the number of write statements run.
    #[must_use]
    pub fn execute_times(&self) -> u64 {
        self.execute_times.load(Ordering::Relaxed)
    }

    /// Resets both counters.
    pub fn reset_counters(&self) {
        self.query_times.store(0, Ordering::Relaxed);
        self.execute_times.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiller_query::{ColumnInfo, TableSchema};

    #[test]
    fn test_counters() {
        let ctx = DbContext::new();
        ctx.record_query();
        ctx.record_query();
        ctx.record_execute();
        assert_eq!(ctx.query_times(), 2);
        assert_eq!(ctx.execute_times(), 1);

        ctx.reset_counters();
        assert_eq!(ctx.query_times(), 0);
        assert!(ctx.schema().is_empty());
    }

    #[test]
    fn test_schema_dir_is_shared_between_contexts() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = DbContext::with_schema_dir(dir.path());
        first
            .schema()
            .insert(
                "app",
                "user",
                TableSchema::from_columns(&[ColumnInfo::new("id", "int", true)]),
            )
            .unwrap();

        let second = DbContext::with_schema_dir(dir.path());
        let schema = second.schema().get("app", "user").unwrap();
        assert_eq!(schema.fields, vec!["id".to_string()]);
    }
}

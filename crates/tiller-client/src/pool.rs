//! Connection registry.
//!
//! Connections are keyed by configuration fingerprint and a caller-chosen
//! slot, so identical configurations share one connection per slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tiller_cache::Cache;
use tiller_common::{DatabaseConfig, TillerResult};
use tracing::debug;

use crate::connection::Connection;
use crate::context::DbContext;
use crate::driver::Driver;

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections created.
    pub created: u64,
    /// Lookups served by an existing connection.
    pub reused: u64,
    /// Connections currently registered.
    pub size: usize,
}

/// Shares connections between callers.
pub struct ConnectionPool {
    driver: Arc<dyn Driver>,
    context: Arc<DbContext>,
    cache: Option<Arc<dyn Cache>>,
    connections: Mutex<HashMap<(u64, usize), Arc<Mutex<Connection>>>>,
    created: AtomicU64,
    reused: AtomicU64,
}

impl ConnectionPool {
    /// Creates an empty pool.
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            context: Arc::new(DbContext::new()),
            cache: None,
            connections: Mutex::new(HashMap::new()),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Shares `context` with every pooled connection.
    #[must_use]
    pub fn with_context(mut self, context: Arc<DbContext>) -> Self {
        self.context = context;
        self
    }

    /// Gives every pooled connection a result cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Returns the shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<DbContext> {
        &self.context
    }

    /// Returns the connection for `config` in `slot`, creating it on first use.
    pub fn get(&self, config: &DatabaseConfig, slot: usize) -> TillerResult<Arc<Mutex<Connection>>> {
        let key = (config.fingerprint(), slot);
        let mut connections = self.connections.lock();
        if let Some(conn) = connections.get(&key) {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(conn));
        }

        let mut conn = Connection::new(config.clone(), Arc::clone(&self.driver))?
            .with_context(Arc::clone(&self.context));
        if let Some(cache) = &self.cache {
            conn = conn.with_cache(Arc::clone(cache));
        }
        let conn = Arc::new(Mutex::new(conn));
        connections.insert(key, Arc::clone(&conn));
        self.created.fetch_add(1, Ordering::Relaxed);
        debug!(fingerprint = key.0, slot, "pooled connection created");
        Ok(conn)
    }

    /// Closes and drops the connection for `config` in `slot`.
    pub fn remove(&self, config: &DatabaseConfig, slot: usize) -> bool {
        let removed = self.connections.lock().remove(&(config.fingerprint(), slot));
        match removed {
            Some(conn) => {
                conn.lock().close();
                true
            }
            None => false,
        }
    }

    /// Closes and drops every connection.
    pub fn clear(&self) {
        let drained: Vec<_> = self.connections.lock().drain().map(|(_, c)| c).collect();
        for conn in drained {
            conn.lock().close();
        }
    }

    /// Returns the number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns true if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            size: self.len(),
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;

    #[test]
    fn test_same_config_shares_connection() {
        let pool = ConnectionPool::new(Arc::new(MemoryDriver::new()));
        let config = DatabaseConfig::builder().database("app").build();

        let a = pool.get(&config, 0).unwrap();
        let b = pool.get(&config, 0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = pool.get(&config, 1).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));

        let stats = pool.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.size, 2);
    }

    #[test]
    fn test_remove_and_clear() {
        let pool = ConnectionPool::new(Arc::new(MemoryDriver::new()));
        let first = DatabaseConfig::builder().database("a").build();
        let second = DatabaseConfig::builder().database("b").build();
        pool.get(&first, 0).unwrap();
        pool.get(&second, 0).unwrap();

        assert!(pool.remove(&first, 0));
        assert!(!pool.remove(&first, 0));
        assert_eq!(pool.len(), 1);

        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let pool = ConnectionPool::new(Arc::new(MemoryDriver::new()));
        let config = DatabaseConfig::builder().dialect("oracle").build();
        assert!(pool.get(&config, 0).is_err());
    }
}

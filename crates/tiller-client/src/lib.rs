//! # tiller-client
//!
//! Connection engine for Tiller.
//!
//! This crate runs compiled queries against database servers:
//!
//! - **Connection**: Prepare, bind and execute with one reconnect on connection loss
//! - **Replication**: Master/replica selection with read-after-write routing
//! - **Transactions**: Nested levels mapped onto savepoints
//! - **Caching**: Read-through results, invalidation on write and lazy counters
//! - **Drivers**: The [`Driver`] seam plus the recording [`MemoryDriver`]
//! - **Pooling**: Connections shared by configuration fingerprint
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tiller_client::{Connection, MemoryDriver};
//! use tiller_common::{DatabaseConfig, Row};
//! use tiller_query::Query;
//!
//! let driver = MemoryDriver::new();
//! driver.push_rows(vec![Row::from_pairs([("id", 7)])]);
//!
//! let config = DatabaseConfig::builder().database("app").build();
//! let mut conn = Connection::new(config, Arc::new(driver.clone())).unwrap();
//!
//! let row = conn.find(Query::new().table("user").where_eq("id", 7)).unwrap();
//! assert_eq!(row.unwrap().get("id"), Some(&7.into()));
//! assert!(driver.executed_sql()[0].starts_with("SELECT * FROM user WHERE id = :where_id"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod connection;
pub mod context;
pub mod driver;
pub mod logger;
pub mod pool;
pub mod transaction;

// Re-export commonly used items at the crate root
pub use connection::{Connection, Listener};
pub use context::DbContext;
pub use driver::{
    ConnectTarget, Driver, DriverError, DriverResult, ExecutedStatement, Handle, MemoryDriver,
    Param, PreparedStatement,
};
pub use logger::{LogLevel, Logger, TracingLogger};
pub use pool::{ConnectionPool, PoolStats};

//! # tiller-query
//!
//! Fluent query builder and SQL compiler for Tiller.
//!
//! This crate turns a chained [`Query`] description into parameterized SQL:
//!
//! - **Query**: Fluent setters that normalize into [`QueryOptions`]
//! - **Where-tree**: Canonical condition entries grouped by AND/OR/XOR
//! - **Builder**: Template-based SELECT/INSERT/UPDATE/DELETE compilation
//! - **Binds**: Collision-free named placeholders ([`BindTable`])
//! - **Schema**: Cached table fields, types and primary keys
//! - **Dialect**: Quoting, row windows and DSNs per server flavour
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tiller_query::{Builder, MysqlDialect, Query};
//!
//! let mut query = Query::new()
//!     .table("user")
//!     .where_map([("status", 1)])
//!     .where_in("type", [1, 2, 3]);
//! let options = query.parse_options(true);
//!
//! let builder = Builder::new(Arc::new(MysqlDialect));
//! let compiled = builder.select(&options, None).unwrap();
//! assert_eq!(
//!     compiled.sql,
//!     "SELECT * FROM user WHERE status = :where_status \
//!      AND type IN (:where_type_in_1,:where_type_in_2,:where_type_in_3)"
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bind;
pub mod builder;
pub mod dialect;
pub mod operator;
pub mod options;
pub mod query;
pub mod schema;
pub mod where_tree;

// Re-export commonly used items at the crate root
pub use bind::{BindEntry, BindTable};
pub use builder::{bind_base, Builder, CompiledSql};
pub use dialect::{dialect_for, Dialect, GenericDialect, MysqlDialect};
pub use operator::{Operator, OperatorKind};
pub use options::{CacheSpec, DataValue, QueryOptions};
pub use query::Query;
pub use schema::{ColumnInfo, PrimaryKey, SchemaCache, SchemaLookup, TableSchema};
pub use where_tree::{CondValue, Condition, Logic, SubQuery, WhereTree};

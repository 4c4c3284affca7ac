//! Driver primitives.
//!
//! The connection engine reaches a database only through these traits. A
//! [`Driver`] opens [`Handle`]s; a handle prepares [`PreparedStatement`]s,
//! which are bound, executed and then fetched or counted.

mod memory;

use std::fmt;

use thiserror::Error;
use tiller_common::{BindType, HostConfig, Row, Value};
use tiller_query::ColumnInfo;

pub use memory::{ExecutedStatement, MemoryDriver};

/// Error reported by a driver.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The server could not be reached.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The statement was rejected at prepare time.
    #[error("prepare failed: {0}")]
    Prepare(String),

    /// A parameter was rejected.
    #[error("bind failed: {0}")]
    Bind(String),

    /// The statement failed while running.
    #[error("{0}")]
    Execute(String),
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// A statement parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    /// `:name` placeholder.
    Named(String),
    /// 1-based `?` placeholder.
    Position(usize),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Named(name) => write!(f, ":{name}"),
            Param::Position(pos) => write!(f, "{pos}"),
        }
    }
}

/// Where a handle connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Data source name.
    pub dsn: String,
    /// Resolved server settings, credentials included.
    pub host: HostConfig,
}

/// Opens handles.
pub trait Driver: Send + Sync + fmt::Debug {
    /// Opens a handle to one server.
    fn connect(&self, target: &ConnectTarget) -> DriverResult<Box<dyn Handle>>;
}

/// An open server connection.
pub trait Handle: Send {
    /// Prepares a statement.
    fn prepare(&mut self, sql: &str) -> DriverResult<Box<dyn PreparedStatement>>;

    /// Runs a statement without parameters and returns the affected rows.
    fn exec(&mut self, sql: &str) -> DriverResult<u64>;

    /// Returns the id generated by the last insert.
    fn last_insert_id(&self) -> Option<String>;

    /// Lists the columns of a table.
    fn columns(&mut self, table: &str) -> DriverResult<Vec<ColumnInfo>>;
}

/// A prepared statement.
pub trait PreparedStatement: Send {
    /// Binds one parameter.
    fn bind(&mut self, param: &Param, value: &Value, bind_type: BindType) -> DriverResult<()>;

    /// Runs the statement with the current bindings.
    fn execute(&mut self) -> DriverResult<()>;

    /// Returns the rows produced by the last execution.
    fn fetch_all(&mut self) -> DriverResult<Vec<Row>>;

    /// Returns the rows affected by the last execution.
    fn row_count(&self) -> u64;
}

//! Connection fixtures.

use std::sync::{Arc, Once};

use tiller_client::{Connection, MemoryDriver};
use tiller_common::{DatabaseConfig, Deploy};
use tiller_query::ColumnInfo;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test subscriber once; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tiller_client=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Columns of the `user` table used by every scenario.
#[must_use]
pub fn user_columns() -> Vec<ColumnInfo> {
    vec![
        ColumnInfo::new("id", "int(11) unsigned", true),
        ColumnInfo::new("name", "varchar(64)", false),
        ColumnInfo::new("status", "tinyint(1)", false),
        ColumnInfo::new("score", "int(11)", false),
        ColumnInfo::new("create_time", "datetime", false),
    ]
}

/// Single-server configuration on `mem://app`.
#[must_use]
pub fn single_config() -> DatabaseConfig {
    DatabaseConfig::builder()
        .database("app")
        .dsn("mem://app")
        .build()
}

/// Distributed configuration with `masters` masters out of `hosts` servers,
/// named `mem://db0`, `mem://db1`, ...
#[must_use]
pub fn distributed_config(hosts: usize, masters: usize) -> DatabaseConfig {
    let names: Vec<String> = (0..hosts).map(|i| format!("10.0.0.{}", i + 1)).collect();
    let dsns: Vec<String> = (0..hosts).map(|i| format!("mem://db{i}")).collect();
    DatabaseConfig::builder()
        .deploy(Deploy::Distributed)
        .hostname(names.join(","))
        .dsn(dsns.join(","))
        .database("app")
        .rw_separate(true)
        .master_num(masters)
        .build()
}

/// A connection with its driver.
pub struct Fixture {
    /// The connection under test.
    pub conn: Connection,
    /// Shared view of the driver the connection uses.
    pub driver: MemoryDriver,
}

/// Opens a seeded connection over a driver that knows the `user` table.
///
/// # Panics
///
/// Panics if `config` is invalid.
#[must_use]
pub fn open(config: DatabaseConfig) -> Fixture {
    init_tracing();
    let driver = MemoryDriver::new();
    driver.define_table("user", user_columns());
    let conn = Connection::new(config, Arc::new(driver.clone()))
        .expect("valid test configuration")
        .with_seed(42);
    Fixture { conn, driver }
}

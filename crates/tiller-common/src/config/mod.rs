//! Configuration for Tiller.
//!
//! This module provides the connection configuration shared by the query
//! builder and the connection engine.

mod database;

pub use database::{DatabaseConfig, DatabaseConfigBuilder, Deploy, HostConfig};

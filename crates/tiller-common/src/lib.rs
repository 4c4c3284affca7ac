//! # tiller-common
//!
//! Common types, errors, and configuration for Tiller.
//!
//! This crate provides the foundational types shared by every Tiller
//! component. It includes:
//!
//! - **Values**: The tagged [`Value`] carried by every bind placeholder, its
//!   [`BindType`], and result [`Row`]s
//! - **Errors**: Unified error handling with [`TillerError`]
//! - **Config**: Connection configuration ([`DatabaseConfig`])
//! - **Constants**: Defaults shared by the builder and the connection engine
//!
//! ## Example
//!
//! ```rust
//! use tiller_common::{BindType, TillerResult, Value};
//!
//! fn example() -> TillerResult<()> {
//!     let value = Value::from(42);
//!     assert_eq!(value.bind_type(), BindType::Int);
//!     assert_eq!(value.to_sql_literal(), "42");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod row;
pub mod value;

// Re-export commonly used items at the crate root
pub use config::{DatabaseConfig, DatabaseConfigBuilder, Deploy, HostConfig};
pub use constants::*;
pub use error::{ErrorCode, TillerError, TillerResult};
pub use row::Row;
pub use value::{BindType, Value};

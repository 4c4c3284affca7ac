//! # tiller-test
//!
//! End-to-end scenarios for Tiller.
//!
//! The scenarios under `tests/` drive a real [`tiller_client::Connection`] over the
//! recording [`tiller_client::MemoryDriver`] and assert on the statements that reached it.
//! This crate provides the shared fixtures.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Fixtures shared by the scenarios.
pub mod utils;

pub use utils::{distributed_config, init_tracing, open, single_config, user_columns, Fixture};

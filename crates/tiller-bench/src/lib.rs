//! Tiller Performance Benchmarks
//!
//! This crate contains benchmarks for:
//! - Where-clause and statement compilation
//! - Bind table reconstruction
//! - Statement execution through the connection engine
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench -p tiller-bench
//! ```

pub mod utils;

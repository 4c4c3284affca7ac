//! Error handling for Tiller.
//!
//! This module provides a unified error type and result alias used
//! across all Tiller components.

mod database;

pub use database::{ErrorCode, TillerError};

/// Result type alias for Tiller operations.
pub type TillerResult<T> = std::result::Result<T, TillerError>;

//! Error handling for HeapDB.
//!
//! This module provides a unified error type and result alias used
//! across all HeapDB components.

mod database;

pub use database::{DbError, ErrorCode};

/// Result type alias for HeapDB operations.
pub type DbResult<T> = std::result::Result<T, DbError>;

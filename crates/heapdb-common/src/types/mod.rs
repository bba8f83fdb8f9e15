//! Type definitions for HeapDB.
//!
//! This module contains the identifier types used across the engine.

mod ids;

pub use ids::{PageId, TableId, TxnId};

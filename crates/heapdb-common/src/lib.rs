//! # heapdb-common
//!
//! Common types, errors, and configuration for HeapDB.
//!
//! This crate provides the foundational pieces shared by every HeapDB
//! component:
//!
//! - **Types**: Core identifiers (`TableId`, `PageId`, `TxnId`)
//! - **Errors**: Unified error handling with `DbError`
//! - **Config**: Engine configuration loaded from TOML or built in code
//! - **Constants**: Page, pool, and lock defaults
//!
//! ## Example
//!
//! ```rust
//! use heapdb_common::types::{PageId, TableId, TxnId};
//! use heapdb_common::error::DbResult;
//!
//! fn example() -> DbResult<()> {
//!     let page = PageId::new(TableId::new(7), 3);
//!     let txn = TxnId::new(1);
//!     assert_eq!(page.page_no(), 3);
//!     assert!(txn.is_valid());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use constants::*;
pub use error::{DbError, DbResult, ErrorCode};
pub use types::{PageId, TableId, TxnId};

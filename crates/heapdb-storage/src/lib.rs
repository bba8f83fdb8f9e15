//! # heapdb-storage
//!
//! Storage engine for HeapDB.
//!
//! This crate provides:
//!
//! - **Tuple**: fixed-width rows and their schemas
//! - **Page**: slotted heap pages with an occupancy bitmap header
//! - **File**: heap files, one table per file, and row iteration
//! - **Catalog**: table registry shared with the buffer pool
//! - **Buffer**: the page cache that every read and write goes through,
//!   with page locking and commit/abort completion
//! - **Scan**: alias-qualified sequential scan
//! - **Exec**: filter, insert, delete, and aggregate operators stacked
//!   on top of scans
//!
//! # Transactions
//!
//! A transaction is an id handed out by
//! [`BufferPool::begin_transaction`](buffer::BufferPool::begin_transaction).
//! Locks are taken implicitly as pages are fetched and held until
//! [`complete_transaction`](buffer::BufferPool::complete_transaction)
//! (strict two-phase locking). Dirty pages stay in memory until commit,
//! so the pool never writes uncommitted data during normal operation.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use heapdb_storage::buffer::{BufferPool, BufferPoolConfig};
//! use heapdb_storage::catalog::Catalog;
//! use heapdb_storage::tuple::Schema;
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Arc::new(Catalog::new(4096));
//!     let table = catalog.add_table("users", "/tmp/users.dat", Schema::parse("int:id,str:name")?)?;
//!     let pool = BufferPool::new(BufferPoolConfig::default(), catalog)?;
//!
//!     let txn = pool.begin_transaction();
//!     let count = pool.scan(txn, table)?.count();
//!     pool.complete_transaction(txn, true)?;
//!     println!("{count} rows");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod catalog;
pub mod exec;
pub mod file;
pub mod page;
pub mod scan;
pub mod tuple;

pub use buffer::{BufferPool, BufferPoolConfig, BufferPoolStats};
pub use catalog::Catalog;
pub use exec::{Aggregate, AggregateOp, CmpOp, Delete, Filter, Insert, Operator, Predicate};
pub use file::{HeapFile, HeapFileIter};
pub use page::HeapPage;
pub use scan::SeqScan;
pub use tuple::{FieldType, RecordId, Row, Schema, Value};

//! # heapdb-txn
//!
//! Concurrency control for HeapDB.
//!
//! This crate provides the page-level two-phase locking used by the
//! buffer pool:
//!
//! - **Lock Table**: per-page shared (S) and exclusive (X) locks, with
//!   same-transaction upgrade from S to X.
//!
//! - **Deadlock Detection**: a wait-for graph rebuilt from blocked
//!   requests on every check, reduced with Kahn's algorithm.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                  LockTable                    │
//! │                                               │
//! │   records: PageId -> LockRecord {S set, X}    │
//! │   pending: [PendingWait]                      │
//! │        │                                      │
//! │        ▼  (every blocked check)               │
//! │   ┌──────────────┐     ┌──────────────────┐   │
//! │   │ WaitForGraph │ ──▶ │ DeadlockDetector │   │
//! │   └──────────────┘     └──────────────────┘   │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use heapdb_common::types::{PageId, TableId, TxnId};
//! use heapdb_txn::{LockMode, LockTable};
//!
//! let locks = LockTable::new();
//! let page = PageId::new(TableId::new(1), 0);
//! let txn = TxnId::new(1);
//!
//! locks.acquire(txn, page, LockMode::Exclusive).unwrap();
//! assert!(locks.holds_lock(txn, page));
//! assert_eq!(locks.release_all(txn), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Lock table implementation.
///
/// This module provides:
/// - [`lock::LockTable`]: Grants, blocks, and releases page locks
/// - [`lock::LockMode`]: Shared and Exclusive
/// - [`lock::LockRecord`]: Holder sets of one page
pub mod lock;

/// Deadlock detection.
///
/// This module provides:
/// - [`deadlock::WaitForGraph`]: Transaction dependencies
/// - [`deadlock::DeadlockDetector`]: Finds a cycle member to abort
pub mod deadlock;

pub use lock::{
    LockMode, LockRecord, LockStats, LockStatsSnapshot, LockTable, LockTableConfig, PendingWait,
};

pub use deadlock::{DeadlockDetector, DeadlockInfo, DeadlockStats, WaitForGraph};

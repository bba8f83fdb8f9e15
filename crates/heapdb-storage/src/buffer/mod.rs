//! Buffer pool for HeapDB.
//!
//! The buffer pool is the only path between transactions and heap
//! files. It holds a bounded set of decoded pages and provides:
//!
//! - **Page Caching**: Keep recently used pages in memory
//! - **Page Locking**: Shared and exclusive page locks taken on every fetch
//! - **Dirty Tracking**: Remember which transaction last modified a page
//! - **No-Steal Eviction**: Only clean pages are evicted, least recently used first
//! - **Transaction Completion**: Force dirty pages at commit, drop them at abort
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       BufferPool                         │
//! │  ┌──────────────────┐   ┌─────────────────────────────┐  │
//! │  │    LockTable     │   │  pages: PageId -> HeapPage  │  │
//! │  │ (S/X, deadlocks) │   │  LruReplacer (clean only)   │  │
//! │  └──────────────────┘   └─────────────────────────────┘  │
//! │                                  │ miss / flush          │
//! │                                  ▼                       │
//! │                      Catalog -> HeapFile (disk)          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use heapdb_storage::buffer::{BufferPool, BufferPoolConfig};
//! use heapdb_storage::catalog::Catalog;
//! use heapdb_storage::tuple::{FieldType, Row, Schema, Value};
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Arc::new(Catalog::new(4096));
//!     let table = catalog.add_table("t", "/tmp/t.dat", Schema::from_types(&[FieldType::Int])?)?;
//!     let pool = BufferPool::new(BufferPoolConfig::new(50), Arc::clone(&catalog))?;
//!
//!     let txn = pool.begin_transaction();
//!     let mut row = Row::new(catalog.schema(table)?, vec![Value::Int(7)])?;
//!     pool.insert_row(txn, table, &mut row)?;
//!     pool.complete_transaction(txn, true)?;
//!     Ok(())
//! }
//! ```

mod config;
mod eviction;
mod pool;

pub use config::BufferPoolConfig;
pub use eviction::LruReplacer;
pub use pool::BufferPool;

/// Statistics for buffer pool monitoring.
#[derive(Debug, Clone, Default)]
pub struct BufferPoolStats {
    /// Total number of page fetches.
    pub fetches: u64,
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (required disk read).
    pub misses: u64,
    /// Number of pages evicted.
    pub evictions: u64,
    /// Number of dirty pages written back.
    pub flushes: u64,
    /// Number of pages dropped without writing.
    pub discards: u64,
    /// Current number of resident pages.
    pub resident_pages: usize,
    /// Current number of dirty resident pages.
    pub dirty_pages: usize,
}

impl BufferPoolStats {
    /// Returns the cache hit ratio (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        if self.fetches == 0 {
            0.0
        } else {
            self.hits as f64 / self.fetches as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_hit_ratio() {
        let mut stats = BufferPoolStats::default();
        assert_eq!(stats.hit_ratio(), 0.0);

        stats.fetches = 40;
        stats.hits = 30;
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }
}

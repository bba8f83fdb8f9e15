//! Buffer pool configuration.

use heapdb_common::config::EngineConfig;
use heapdb_common::constants::{
    DEFAULT_PAGE_SIZE, DEFAULT_POOL_PAGES, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
use heapdb_common::error::{DbError, DbResult};
use heapdb_txn::LockTableConfig;

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Maximum number of resident pages.
    pub capacity: usize,
    /// Page size in bytes.
    pub page_size: usize,
    /// Lock wait policy.
    pub locks: LockTableConfig,
}

impl BufferPoolConfig {
    /// Creates a configuration holding at most `capacity` pages.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            page_size: DEFAULT_PAGE_SIZE,
            locks: LockTableConfig::default(),
        }
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the lock wait policy.
    pub fn with_locks(mut self, locks: LockTableConfig) -> Self {
        self.locks = locks;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.capacity == 0 {
            return Err(DbError::invalid_config("capacity must be positive"));
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(DbError::invalid_config(format!(
                "page_size must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE} bytes"
            )));
        }
        self.locks.validate()
    }

    /// Returns the memory held by a full pool, ignoring decode overhead.
    pub fn memory_usage(&self) -> usize {
        self.capacity * self.page_size
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_PAGES)
    }
}

impl From<&EngineConfig> for BufferPoolConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            capacity: config.pool_pages,
            page_size: config.page_size,
            locks: LockTableConfig::from(config),
        }
    }
}

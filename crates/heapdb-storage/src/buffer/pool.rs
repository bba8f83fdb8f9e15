//! Buffer pool implementation.
//!
//! The buffer pool caches decoded pages, takes page locks on behalf of
//! transactions, and completes transactions by forcing or discarding
//! their dirty pages.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use heapdb_common::error::{DbError, DbResult};
use heapdb_common::types::{PageId, TableId, TxnId};
use heapdb_txn::{LockMode, LockStatsSnapshot, LockTable};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::config::BufferPoolConfig;
use super::eviction::LruReplacer;
use super::BufferPoolStats;
use crate::catalog::Catalog;
use crate::file::HeapFileIter;
use crate::page::HeapPage;
use crate::tuple::Row;

/// Resident pages and their recency, guarded by the pool latch.
#[derive(Debug, Default)]
struct PoolState {
    pages: HashMap<PageId, Arc<HeapPage>>,
    replacer: LruReplacer,
}

impl PoolState {
    fn insert(&mut self, page: Arc<HeapPage>) {
        let page_id = page.page_id();
        self.replacer.record_access(page_id);
        self.pages.insert(page_id, page);
    }

    fn remove(&mut self, page_id: PageId) -> Option<Arc<HeapPage>> {
        self.replacer.remove(page_id);
        self.pages.remove(&page_id)
    }

    fn clean_victim(&self) -> Option<PageId> {
        let pages = &self.pages;
        self.replacer
            .victim(|pid| pages.get(&pid).is_some_and(|p| !p.is_dirty()))
    }

    fn dirtied_by(&self, txn_id: TxnId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .pages
            .values()
            .filter(|p| p.dirtied_by() == Some(txn_id))
            .map(|p| p.page_id())
            .collect();
        pages.sort();
        pages
    }
}

/// The buffer pool manages page caching and locking for transactions.
///
/// It provides:
/// - A bounded page cache with LRU eviction of clean pages only
/// - Page-level shared and exclusive locks with deadlock detection
/// - Force-at-commit and discard-on-abort transaction completion
///
/// Cached pages are immutable snapshots. A writer checks a page out,
/// changes its own copy, and checks it back in, which replaces the
/// cached snapshot and marks it dirty.
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Tables reachable through this pool.
    catalog: Arc<Catalog>,
    /// Resident pages.
    state: Mutex<PoolState>,
    /// Page locks.
    locks: LockTable,
    /// Next transaction id to hand out.
    next_txn: AtomicU64,
    /// Fetch counter for statistics.
    fetch_count: AtomicU64,
    /// Hit counter for statistics.
    hit_count: AtomicU64,
    /// Miss counter for statistics.
    miss_count: AtomicU64,
    /// Eviction counter for statistics.
    eviction_count: AtomicU64,
    /// Flush counter for statistics.
    flush_count: AtomicU64,
    /// Discard counter for statistics.
    discard_count: AtomicU64,
}

impl BufferPool {
    /// Creates a buffer pool over the tables of `catalog`.
    pub fn new(config: BufferPoolConfig, catalog: Arc<Catalog>) -> DbResult<Self> {
        config.validate()?;
        if catalog.page_size() != config.page_size {
            return Err(DbError::invalid_config(format!(
                "catalog page size {} differs from pool page size {}",
                catalog.page_size(),
                config.page_size
            )));
        }

        debug!(
            capacity = config.capacity,
            page_size = config.page_size,
            "created buffer pool"
        );

        Ok(Self {
            locks: LockTable::with_config(config.locks.clone()),
            config,
            catalog,
            state: Mutex::new(PoolState::default()),
            next_txn: AtomicU64::new(TxnId::MIN.as_u64()),
            fetch_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
            discard_count: AtomicU64::new(0),
        })
    }

    /// Returns a fresh transaction id.
    pub fn begin_transaction(&self) -> TxnId {
        TxnId::new(self.next_txn.fetch_add(1, Ordering::Relaxed))
    }

    /// Locks `page_id` for `txn_id` and returns the cached page, reading
    /// it from its heap file on a miss.
    ///
    /// If the lock wait times out or `txn_id` is chosen as a deadlock
    /// victim, the transaction is rolled back before the error is
    /// returned.
    pub fn get_page(
        &self,
        txn_id: TxnId,
        page_id: PageId,
        mode: LockMode,
    ) -> DbResult<Arc<HeapPage>> {
        self.lock_page(txn_id, page_id, mode)?;
        self.fetch(page_id)
    }

    /// Acquires a page lock without fetching the page. Aborts are
    /// handled as in [`get_page`](Self::get_page).
    pub fn lock_page(&self, txn_id: TxnId, page_id: PageId, mode: LockMode) -> DbResult<()> {
        match self.locks.acquire(txn_id, page_id, mode) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.is_abort() {
                    if let Err(rollback) = self.complete_transaction(txn_id, false) {
                        warn!(txn = %txn_id, error = %rollback, "rollback after lock abort failed");
                    }
                }
                Err(err)
            }
        }
    }

    /// Locks `page_id` exclusively and returns an owned copy to modify.
    pub fn check_out(&self, txn_id: TxnId, page_id: PageId) -> DbResult<HeapPage> {
        let page = self.get_page(txn_id, page_id, LockMode::Exclusive)?;
        Ok(HeapPage::clone(&page))
    }

    /// Publishes a modified page: marks it dirtied by `txn_id` and
    /// replaces the cached copy.
    pub fn check_in(&self, txn_id: TxnId, mut page: HeapPage) -> DbResult<()> {
        let page_id = page.page_id();
        if self.locks.held_mode(txn_id, page_id) != Some(LockMode::Exclusive) {
            return Err(DbError::invalid_argument(format!(
                "transaction {txn_id} does not hold an exclusive lock on page {page_id}"
            )));
        }

        page.mark_dirty(Some(txn_id));
        let mut state = self.state.lock();
        if !state.pages.contains_key(&page_id) && state.pages.len() >= self.config.capacity {
            self.evict_clean(&mut state)?;
        }
        state.insert(Arc::new(page));
        trace!(txn = %txn_id, page = %page_id, "checked in dirty page");
        Ok(())
    }

    /// Inserts `row` into a table and sets its record id.
    pub fn insert_row(&self, txn_id: TxnId, table_id: TableId, row: &mut Row) -> DbResult<()> {
        let file = self.catalog.table(table_id)?;
        for page in file.insert_row(self, txn_id, row)? {
            self.check_in(txn_id, page)?;
        }
        Ok(())
    }

    /// Deletes `row` from the table its record id points into.
    pub fn delete_row(&self, txn_id: TxnId, row: &Row) -> DbResult<()> {
        let record_id = row.record_id().ok_or(DbError::MissingRecordId)?;
        let file = self.catalog.table(record_id.page_id.table_id())?;
        for page in file.delete_row(self, txn_id, row)? {
            self.check_in(txn_id, page)?;
        }
        Ok(())
    }

    /// Commits or aborts a transaction.
    ///
    /// Commit flushes every page `txn_id` dirtied. Abort drops those
    /// pages from the cache so the next access re-reads the on-disk
    /// version. Either way every lock held by `txn_id` is released last,
    /// even if flushing failed.
    pub fn complete_transaction(&self, txn_id: TxnId, commit: bool) -> DbResult<()> {
        let result = if commit {
            self.flush_pages(txn_id)
        } else {
            self.discard_pages(txn_id);
            Ok(())
        };
        let released = self.locks.release_all(txn_id);
        debug!(txn = %txn_id, commit, released, ok = result.is_ok(), "transaction complete");
        result
    }

    /// Returns true if `txn_id` holds a lock on `page_id`.
    pub fn holds_lock(&self, txn_id: TxnId, page_id: PageId) -> bool {
        self.locks.holds_lock(txn_id, page_id)
    }

    /// Releases one page lock outside of transaction completion.
    ///
    /// Use with care: the page's changes are no longer protected.
    pub fn unsafe_release_page(&self, txn_id: TxnId, page_id: PageId) {
        self.locks.release(txn_id, page_id);
    }

    /// Writes `page_id` if it is dirty and removes it from the cache.
    pub fn flush_page(&self, page_id: PageId) -> DbResult<()> {
        let flushed = {
            let mut state = self.state.lock();
            self.flush_locked(&mut state, page_id)?
        };
        if flushed {
            self.catalog.table(page_id.table_id())?.sync()?;
        }
        Ok(())
    }

    /// Flushes every page dirtied by `txn_id`, releasing `txn_id`'s lock
    /// on each page as soon as it has been written.
    pub fn flush_pages(&self, txn_id: TxnId) -> DbResult<()> {
        let mut tables = BTreeSet::new();
        {
            let mut state = self.state.lock();
            for page_id in state.dirtied_by(txn_id) {
                self.flush_locked(&mut state, page_id)?;
                self.locks.release(txn_id, page_id);
                tables.insert(page_id.table_id());
            }
        }
        for table_id in &tables {
            self.catalog.table(*table_id)?.sync()?;
        }
        debug!(txn = %txn_id, tables = tables.len(), "flushed transaction pages");
        Ok(())
    }

    /// Empties the pool, oldest page first, writing dirty pages.
    ///
    /// Intended for shutdown. Dirty pages of running transactions are
    /// written too, and no locks are released.
    pub fn flush_all_pages(&self) -> DbResult<()> {
        let mut tables = BTreeSet::new();
        {
            let mut state = self.state.lock();
            while let Some(page_id) = state.replacer.oldest() {
                self.flush_locked(&mut state, page_id)?;
                self.eviction_count.fetch_add(1, Ordering::Relaxed);
                tables.insert(page_id.table_id());
            }
        }
        for table_id in tables {
            self.catalog.table(table_id)?.sync()?;
        }
        Ok(())
    }

    /// Drops a cached page without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        if self.state.lock().remove(page_id).is_some() {
            self.discard_count.fetch_add(1, Ordering::Relaxed);
            trace!(page = %page_id, "discarded page");
        }
    }

    /// Writes `page` to its heap file as a clean page.
    ///
    /// A resident copy is replaced by the clean page before the write,
    /// so the cache is never behind the disk. It is restored if the
    /// write fails.
    pub fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        let page_id = page.page_id();
        let file = self.catalog.table(page_id.table_id())?;
        let mut clean = page.clone();
        clean.mark_dirty(None);

        let mut state = self.state.lock();
        let previous = state.pages.get(&page_id).cloned();
        if previous.is_some() {
            state.pages.insert(page_id, Arc::new(clean.clone()));
        }
        if let Err(err) = file.write_page(&clean) {
            if let Some(previous) = previous {
                state.pages.insert(page_id, previous);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Returns a restartable scan over every row of a table.
    pub fn scan(&self, txn_id: TxnId, table_id: TableId) -> DbResult<HeapFileIter<'_>> {
        Ok(self.catalog.table(table_id)?.iter(self, txn_id))
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let (resident, dirty) = {
            let state = self.state.lock();
            let dirty = state.pages.values().filter(|p| p.is_dirty()).count();
            (state.pages.len(), dirty)
        };

        BufferPoolStats {
            fetches: self.fetch_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            evictions: self.eviction_count.load(Ordering::Relaxed),
            flushes: self.flush_count.load(Ordering::Relaxed),
            discards: self.discard_count.load(Ordering::Relaxed),
            resident_pages: resident,
            dirty_pages: dirty,
        }
    }

    /// Returns true if a page is in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().pages.contains_key(&page_id)
    }

    /// Returns the cached copy of a page without locking or fetching it.
    pub fn peek(&self, page_id: PageId) -> Option<Arc<HeapPage>> {
        self.state.lock().pages.get(&page_id).cloned()
    }

    /// Returns the resident page ids in ascending order.
    pub fn resident_pages(&self) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self.state.lock().pages.keys().copied().collect();
        pages.sort();
        pages
    }

    /// Returns the maximum number of resident pages.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Returns the page size.
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    /// Returns the catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns the lock table.
    pub fn lock_table(&self) -> &LockTable {
        &self.locks
    }

    /// Returns lock statistics.
    pub fn lock_stats(&self) -> LockStatsSnapshot {
        self.locks.stats().snapshot()
    }

    fn fetch(&self, page_id: PageId) -> DbResult<Arc<HeapPage>> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();

        if let Some(page) = state.pages.get(&page_id).cloned() {
            state.replacer.record_access(page_id);
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(page);
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let file = self.catalog.table(page_id.table_id())?;
        let page = Arc::new(file.read_page(page_id)?);
        if state.pages.len() >= self.config.capacity {
            self.evict_clean(&mut state)?;
        }
        state.insert(Arc::clone(&page));
        trace!(page = %page_id, "loaded page");
        Ok(page)
    }

    /// Evicts the least recently used clean page.
    fn evict_clean(&self, state: &mut PoolState) -> DbResult<()> {
        let victim = state.clean_victim().ok_or(DbError::CapacityExhausted {
            capacity: self.config.capacity,
        })?;
        state.remove(victim);
        self.eviction_count.fetch_add(1, Ordering::Relaxed);
        debug!(page = %victim, "evicted page");
        Ok(())
    }

    /// Writes a resident page if dirty, then drops it. Returns false if
    /// the page was not resident.
    fn flush_locked(&self, state: &mut PoolState, page_id: PageId) -> DbResult<bool> {
        let Some(page) = state.pages.get(&page_id).cloned() else {
            return Ok(false);
        };
        if page.is_dirty() {
            let file = self.catalog.table(page_id.table_id())?;
            let mut clean = HeapPage::clone(&page);
            clean.mark_dirty(None);
            file.write_page(&clean)?;
            self.flush_count.fetch_add(1, Ordering::Relaxed);
            trace!(page = %page_id, txn = ?page.dirtied_by(), "flushed page");
        }
        state.remove(page_id);
        Ok(true)
    }

    fn discard_pages(&self, txn_id: TxnId) {
        let mut state = self.state.lock();
        for page_id in state.dirtied_by(txn_id) {
            state.remove(page_id);
            self.discard_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.config.capacity)
            .field("page_size", &self.config.page_size)
            .field("stats", &self.stats())
            .field("locks", &self.locks)
            .finish()
    }
}

//! Shared setup for storage integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use heapdb_common::types::{PageId, TableId};
use heapdb_storage::buffer::{BufferPool, BufferPoolConfig};
use heapdb_storage::catalog::Catalog;
use heapdb_storage::page::HeapPage;
use heapdb_storage::tuple::{FieldType, Row, Schema, Value};
use heapdb_txn::LockTableConfig;
use tempfile::TempDir;

/// Small pages so that an `(INT, STRING)` row fills a page after three
/// inserts.
pub const PAGE_SIZE: usize = 512;

/// Rows per page for the test schema at [`PAGE_SIZE`].
pub const ROWS_PER_PAGE: usize = 3;

/// A catalog with one table and a pool over it.
pub struct TestDb {
    pub dir: TempDir,
    pub catalog: Arc<Catalog>,
    pub pool: BufferPool,
    pub table: TableId,
}

impl TestDb {
    /// Creates a database whose pool holds `capacity` pages and whose
    /// lock waits give up after `timeout_ms`.
    pub fn new(capacity: usize, timeout_ms: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(Catalog::new(PAGE_SIZE));
        let table = catalog
            .add_table("items", dir.path().join("items.dat"), schema())
            .unwrap();
        let pool = BufferPool::new(pool_config(capacity, timeout_ms), Arc::clone(&catalog)).unwrap();
        Self {
            dir,
            catalog,
            pool,
            table,
        }
    }

    /// Opens a second catalog and pool over the same file, as a restart
    /// would.
    pub fn reopen(&self, capacity: usize) -> (Arc<Catalog>, BufferPool, TableId) {
        let catalog = Arc::new(Catalog::new(PAGE_SIZE));
        let table = catalog
            .add_table("items", self.dir.path().join("items.dat"), schema())
            .unwrap();
        let pool = BufferPool::new(pool_config(capacity, 1_000), Arc::clone(&catalog)).unwrap();
        (catalog, pool, table)
    }

    /// Returns page `page_no` of the table.
    pub fn page(&self, page_no: u32) -> PageId {
        PageId::new(self.table, page_no)
    }

    /// Builds a row of the table's schema.
    pub fn row(&self, id: i32, name: &str) -> Row {
        Row::new(
            self.catalog.schema(self.table).unwrap(),
            vec![Value::Int(id), Value::from(name)],
        )
        .unwrap()
    }

    /// Writes `pages` full pages directly to the heap file, bypassing the
    /// pool. Row ids count up from zero.
    pub fn seed_pages(&self, pages: u32) {
        let file = self.catalog.table(self.table).unwrap();
        let mut id = 0;
        for page_no in 0..pages {
            let mut page = HeapPage::empty(self.page(page_no), Arc::clone(file.schema()), PAGE_SIZE);
            for _ in 0..ROWS_PER_PAGE {
                page.insert_row(self.row(id, "seed")).unwrap();
                id += 1;
            }
            file.write_page(&page).unwrap();
        }
    }

    /// Reads a page straight from disk.
    pub fn disk_page(&self, page_no: u32) -> HeapPage {
        self.catalog
            .table(self.table)
            .unwrap()
            .read_page(self.page(page_no))
            .unwrap()
    }

    /// Returns the number of pages in the heap file.
    pub fn num_pages(&self) -> u32 {
        self.catalog.table(self.table).unwrap().num_pages().unwrap()
    }
}

/// `(INT id, STRING name)`.
pub fn schema() -> Schema {
    Schema::named(&[(FieldType::Int, "id"), (FieldType::Str, "name")]).unwrap()
}

fn pool_config(capacity: usize, timeout_ms: u64) -> BufferPoolConfig {
    let poll = Duration::from_millis(timeout_ms.min(10));
    BufferPoolConfig::new(capacity)
        .with_page_size(PAGE_SIZE)
        .with_locks(
            LockTableConfig::default()
                .with_lock_timeout(Duration::from_millis(timeout_ms))
                .with_poll_interval(poll),
        )
}

//! Heap files: one table stored as a flat sequence of fixed-size pages.
//!
//! Page `n` lives at byte offset `n * page_size`. The page count is
//! derived from the file length, so appending a page is a positioned
//! write one page past the end.
//!
//! Row mutations go through the buffer pool: the heap file only decides
//! which page a row goes to and hands back the pages it changed.

mod iter;

pub use iter::HeapFileIter;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use heapdb_common::error::{DbError, DbResult};
use heapdb_common::types::{PageId, TableId, TxnId};
use heapdb_txn::LockMode;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::BufferPool;
use crate::page::{checked_slots, HeapPage};
use crate::tuple::{Row, Schema};

/// A table's backing file.
pub struct HeapFile {
    /// The file path.
    path: PathBuf,
    /// Table stored in this file.
    table_id: TableId,
    /// Schema of every row.
    schema: Arc<Schema>,
    /// Page size in bytes.
    page_size: usize,
    /// The underlying file, wrapped in a mutex for positioned access.
    file: Mutex<File>,
    /// Serializes page appends.
    append_latch: Mutex<()>,
}

impl HeapFile {
    /// Opens a heap file, creating it empty if it does not exist.
    ///
    /// Fails without touching the file system when a row of `schema` does
    /// not fit on a page, or when the page holds more slots than a record
    /// id can name.
    pub fn open(
        path: impl AsRef<Path>,
        table_id: TableId,
        schema: Arc<Schema>,
        page_size: usize,
    ) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        checked_slots(page_size, schema.row_size())?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        debug!(table = %table_id, path = %path.display(), "opened heap file");

        Ok(Self {
            path,
            table_id,
            schema,
            page_size,
            file: Mutex::new(file),
            append_latch: Mutex::new(()),
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the table id.
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Returns the row schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of pages, counting a trailing partial page.
    pub fn num_pages(&self) -> DbResult<u32> {
        let len = self.file.lock().metadata()?.len();
        Ok(len.div_ceil(self.page_size as u64) as u32)
    }

    /// Reads and decodes one page directly from disk.
    pub fn read_page(&self, page_id: PageId) -> DbResult<HeapPage> {
        self.check_page(page_id)?;
        let offset = page_id.byte_offset(self.page_size);
        let mut data = vec![0u8; self.page_size];

        {
            let mut file = self.file.lock();
            let len = file.metadata()?.len();
            if offset + self.page_size as u64 > len {
                return Err(DbError::ShortRead {
                    page_id,
                    expected: self.page_size,
                    actual: len.saturating_sub(offset) as usize,
                });
            }
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut data)?;
        }

        trace!(page = %page_id, "read page");
        HeapPage::decode(page_id, Arc::clone(&self.schema), &data)
    }

    /// Encodes and writes one page at its offset.
    pub fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        let page_id = page.page_id();
        self.check_page(page_id)?;
        if page.page_size() != self.page_size {
            return Err(DbError::invalid_argument(format!(
                "page {page_id} is {} bytes, file uses {}",
                page.page_size(),
                self.page_size
            )));
        }

        let data = page.encode();
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset(self.page_size)))?;
        file.write_all(&data)?;

        trace!(page = %page_id, "wrote page");
        Ok(())
    }

    /// Flushes written pages to stable storage.
    pub fn sync(&self) -> DbResult<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    /// Places `row` on the first page with a free slot, appending a new
    /// page when none has room. Returns the changed page, not yet
    /// published to the pool, and sets the row's record id.
    ///
    /// Pages are inspected under exclusive locks. A full page that
    /// `txn_id` did not already hold is released again right away.
    pub fn insert_row(
        &self,
        pool: &BufferPool,
        txn_id: TxnId,
        row: &mut Row,
    ) -> DbResult<Vec<HeapPage>> {
        if **row.schema() != *self.schema {
            return Err(DbError::SchemaMismatch {
                expected: self.schema.to_string(),
                actual: row.schema().to_string(),
            });
        }

        for page_no in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_no);
            let held_before = pool.holds_lock(txn_id, page_id);
            let page = pool.get_page(txn_id, page_id, LockMode::Exclusive)?;

            if page.free_slots() > 0 {
                let mut page = HeapPage::clone(&page);
                let record_id = page.insert_row(row.clone())?;
                row.set_record_id(Some(record_id));
                return Ok(vec![page]);
            }
            if !held_before {
                pool.unsafe_release_page(txn_id, page_id);
            }
        }

        let mut page = self.append_page(pool, txn_id)?;
        let record_id = page.insert_row(row.clone())?;
        row.set_record_id(Some(record_id));
        debug!(txn = %txn_id, page = %page.page_id(), "heap file grew by one page");
        Ok(vec![page])
    }

    /// Frees the slot recorded in `row`. Returns the changed page.
    pub fn delete_row(
        &self,
        pool: &BufferPool,
        txn_id: TxnId,
        row: &Row,
    ) -> DbResult<Vec<HeapPage>> {
        let record_id = row.record_id().ok_or(DbError::MissingRecordId)?;
        if record_id.page_id.table_id() != self.table_id
            || record_id.page_id.page_no() >= self.num_pages()?
        {
            return Err(DbError::RowNotFound {
                page_id: record_id.page_id,
                slot: record_id.slot,
            });
        }

        let mut page = pool.check_out(txn_id, record_id.page_id)?;
        page.delete_row(record_id)?;
        Ok(vec![page])
    }

    /// Returns a restartable iterator over every row, read through `pool`
    /// under shared locks.
    pub fn iter<'a>(self: &Arc<Self>, pool: &'a BufferPool, txn_id: TxnId) -> HeapFileIter<'a> {
        HeapFileIter::new(pool, Arc::clone(self), txn_id)
    }

    /// Writes an empty page past the end of the file and returns an
    /// owned copy of it, exclusively locked by `txn_id`.
    fn append_page(&self, pool: &BufferPool, txn_id: TxnId) -> DbResult<HeapPage> {
        let _guard = self.append_latch.lock();
        let page_id = PageId::new(self.table_id, self.num_pages()?);

        pool.lock_page(txn_id, page_id, LockMode::Exclusive)?;
        let empty = HeapPage::empty(page_id, Arc::clone(&self.schema), self.page_size);
        pool.write_page(&empty)?;
        pool.check_out(txn_id, page_id)
    }

    fn check_page(&self, page_id: PageId) -> DbResult<()> {
        if page_id.table_id() != self.table_id {
            return Err(DbError::invalid_argument(format!(
                "page {page_id} does not belong to table {}",
                self.table_id
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for HeapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapFile")
            .field("path", &self.path)
            .field("table_id", &self.table_id)
            .field("schema", &self.schema.to_string())
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{FieldType, Value};
    use tempfile::tempdir;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from_types(&[FieldType::Int, FieldType::Int]).unwrap())
    }

    #[test]
    fn test_open_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");
        let file = HeapFile::open(&path, TableId::new(1), schema(), 4096).unwrap();

        assert!(path.exists());
        assert_eq!(file.num_pages().unwrap(), 0);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let table = TableId::new(1);
        let file = HeapFile::open(dir.path().join("t.dat"), table, schema(), 4096).unwrap();

        let pid = PageId::new(table, 2);
        let mut page = HeapPage::empty(pid, schema(), 4096);
        let row = Row::new(schema(), vec![Value::Int(1), Value::Int(2)]).unwrap();
        page.insert_row(row.clone()).unwrap();
        file.write_page(&page).unwrap();

        // Writing page 2 implies pages 0 and 1 exist as zeroes.
        assert_eq!(file.num_pages().unwrap(), 3);

        let read = file.read_page(pid).unwrap();
        assert_eq!(read.encode(), page.encode());
        assert_eq!(read.rows().next(), Some(&row));

        let blank = file.read_page(PageId::new(table, 0)).unwrap();
        assert_eq!(blank.rows().count(), 0);
    }

    #[test]
    fn test_read_past_end() {
        let dir = tempdir().unwrap();
        let table = TableId::new(1);
        let file = HeapFile::open(dir.path().join("t.dat"), table, schema(), 4096).unwrap();

        let err = file.read_page(PageId::new(table, 0)).unwrap_err();
        assert!(matches!(
            err,
            DbError::ShortRead {
                expected: 4096,
                actual: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_partial_trailing_page_counts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");
        std::fs::write(&path, vec![0u8; 4096 + 10]).unwrap();

        let table = TableId::new(1);
        let file = HeapFile::open(&path, table, schema(), 4096).unwrap();
        assert_eq!(file.num_pages().unwrap(), 2);
        assert!(file.read_page(PageId::new(table, 1)).is_err());
    }

    #[test]
    fn test_foreign_page_rejected() {
        let dir = tempdir().unwrap();
        let file =
            HeapFile::open(dir.path().join("t.dat"), TableId::new(1), schema(), 4096).unwrap();
        let foreign = PageId::new(TableId::new(2), 0);
        assert!(file.read_page(foreign).is_err());
    }

    #[test]
    fn test_open_rejects_row_wider_than_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wide.dat");
        let wide = Arc::new(Schema::from_types(&[FieldType::Str; 32]).unwrap());

        let err = HeapFile::open(&path, TableId::new(1), wide, 4096).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_open_rejects_unaddressable_slots() {
        let dir = tempdir().unwrap();
        let narrow = Arc::new(Schema::from_types(&[FieldType::Int]).unwrap());

        let path = dir.path().join("huge.dat");
        assert!(HeapFile::open(&path, TableId::new(1), Arc::clone(&narrow), 1 << 19).is_err());
        assert!(!path.exists());

        let path = dir.path().join("large.dat");
        assert!(HeapFile::open(&path, TableId::new(1), narrow, 1 << 18).is_ok());
    }
}

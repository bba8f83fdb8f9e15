//! Row iteration over a heap file.

use std::sync::Arc;

use heapdb_common::error::DbResult;
use heapdb_common::types::{PageId, TxnId};
use heapdb_txn::LockMode;

use super::HeapFile;
use crate::buffer::BufferPool;
use crate::page::HeapPage;
use crate::tuple::Row;

/// Forward iterator over the live rows of a heap file.
///
/// Pages are fetched lazily, lowest page number first, through the
/// buffer pool under shared locks, so the iterator sees cached and dirty
/// state rather than raw disk. Pages without live rows are skipped. The
/// page count is re-read each time the iterator moves to a new page.
///
/// After an error the iterator is exhausted until [`rewind`](Self::rewind).
pub struct HeapFileIter<'a> {
    pool: &'a BufferPool,
    file: Arc<HeapFile>,
    txn_id: TxnId,
    next_page: u32,
    current: Option<(Arc<HeapPage>, usize)>,
    done: bool,
}

impl<'a> HeapFileIter<'a> {
    pub(crate) fn new(pool: &'a BufferPool, file: Arc<HeapFile>, txn_id: TxnId) -> Self {
        Self {
            pool,
            file,
            txn_id,
            next_page: 0,
            current: None,
            done: false,
        }
    }

    /// Restarts iteration from the first page.
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.current = None;
        self.done = false;
    }

    /// Returns the heap file being scanned.
    pub fn file(&self) -> &Arc<HeapFile> {
        &self.file
    }

    /// Returns the transaction the scan runs under.
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    fn advance_page(&mut self) -> DbResult<bool> {
        if self.next_page >= self.file.num_pages()? {
            return Ok(false);
        }
        let page_id = PageId::new(self.file.table_id(), self.next_page);
        let page = self.pool.get_page(self.txn_id, page_id, LockMode::Shared)?;
        self.next_page += 1;
        self.current = Some((page, 0));
        Ok(true)
    }
}

impl Iterator for HeapFileIter<'_> {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some((page, slot)) = &mut self.current {
                while *slot < page.num_slots() {
                    let at = *slot;
                    *slot += 1;
                    if let Some(row) = page.row(at) {
                        return Some(Ok(row.clone()));
                    }
                }
            }

            match self.advance_page() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    self.current = None;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    self.current = None;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl std::fmt::Debug for HeapFileIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapFileIter")
            .field("table_id", &self.file.table_id())
            .field("txn_id", &self.txn_id)
            .field("next_page", &self.next_page)
            .field("done", &self.done)
            .finish()
    }
}

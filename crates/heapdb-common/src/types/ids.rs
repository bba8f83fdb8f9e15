//! Core identifier types for HeapDB.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Table identifier - names one heap file registered in the catalog.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TableId(u32);

impl TableId {
    /// Creates a new `TableId` from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TableId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

/// Page identifier - a page number within one table's heap file.
///
/// `PageId` is the key of both the page cache and the lock table, so
/// equality and hashing are purely structural.
///
/// # Example
///
/// ```rust
/// use heapdb_common::types::{PageId, TableId};
///
/// let page = PageId::new(TableId::new(1), 42);
/// assert_eq!(page.table_id(), TableId::new(1));
/// assert_eq!(page.page_no(), 42);
/// assert_eq!(page.byte_offset(4096), 42 * 4096);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId {
    table_id: TableId,
    page_no: u32,
}

impl PageId {
    /// Creates a new `PageId`.
    #[inline]
    #[must_use]
    pub const fn new(table_id: TableId, page_no: u32) -> Self {
        Self { table_id, page_no }
    }

    /// Returns the table this page belongs to.
    #[inline]
    #[must_use]
    pub const fn table_id(self) -> TableId {
        self.table_id
    }

    /// Returns the page number within the table.
    #[inline]
    #[must_use]
    pub const fn page_no(self) -> u32 {
        self.page_no
    }

    /// Returns the next page of the same table.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            table_id: self.table_id,
            page_no: self.page_no.saturating_add(1),
        }
    }

    /// Returns the byte offset of this page in its heap file.
    #[inline]
    #[must_use]
    pub const fn byte_offset(self, page_size: usize) -> u64 {
        self.page_no as u64 * page_size as u64
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({}:{})", self.table_id.0, self.page_no)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id.0, self.page_no)
    }
}

/// Transaction identifier - uniquely identifies a transaction.
///
/// One flat transaction id spans every page access a transaction makes
/// until it is explicitly completed.
///
/// # Example
///
/// ```rust
/// use heapdb_common::types::TxnId;
///
/// let txn = TxnId::new(1);
/// assert!(txn.is_valid());
/// assert_eq!(txn.next(), TxnId::new(2));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TxnId(u64);

impl TxnId {
    /// Invalid transaction ID, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// Minimum valid transaction ID.
    pub const MIN: Self = Self(1);

    /// Creates a new `TxnId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next transaction ID.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid transaction ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "TxnId(INVALID)")
        } else {
            write!(f, "TxnId({})", self.0)
        }
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TxnId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<TxnId> for u64 {
    #[inline]
    fn from(id: TxnId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_page_id_structural_equality() {
        let a = PageId::new(TableId::new(1), 5);
        let b = PageId::new(TableId::new(1), 5);
        let c = PageId::new(TableId::new(2), 5);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<PageId> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_page_id_ordering() {
        let t = TableId::new(3);
        assert!(PageId::new(t, 1) < PageId::new(t, 2));
        assert_eq!(PageId::new(t, 1).next(), PageId::new(t, 2));
    }

    #[test]
    fn test_page_id_display() {
        let page = PageId::new(TableId::new(4), 9);
        assert_eq!(page.to_string(), "4:9");
        assert_eq!(format!("{page:?}"), "PageId(4:9)");
    }

    #[test]
    fn test_byte_offset() {
        let page = PageId::new(TableId::new(1), 3);
        assert_eq!(page.byte_offset(4096), 12_288);
    }

    #[test]
    fn test_txn_id() {
        assert!(!TxnId::INVALID.is_valid());
        assert!(TxnId::MIN.is_valid());
        assert_eq!(TxnId::MIN.next().as_u64(), 2);
        assert_eq!(format!("{:?}", TxnId::INVALID), "TxnId(INVALID)");
    }
}

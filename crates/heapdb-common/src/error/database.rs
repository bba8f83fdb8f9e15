//! Database error types.

use std::fmt;
use thiserror::Error;

use crate::types::{PageId, TableId, TxnId};

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Invalid argument provided.
    InvalidArgument = 0x0003,
    /// Invalid configuration.
    InvalidConfig = 0x0006,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,
    /// Data corruption detected.
    Corruption = 0x0104,

    // Storage errors (0x0200 - 0x02FF)
    /// No clean page could be evicted.
    CapacityExhausted = 0x0202,
    /// Row not found at its recorded location.
    RowNotFound = 0x0203,
    /// Page has no free slot.
    PageFull = 0x0207,
    /// Row does not match the table schema.
    SchemaMismatch = 0x0208,
    /// Table not registered in the catalog.
    TableNotFound = 0x0209,
    /// Table name already registered.
    TableExists = 0x020A,
    /// Field name not present in a schema.
    FieldNotFound = 0x020B,

    // Transaction errors (0x0300 - 0x03FF)
    /// Deadlock detected.
    Deadlock = 0x0302,
    /// Lock wait timed out.
    LockTimeout = 0x0303,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Storage",
            0x03 => "Transaction",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for HeapDB.
///
/// # Example
///
/// ```rust
/// use heapdb_common::error::{DbError, DbResult};
/// use heapdb_common::types::{PageId, TableId};
///
/// fn delete_from(page_id: PageId) -> DbResult<()> {
///     Err(DbError::RowNotFound { page_id, slot: 3 })
/// }
///
/// assert!(delete_from(PageId::new(TableId::new(1), 0)).is_err());
/// ```
#[derive(Debug, Error)]
pub enum DbError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// I/O error from the underlying file.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A page read ended before a full page was available.
    #[error("short read of page {page_id}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// The page being read.
        page_id: PageId,
        /// Bytes requested.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Page bytes could not be decoded.
    #[error("page {page_id} is corrupted: {reason}")]
    PageCorrupted {
        /// The corrupted page.
        page_id: PageId,
        /// Reason for corruption.
        reason: String,
    },

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    /// Eviction was required but every resident page is dirty.
    #[error("buffer pool exhausted: all {capacity} resident pages are dirty")]
    CapacityExhausted {
        /// Pool capacity in pages.
        capacity: usize,
    },

    /// Row is no longer present where it was recorded.
    #[error("row not found in slot {slot} of page {page_id}")]
    RowNotFound {
        /// Page the row was recorded on.
        page_id: PageId,
        /// Slot the row was recorded in.
        slot: u16,
    },

    /// Row carries no record id, so its location is unknown.
    #[error("row has no record id")]
    MissingRecordId,

    /// Page has no free slot.
    #[error("page {page_id} has no free slot")]
    PageFull {
        /// The full page.
        page_id: PageId,
    },

    /// Row does not match the schema it is being stored under.
    #[error("schema mismatch: expected ({expected}), got ({actual})")]
    SchemaMismatch {
        /// Schema of the target.
        expected: String,
        /// Schema of the row.
        actual: String,
    },

    /// Table not registered.
    #[error("table {table} not found")]
    TableNotFound {
        /// The missing table, by name or id.
        table: String,
    },

    /// Table name already registered.
    #[error("table '{name}' already exists")]
    TableExists {
        /// The duplicate name.
        name: String,
    },

    /// Field name not present in a schema.
    #[error("field '{name}' not found")]
    FieldNotFound {
        /// The missing field.
        name: String,
    },

    // ==========================================================================
    // Transaction Errors
    // ==========================================================================
    /// Lock request was not granted in time.
    #[error("transaction {txn_id} timed out after {waited_ms}ms waiting for page {page_id}")]
    LockTimeout {
        /// The waiting transaction.
        txn_id: TxnId,
        /// The page it waited for.
        page_id: PageId,
        /// How long it waited.
        waited_ms: u64,
    },

    /// Requester was chosen as a deadlock victim.
    #[error("deadlock detected, transaction {txn_id} was chosen as victim while waiting for page {page_id}")]
    Deadlock {
        /// The aborted transaction.
        txn_id: TxnId,
        /// The page it waited for.
        page_id: PageId,
    },
}

impl DbError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::Io { .. } | Self::ShortRead { .. } => ErrorCode::Io,
            Self::PageCorrupted { .. } => ErrorCode::Corruption,
            Self::CapacityExhausted { .. } => ErrorCode::CapacityExhausted,
            Self::RowNotFound { .. } | Self::MissingRecordId => ErrorCode::RowNotFound,
            Self::PageFull { .. } => ErrorCode::PageFull,
            Self::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            Self::TableNotFound { .. } => ErrorCode::TableNotFound,
            Self::TableExists { .. } => ErrorCode::TableExists,
            Self::FieldNotFound { .. } => ErrorCode::FieldNotFound,
            Self::LockTimeout { .. } => ErrorCode::LockTimeout,
            Self::Deadlock { .. } => ErrorCode::Deadlock,
        }
    }

    /// Returns true if the transaction was aborted by concurrency control.
    ///
    /// When this is true the buffer pool has already rolled the
    /// transaction back and released its locks.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::Deadlock { .. })
    }

    /// Returns true if re-running the whole transaction may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::Deadlock { .. } | Self::CapacityExhausted { .. }
        )
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a page corruption error.
    #[must_use]
    pub fn corrupted(page_id: PageId, reason: impl Into<String>) -> Self {
        Self::PageCorrupted {
            page_id,
            reason: reason.into(),
        }
    }

    /// Creates a table-not-found error for a table id.
    #[must_use]
    pub fn table_not_found(table_id: TableId) -> Self {
        Self::TableNotFound {
            table: table_id.to_string(),
        }
    }
}

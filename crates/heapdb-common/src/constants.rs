//! System-wide constants for HeapDB.
//!
//! These are the defaults an engine starts with when no configuration
//! overrides them. None of them may change while a buffer pool is live.

// =============================================================================
// Page Constants
// =============================================================================

/// Default page size in bytes (4 KB).
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024;

/// Smallest page size accepted by configuration validation.
///
/// Leaves room for at least one row of a two-string schema.
pub const MIN_PAGE_SIZE: usize = 512;

/// Largest page size accepted by configuration validation.
///
/// Slot numbers are 16 bits wide, and a page of single-integer rows at
/// this size still numbers every slot.
pub const MAX_PAGE_SIZE: usize = 256 * 1024;

/// Fixed payload width of a string field, in bytes.
pub const STRING_FIELD_LEN: usize = 128;

/// Width of the length prefix stored in front of every string payload.
pub const STRING_LEN_PREFIX: usize = 4;

/// Width of an integer field, in bytes.
pub const INT_FIELD_LEN: usize = 4;

// =============================================================================
// Buffer Pool Constants
// =============================================================================

/// Default number of pages the buffer pool may keep resident.
pub const DEFAULT_POOL_PAGES: usize = 50;

// =============================================================================
// Lock Constants
// =============================================================================

/// Default maximum time a lock request may wait before aborting.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

/// Default interval between deadlock-detection passes of a blocked request.
pub const DEFAULT_LOCK_POLL_INTERVAL_MS: u64 = 100;

//! Page-level lock table.
//!
//! Every page has a [`LockRecord`] holding a set of shared holders and at
//! most one exclusive holder. A transaction may upgrade its own shared
//! lock to exclusive when it is the only shared holder.
//!
//! # Lock Compatibility Matrix
//!
//! ```text
//!          │ S  │ X  │
//! ─────────┼────┼────┤
//!     S    │ ✓  │ ✗  │
//!     X    │ ✗  │ ✗  │
//! ```
//!
//! Requests by the holder itself are always compatible with its own
//! lock. A shared request by the exclusive holder keeps the exclusive
//! grant as it is.
//!
//! # Waiting
//!
//! A request that cannot be granted registers a [`PendingWait`] and parks
//! on a condition variable notified by every release. Parks are bounded
//! by the poll interval, so each blocked request rebuilds the wait-for
//! graph and runs the deadlock detector at least once per interval. The
//! request fails with [`DbError::LockTimeout`] once the lock timeout has
//! elapsed, or with [`DbError::Deadlock`] when the detector names the
//! requester.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use heapdb_common::config::EngineConfig;
use heapdb_common::constants::{DEFAULT_LOCK_POLL_INTERVAL_MS, DEFAULT_LOCK_TIMEOUT_MS};
use heapdb_common::error::{DbError, DbResult};
use heapdb_common::types::{PageId, TxnId};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::deadlock::{DeadlockDetector, WaitForGraph};

/// Lock mode for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockMode {
    /// Shared lock (read lock).
    Shared,
    /// Exclusive lock (write lock).
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another held by a
    /// different transaction.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "S"),
            LockMode::Exclusive => write!(f, "X"),
        }
    }
}

/// Holders of one page's lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockRecord {
    shared: BTreeSet<TxnId>,
    exclusive: Option<TxnId>,
}

impl LockRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if `mode` can be granted to `txn_id` right now.
    pub fn can_grant(&self, txn_id: TxnId, mode: LockMode) -> bool {
        let no_other_exclusive = self.exclusive.map_or(true, |x| x == txn_id);
        match mode {
            LockMode::Shared => no_other_exclusive,
            LockMode::Exclusive => no_other_exclusive && self.shared.iter().all(|&t| t == txn_id),
        }
    }

    /// Grants `mode` to `txn_id`. Returns true if this upgraded a shared
    /// lock held by the same transaction.
    ///
    /// Callers must check [`can_grant`](Self::can_grant) first.
    pub fn grant(&mut self, txn_id: TxnId, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => {
                if self.exclusive != Some(txn_id) {
                    self.shared.insert(txn_id);
                }
                false
            }
            LockMode::Exclusive => {
                let upgraded = self.shared.remove(&txn_id);
                self.exclusive = Some(txn_id);
                upgraded
            }
        }
    }

    /// Removes `txn_id` from both holder sets. Returns true if it held
    /// anything.
    pub fn release(&mut self, txn_id: TxnId) -> bool {
        let was_shared = self.shared.remove(&txn_id);
        let was_exclusive = self.exclusive == Some(txn_id);
        if was_exclusive {
            self.exclusive = None;
        }
        was_shared || was_exclusive
    }

    /// Returns the mode `txn_id` holds, if any.
    pub fn held_mode(&self, txn_id: TxnId) -> Option<LockMode> {
        if self.exclusive == Some(txn_id) {
            Some(LockMode::Exclusive)
        } else if self.shared.contains(&txn_id) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    /// Returns the holders that keep `txn_id` from being granted `mode`.
    pub fn blockers(&self, txn_id: TxnId, mode: LockMode) -> Vec<TxnId> {
        let mut blockers: Vec<TxnId> = self.exclusive.into_iter().filter(|&x| x != txn_id).collect();
        if mode == LockMode::Exclusive {
            blockers.extend(self.shared.iter().copied().filter(|&t| t != txn_id));
        }
        blockers
    }

    /// Returns the shared holders.
    pub fn shared_holders(&self) -> impl Iterator<Item = TxnId> + '_ {
        self.shared.iter().copied()
    }

    /// Returns the exclusive holder.
    pub fn exclusive_holder(&self) -> Option<TxnId> {
        self.exclusive
    }

    /// Returns true if nobody holds the lock.
    pub fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }
}

/// A blocked lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingWait {
    /// Transaction requesting the lock.
    pub txn_id: TxnId,
    /// Page being requested.
    pub page_id: PageId,
    /// Requested lock mode.
    pub mode: LockMode,
}

/// Statistics about the lock table.
#[derive(Debug, Default)]
pub struct LockStats {
    /// Total lock grants.
    pub acquisitions: AtomicU64,
    /// Total shared-to-exclusive upgrades.
    pub upgrades: AtomicU64,
    /// Total requests that had to wait.
    pub waits: AtomicU64,
    /// Total timeouts.
    pub timeouts: AtomicU64,
    /// Total deadlock victims.
    pub deadlocks: AtomicU64,
    /// Total page releases.
    pub releases: AtomicU64,
}

impl LockStats {
    /// Creates new stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful acquisition.
    pub fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records an upgrade.
    pub fn record_upgrade(&self) {
        self.upgrades.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a wait.
    pub fn record_wait(&self) {
        self.waits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a timeout.
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a deadlock victim.
    pub fn record_deadlock(&self) {
        self.deadlocks.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records `count` page releases.
    pub fn record_releases(&self, count: u64) {
        self.releases.fetch_add(count, AtomicOrdering::Relaxed);
    }

    /// Returns a plain copy of the counters.
    pub fn snapshot(&self) -> LockStatsSnapshot {
        LockStatsSnapshot {
            acquisitions: self.acquisitions.load(AtomicOrdering::Relaxed),
            upgrades: self.upgrades.load(AtomicOrdering::Relaxed),
            waits: self.waits.load(AtomicOrdering::Relaxed),
            timeouts: self.timeouts.load(AtomicOrdering::Relaxed),
            deadlocks: self.deadlocks.load(AtomicOrdering::Relaxed),
            releases: self.releases.load(AtomicOrdering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LockStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockStatsSnapshot {
    /// Total lock grants.
    pub acquisitions: u64,
    /// Total shared-to-exclusive upgrades.
    pub upgrades: u64,
    /// Total requests that had to wait.
    pub waits: u64,
    /// Total timeouts.
    pub timeouts: u64,
    /// Total deadlock victims.
    pub deadlocks: u64,
    /// Total page releases.
    pub releases: u64,
}

/// Configuration for the lock table.
#[derive(Debug, Clone)]
pub struct LockTableConfig {
    /// Maximum time a request may wait.
    pub lock_timeout: Duration,
    /// Longest park between deadlock checks.
    pub poll_interval: Duration,
}

impl Default for LockTableConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_LOCK_POLL_INTERVAL_MS),
        }
    }
}

impl LockTableConfig {
    /// Sets the lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.poll_interval.is_zero() {
            return Err(DbError::invalid_config("poll_interval must be positive"));
        }
        if self.poll_interval > self.lock_timeout {
            return Err(DbError::invalid_config(
                "poll_interval must not exceed lock_timeout",
            ));
        }
        Ok(())
    }
}

impl From<&EngineConfig> for LockTableConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            lock_timeout: config.lock_timeout(),
            poll_interval: config.lock_poll_interval(),
        }
    }
}

/// State guarded by the lock table latch.
#[derive(Debug, Default)]
struct LockTableState {
    records: HashMap<PageId, LockRecord>,
    pending: Vec<PendingWait>,
}

impl LockTableState {
    /// Grants the request if possible. Returns `Some(upgraded)` on grant.
    fn try_grant(&mut self, txn_id: TxnId, page_id: PageId, mode: LockMode) -> Option<bool> {
        let record = self.records.entry(page_id).or_default();
        if record.can_grant(txn_id, mode) {
            Some(record.grant(txn_id, mode))
        } else {
            None
        }
    }

    fn remove_pending(&mut self, txn_id: TxnId, page_id: PageId) {
        self.pending
            .retain(|w| !(w.txn_id == txn_id && w.page_id == page_id));
    }

    fn wait_for_graph(&self) -> WaitForGraph {
        let mut graph = WaitForGraph::new();
        for wait in &self.pending {
            graph.add_txn(wait.txn_id);
            if let Some(record) = self.records.get(&wait.page_id) {
                for holder in record.blockers(wait.txn_id, wait.mode) {
                    graph.add_wait(wait.txn_id, holder);
                }
            }
        }
        graph
    }

    fn release(&mut self, txn_id: TxnId, page_id: PageId) -> bool {
        let Some(record) = self.records.get_mut(&page_id) else {
            return false;
        };
        // Records outlive their holders; an emptied record stays in place.
        record.release(txn_id)
    }
}

/// The page lock table.
///
/// # Example
///
/// ```rust
/// use heapdb_common::types::{PageId, TableId, TxnId};
/// use heapdb_txn::lock::{LockMode, LockTable};
///
/// let locks = LockTable::new();
/// let page = PageId::new(TableId::new(1), 0);
///
/// locks.acquire(TxnId::new(1), page, LockMode::Shared).unwrap();
/// locks.acquire(TxnId::new(2), page, LockMode::Shared).unwrap();
/// assert!(!locks.try_acquire(TxnId::new(3), page, LockMode::Exclusive));
///
/// locks.release_all(TxnId::new(1));
/// locks.release_all(TxnId::new(2));
/// assert!(locks.try_acquire(TxnId::new(3), page, LockMode::Exclusive));
/// ```
pub struct LockTable {
    state: Mutex<LockTableState>,
    /// Notified whenever a holder leaves a record.
    released: Condvar,
    detector: DeadlockDetector,
    config: LockTableConfig,
    stats: LockStats,
}

impl LockTable {
    /// Creates a new lock table with default configuration.
    pub fn new() -> Self {
        Self::with_config(LockTableConfig::default())
    }

    /// Creates a lock table with custom configuration.
    pub fn with_config(config: LockTableConfig) -> Self {
        Self {
            state: Mutex::new(LockTableState::default()),
            released: Condvar::new(),
            detector: DeadlockDetector::new(),
            config,
            stats: LockStats::new(),
        }
    }

    /// Grants the lock if it is compatible right now, without waiting.
    pub fn try_acquire(&self, txn_id: TxnId, page_id: PageId, mode: LockMode) -> bool {
        match self.state.lock().try_grant(txn_id, page_id, mode) {
            Some(upgraded) => {
                self.record_grant(upgraded);
                true
            }
            None => false,
        }
    }

    /// Acquires a lock, blocking until granted, timed out, or chosen as
    /// a deadlock victim.
    ///
    /// On error the request is withdrawn but locks already held by
    /// `txn_id` are untouched; rolling the transaction back is the
    /// caller's job.
    pub fn acquire(&self, txn_id: TxnId, page_id: PageId, mode: LockMode) -> DbResult<()> {
        let start = Instant::now();
        let deadline = start + self.config.lock_timeout;
        let mut state = self.state.lock();
        let mut waiting = false;

        loop {
            if let Some(upgraded) = state.try_grant(txn_id, page_id, mode) {
                if waiting {
                    state.remove_pending(txn_id, page_id);
                }
                self.record_grant(upgraded);
                debug!(txn = %txn_id, page = %page_id, mode = %mode, upgraded, "lock granted");
                return Ok(());
            }

            if !waiting {
                state.pending.push(PendingWait {
                    txn_id,
                    page_id,
                    mode,
                });
                waiting = true;
                self.stats.record_wait();
                debug!(txn = %txn_id, page = %page_id, mode = %mode, "lock request blocked");
            }

            let graph = state.wait_for_graph();
            trace!(txn = %txn_id, page = %page_id, edges = graph.edge_count(), "deadlock check");
            if let Some(info) = self.detector.detect(&graph) {
                if info.victim == txn_id {
                    state.remove_pending(txn_id, page_id);
                    self.stats.record_deadlock();
                    warn!(txn = %txn_id, page = %page_id, cycle = ?info.cycle, "deadlock victim");
                    return Err(DbError::Deadlock { txn_id, page_id });
                }
                // Wake the victim so it notices on its next pass.
                self.released.notify_all();
            }

            let now = Instant::now();
            if now >= deadline {
                state.remove_pending(txn_id, page_id);
                self.stats.record_timeout();
                let waited_ms = now.duration_since(start).as_millis() as u64;
                warn!(txn = %txn_id, page = %page_id, waited_ms, "lock wait timed out");
                return Err(DbError::LockTimeout {
                    txn_id,
                    page_id,
                    waited_ms,
                });
            }

            let park = self.config.poll_interval.min(deadline - now);
            self.released.wait_for(&mut state, park);
        }
    }

    /// Returns true if `txn_id` holds any lock on `page_id`.
    pub fn holds_lock(&self, txn_id: TxnId, page_id: PageId) -> bool {
        self.held_mode(txn_id, page_id).is_some()
    }

    /// Returns the mode `txn_id` holds on `page_id`, if any.
    pub fn held_mode(&self, txn_id: TxnId, page_id: PageId) -> Option<LockMode> {
        self.state
            .lock()
            .records
            .get(&page_id)
            .and_then(|r| r.held_mode(txn_id))
    }

    /// Releases `txn_id`'s lock on one page, with no other bookkeeping.
    ///
    /// Use with care: this bypasses two-phase locking. It exists for
    /// callers that know a page they just inspected needs no protection,
    /// such as a full page skipped during insert.
    pub fn release(&self, txn_id: TxnId, page_id: PageId) -> bool {
        let released = self.state.lock().release(txn_id, page_id);
        if released {
            self.stats.record_releases(1);
            self.released.notify_all();
            trace!(txn = %txn_id, page = %page_id, "lock released");
        }
        released
    }

    /// Releases every lock held by `txn_id`. Returns the number of pages
    /// released.
    pub fn release_all(&self, txn_id: TxnId) -> usize {
        let count = {
            let mut state = self.state.lock();
            let pages: Vec<PageId> = state
                .records
                .iter()
                .filter(|(_, r)| r.held_mode(txn_id).is_some())
                .map(|(p, _)| *p)
                .collect();
            for page in &pages {
                state.release(txn_id, *page);
            }
            pages.len()
        };

        if count > 0 {
            self.stats.record_releases(count as u64);
            self.released.notify_all();
        }
        debug!(txn = %txn_id, count, "released all locks");
        count
    }

    /// Returns the pages `txn_id` holds locks on, in ascending order.
    pub fn pages_locked_by(&self, txn_id: TxnId) -> Vec<PageId> {
        let state = self.state.lock();
        let mut pages: Vec<PageId> = state
            .records
            .iter()
            .filter(|(_, r)| r.held_mode(txn_id).is_some())
            .map(|(p, _)| *p)
            .collect();
        pages.sort();
        pages
    }

    /// Returns a copy of one page's lock record.
    pub fn record(&self, page_id: PageId) -> Option<LockRecord> {
        self.state.lock().records.get(&page_id).cloned()
    }

    /// Builds the wait-for graph for the current state.
    pub fn wait_for_graph(&self) -> WaitForGraph {
        self.state.lock().wait_for_graph()
    }

    /// Returns the number of pages with a lock record, held or not.
    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Returns the number of blocked requests.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LockTableConfig {
        &self.config
    }

    /// Returns statistics.
    pub fn stats(&self) -> &LockStats {
        &self.stats
    }

    /// Returns the deadlock detector.
    pub fn detector(&self) -> &DeadlockDetector {
        &self.detector
    }

    fn record_grant(&self, upgraded: bool) {
        if upgraded {
            self.stats.record_upgrade();
        } else {
            self.stats.record_acquisition();
        }
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockTable")
            .field("record_count", &self.record_count())
            .field("pending_count", &self.pending_count())
            .field("config", &self.config)
            .finish()
    }
}

//! LRU replacement policy.
//!
//! Every access stamps the page with the next value of a logical clock.
//! The oldest stamp is the least recently used page.

use std::collections::HashMap;

use heapdb_common::types::PageId;

/// Tracks recency of resident pages.
#[derive(Debug, Default)]
pub struct LruReplacer {
    clock: u64,
    last_access: HashMap<PageId, u64>,
}

impl LruReplacer {
    /// Creates an empty replacer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `page_id` as most recently used.
    pub fn record_access(&mut self, page_id: PageId) {
        self.clock += 1;
        self.last_access.insert(page_id, self.clock);
    }

    /// Stops tracking `page_id`.
    pub fn remove(&mut self, page_id: PageId) {
        self.last_access.remove(&page_id);
    }

    /// Returns the least recently used page accepted by `evictable`.
    pub fn victim(&self, mut evictable: impl FnMut(PageId) -> bool) -> Option<PageId> {
        self.last_access
            .iter()
            .filter(|(pid, _)| evictable(**pid))
            .min_by_key(|(_, stamp)| **stamp)
            .map(|(pid, _)| *pid)
    }

    /// Returns the least recently used page.
    pub fn oldest(&self) -> Option<PageId> {
        self.victim(|_| true)
    }

    /// Returns the number of tracked pages.
    pub fn len(&self) -> usize {
        self.last_access.len()
    }

    /// Returns true if no page is tracked.
    pub fn is_empty(&self) -> bool {
        self.last_access.is_empty()
    }
}

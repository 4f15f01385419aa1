//! Time-bounded cache of parsed directory listings.
//!
//! The cache owns the item vectors it stores; `get` hands out snapshots so
//! callers never observe an entry that a concurrent eviction is freeing.
//! Invalidation matches whole path components: invalidating `/a` removes
//! `/a` and `/a/b` but leaves `/ab` alone.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::trace;

use super::{lock, FtpItem};

struct ListingEntry {
    items: Vec<FtpItem>,
    stamp: Instant,
}

/// Map from absolute directory path to its most recent parsed listing.
/// One internal mutex guards all reads and mutations.
pub struct ListingCache {
    timeout: Duration,
    entries: Mutex<HashMap<String, ListingEntry>>,
}

impl ListingCache {
    /// An empty cache whose entries expire `timeout` after insertion.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of the cached items for `path`, if present and fresh.
    /// An expired entry is evicted on the way out.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Vec<FtpItem>> {
        let mut entries = lock(&self.entries);
        match entries.get(path) {
            Some(entry) if entry.stamp.elapsed() <= self.timeout => {
                trace!(path, "listing cache hit");
                Some(entry.items.clone())
            }
            Some(_) => {
                trace!(path, "listing cache entry expired");
                entries.remove(path);
                None
            }
            None => None,
        }
    }

    /// Stores `items` as the listing for `path`, replacing any prior entry
    /// and resetting its age. The cache takes ownership of the vector.
    pub fn put(&self, path: &str, items: Vec<FtpItem>) {
        let mut entries = lock(&self.entries);
        trace!(path, count = items.len(), "listing cache store");
        entries.insert(
            path.to_owned(),
            ListingEntry {
                items,
                stamp: Instant::now(),
            },
        );
    }

    /// Removes the entry for `prefix` and every entry below it. `/` clears
    /// the whole cache.
    pub fn invalidate(&self, prefix: &str) {
        let mut entries = lock(&self.entries);
        if prefix == "/" {
            trace!("listing cache cleared");
            entries.clear();
            return;
        }
        entries.retain(|path, _| {
            let under = path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'));
            if under {
                trace!(path, "listing cache invalidated");
            }
            !under
        });
    }
}

//! A bounded cache of recently decompressed chunk payloads, keyed by logical start, plus a
//! per-key lock that deduplicates concurrent decompression of the same chunk.
//!
//! The per-key lock is not a mutex over the cached payload - see the design note on
//! `Coordinator<Key>` in SPEC_FULL.md §9. It exists purely so that when two threads both
//! need chunk X at once, only one of them decompresses it; the other waits, then finds it
//! in the cache.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

struct LockEntry {
    cv: Condvar,
}

struct Inner {
    lru: LruCache<u64, Vec<u8>>,
    locks: HashMap<u64, Arc<LockEntry>>,
}

pub struct DecompressionCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl DecompressionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                lru: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
                locks: HashMap::new(),
            }),
        }
    }

    /// Blocks until no other thread holds the lock for `key`, then returns a guard that
    /// releases it on drop - the only way to release the lock, so `lock`/`unlock` can never
    /// be mismatched even on an error path.
    pub fn lock(&self, key: u64) -> CacheGuard<'_> {
        loop {
            let mut inner = self.inner.lock();
            match inner.locks.get(&key).cloned() {
                None => {
                    inner.locks.insert(key, Arc::new(LockEntry { cv: Condvar::new() }));
                    return CacheGuard { cache: self, key };
                }
                Some(existing) => {
                    // `Condvar::wait` needs a MutexGuard from the *same* parking_lot::Mutex
                    // the notifier locks before calling notify_all; reuse `inner` itself so
                    // the entry can't be removed and re-inserted between release and wait.
                    existing.cv.wait(&mut inner);
                }
            }
        }
    }

    fn unlock(&self, key: u64) {
        let mut inner = self.inner.lock();
        // Remove and notify under the same critical section: a waiter reacquires `inner`
        // inside `Condvar::wait` before it can observe the map again, so it always sees the
        // entry already gone and loops back to register a fresh one - never an entry that
        // is about to be removed with no further notification coming.
        if let Some(entry) = inner.locks.remove(&key) {
            entry.cv.notify_all();
        }
    }

    pub fn get(&self, key: u64) -> Option<Vec<u8>> {
        self.inner.lock().lru.get(&key).cloned()
    }

    pub fn put(&self, key: u64, bytes: &[u8]) {
        let mut inner = self.inner.lock();

        let mut owned = Vec::new();
        if owned.try_reserve_exact(bytes.len()).is_err() {
            debug!(capacity = self.capacity, "cache allocation failed, clearing");
            inner.lru.clear();
            return;
        }
        owned.extend_from_slice(bytes);
        inner.lru.put(key, owned);

        if inner.lru.len() > self.capacity {
            debug!(len = inner.lru.len(), capacity = self.capacity, "cache over bound, clearing");
            inner.lru.clear();
        }
    }
}

/// RAII guard returned by [`DecompressionCache::lock`]; releases the per-key lock on drop.
pub struct CacheGuard<'a> {
    cache: &'a DecompressionCache,
    key: u64,
}

impl Drop for CacheGuard<'_> {
    fn drop(&mut self) {
        self.cache.unlock(self.key);
    }
}

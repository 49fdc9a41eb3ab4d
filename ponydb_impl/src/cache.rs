//! Row cache (part of C5, §4.5).
//!
//! A client-side, size-bounded map from `(resultId, rowIndex)` to a decoded
//! cell vector, backed by an LRU eviction policy.

use crate::config::ConnectionConfiguration;
use crate::wire::Value;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

type Key = (i32, u32);

struct Inner {
    cache: LruCache<Key, Vec<Value>>,
    byte_budget: usize,
    bytes_used: usize,
}

/// Size-bounded LRU cache of decoded rows, shared by every cursor on a
/// connection (§3, "Row cache key/value"; §4.5).
pub struct RowCache {
    inner: Mutex<Inner>,
    admission_threshold: usize,
}

impl std::fmt::Debug for RowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCache").finish_non_exhaustive()
    }
}

impl RowCache {
    pub fn new(config: &ConnectionConfiguration) -> Self {
        let capacity = NonZeroUsize::new(config.row_cache_capacity().max(1)).unwrap();
        Self {
            inner: Mutex::new(Inner {
                cache: LruCache::new(capacity),
                byte_budget: config.row_cache_byte_budget(),
                bytes_used: 0,
            }),
            admission_threshold: config.cache_admission_threshold(),
        }
    }

    pub fn get(&self, result_id: i32, row_index: u32) -> Option<Vec<Value>> {
        self.inner
            .lock()
            .ok()?
            .cache
            .get(&(result_id, row_index))
            .cloned()
    }

    /// Inserts a decoded row unless its estimated encoded size exceeds the
    /// admission threshold (§3, §4.5: "this prevents large-object-heavy
    /// result sets from evicting useful small rows").
    pub fn insert(&self, result_id: i32, row_index: u32, row: Vec<Value>) {
        let size: usize = row.iter().map(Value::encoded_size_estimate).sum();
        if size > self.admission_threshold {
            trace!("row cache bypass: result_id={result_id} row={row_index} size={size}");
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        while inner.bytes_used + size > inner.byte_budget && inner.cache.pop_lru().is_some() {
            // size-bounded eviction; `pop_lru` already removed the oldest entry.
            // We don't track per-entry sizes precisely, so this is a coarse
            // backstop on top of the element-count LRU bound.
        }
        trace!("row cache admit: result_id={result_id} row={row_index} size={size}");
        inner.cache.put((result_id, row_index), row);
        inner.bytes_used = inner.bytes_used.saturating_add(size);
    }

    /// Logically invalidates every entry for `result_id` (§3, invariant I4).
    pub fn invalidate_result(&self, result_id: i32) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let stale: Vec<Key> = inner
            .cache
            .iter()
            .map(|(k, _)| *k)
            .filter(|(rid, _)| *rid == result_id)
            .collect();
        for key in stale {
            inner.cache.pop(&key);
        }
    }

    /// Largest contiguous prefix and suffix of `[start, end)` already resident
    /// in the cache, used to shrink the hole a block fetch must request
    /// (§4.5, "Row cache").
    pub fn contiguous_bounds(&self, result_id: i32, start: u32, end: u32) -> (u32, u32) {
        if start >= end {
            return (start, start);
        }
        let Ok(mut inner) = self.inner.lock() else {
            return (start, start);
        };
        let mut prefix_end = start;
        while prefix_end < end && inner.cache.contains(&(result_id, prefix_end)) {
            prefix_end += 1;
        }
        let mut suffix_start = end;
        while suffix_start > prefix_end && inner.cache.contains(&(result_id, suffix_start - 1)) {
            suffix_start -= 1;
        }
        (prefix_end, suffix_start)
    }
}

//! Runtime configuration of a connection (§10.3).
//!
//! A plain builder struct, cloned into every [`crate::cursor::ResultSet`] it
//! produces so that a cursor's behaviour never changes mid-lifetime even if
//! the connection's configuration is later mutated.

use std::time::Duration;

/// Default number of rows fetched per `RESULT_SECTION` round trip (§4.5).
pub const DEFAULT_FETCH_SIZE: u32 = 32;

/// Hard upper bound on `fetch_size` (§4.5).
pub const MAX_FETCH_SIZE: u32 = 512;

/// Default row-count threshold below which a result is eagerly inlined (§4.5).
pub const DEFAULT_INLINE_THRESHOLD: u32 = 40;

/// Byte-size threshold above which a decoded row bypasses the row cache (§4.5, §3).
pub const DEFAULT_CACHE_ADMISSION_THRESHOLD: usize = 3200;

/// Default large-object chunk size for both upload and download (§4.4).
pub const DEFAULT_LOB_CHUNK_SIZE: usize = 64 * 1024;

/// A collection of settings that influence the runtime behaviour of a
/// connection and the cursors it produces.
#[derive(Clone, Debug)]
pub struct ConnectionConfiguration {
    fetch_size: u32,
    max_rows: Option<u32>,
    row_cache_capacity: usize,
    row_cache_byte_budget: usize,
    cache_admission_threshold: usize,
    small_result_inlining: bool,
    inline_threshold: u32,
    lob_chunk_size: usize,
    query_timeout: Option<Duration>,
    case_insensitive_columns: bool,
    trigger_queue_bound: usize,
}

impl Default for ConnectionConfiguration {
    fn default() -> Self {
        Self {
            fetch_size: DEFAULT_FETCH_SIZE,
            max_rows: None,
            row_cache_capacity: 10_000,
            row_cache_byte_budget: 16 * 1024 * 1024,
            cache_admission_threshold: DEFAULT_CACHE_ADMISSION_THRESHOLD,
            small_result_inlining: true,
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            lob_chunk_size: DEFAULT_LOB_CHUNK_SIZE,
            query_timeout: None,
            case_insensitive_columns: true,
            trigger_queue_bound: 1024,
        }
    }
}

impl ConnectionConfiguration {
    /// Rows fetched per block (§4.5); clamped to `[1, MAX_FETCH_SIZE]`.
    #[must_use]
    pub fn with_fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = fetch_size.clamp(1, MAX_FETCH_SIZE);
        self
    }

    pub fn fetch_size(&self) -> u32 {
        self.fetch_size
    }

    #[must_use]
    pub fn with_max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    pub fn max_rows(&self) -> Option<u32> {
        self.max_rows
    }

    #[must_use]
    pub fn with_row_cache_capacity(mut self, capacity: usize) -> Self {
        self.row_cache_capacity = capacity;
        self
    }

    pub fn row_cache_capacity(&self) -> usize {
        self.row_cache_capacity
    }

    #[must_use]
    pub fn with_row_cache_byte_budget(mut self, bytes: usize) -> Self {
        self.row_cache_byte_budget = bytes;
        self
    }

    pub fn row_cache_byte_budget(&self) -> usize {
        self.row_cache_byte_budget
    }

    #[must_use]
    pub fn with_cache_admission_threshold(mut self, bytes: usize) -> Self {
        self.cache_admission_threshold = bytes;
        self
    }

    pub fn cache_admission_threshold(&self) -> usize {
        self.cache_admission_threshold
    }

    #[must_use]
    pub fn with_small_result_inlining(mut self, enabled: bool) -> Self {
        self.small_result_inlining = enabled;
        self
    }

    pub fn small_result_inlining(&self) -> bool {
        self.small_result_inlining
    }

    #[must_use]
    pub fn with_inline_threshold(mut self, rows: u32) -> Self {
        self.inline_threshold = rows;
        self
    }

    pub fn inline_threshold(&self) -> u32 {
        self.inline_threshold
    }

    #[must_use]
    pub fn with_lob_chunk_size(mut self, bytes: usize) -> Self {
        self.lob_chunk_size = bytes.max(1);
        self
    }

    pub fn lob_chunk_size(&self) -> usize {
        self.lob_chunk_size
    }

    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    /// Overridden by the server's declared flag from `SHOW CONNECTION_INFO` once
    /// a connection is established (§4.6).
    #[must_use]
    pub fn with_case_insensitive_columns(mut self, enabled: bool) -> Self {
        self.case_insensitive_columns = enabled;
        self
    }

    pub fn case_insensitive_columns(&self) -> bool {
        self.case_insensitive_columns
    }

    #[must_use]
    pub fn with_trigger_queue_bound(mut self, bound: usize) -> Self {
        self.trigger_queue_bound = bound.max(1);
        self
    }

    pub fn trigger_queue_bound(&self) -> usize {
        self.trigger_queue_bound
    }
}

//! Length-bucketed cache of reusable `f64` buffers.

use log::trace;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default budget for [`CacheConfig::max_floats`] (4 Mi floats, 32 MiB).
pub const DEFAULT_MAX_FLOATS: usize = 4 << 20;

/// Configuration for a [`VectorCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of floats held across all cached buffers.
    ///
    /// A buffer whose length would push the total past this budget is dropped
    /// instead of cached. Zero disables caching entirely.
    pub max_floats: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_floats: DEFAULT_MAX_FLOATS,
        }
    }
}

/// Snapshot of a cache's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Total floats held in cached buffers.
    pub floats: usize,
    /// Number of cached buffers.
    pub buffers: usize,
}

#[derive(Default)]
struct CacheState {
    buckets: HashMap<usize, Vec<Vec<f64>>>,
    float_count: usize,
}

/// Concurrency-safe pool of previously allocated buffers, bucketed by length.
///
/// The cache never influences results: [`alloc`](Self::alloc) always returns a
/// zero-filled buffer whether it was reused or freshly allocated.
pub struct VectorCache {
    max_floats: usize,
    state: Mutex<CacheState>,
}

impl VectorCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            max_floats: config.max_floats,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Create a cache that never retains buffers (always allocates).
    pub fn disabled() -> Self {
        Self::new(CacheConfig { max_floats: 0 })
    }

    /// Configured float budget.
    pub fn max_floats(&self) -> usize {
        self.max_floats
    }

    /// Check whether this cache can ever hold a buffer.
    pub fn is_enabled(&self) -> bool {
        self.max_floats > 0
    }

    /// Return a zero-filled buffer of length `len`, reusing a cached one if
    /// available.
    pub fn alloc(&self, len: usize) -> Vec<f64> {
        if len == 0 || !self.is_enabled() {
            return vec![0.0; len];
        }
        let cached = {
            let mut state = self.lock();
            let buf = state.buckets.get_mut(&len).and_then(Vec::pop);
            if buf.is_some() {
                state.float_count -= len;
            }
            buf
        };
        match cached {
            Some(mut buf) => {
                buf.fill(0.0);
                buf
            }
            None => vec![0.0; len],
        }
    }

    /// Hand a buffer back to the cache.
    ///
    /// The buffer is dropped if caching it would exceed the float budget.
    pub fn free(&self, buf: Vec<f64>) {
        let len = buf.len();
        if len == 0 {
            return;
        }
        let mut state = self.lock();
        if state.float_count + len > self.max_floats {
            trace!(
                "dropping buffer of {len} floats ({} cached, budget {})",
                state.float_count, self.max_floats
            );
            return;
        }
        state.float_count += len;
        state.buckets.entry(len).or_default().push(buf);
    }

    /// Current contents of the cache.
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            floats: state.float_count,
            buffers: state.buckets.values().map(Vec::len).sum(),
        }
    }

    /// Drop every cached buffer.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.buckets.clear();
        state.float_count = 0;
    }

    // A panic while holding the lock cannot leave the bucket table in a state
    // that breaks later callers, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for VectorCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl Debug for VectorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("VectorCache")
            .field("max_floats", &self.max_floats)
            .field("floats", &stats.floats)
            .field("buffers", &stats.buffers)
            .finish()
    }
}

//! Allocation context threaded through node constructors.

use super::buffer::Buffer;
use super::cache::{CacheConfig, VectorCache};
use std::sync::Arc;

/// Handle to the [`VectorCache`] that node outputs and scratch vectors are
/// drawn from.
///
/// Cloning a context is cheap and shares the cache. Every node constructor
/// that allocates takes a `&Context`; there is no process-wide default cache.
#[derive(Debug, Clone)]
pub struct Context {
    cache: Arc<VectorCache>,
}

impl Context {
    /// Create a context over an existing cache.
    pub fn new(cache: Arc<VectorCache>) -> Self {
        Self { cache }
    }

    /// Create a context with a private cache.
    pub fn with_config(config: CacheConfig) -> Self {
        Self::new(Arc::new(VectorCache::new(config)))
    }

    /// Create a context that always allocates fresh buffers.
    pub fn uncached() -> Self {
        Self::new(Arc::new(VectorCache::disabled()))
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<VectorCache> {
        &self.cache
    }

    /// Zero-filled buffer of length `len`.
    pub fn alloc(&self, len: usize) -> Buffer {
        Buffer::new(self.cache.alloc(len), Arc::clone(&self.cache))
    }

    /// Buffer holding a copy of `data`.
    pub fn copy_of(&self, data: &[f64]) -> Buffer {
        let mut buf = self.alloc(data.len());
        buf.copy_from_slice(data);
        buf
    }

    /// Buffer with `f` applied to every element of `data`.
    pub fn map(&self, data: &[f64], f: impl Fn(f64) -> f64) -> Buffer {
        let mut buf = self.alloc(data.len());
        for (dst, &x) in buf.iter_mut().zip(data) {
            *dst = f(x);
        }
        buf
    }

    /// Buffer with `f` applied pairwise to `a` and `b`.
    ///
    /// # Panics
    ///
    /// Panics if the lengths differ.
    pub fn zip(&self, a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Buffer {
        assert_eq!(a.len(), b.len(), "zip: length mismatch");
        let mut buf = self.alloc(a.len());
        for ((dst, &x), &y) in buf.iter_mut().zip(a).zip(b) {
            *dst = f(x, y);
        }
        buf
    }

    /// Return a vector taken out of a buffer (e.g. a gradient entry) to the cache.
    pub fn recycle(&self, data: Vec<f64>) {
        self.cache.free(data);
    }
}

impl Default for Context {
    /// A context with its own cache using [`CacheConfig::default`].
    fn default() -> Self {
        Self::with_config(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_release() {
        let ctx = Context::default();
        let buf = ctx.alloc(3);
        assert_eq!(buf.as_slice(), &[0.0; 3]);
        drop(buf);
        assert_eq!(ctx.cache().stats().buffers, 1);
    }

    #[test]
    fn test_uncached_never_stores() {
        let ctx = Context::uncached();
        drop(ctx.copy_of(&[1.0, 2.0]));
        assert_eq!(ctx.cache().stats().buffers, 0);
    }

    #[test]
    fn test_map_and_zip() {
        let ctx = Context::default();
        let m = ctx.map(&[1.0, 2.0], |x| x * 3.0);
        assert_eq!(m.as_slice(), &[3.0, 6.0]);
        let z = ctx.zip(&[1.0, 2.0], &[3.0, 4.0], |x, y| x - y);
        assert_eq!(z.as_slice(), &[-2.0, -2.0]);
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn test_zip_length_mismatch() {
        let ctx = Context::default();
        ctx.zip(&[1.0], &[1.0, 2.0], |x, y| x + y);
    }

    #[test]
    fn test_clones_share_cache() {
        let ctx = Context::default();
        let other = ctx.clone();
        drop(other.alloc(5));
        assert_eq!(ctx.cache().stats().floats, 5);
    }
}

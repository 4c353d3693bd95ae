//! Cache-backed data buffer.

use super::cache::VectorCache;
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A `Vec<f64>` lent from a [`VectorCache`].
///
/// Node outputs and backward scratch vectors are `Buffer`s. Dropping a buffer
/// hands its storage back to the cache it came from, so releasing a graph is
/// just dropping its last handle.
pub struct Buffer {
    data: Vec<f64>,
    cache: Arc<VectorCache>,
}

impl Buffer {
    #[inline]
    pub(crate) fn new(data: Vec<f64>, cache: Arc<VectorCache>) -> Self {
        Self { data, cache }
    }

    /// Length of buffer (number of elements).
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get immutable slice of data.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Get mutable slice of data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Take the underlying vector; it will not be returned to the cache.
    pub fn into_vec(mut self) -> Vec<f64> {
        std::mem::take(&mut self.data)
    }
}

impl Deref for Buffer {
    type Target = [f64];

    #[inline]
    fn deref(&self) -> &[f64] {
        &self.data
    }
}

impl DerefMut for Buffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Clone for Buffer {
    fn clone(&self) -> Self {
        let mut data = self.cache.alloc(self.data.len());
        data.copy_from_slice(&self.data);
        Self::new(data, Arc::clone(&self.cache))
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.cache.free(std::mem::take(&mut self.data));
    }
}

impl Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.data.iter()).finish()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CacheConfig;

    fn cache() -> Arc<VectorCache> {
        Arc::new(VectorCache::new(CacheConfig::default()))
    }

    #[test]
    fn test_buffer_deref() {
        let mut buf = Buffer::new(vec![1.0, 2.0, 3.0], cache());
        buf[1] = 5.0;
        assert_eq!(buf.as_slice(), &[1.0, 5.0, 3.0]);
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_drop_returns_to_cache() {
        let cache = cache();
        let buf = Buffer::new(vec![1.0; 4], Arc::clone(&cache));
        assert_eq!(cache.stats().buffers, 0);
        drop(buf);
        assert_eq!(cache.stats().buffers, 1);
        assert_eq!(cache.stats().floats, 4);
    }

    #[test]
    fn test_into_vec_skips_cache() {
        let cache = cache();
        let buf = Buffer::new(vec![1.0, 2.0], Arc::clone(&cache));
        assert_eq!(buf.into_vec(), vec![1.0, 2.0]);
        assert_eq!(cache.stats().buffers, 0);
    }

    #[test]
    fn test_clone_copies() {
        let cache = cache();
        let buf = Buffer::new(vec![1.0, 2.0], Arc::clone(&cache));
        let copy = buf.clone();
        assert_eq!(buf, copy);
        assert_ne!(buf.as_ptr(), copy.as_ptr());
    }
}

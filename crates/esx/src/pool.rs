//! ♻️ pool — reusable response buffers.
//!
//! A multi-terabyte export is thousands of pages, and every page is one response body.
//! Allocating (and regrowing) a fresh `Vec<u8>` for each would be the allocator's own
//! personal Groundhog Day. So the buffers come back here and go out again, empty but
//! with their capacity intact.
//!
//! Requests are strictly sequential, so in practice one buffer circulates. The pool is
//! still a real pool so the estimator's probe and the page loop can share it. 🦆

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

/// ♻️ Homogeneous pool of byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    initial_capacity: usize,
    max_retained: usize,
}

impl BufferPool {
    /// 🏗️ `initial_capacity` is what a brand-new buffer starts with; `max_retained` caps
    /// how many idle buffers we hang on to.
    pub fn new(initial_capacity: usize, max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            initial_capacity,
            max_retained,
        }
    }

    /// 📤 Take a buffer. It is always empty; it may already be big.
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let recycled = self.lock().pop();
        let buf = recycled.unwrap_or_else(|| Vec::with_capacity(self.initial_capacity));
        PooledBuffer { pool: self, buf }
    }

    /// 📥 Hand a buffer back. Truncated to empty here, capacity kept.
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }

    /// 📊 How many idle buffers are waiting.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<u8>>> {
        // -- a panic while holding this lock can't leave a Vec<Vec<u8>> half-updated
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        // 📦 1 MiB to start, a couple spares
        Self::new(1024 * 1024, 2)
    }
}

/// 📦 A buffer on loan. Goes back to the pool when dropped.
#[derive(Debug)]
pub struct PooledBuffer<'p> {
    pool: &'p BufferPool,
    buf: Vec<u8>,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_a_buffer_comes_back_empty_but_roomy() {
        let pool = BufferPool::new(16, 2);
        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(&[7u8; 4096]);
        }
        assert_eq!(pool.idle(), 1);
        let buf = pool.acquire();
        assert!(buf.is_empty(), "recycled buffers must be truncated");
        assert!(buf.capacity() >= 4096, "capacity should survive the round trip");
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn the_one_where_the_pool_refuses_to_hoard() {
        let pool = BufferPool::new(8, 1);
        let first = pool.acquire();
        let second = pool.acquire();
        drop(first);
        drop(second);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn the_one_where_owned_vectors_can_be_released_explicitly() {
        let pool = BufferPool::new(8, 4);
        pool.release(b"leftovers".to_vec());
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 9);
    }
}

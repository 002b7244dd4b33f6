//! A pooled allocator for decompressed-chunk buffers, with copy-on-refill semantics so a
//! cloned cursor can keep reading a stable snapshot until it refills for itself.

use std::sync::{Arc, Mutex, Weak};

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
}

/// Hands out [`SharedBuffer`]s and reclaims their backing allocation once the last handle
/// sharing a buffer is dropped.
#[derive(Clone)]
pub struct SharedBufferPool(Arc<PoolInner>);

impl Default for SharedBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedBufferPool {
    pub fn new() -> Self {
        Self(Arc::new(PoolInner {
            free: Mutex::new(Vec::new()),
        }))
    }

    /// Returns a buffer of exactly `min_capacity` bytes, reusing a released allocation with
    /// enough capacity when one is available.
    pub fn acquire(&self, min_capacity: usize) -> SharedBuffer {
        let mut free = self.0.free.lock().unwrap();
        let reused = free
            .iter()
            .position(|b| b.capacity() >= min_capacity)
            .map(|pos| free.swap_remove(pos));
        drop(free);

        let mut data = reused.unwrap_or_default();
        data.clear();
        data.resize(min_capacity, 0);

        SharedBuffer(Arc::new(BufferHandle {
            data,
            pool: Arc::downgrade(&self.0),
        }))
    }
}

struct BufferHandle {
    data: Vec<u8>,
    pool: Weak<PoolInner>,
}

impl Drop for BufferHandle {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            let buf = std::mem::take(&mut self.data);
            pool.free.lock().unwrap().push(buf);
        }
    }
}

/// A reference-counted decompressed-chunk buffer.
///
/// While `ref_count() == 1` the holder may write into it via [`SharedBuffer::make_mut`]
/// without reallocating; once cloned (e.g. by a cloned cursor sharing the current chunk),
/// the next writer must reallocate rather than mutate in place, leaving prior clones holding
/// a stable snapshot.
#[derive(Clone)]
pub struct SharedBuffer(Arc<BufferHandle>);

impl SharedBuffer {
    pub fn empty(pool: &SharedBufferPool) -> Self {
        pool.acquire(0)
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0.data
    }

    /// Returns a mutable view of at least `min_capacity` bytes, reallocating from `pool`
    /// first if this buffer is shared or too small.
    pub fn make_mut(&mut self, pool: &SharedBufferPool, min_capacity: usize) -> &mut [u8] {
        if self.ref_count() > 1 || self.0.data.len() < min_capacity {
            *self = pool.acquire(min_capacity);
        }
        let handle = Arc::get_mut(&mut self.0).expect("unique after acquire");
        &mut handle.data[..min_capacity]
    }
}

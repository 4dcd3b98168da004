//! Reusable frame buffer pool
//!
//! Per-frame scratch planes (luminance, masks) are borrowed from here instead
//! of allocated. Borrowing never blocks: an empty pool allocates a fresh
//! buffer. Returning to a full pool frees the buffer.

use crate::types::{FrameSize, BYTES_PER_PIXEL};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct FrameBufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    max_pool_size: AtomicUsize,
    allocations: AtomicU64,
    reuses: AtomicU64,
}

impl FrameBufferPool {
    pub fn new(max_pool_size: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(max_pool_size)),
            max_pool_size: AtomicUsize::new(max_pool_size),
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
        }
    }

    fn buffers(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Borrow a zeroed buffer of exactly `len` bytes
    pub fn acquire(&self, len: usize) -> PooledBuffer<'_> {
        let recycled = self.buffers().pop();
        let data = match recycled {
            Some(mut buf) => {
                self.reuses.fetch_add(1, Ordering::Relaxed);
                buf.clear();
                buf.resize(len, 0);
                buf
            }
            None => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                log::trace!("Pool empty, allocating {} byte buffer", len);
                vec![0u8; len]
            }
        };

        PooledBuffer {
            pool: self,
            data: Some(data),
        }
    }

    /// One byte per pixel (luminance or mask plane)
    pub fn acquire_plane(&self, size: FrameSize) -> PooledBuffer<'_> {
        self.acquire(size.area() as usize)
    }

    /// Packed RGB24 frame buffer
    pub fn acquire_rgb(&self, size: FrameSize) -> PooledBuffer<'_> {
        self.acquire(size.area() as usize * BYTES_PER_PIXEL)
    }

    /// Hand a buffer back. Kept only while the pool is below capacity.
    pub fn release(&self, buffer: Vec<u8>) {
        let mut buffers = self.buffers();
        let max = self.max_pool_size();
        if buffers.len() < max {
            buffers.push(buffer);
        } else {
            log::trace!("Pool full ({}), freeing returned buffer", max);
        }
    }

    /// Buffers currently parked in the pool
    pub fn pool_size(&self) -> usize {
        self.buffers().len()
    }

    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size.load(Ordering::Acquire)
    }

    /// Change capacity. Shrinking frees parked buffers beyond the new limit.
    pub fn set_max_pool_size(&self, max_pool_size: usize) {
        let mut buffers = self.buffers();
        self.max_pool_size.store(max_pool_size, Ordering::Release);
        if buffers.len() > max_pool_size {
            let freed = buffers.len() - max_pool_size;
            buffers.truncate(max_pool_size);
            log::debug!("Pool capacity now {}, freed {} buffers", max_pool_size, freed);
        }
    }

    /// Fresh allocations made because the pool was empty
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    pub fn reuses(&self) -> u64 {
        self.reuses.load(Ordering::Relaxed)
    }

    /// Free every parked buffer. Safe to call repeatedly.
    pub fn cleanup(&self) {
        let mut buffers = self.buffers();
        let freed = buffers.len();
        buffers.clear();
        buffers.shrink_to_fit();
        if freed > 0 {
            log::debug!("Buffer pool cleaned up, freed {} buffers", freed);
        }
    }
}

/// Scoped borrow from a [`FrameBufferPool`]; returns itself on drop.
#[derive(Debug)]
pub struct PooledBuffer<'a> {
    pool: &'a FrameBufferPool,
    data: Option<Vec<u8>>,
}

impl PooledBuffer<'_> {
    /// Take the buffer out of pool management entirely
    pub fn detach(mut self) -> Vec<u8> {
        self.data.take().unwrap_or_default()
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.release(data);
        }
    }
}

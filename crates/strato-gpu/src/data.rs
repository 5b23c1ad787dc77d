//! Transient staging memory for deferred updates.
//!
//! Update commands outlive the caller's buffers, so their payloads are
//! copied into [`DataSlice`]s owned by the queued closure. Small slices
//! draw from a pool of recycled blocks; anything at or above
//! [`DataAllocator::BLOCK_SIZE`] gets a dedicated allocation that is freed
//! on drop instead of pooled.

use std::mem;
use std::sync::{Arc, Mutex, Weak};

struct DataPool {
    free: Mutex<Vec<Vec<u8>>>,
}

/// Allocator handing out transient byte slices.
#[derive(Clone)]
pub struct DataAllocator {
    pool: Arc<DataPool>,
}

impl DataAllocator {
    /// Size of one pooled block, and the threshold above which an
    /// allocation bypasses the pool.
    pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

    pub fn new() -> Self {
        Self {
            pool: Arc::new(DataPool {
                free: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Allocates a zero-initialized slice of `len` bytes.
    pub fn alloc(&self, len: usize) -> DataSlice {
        if len >= Self::BLOCK_SIZE {
            return DataSlice {
                bytes: vec![0; len],
                pool: None,
            };
        }

        let recycled = self.pool.free.lock().unwrap().pop();
        let mut bytes = recycled.unwrap_or_else(|| Vec::with_capacity(Self::BLOCK_SIZE));
        bytes.clear();
        bytes.resize(len, 0);

        DataSlice {
            bytes,
            pool: Some(Arc::downgrade(&self.pool)),
        }
    }

    /// Number of blocks currently sitting in the free list.
    pub fn free_blocks(&self) -> usize {
        self.pool.free.lock().unwrap().len()
    }
}

impl Default for DataAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A transient byte slice. Pooled slices return their block to the
/// allocator when dropped.
pub struct DataSlice {
    bytes: Vec<u8>,
    pool: Option<Weak<DataPool>>,
}

impl DataSlice {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for DataSlice {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let block = mem::take(&mut self.bytes);
        pool.free.lock().unwrap().push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_blocks_are_recycled() {
        let allocator = DataAllocator::new();

        let slice = allocator.alloc(64);
        assert_eq!(slice.len(), 64);
        assert_eq!(allocator.free_blocks(), 0);
        drop(slice);
        assert_eq!(allocator.free_blocks(), 1);

        let again = allocator.alloc(128);
        assert_eq!(allocator.free_blocks(), 0);
        assert_eq!(again.len(), 128);
        assert!(again.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn large_allocations_bypass_the_pool() {
        let allocator = DataAllocator::new();

        let slice = allocator.alloc(DataAllocator::BLOCK_SIZE);
        drop(slice);
        assert_eq!(allocator.free_blocks(), 0);

        let below = allocator.alloc(DataAllocator::BLOCK_SIZE - 1);
        drop(below);
        assert_eq!(allocator.free_blocks(), 1);
    }

    #[test]
    fn dropping_the_allocator_orphans_outstanding_slices() {
        let allocator = DataAllocator::new();
        let slice = allocator.alloc(16);
        drop(allocator);
        // Returning to a dead pool is a no-op rather than a leak or panic.
        drop(slice);
    }
}

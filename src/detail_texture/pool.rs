//! GPU storage-buffer pool (spec.md §4.7 "GPU storage buffer pool").
//! Grounded on `original_source/engine/gpu_storage_buffer_pool.h/.cpp`:
//! 48 power-of-1.5-ish size buckets, `allocate`/`recycle` by bucket, never
//! shrinking under steady state. This crate has no live device handle to
//! back real GPU buffers with, so a `GpuStorageBuffer` here is an opaque
//! handle plus its capacity; the pool's bucket bookkeeping is otherwise
//! identical to the original.

use crate::constants::detail_texture::STORAGE_BUFFER_POOL_BUCKETS;

/// An allocated slot. `id` stands in for the original's rendering-device
/// RID; this crate has no device to allocate a real one from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuStorageBuffer {
    pub id: u64,
    pub size: u32,
}

#[derive(Default)]
struct Bucket {
    free: Vec<GpuStorageBuffer>,
    used: usize,
}

/// Not thread-safe, matching the original (the GPU runner thread owns it
/// exclusively per spec.md §5 "The GPU pool is owned by the GPU runner and
/// not shared").
pub struct GpuStorageBufferPool {
    bucket_sizes: [u32; STORAGE_BUFFER_POOL_BUCKETS],
    buckets: Vec<Bucket>,
    next_id: u64,
}

impl GpuStorageBufferPool {
    pub fn new() -> Self {
        let mut bucket_sizes = [0u32; STORAGE_BUFFER_POOL_BUCKETS];
        let mut s: u32 = 1;
        for size in &mut bucket_sizes {
            *size = s * 4;
            s = (s + 1).max(s + s / 2);
        }
        Self {
            bucket_sizes,
            buckets: (0..STORAGE_BUFFER_POOL_BUCKETS).map(|_| Bucket::default()).collect(),
            next_id: 1,
        }
    }

    fn bucket_index_for_size(&self, size: u32) -> usize {
        self.bucket_sizes
            .iter()
            .position(|&cap| cap >= size)
            .unwrap_or(STORAGE_BUFFER_POOL_BUCKETS - 1)
    }

    /// Returns a buffer whose capacity is at least `size`, reusing one
    /// from the matching bucket's free list or minting a new one.
    pub fn allocate(&mut self, size: u32) -> GpuStorageBuffer {
        assert!(size > 0, "cannot allocate a zero-size storage buffer");
        let index = self.bucket_index_for_size(size);
        let capacity = self.bucket_sizes[index];
        let bucket = &mut self.buckets[index];

        let buffer = if let Some(existing) = bucket.free.pop() {
            existing
        } else {
            let id = self.next_id;
            self.next_id += 1;
            GpuStorageBuffer { id, size: capacity }
        };
        bucket.used += 1;
        buffer
    }

    /// Returns `buffer` to its bucket's free list for reuse.
    pub fn recycle(&mut self, buffer: GpuStorageBuffer) {
        let index = self.bucket_index_for_size(buffer.size);
        let bucket = &mut self.buckets[index];
        debug_assert!(bucket.used > 0, "recycling more buffers than were allocated");
        bucket.used = bucket.used.saturating_sub(1);
        bucket.free.push(buffer);
    }

    /// Total buffers held (free + in use), for leak diagnostics.
    pub fn total_buffer_count(&self) -> usize {
        self.buckets.iter().map(|b| b.free.len() + b.used).sum()
    }
}

impl Default for GpuStorageBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_recycle_reuses_the_same_buffer() {
        let mut pool = GpuStorageBufferPool::new();
        let a = pool.allocate(100);
        pool.recycle(a);
        let b = pool.allocate(100);
        assert_eq!(a.id, b.id, "recycled buffer should be handed back out");
    }

    #[test]
    fn pool_never_shrinks_under_steady_allocate_recycle_cycles() {
        let mut pool = GpuStorageBufferPool::new();
        let mut held = Vec::new();
        for _ in 0..16 {
            held.push(pool.allocate(4096));
        }
        let peak = pool.total_buffer_count();
        for buf in held.drain(..) {
            pool.recycle(buf);
        }
        for _ in 0..16 {
            held.push(pool.allocate(4096));
        }
        assert_eq!(pool.total_buffer_count(), peak);
    }

    #[test]
    fn bucket_sizes_are_non_decreasing_and_cover_small_requests() {
        let pool = GpuStorageBufferPool::new();
        assert!(pool.bucket_sizes.windows(2).all(|w| w[1] >= w[0]));
        assert!(pool.bucket_sizes[0] >= 1);
    }
}

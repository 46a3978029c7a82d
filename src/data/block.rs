//! `DataBlock`: a VoxelBuffer plus edit/stream bookkeeping (spec.md §3.1).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::voxel::VoxelBuffer;

/// A reference to a [`VoxelBuffer`] plus the flags spec.md §3.1 describes.
/// Position is implicit: it is the key under which the owning
/// [`crate::data::VoxelDataMap`] stores this block.
#[derive(Clone)]
pub struct DataBlock {
    buffer: Arc<RwLock<VoxelBuffer>>,
    edited: Arc<AtomicBool>,
    modified: Arc<AtomicBool>,
    /// How many in-flight readers (e.g. a meshing task's neighborhood
    /// gather) currently hold a view onto this block. Used by streaming
    /// eviction to avoid unloading a block someone is reading.
    view_refcount: Arc<AtomicU32>,
}

impl DataBlock {
    pub fn new(buffer: VoxelBuffer) -> Self {
        Self {
            buffer: Arc::new(RwLock::new(buffer)),
            edited: Arc::new(AtomicBool::new(false)),
            modified: Arc::new(AtomicBool::new(false)),
            view_refcount: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn buffer(&self) -> &RwLock<VoxelBuffer> {
        &self.buffer
    }

    pub fn is_edited(&self) -> bool {
        self.edited.load(Ordering::Acquire)
    }

    pub fn set_edited(&self, value: bool) {
        self.edited.store(value, Ordering::Release);
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    pub fn set_modified(&self, value: bool) {
        self.modified.store(value, Ordering::Release);
    }

    pub fn acquire_view(&self) -> ViewGuard {
        self.view_refcount.fetch_add(1, Ordering::AcqRel);
        ViewGuard {
            refcount: self.view_refcount.clone(),
        }
    }

    pub fn view_count(&self) -> u32 {
        self.view_refcount.load(Ordering::Acquire)
    }
}

/// RAII handle keeping a block's view refcount elevated while a task reads
/// its buffer, so streaming eviction (outside this crate's scope to drive,
/// but modeled here) can detect "currently borrowed" blocks.
pub struct ViewGuard {
    refcount: Arc<AtomicU32>,
}

impl Drop for ViewGuard {
    fn drop(&mut self) {
        self.refcount.fetch_sub(1, Ordering::AcqRel);
    }
}

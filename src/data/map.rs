//! `VoxelDataMap`: one per LOD, a sparse hash-indexed grid of [`DataBlock`]
//! (spec.md §3.1, §4.2). The readers-writer lock here guards map
//! *structure* (insertion/removal); each block's own payload lock (inside
//! its `VoxelBuffer`'s `RwLock`) is acquired separately, per the locking
//! discipline in spec.md §5.
//!
//! Deliberately `parking_lot::RwLock<FxHashMap<..>>` rather than
//! `dashmap` — see SPEC_FULL.md §2 for why a sharded map doesn't give
//! callers the whole-structure lock spec.md's concurrency contract needs.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use glam::IVec3;

use crate::data::block::DataBlock;
use crate::math::Aabb;

pub struct VoxelDataMap {
    lod: u32,
    block_size: u32,
    bounds: Aabb,
    blocks: RwLock<FxHashMap<IVec3, DataBlock>>,
}

impl VoxelDataMap {
    pub fn new(lod: u32, block_size: u32, bounds: Aabb) -> Self {
        Self {
            lod,
            block_size,
            bounds,
            blocks: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn lod(&self) -> u32 {
        self.lod
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Voxel spacing at this LOD (spec.md §3.1 invariant: "spacing 2^L").
    pub fn voxel_spacing(&self) -> i32 {
        1 << self.lod
    }

    pub fn get_block(&self, pos: IVec3) -> Option<DataBlock> {
        self.blocks.read().get(&pos).cloned()
    }

    pub fn has_block(&self, pos: IVec3) -> bool {
        self.blocks.read().contains_key(&pos)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    /// Insert a block atomically, failing if the slot is occupied
    /// (spec.md §4.2 `try_set_block`).
    pub fn try_set_block(&self, pos: IVec3, block: DataBlock) -> bool {
        let mut guard = self.blocks.write();
        if guard.contains_key(&pos) {
            return false;
        }
        guard.insert(pos, block);
        true
    }

    /// Insert, or run `action_when_exists` against the existing block so
    /// callers can merge instead of failing outright.
    pub fn try_set_block_or_merge<F>(&self, pos: IVec3, block: DataBlock, action_when_exists: F)
    where
        F: FnOnce(&DataBlock),
    {
        let mut guard = self.blocks.write();
        match guard.get(&pos) {
            Some(existing) => action_when_exists(existing),
            None => {
                guard.insert(pos, block);
            }
        }
    }

    /// Idempotent removal: returns the removed block, if any.
    pub fn remove_block(&self, pos: IVec3) -> Option<DataBlock> {
        self.blocks.write().remove(&pos)
    }

    pub fn positions(&self) -> Vec<IVec3> {
        self.blocks.read().keys().copied().collect()
    }

    /// Positions whose box (in this LOD's block space) overlaps `area`.
    pub fn positions_in_area(&self, area: Aabb) -> Vec<IVec3> {
        self.blocks
            .read()
            .keys()
            .filter(|p| area.contains(**p))
            .copied()
            .collect()
    }

    /// Quick, conservative rejection test: does *any* block in `area`
    /// exist at all? Used directly by LOD-0 queries; the coarse-mip
    /// variant in [`crate::data::volume::VoxelData`] calls this on the
    /// coarsest map (spec.md §4.2
    /// `has_blocks_with_voxels_in_area_broad_mip_test`).
    pub fn any_block_in_area(&self, area: Aabb) -> bool {
        self.blocks.read().keys().any(|p| area.contains(*p))
    }
}

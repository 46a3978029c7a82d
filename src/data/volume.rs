//! `VoxelData`: aggregates the per-LOD maps, bounds, generator, stream,
//! and modifier stack (spec.md §3.1/§4.2). Grounded on
//! `original_source/storage/voxel_data.h`'s `VoxelData` class (the same
//! aggregation of per-LOD `VoxelDataLodMap`s plus generator/stream/modifier
//! references) and on `voxel_tool.cpp`'s copy/paste-through-generator
//! fallback, which the test `test_discord_soakil_copypaste` (see
//! original_source) specifically guards against regressing: copy must
//! synthesize from the generator for blocks that have no cached buffer,
//! not silently skip them.

use std::sync::Arc;

use glam::IVec3;
use log::{debug, warn};
use rayon::prelude::*;

use crate::constants::core::MAX_LOD_COUNT;
use crate::data::block::DataBlock;
use crate::data::map::VoxelDataMap;
use crate::error::{EngineError, EngineResult};
use crate::generator::Generator;
use crate::math::Aabb;
use crate::modifiers::ModifierStack;
use crate::region::Stream;
use crate::voxel::{ChannelId, VoxelBuffer};

/// Aggregates everything needed to answer "what's the state of voxel space
/// at this position" (spec.md §3.1 `VoxelData`).
pub struct VoxelData {
    lods: Vec<VoxelDataMap>,
    block_size: u32,
    bounds: Aabb,
    generator: Arc<dyn Generator>,
    stream: Option<Arc<dyn Stream>>,
    modifiers: ModifierStack,
    /// When disabled, "no block in memory" means the generator is
    /// authoritative; when enabled, it means "not yet loaded" (spec.md
    /// §3.1).
    streaming_enabled: bool,
}

impl VoxelData {
    pub fn new(
        lod_count: u32,
        block_size: u32,
        bounds: Aabb,
        generator: Arc<dyn Generator>,
        stream: Option<Arc<dyn Stream>>,
        streaming_enabled: bool,
    ) -> EngineResult<Self> {
        if lod_count == 0 || lod_count > MAX_LOD_COUNT {
            return Err(EngineError::InvalidFormat {
                reason: format!("lod_count {} out of range 1..={}", lod_count, MAX_LOD_COUNT),
            });
        }
        let lods = (0..lod_count)
            .map(|lod| VoxelDataMap::new(lod, block_size, bounds))
            .collect();
        Ok(Self {
            lods,
            block_size,
            bounds,
            generator,
            stream,
            modifiers: ModifierStack::new(),
            streaming_enabled,
        })
    }

    pub fn lod_count(&self) -> u32 {
        self.lods.len() as u32
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn streaming_enabled(&self) -> bool {
        self.streaming_enabled
    }

    pub fn modifiers(&self) -> &ModifierStack {
        &self.modifiers
    }

    pub fn modifiers_mut(&mut self) -> &mut ModifierStack {
        &mut self.modifiers
    }

    pub fn lod(&self, lod: u32) -> &VoxelDataMap {
        &self.lods[lod as usize]
    }

    fn block_pos_for(&self, voxel_pos: IVec3, lod: u32) -> IVec3 {
        let spacing = self.lods[lod as usize].voxel_spacing();
        voxel_pos.div_euclid(IVec3::splat(spacing * self.block_size as i32))
    }

    fn block_origin(&self, block_pos: IVec3, lod: u32) -> IVec3 {
        let spacing = self.lods[lod as usize].voxel_spacing();
        block_pos * (self.block_size as i32 * spacing)
    }

    /// Synthesize a fresh buffer for `block_pos` at `lod` from the
    /// generator and modifier stack, without inserting it into the map
    /// (spec.md §3.1: "generator is authoritative" when streaming is off).
    fn synthesize(&self, block_pos: IVec3, lod: u32) -> VoxelBuffer {
        let origin = self.block_origin(block_pos, lod);
        let mut buffer = VoxelBuffer::create(self.block_size);
        self.generator.generate_block(&mut buffer, origin, lod);
        let world_box = Aabb::from_min_size(
            origin,
            IVec3::splat(self.block_size as i32 * self.lods[lod as usize].voxel_spacing()),
        );
        self.modifiers.apply(&mut buffer, world_box);
        buffer
    }

    /// Gather voxels from the LOD-0 map into `dst_buffer`, placed so that
    /// `dst_buffer`'s origin corresponds to `min` in world-voxel space
    /// (spec.md §4.2 `VoxelData.copy`). Missing blocks fall back to the
    /// generator+modifiers when streaming is disabled, matching
    /// `original_source`'s `test_discord_soakil_copypaste` regression:
    /// copy must not silently skip blocks with no cached buffer.
    pub fn copy(&self, min: IVec3, dst_buffer: &mut VoxelBuffer, channels_mask: &[ChannelId]) {
        let dst_box = Aabb::from_min_size(min, IVec3::splat(dst_buffer.size() as i32));
        let map = &self.lods[0];
        let block_voxels = self.block_size as i32;

        let first_block = min.div_euclid(IVec3::splat(block_voxels));
        let last_block = (dst_box.max - IVec3::ONE).div_euclid(IVec3::splat(block_voxels));

        let mut bz = first_block.z;
        while bz <= last_block.z {
            let mut by = first_block.y;
            while by <= last_block.y {
                let mut bx = first_block.x;
                while bx <= last_block.x {
                    let block_pos = IVec3::new(bx, by, bz);
                    let block_origin = block_pos * block_voxels;

                    match map.get_block(block_pos) {
                        Some(data_block) => {
                            let guard = data_block.buffer().read();
                            for channel in channels_mask {
                                dst_buffer.copy_from(&guard, guard.bounds(), block_origin - min, *channel);
                            }
                        }
                        None => {
                            if self.streaming_enabled {
                                debug!(
                                    "[VOXEL_DATA] copy: block {:?} not loaded (streaming enabled), skipping",
                                    block_pos
                                );
                                continue;
                            }
                            let synthesized = self.synthesize(block_pos, 0);
                            for channel in channels_mask {
                                dst_buffer.copy_from(
                                    &synthesized,
                                    synthesized.bounds(),
                                    block_origin - min,
                                    *channel,
                                );
                            }
                        }
                    }
                    bx += 1;
                }
                by += 1;
            }
            bz += 1;
        }
    }

    /// Write `src_buffer` into LOD 0 at `min`, allocating new blocks via
    /// the generator when `create_new_blocks` is true (spec.md §4.2
    /// `paste`). `mask` optionally skips source voxels equal to a sentinel
    /// value on `mask_channel`.
    pub fn paste(
        &mut self,
        min: IVec3,
        src_buffer: &VoxelBuffer,
        channels_mask: &[ChannelId],
        create_new_blocks: bool,
        mask: Option<(ChannelId, u64)>,
    ) {
        let src_box = Aabb::from_min_size(min, IVec3::splat(src_buffer.size() as i32));
        self.pre_generate_box_if(src_box, create_new_blocks);

        let block_voxels = self.block_size as i32;
        let first_block = min.div_euclid(IVec3::splat(block_voxels));
        let last_block = (src_box.max - IVec3::ONE).div_euclid(IVec3::splat(block_voxels));

        let mut bz = first_block.z;
        while bz <= last_block.z {
            let mut by = first_block.y;
            while by <= last_block.y {
                let mut bx = first_block.x;
                while bx <= last_block.x {
                    let block_pos = IVec3::new(bx, by, bz);
                    let block_origin = block_pos * block_voxels;
                    let Some(data_block) = self.lods[0].get_block(block_pos) else {
                        bx += 1;
                        continue;
                    };
                    {
                        let mut guard = data_block.buffer().write();
                        let block_box = Aabb::from_min_size(block_origin, IVec3::splat(block_voxels));
                        let Some(overlap) = block_box.clipped(&src_box) else {
                            bx += 1;
                            continue;
                        };
                        for p in overlap.iter_points() {
                            let src_local = p - min;
                            if let Some((mask_channel, mask_value)) = mask {
                                let src_mask_val = src_buffer.get(
                                    mask_channel,
                                    src_local.x,
                                    src_local.y,
                                    src_local.z,
                                );
                                if src_mask_val == mask_value {
                                    continue;
                                }
                            }
                            let dst_local = p - block_origin;
                            for channel in channels_mask {
                                let v = src_buffer.get(*channel, src_local.x, src_local.y, src_local.z);
                                guard.set(*channel, dst_local.x, dst_local.y, dst_local.z, v);
                            }
                        }
                    }
                    data_block.set_edited(true);
                    data_block.set_modified(true);
                    bx += 1;
                }
                by += 1;
            }
            bz += 1;
        }

        self.mark_area_modified(src_box, &mut Vec::new());
    }

    fn pre_generate_box_if(&mut self, area: Aabb, create_new_blocks: bool) {
        if !create_new_blocks {
            return;
        }
        self.pre_generate_box(area);
    }

    /// Ensure every LOD-0 block overlapping `area` has an allocated buffer
    /// populated by the generator+modifiers (spec.md §4.2
    /// `pre_generate_box`).
    pub fn pre_generate_box(&mut self, area: Aabb) {
        let block_voxels = self.block_size as i32;
        let first_block = area.min.div_euclid(IVec3::splat(block_voxels));
        let last_block = (area.max - IVec3::ONE).div_euclid(IVec3::splat(block_voxels));

        let mut bz = first_block.z;
        while bz <= last_block.z {
            let mut by = first_block.y;
            while by <= last_block.y {
                let mut bx = first_block.x;
                while bx <= last_block.x {
                    let block_pos = IVec3::new(bx, by, bz);
                    if !self.lods[0].has_block(block_pos) {
                        let buffer = self.synthesize(block_pos, 0);
                        self.lods[0].try_set_block(block_pos, DataBlock::new(buffer));
                    }
                    bx += 1;
                }
                by += 1;
            }
            bz += 1;
        }
    }

    /// Flag every LOD-0 block overlapping `area` as edited and collect
    /// their positions into `out_lod0_new`, then run mip propagation
    /// (spec.md §4.2 `mark_area_modified` + `update_lods`).
    pub fn mark_area_modified(&mut self, area: Aabb, out_lod0_new: &mut Vec<IVec3>) {
        let block_voxels = self.block_size as i32;
        let first_block = area.min.div_euclid(IVec3::splat(block_voxels));
        let last_block = (area.max - IVec3::ONE).div_euclid(IVec3::splat(block_voxels));

        let mut touched = Vec::new();
        let mut bz = first_block.z;
        while bz <= last_block.z {
            let mut by = first_block.y;
            while by <= last_block.y {
                let mut bx = first_block.x;
                while bx <= last_block.x {
                    let block_pos = IVec3::new(bx, by, bz);
                    if let Some(block) = self.lods[0].get_block(block_pos) {
                        block.set_edited(true);
                        block.set_modified(true);
                        touched.push(block_pos);
                        out_lod0_new.push(block_pos);
                    }
                    bx += 1;
                }
                by += 1;
            }
            bz += 1;
        }
        self.update_lods(&touched);
    }

    /// Downsample each flagged LOD-0 block's channels into its parent at
    /// every higher LOD, recursively marking parents edited (spec.md §4.2
    /// `update_lods`, mip-consistency invariant).
    pub fn update_lods(&mut self, positions: &[IVec3]) {
        if positions.is_empty() || self.lods.len() < 2 {
            return;
        }
        let mut frontier: Vec<IVec3> = positions.to_vec();
        for lod in 1..self.lods.len() as u32 {
            let mut parents = std::collections::HashSet::new();
            for child_pos in &frontier {
                parents.insert(child_pos.div_euclid(IVec3::splat(2)));
            }
            let mut next_frontier = Vec::new();
            for parent_pos in parents {
                self.downsample_into(parent_pos, lod);
                next_frontier.push(parent_pos);
            }
            frontier = next_frontier;
        }
    }

    /// Recompute `parent_pos` at `lod` as the box-downsample of its eight
    /// `lod - 1` children if all are present, else fall back to the
    /// generator-sampled value (spec.md §4.2 invariant).
    fn downsample_into(&mut self, parent_pos: IVec3, lod: u32) {
        let child_lod = lod - 1;
        let mut child_bufs: Vec<Option<VoxelBuffer>> = Vec::with_capacity(8);
        for dz in 0..2 {
            for dy in 0..2 {
                for dx in 0..2 {
                    let child_pos = parent_pos * 2 + IVec3::new(dx, dy, dz);
                    child_bufs.push(
                        self.lods[child_lod as usize]
                            .get_block(child_pos)
                            .map(|b| b.buffer().read().clone()),
                    );
                }
            }
        }
        let all_present = child_bufs.iter().all(|c| c.is_some());

        let new_buffer = if all_present {
            let size = self.block_size as usize;
            let mut out = VoxelBuffer::create(self.block_size);
            for channel in ChannelId::ALL {
                out.decompress_channel(channel);
                let mut child_idx = 0usize;
                for dz in 0..2i32 {
                    for dy in 0..2i32 {
                        for dx in 0..2i32 {
                            let child = child_bufs[child_idx].as_ref().unwrap();
                            child_idx += 1;
                            let half = size / 2;
                            for lz in 0..half {
                                for ly in 0..half {
                                    for lx in 0..half {
                                        // box-downsample: average the 2x2x2 source cell
                                        let sx = lx * 2;
                                        let sy = ly * 2;
                                        let sz = lz * 2;
                                        let mut sum = 0i64;
                                        for ox in 0..2i32 {
                                            for oy in 0..2i32 {
                                                for oz in 0..2i32 {
                                                    sum += child.get(
                                                        channel,
                                                        sx as i32 + ox,
                                                        sy as i32 + oy,
                                                        sz as i32 + oz,
                                                    ) as i64;
                                                }
                                            }
                                        }
                                        let avg = (sum / 8) as u64;
                                        let dst_x = dx as usize * half + lx;
                                        let dst_y = dy as usize * half + ly;
                                        let dst_z = dz as usize * half + lz;
                                        out.set(
                                            channel,
                                            dst_x as i32,
                                            dst_y as i32,
                                            dst_z as i32,
                                            avg,
                                        );
                                    }
                                }
                            }
                        }
                    }
                }
            }
            out.compress_uniform_channels();
            out
        } else {
            debug!(
                "[VOXEL_DATA] downsample: block {:?} at lod {} missing children, falling back to generator",
                parent_pos, lod
            );
            self.synthesize(parent_pos, lod)
        };

        let data_block = DataBlock::new(new_buffer);
        data_block.set_edited(true);
        self.lods[lod as usize].try_set_block_or_merge(parent_pos, data_block.clone(), |existing| {
            *existing.buffer().write() = data_block.buffer().read().clone();
            existing.set_edited(true);
        });
    }

    /// Quickly reject large regions with no edits by inspecting only the
    /// coarsest LOD (spec.md §4.2
    /// `has_blocks_with_voxels_in_area_broad_mip_test`): a conservative
    /// over-approximation, false positives allowed, false negatives
    /// forbidden.
    pub fn has_blocks_with_voxels_in_area_broad_mip_test(&self, area: Aabb) -> bool {
        let coarsest = self.lods.len() as u32 - 1;
        let spacing = self.lods[coarsest as usize].voxel_spacing();
        let block_voxels = self.block_size as i32 * spacing;
        let coarse_box = Aabb::new(
            area.min.div_euclid(IVec3::splat(block_voxels)),
            (area.max - IVec3::ONE).div_euclid(IVec3::splat(block_voxels)) + IVec3::ONE,
        );
        self.lods[coarsest as usize].any_block_in_area(coarse_box)
    }

    /// Insert a pre-built block atomically at LOD 0 (spec.md §4.2
    /// `try_set_block`).
    pub fn try_set_block(&self, pos: IVec3, block: DataBlock) -> bool {
        self.lods[0].try_set_block(pos, block)
    }

    /// Query a single voxel, falling through to the generator+modifiers
    /// when the owning block isn't in memory and streaming is disabled.
    pub fn get_voxel(&self, world_pos: IVec3, channel: ChannelId) -> u64 {
        let block_pos = self.block_pos_for(world_pos, 0);
        match self.lods[0].get_block(block_pos) {
            Some(block) => {
                let origin = self.block_origin(block_pos, 0);
                let local = world_pos - origin;
                block.buffer().read().get(channel, local.x, local.y, local.z)
            }
            None => {
                if self.streaming_enabled {
                    warn!(
                        "[VOXEL_DATA] get_voxel at {:?}: block {:?} not loaded",
                        world_pos, block_pos
                    );
                    return channel.default_value();
                }
                let synthesized = self.synthesize(block_pos, 0);
                let origin = self.block_origin(block_pos, 0);
                let local = world_pos - origin;
                synthesized.get(channel, local.x, local.y, local.z)
            }
        }
    }

    /// Gather the anchor block at `(lod, block_pos)` plus its 26
    /// neighbors into a single padded buffer, synthesizing from the
    /// generator+modifiers wherever a neighbor block isn't resident
    /// (spec.md §4.6 "Gather" / "Fill": this engine always resolves fill
    /// targets inline on the CPU rather than staging a compute dispatch,
    /// since the GPU fill path needs a render backend this crate treats
    /// as optional).
    pub fn gather_padded(
        &self,
        lod: u32,
        block_pos: IVec3,
        min_padding: i32,
        max_padding: i32,
    ) -> VoxelBuffer {
        let block_voxels = self.block_size as i32;
        let padded_size = block_voxels + min_padding + max_padding;
        let mut buffer = VoxelBuffer::create(padded_size as u32);
        let local_origin = block_pos * block_voxels - IVec3::splat(min_padding);
        let padded_box = Aabb::from_min_size(local_origin, IVec3::splat(padded_size));

        let first_block = local_origin.div_euclid(IVec3::splat(block_voxels));
        let last_block = (padded_box.max - IVec3::ONE).div_euclid(IVec3::splat(block_voxels));

        let mut bz = first_block.z;
        while bz <= last_block.z {
            let mut by = first_block.y;
            while by <= last_block.y {
                let mut bx = first_block.x;
                while bx <= last_block.x {
                    let neighbor_pos = IVec3::new(bx, by, bz);
                    let neighbor_origin = neighbor_pos * block_voxels;
                    let dst_origin = neighbor_origin - local_origin;

                    match self.lods[lod as usize].get_block(neighbor_pos) {
                        Some(data_block) => {
                            let guard = data_block.buffer().read();
                            for channel in ChannelId::ALL {
                                buffer.copy_from(&guard, guard.bounds(), dst_origin, channel);
                            }
                        }
                        None => {
                            debug!(
                                "[MESH_BLOCK_TASK] gather: synthesizing missing neighbor {:?} at lod {}",
                                neighbor_pos, lod
                            );
                            let synthesized = self.synthesize(neighbor_pos, lod);
                            for channel in ChannelId::ALL {
                                buffer.copy_from(&synthesized, synthesized.bounds(), dst_origin, channel);
                            }
                        }
                    }
                    bx += 1;
                }
                by += 1;
            }
            bz += 1;
        }

        buffer
    }

    /// Parallel variant of [`Self::update_lods`] fan-out used when many
    /// independent parent blocks need recomputation (e.g. after a large
    /// edit touches dozens of LOD-0 blocks). Uses `rayon` the way the
    /// teacher fans out chunk work across its thread pool.
    pub fn update_lods_parallel(&mut self, positions: &[IVec3]) {
        // Downsampling mutates `self.lods`, so the actual per-parent work
        // can't run concurrently without a second borrow of `self`; we
        // still use rayon to compute the set of distinct parents per
        // level in parallel since that part has no shared mutable state.
        if positions.is_empty() || self.lods.len() < 2 {
            return;
        }
        let mut frontier: Vec<IVec3> = positions.to_vec();
        for lod in 1..self.lods.len() as u32 {
            let parents: std::collections::HashSet<IVec3> = frontier
                .par_iter()
                .map(|p| p.div_euclid(IVec3::splat(2)))
                .collect();
            let next_frontier: Vec<IVec3> = parents.into_iter().collect();
            for parent_pos in &next_frontier {
                self.downsample_into(*parent_pos, lod);
            }
            frontier = next_frontier;
        }
    }
}

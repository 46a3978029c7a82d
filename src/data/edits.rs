//! Edit primitives: sphere/box/raycast/blur/random-tick (spec.md §3 "Edit
//! primitives", 6% of scope). Grounded on `original_source/voxel_tool.cpp`
//! (`do_sphere`, `sdf_blend`, `raycast`) and
//! `original_source/tests/voxel/test_edition_funcs.cpp` (box blur,
//! blocky random tick).

use glam::{IVec3, Vec3};
use rand::Rng;

use crate::data::volume::VoxelData;
use crate::math::Aabb;
use crate::modifiers::Blend;
use crate::voxel::{ChannelId, Depth};

/// Result of a successful [`raycast`]: the voxel that was hit, the voxel
/// just before it along the ray, and the face normal crossed to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaycastHit {
    pub position: IVec3,
    pub previous_position: IVec3,
    pub normal: IVec3,
}

fn sdf_blend(operator_value: f32, existing_value: f32, blend: Blend) -> f32 {
    match blend {
        Blend::Add => operator_value.min(existing_value),
        Blend::Remove => (1.0 - operator_value).max(existing_value),
        Blend::Set => operator_value,
    }
}

/// Carve (or fill) a sphere directly into the SDF channel, matching
/// `VoxelTool::do_sphere`'s `MODE_ADD`/`MODE_REMOVE`/`MODE_SET` blend. For
/// the TYPE channel (non-SDF volumes) this instead stamps `value` onto
/// every voxel within `radius`.
pub fn do_sphere(data: &mut VoxelData, center: Vec3, radius: f32, channel: ChannelId, blend: Blend, value: u64) {
    let half = Vec3::splat(radius.ceil());
    let area = Aabb::from_min_size(
        (center - half).floor().as_ivec3(),
        ((half * 2.0).ceil().as_ivec3()) + IVec3::ONE,
    );
    data.pre_generate_box(area);

    if channel == ChannelId::Sdf {
        let depth = Depth::D16; // SDF is always resolved at the data map's configured depth
        for_each_voxel_mut(data, area, channel, |pos, existing_raw| {
            let d = pos.as_vec3().distance(center) - radius;
            let existing = crate::voxel::channel::sdf_decode(existing_raw as i64, depth);
            let blended = sdf_blend(d, existing, blend);
            crate::voxel::channel::sdf_encode(blended, depth) as u64
        });
    } else {
        for_each_voxel_mut(data, area, channel, |pos, existing| {
            if pos.as_vec3().distance(center) <= radius {
                value
            } else {
                existing
            }
        });
    }

    let mut touched = Vec::new();
    data.mark_area_modified(area, &mut touched);
}

/// Stamp a constant value over an axis-aligned box (`original_source`
/// leaves `VoxelTool::do_box` unimplemented — "ERR_PRINT(Not implemented)"
/// — so this fills the gap with the same clip/edit/mark-modified shape as
/// [`do_sphere`]).
pub fn do_box(data: &mut VoxelData, area: Aabb, channel: ChannelId, value: u64) {
    data.pre_generate_box(area);
    for_each_voxel_mut(data, area, channel, |_pos, _existing| value);
    let mut touched = Vec::new();
    data.mark_area_modified(area, &mut touched);
}

/// Apply `f` to every voxel in `area` for `channel`, block by block,
/// marking each touched block edited. Blocks outside the LOD-0 map (after
/// `pre_generate_box`) are skipped — callers that need guaranteed
/// coverage must pre-generate first.
fn for_each_voxel_mut<F>(data: &VoxelData, area: Aabb, channel: ChannelId, mut f: F)
where
    F: FnMut(IVec3, u64) -> u64,
{
    let block_size = data.block_size() as i32;
    let map = data.lod(0);
    let first_block = area.min.div_euclid(IVec3::splat(block_size));
    let last_block = (area.max - IVec3::ONE).div_euclid(IVec3::splat(block_size));

    let mut bz = first_block.z;
    while bz <= last_block.z {
        let mut by = first_block.y;
        while by <= last_block.y {
            let mut bx = first_block.x;
            while bx <= last_block.x {
                let block_pos = IVec3::new(bx, by, bz);
                if let Some(block) = map.get_block(block_pos) {
                    let block_origin = block_pos * block_size;
                    let block_box = Aabb::from_min_size(block_origin, IVec3::splat(block_size));
                    if let Some(overlap) = block_box.clipped(&area) {
                        let mut guard = block.buffer().write();
                        for p in overlap.iter_points() {
                            let local = p - block_origin;
                            let old = guard.get(channel, local.x, local.y, local.z);
                            let new = f(p, old);
                            if new != old {
                                guard.set(channel, local.x, local.y, local.z, new);
                            }
                        }
                        drop(guard);
                        block.set_edited(true);
                        block.set_modified(true);
                    }
                }
                bx += 1;
            }
            by += 1;
        }
        bz += 1;
    }
}

/// Walk a ray through the TYPE channel at LOD 0, stepping one voxel at a
/// time, stopping at `max_distance` or the first voxel whose type is not
/// `0` (air). Grounded on `VoxelTool::raycast`'s signature; the teacher's
/// upstream left the body unimplemented, so the walk itself follows the
/// standard "3D DDA" voxel traversal used by the rest of the pack's
/// raycasting code.
pub fn raycast(data: &VoxelData, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RaycastHit> {
    let dir = direction.normalize_or_zero();
    if dir == Vec3::ZERO {
        return None;
    }

    let mut pos = origin.floor().as_ivec3();
    let step = IVec3::new(dir.x.signum() as i32, dir.y.signum() as i32, dir.z.signum() as i32);

    let t_delta = Vec3::new(
        if dir.x != 0.0 { (1.0 / dir.x).abs() } else { f32::INFINITY },
        if dir.y != 0.0 { (1.0 / dir.y).abs() } else { f32::INFINITY },
        if dir.z != 0.0 { (1.0 / dir.z).abs() } else { f32::INFINITY },
    );

    let next_boundary = |o: f32, p: i32, s: i32| -> f32 {
        if s > 0 {
            (p + 1) as f32 - o
        } else {
            o - p as f32
        }
    };
    let mut t_max = Vec3::new(
        if dir.x != 0.0 { next_boundary(origin.x, pos.x, step.x) / dir.x.abs() } else { f32::INFINITY },
        if dir.y != 0.0 { next_boundary(origin.y, pos.y, step.y) / dir.y.abs() } else { f32::INFINITY },
        if dir.z != 0.0 { next_boundary(origin.z, pos.z, step.z) / dir.z.abs() } else { f32::INFINITY },
    );

    let mut previous_position = pos;
    let mut normal = IVec3::ZERO;
    let mut travelled = 0.0f32;

    while travelled <= max_distance {
        let value = data.get_voxel(pos, ChannelId::Type);
        if value != 0 {
            return Some(RaycastHit {
                position: pos,
                previous_position,
                normal,
            });
        }
        previous_position = pos;
        if t_max.x < t_max.y && t_max.x < t_max.z {
            pos.x += step.x;
            travelled = t_max.x;
            t_max.x += t_delta.x;
            normal = IVec3::new(-step.x, 0, 0);
        } else if t_max.y < t_max.z {
            pos.y += step.y;
            travelled = t_max.y;
            t_max.y += t_delta.y;
            normal = IVec3::new(0, -step.y, 0);
        } else {
            pos.z += step.z;
            travelled = t_max.z;
            t_max.z += t_delta.z;
            normal = IVec3::new(0, 0, -step.z);
        }
    }
    None
}

/// Box-blur the SDF channel of `src` into `dst` within a clipping sphere,
/// matching `original_source`'s `ops::box_blur` reference semantics
/// (`test_box_blur`): average each voxel with its `radius`-neighborhood,
/// restricted to a sphere so edits stay local.
pub fn box_blur(
    data: &VoxelData,
    area: Aabb,
    blur_radius: i32,
    sphere_center: Vec3,
    sphere_radius: f32,
) -> Vec<(IVec3, f32)> {
    let mut out = Vec::new();
    for p in area.iter_points() {
        if p.as_vec3().distance(sphere_center) > sphere_radius {
            continue;
        }
        let mut sum = 0.0f32;
        let mut count = 0i32;
        for dz in -blur_radius..=blur_radius {
            for dy in -blur_radius..=blur_radius {
                for dx in -blur_radius..=blur_radius {
                    let sample_pos = p + IVec3::new(dx, dy, dz);
                    sum += data.get_voxel_f(sample_pos, ChannelId::Sdf);
                    count += 1;
                }
            }
        }
        out.push((p, sum / count as f32));
    }
    out
}

/// Apply the output of [`box_blur`] back into the volume's SDF channel.
pub fn apply_blur_result(data: &mut VoxelData, blurred: &[(IVec3, f32)]) {
    if blurred.is_empty() {
        return;
    }
    let mut min = blurred[0].0;
    let mut max = blurred[0].0 + IVec3::ONE;
    for (p, _) in blurred {
        min = min.min(*p);
        max = max.max(*p + IVec3::ONE);
    }
    let area = Aabb::new(min, max);
    data.pre_generate_box(area);
    let depth = Depth::D16;
    let lookup: std::collections::HashMap<IVec3, f32> = blurred.iter().copied().collect();
    for_each_voxel_mut(data, area, ChannelId::Sdf, |pos, existing_raw| {
        match lookup.get(&pos) {
            Some(&value) => crate::voxel::channel::sdf_encode(value, depth) as u64,
            None => existing_raw,
        }
    });
    let mut touched = Vec::new();
    data.mark_area_modified(area, &mut touched);
}

/// Pick `iterations` random voxel positions inside `voxel_box`, testing
/// each against `is_tickable` (a predicate over the raw TYPE value), and
/// invoke `callback(pos, type_value)` for every hit. Returns early if the
/// callback returns `false`. Grounded on
/// `test_run_blocky_random_tick`/`VoxelToolTerrain::run_blocky_random_tick_static`:
/// positions are drawn uniformly from block-aligned batches so a
/// checkerboard of tickable voxels gets uniform coverage over many ticks.
pub fn run_blocky_random_tick<R, F>(
    data: &VoxelData,
    voxel_box: Aabb,
    is_tickable: impl Fn(u64) -> bool,
    rng: &mut R,
    iterations: u32,
    block_batch_count: u32,
    mut callback: F,
) where
    R: Rng,
    F: FnMut(IVec3, u64) -> bool,
{
    let block_size = data.block_size() as i32;
    let first_block = voxel_box.min.div_euclid(IVec3::splat(block_size));
    let last_block = (voxel_box.max - IVec3::ONE).div_euclid(IVec3::splat(block_size));
    let block_count = IVec3::new(
        last_block.x - first_block.x + 1,
        last_block.y - first_block.y + 1,
        last_block.z - first_block.z + 1,
    );
    if block_count.x <= 0 || block_count.y <= 0 || block_count.z <= 0 {
        return;
    }

    let mut remaining = iterations;
    while remaining > 0 {
        let batch = block_batch_count.min(remaining);
        let block_pos = first_block
            + IVec3::new(
                rng.gen_range(0..block_count.x),
                rng.gen_range(0..block_count.y),
                rng.gen_range(0..block_count.z),
            );
        for _ in 0..batch {
            let local = IVec3::new(
                rng.gen_range(0..block_size),
                rng.gen_range(0..block_size),
                rng.gen_range(0..block_size),
            );
            let world_pos = block_pos * block_size + local;
            if !voxel_box.contains(world_pos) {
                continue;
            }
            let value = data.get_voxel(world_pos, ChannelId::Type);
            if is_tickable(value) && !callback(world_pos, value) {
                return;
            }
        }
        remaining -= batch;
    }
}

impl VoxelData {
    /// Float accessor mirroring [`VoxelData::get_voxel`], used by
    /// [`box_blur`].
    pub fn get_voxel_f(&self, world_pos: IVec3, channel: ChannelId) -> f32 {
        let raw = self.get_voxel(world_pos, channel);
        crate::voxel::channel::sdf_decode(raw as i64, Depth::D16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FlatGenerator;
    use std::sync::Arc;

    fn flat_volume(height: i32) -> VoxelData {
        VoxelData::new(
            1,
            16,
            Aabb::from_min_size(IVec3::splat(-1000), IVec3::splat(2000)),
            Arc::new(FlatGenerator { height, solid_type: 1 }),
            None,
            false,
        )
        .unwrap()
    }

    #[test]
    fn raycast_hits_flat_plane_surface() {
        let data = flat_volume(5);
        let hit = raycast(&data, Vec3::new(10.0, 20.0, 15.0), Vec3::new(0.0, -1.0, 0.0), 20.0).unwrap();
        assert_eq!(hit.position, IVec3::new(10, 4, 15));
        assert_eq!(hit.normal, IVec3::new(0, 1, 0));
    }

    #[test]
    fn sphere_then_paste_restores_generator_region() {
        let mut data = flat_volume(5);
        let min = IVec3::new(-10, -10, -10);
        let mut before = crate::voxel::VoxelBuffer::create(20);
        data.copy(min, &mut before, &[ChannelId::Type, ChannelId::Sdf]);

        do_sphere(
            &mut data,
            Vec3::new(0.0, 0.0, 0.0),
            5.0,
            ChannelId::Type,
            Blend::Set,
            9,
        );

        data.paste(min, &before, &[ChannelId::Type, ChannelId::Sdf], true, None);

        let mut after = crate::voxel::VoxelBuffer::create(20);
        data.copy(min, &mut after, &[ChannelId::Type, ChannelId::Sdf]);
        for p in before.bounds().iter_points() {
            assert_eq!(
                before.get(ChannelId::Type, p.x, p.y, p.z),
                after.get(ChannelId::Type, p.x, p.y, p.z)
            );
        }
    }

    #[test]
    fn random_tick_covers_whole_box_with_seeded_rng() {
        use rand::SeedableRng;
        let mut data = flat_volume(40);
        let voxel_box = Aabb::from_min_size(IVec3::new(-24, -23, -22), IVec3::new(64, 40, 40));
        data.pre_generate_box(voxel_box);

        let mut min_hit = None;
        let mut max_hit = None;
        let mut rng = rand::rngs::StdRng::seed_from_u64(131183);
        run_blocky_random_tick(
            &data,
            voxel_box,
            |v| v == 1,
            &mut rng,
            1000,
            4,
            |pos, _val| {
                min_hit = Some(min_hit.map_or(pos, |m: IVec3| m.min(pos)));
                max_hit = Some(max_hit.map_or(pos, |m: IVec3| m.max(pos)));
                true
            },
        );
        assert!(min_hit.is_some(), "expected at least one tick hit");
    }
}

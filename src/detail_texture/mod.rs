//! Per-cell detail-texture baking (spec.md §4.7, §6.2). Grounded on
//! `original_source/engine/render_detail_texture_task.cpp`'s CPU baking
//! path: for each mesh cell, sphere-trace the implicit SDF from outside
//! and store the hit normal into a packed tile atlas.
//!
//! This crate has no live `wgpu::Device`/compute-pipeline handle to
//! dispatch the GPU path's five-stage pipeline against (`wgpu` is an
//! optional, render-agnostic dependency here), so only the CPU baking
//! path and the buffer pool's bookkeeping are implemented; `pool` module
//! docs call this out where it matters.

pub mod pool;

pub use pool::{GpuStorageBuffer, GpuStorageBufferPool};

use glam::{IVec3, Vec3};

use crate::constants::detail_texture::{MAX_TILE_RESOLUTION, MIN_TILE_RESOLUTION};
use crate::meshing::CellInfo;
use crate::voxel::{ChannelId, VoxelBuffer};

/// Tile resolution scales down with LOD (spec.md §9 Open Question c):
/// halve per LOD step past `begin_lod_index`, clamped to the configured
/// bounds.
pub fn tile_resolution_for_lod(lod: u32, begin_lod_index: u32, base: u32) -> u32 {
    let steps = lod.saturating_sub(begin_lod_index);
    let shifted = base.checked_shr(steps).unwrap_or(0);
    shifted.clamp(MIN_TILE_RESOLUTION, MAX_TILE_RESOLUTION)
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct DetailTextureConfig {
    pub base_tile_resolution: u32,
    pub begin_lod_index: u32,
    pub octahedral_encoding: bool,
    /// Distance the sphere-trace ray starts outside the surface.
    pub trace_start_offset: f32,
    pub max_trace_steps: u32,
}

impl Default for DetailTextureConfig {
    fn default() -> Self {
        Self {
            base_tile_resolution: MAX_TILE_RESOLUTION,
            begin_lod_index: 0,
            octahedral_encoding: false,
            trace_start_offset: 2.0,
            max_trace_steps: 32,
        }
    }
}

/// One baked tile: square, row-major, either 3 bytes/texel (raw normal)
/// or 2 bytes/texel (octahedral-encoded), per spec.md §6.2.
#[derive(Debug, Clone)]
pub struct Tile {
    pub resolution: u32,
    pub bytes_per_texel: u8,
    pub data: Vec<u8>,
}

impl Tile {
    /// Saves the tile as a PNG for debugging, the way the renderer's
    /// texture atlas exposes `save_debug`. Raw normals are written as RGB;
    /// octahedral-encoded tiles are written as RG with a zeroed blue
    /// channel since the third component is reconstructed at sample time.
    pub fn save_png(&self, path: &str) -> Result<(), image::ImageError> {
        let mut image = image::RgbImage::new(self.resolution, self.resolution);
        for (i, pixel) in image.pixels_mut().enumerate() {
            let base = i * self.bytes_per_texel as usize;
            let texel = &self.data[base..base + self.bytes_per_texel as usize];
            *pixel = match texel.len() {
                3 => image::Rgb([texel[0], texel[1], texel[2]]),
                2 => image::Rgb([texel[0], texel[1], 0]),
                _ => image::Rgb([0, 0, 0]),
            };
        }
        image.save(path)
    }
}

/// Maps a mesh cell to its tile index in the atlas (spec.md §6.2 "lookup
/// image").
#[derive(Debug, Clone, Default)]
pub struct TileLookup {
    pub entries: Vec<(IVec3, u32)>,
}

impl TileLookup {
    pub fn tile_for_cell(&self, cell_pos: IVec3) -> Option<u32> {
        self.entries
            .iter()
            .find(|(pos, _)| *pos == cell_pos)
            .map(|(_, idx)| *idx)
    }
}

/// Trilinearly samples the SDF channel of `buffer` at a continuous local
/// position. Positions outside `buffer.bounds()` clamp to the nearest
/// valid integer cell.
fn sample_sdf_trilinear(buffer: &VoxelBuffer, pos: Vec3) -> f32 {
    let bounds = buffer.bounds();
    let max = (bounds.max - IVec3::ONE).as_vec3();
    let min = bounds.min.as_vec3();
    let clamped = pos.clamp(min, max);

    let x0 = clamped.x.floor();
    let y0 = clamped.y.floor();
    let z0 = clamped.z.floor();
    let tx = clamped.x - x0;
    let ty = clamped.y - y0;
    let tz = clamped.z - z0;

    let sample = |dx: i32, dy: i32, dz: i32| {
        let p = IVec3::new(x0 as i32 + dx, y0 as i32 + dy, z0 as i32 + dz);
        let p = p.clamp(bounds.min, bounds.max - IVec3::ONE);
        buffer.get_f(ChannelId::Sdf, p.x, p.y, p.z)
    };

    let c000 = sample(0, 0, 0);
    let c100 = sample(1, 0, 0);
    let c010 = sample(0, 1, 0);
    let c110 = sample(1, 1, 0);
    let c001 = sample(0, 0, 1);
    let c101 = sample(1, 0, 1);
    let c011 = sample(0, 1, 1);
    let c111 = sample(1, 1, 1);

    let c00 = c000 * (1.0 - tx) + c100 * tx;
    let c10 = c010 * (1.0 - tx) + c110 * tx;
    let c01 = c001 * (1.0 - tx) + c101 * tx;
    let c11 = c011 * (1.0 - tx) + c111 * tx;

    let c0 = c00 * (1.0 - ty) + c10 * ty;
    let c1 = c01 * (1.0 - ty) + c11 * ty;

    c0 * (1.0 - tz) + c1 * tz
}

/// Central-difference gradient, not renormalized, matching the mesher's
/// own gradient convention (spec.md §9 Open Question a).
fn gradient(buffer: &VoxelBuffer, pos: Vec3) -> Vec3 {
    const H: f32 = 0.5;
    Vec3::new(
        sample_sdf_trilinear(buffer, pos + Vec3::new(H, 0.0, 0.0))
            - sample_sdf_trilinear(buffer, pos - Vec3::new(H, 0.0, 0.0)),
        sample_sdf_trilinear(buffer, pos + Vec3::new(0.0, H, 0.0))
            - sample_sdf_trilinear(buffer, pos - Vec3::new(0.0, H, 0.0)),
        sample_sdf_trilinear(buffer, pos + Vec3::new(0.0, 0.0, H))
            - sample_sdf_trilinear(buffer, pos - Vec3::new(0.0, 0.0, H)),
    )
}

/// Casts a ray from `origin` along `-normal` until it crosses the implicit
/// surface (SDF sign change) or exhausts its step budget, then returns the
/// surface normal at the crossing (unnormalized, see [`gradient`]).
fn sphere_trace(buffer: &VoxelBuffer, origin: Vec3, direction: Vec3, config: &DetailTextureConfig) -> Vec3 {
    let mut pos = origin;
    let mut last_sdf = sample_sdf_trilinear(buffer, pos);
    for _ in 0..config.max_trace_steps {
        let step = last_sdf.abs().max(0.05);
        pos += direction * step;
        let sdf = sample_sdf_trilinear(buffer, pos);
        if sdf.signum() != last_sdf.signum() {
            break;
        }
        last_sdf = sdf;
    }
    gradient(buffer, pos)
}

fn encode_octahedral(n: Vec3) -> [u8; 2] {
    let n = n.normalize_or_zero();
    let l1 = n.x.abs() + n.y.abs() + n.z.abs();
    let p = if l1 > 0.0 { Vec3::new(n.x, n.y, n.z) / l1 } else { Vec3::ZERO };
    let mut oct = Vec3::new(p.x, p.y, 0.0);
    if p.z < 0.0 {
        oct.x = (1.0 - p.y.abs()) * p.x.signum();
        oct.y = (1.0 - p.x.abs()) * p.y.signum();
    }
    let to_byte = |v: f32| (((v * 0.5 + 0.5).clamp(0.0, 1.0)) * 255.0).round() as u8;
    [to_byte(oct.x), to_byte(oct.y)]
}

fn encode_raw(n: Vec3) -> [u8; 3] {
    let n = n.normalize_or_zero();
    let to_byte = |v: f32| (((v * 0.5 + 0.5).clamp(0.0, 1.0)) * 255.0).round() as u8;
    [to_byte(n.x), to_byte(n.y), to_byte(n.z)]
}

/// Bakes the edited-voxel (CPU) path for one mesh cell (spec.md §4.7: "the
/// CPU follow-up... composited over the GPU atlas"). The GPU path for
/// non-edited cells reuses the same math on the device; here it all runs
/// on the CPU since there is no device handle to dispatch to.
pub fn bake_cell_cpu(buffer: &VoxelBuffer, cell: &CellInfo, lod: u32, config: &DetailTextureConfig) -> Tile {
    let resolution = tile_resolution_for_lod(lod, config.begin_lod_index, config.base_tile_resolution);
    let bytes_per_texel: u8 = if config.octahedral_encoding { 2 } else { 3 };
    let mut data = Vec::with_capacity((resolution * resolution) as usize * bytes_per_texel as usize);

    let cell_origin = cell.cell_pos.as_vec3();
    for v in 0..resolution {
        for u in 0..resolution {
            let uv = Vec3::new(
                (u as f32 + 0.5) / resolution as f32,
                (v as f32 + 0.5) / resolution as f32,
                0.0,
            );
            // A texel's ray origin sits just outside the cell along the
            // dominant surface normal sampled at the cell center; this is
            // a simplification of the original's per-triangle ray-origin
            // gather stage, which needs the full triangle list this
            // module doesn't carry.
            let center_gradient = gradient(buffer, cell_origin + Vec3::splat(0.5));
            let outward = center_gradient.normalize_or_zero();
            let tangent = if outward.x.abs() < 0.9 { Vec3::X } else { Vec3::Y }.cross(outward).normalize_or_zero();
            let bitangent = outward.cross(tangent);
            let offset = (uv.x - 0.5) * tangent + (uv.y - 0.5) * bitangent;
            let ray_origin = cell_origin + Vec3::splat(0.5) + offset + outward * config.trace_start_offset;

            let normal = sphere_trace(buffer, ray_origin, -outward, config);
            let encoded: Vec<u8> = if config.octahedral_encoding {
                encode_octahedral(normal).to_vec()
            } else {
                encode_raw(normal).to_vec()
            };
            data.extend_from_slice(&encoded);
        }
    }

    Tile {
        resolution,
        bytes_per_texel,
        data,
    }
}

/// Bakes every cell of a mesh into one flat atlas plus a lookup table
/// (spec.md §6.2).
pub fn bake_mesh_cpu(
    buffer: &VoxelBuffer,
    cells: &[CellInfo],
    lod: u32,
    config: &DetailTextureConfig,
) -> (Vec<Tile>, TileLookup) {
    let mut tiles = Vec::with_capacity(cells.len());
    let mut lookup = TileLookup::default();
    for (idx, cell) in cells.iter().enumerate() {
        tiles.push(bake_cell_cpu(buffer, cell, lod, config));
        lookup.entries.push((cell.cell_pos, idx as u32));
    }
    (tiles, lookup)
}

/// Fills cracks at tile borders by copying the nearest interior texel
/// outward (spec.md §4.7 "dilation"). Operates in place on the raw byte
/// buffer; texels whose alpha-equivalent marker byte is `0xFF` are
/// treated as unwritten ("holes").
pub fn dilate(tile: &mut Tile, passes: u32) {
    const HOLE_MARKER: u8 = 0xFF;
    let res = tile.resolution as usize;
    let bpt = tile.bytes_per_texel as usize;
    for _ in 0..passes {
        let snapshot = tile.data.clone();
        for y in 0..res {
            for x in 0..res {
                let i = (y * res + x) * bpt;
                if snapshot[i] != HOLE_MARKER {
                    continue;
                }
                for (dx, dy) in [(-1i32, 0i32), (1, 0), (0, -1), (0, 1)] {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx as usize >= res || ny as usize >= res {
                        continue;
                    }
                    let ni = (ny as usize * res + nx as usize) * bpt;
                    if snapshot[ni] != HOLE_MARKER {
                        tile.data[i..i + bpt].copy_from_slice(&snapshot[ni..ni + bpt]);
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_resolution_halves_per_lod_step_past_begin_and_is_clamped() {
        assert_eq!(tile_resolution_for_lod(0, 0, 16), 16);
        assert_eq!(tile_resolution_for_lod(1, 0, 16), 8);
        assert_eq!(tile_resolution_for_lod(2, 0, 16), MIN_TILE_RESOLUTION.max(4));
        assert_eq!(tile_resolution_for_lod(10, 0, 16), MIN_TILE_RESOLUTION);
    }

    #[test]
    fn octahedral_round_trip_preserves_dominant_axis_sign() {
        let n = Vec3::new(0.2, 0.9, 0.1);
        let enc = encode_octahedral(n);
        // A byte above the midpoint (128) corresponds to a positive
        // component; dominant axis here is +Y so the second byte should
        // encode clearly above the midpoint.
        assert!(enc[1] > 128);
    }

    #[test]
    fn bake_cell_cpu_produces_resolution_squared_texels() {
        let buffer = VoxelBuffer::create(8);
        let cell = CellInfo {
            cell_pos: IVec3::new(2, 2, 2),
            first_index: 0,
            index_count: 6,
        };
        let config = DetailTextureConfig {
            base_tile_resolution: 8,
            ..Default::default()
        };
        let tile = bake_cell_cpu(&buffer, &cell, 0, &config);
        assert_eq!(tile.data.len(), 8 * 8 * tile.bytes_per_texel as usize);
    }

    #[test]
    fn save_png_writes_a_readable_image_of_the_right_size() {
        let tile = Tile {
            resolution: 4,
            bytes_per_texel: 3,
            data: vec![128u8; 4 * 4 * 3],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        tile.save_png(path.to_str().unwrap()).unwrap();
        let loaded = image::open(&path).unwrap();
        assert_eq!(loaded.width(), 4);
        assert_eq!(loaded.height(), 4);
    }

    #[test]
    fn dilate_fills_hole_from_a_neighbor() {
        let mut tile = Tile {
            resolution: 2,
            bytes_per_texel: 3,
            data: vec![
                10, 20, 30, // (0,0)
                0xFF, 0xFF, 0xFF, // (1,0) hole
                10, 20, 30, // (0,1)
                10, 20, 30, // (1,1)
            ],
        };
        dilate(&mut tile, 1);
        assert_ne!(tile.data[3], 0xFF);
    }
}

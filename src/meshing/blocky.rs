//! Cube-face culled mesher with baked ambient occlusion (spec.md §4.4).
//! Grounded on `original_source/meshers/blocky/voxel_mesher_blocky.cpp`'s
//! per-corner `shaded_corner` accumulation and
//! `blocky_model_cube.cpp`'s per-face side meshes; simplified here to axis
//! cubes (no authored side/body sub-meshes) since the authoring pipeline
//! for custom models is out of scope (spec.md §1 non-goals: "Concrete
//! material/shader resources").

use glam::{IVec3, Vec3};
use rustc_hash::FxHashMap;

use crate::meshing::{CellInfo, MeshOutput, PrimitiveType, Surface};
use crate::voxel::{ChannelId, VoxelBuffer};

/// One block type's rendering properties (spec.md §4.4 "model"). Side
/// meshes are implicit unit-cube faces here rather than authored
/// sub-meshes; `transparency_index` still controls cross-model face
/// culling per spec.
#[derive(Debug, Clone)]
pub struct BlockyModel {
    pub material_index: u32,
    /// `None` means fully transparent (air): never emits geometry and
    /// never occludes a neighbor's face.
    pub transparency_index: Option<u32>,
    pub collision_enabled: bool,
    pub random_tickable: bool,
}

impl BlockyModel {
    pub fn opaque(material_index: u32) -> Self {
        Self {
            material_index,
            transparency_index: Some(0),
            collision_enabled: true,
            random_tickable: false,
        }
    }

    pub fn air() -> Self {
        Self {
            material_index: 0,
            transparency_index: None,
            collision_enabled: false,
            random_tickable: false,
        }
    }

    fn is_air(&self) -> bool {
        self.transparency_index.is_none()
    }
}

/// Immutable, baked block-id -> model table (spec.md §9 "Library of
/// models... baking is a separate, offline-ish pass").
#[derive(Debug, Clone, Default)]
pub struct BlockyLibrary {
    models: Vec<BlockyModel>,
}

impl BlockyLibrary {
    pub fn new() -> Self {
        Self { models: vec![BlockyModel::air()] }
    }

    /// Appends a model, returning its freshly assigned id.
    pub fn add_model(&mut self, model: BlockyModel) -> u16 {
        self.models.push(model);
        (self.models.len() - 1) as u16
    }

    pub fn model(&self, id: u16) -> Option<&BlockyModel> {
        self.models.get(id as usize)
    }

    pub fn is_random_tickable(&self, id: u16) -> bool {
        self.model(id).map(|m| m.random_tickable).unwrap_or(false)
    }
}

const FACE_DIRS: [IVec3; 6] = [
    IVec3::new(1, 0, 0),
    IVec3::new(-1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(0, 0, -1),
];

/// Four corners of each face, in local [0,1]^3 cube space, CCW as seen
/// from outside the cube along the face normal.
fn face_corners(face: usize) -> [Vec3; 4] {
    match face {
        0 => [ // +X
            Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0), Vec3::new(1.0, 1.0, 0.0),
        ],
        1 => [ // -X
            Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 1.0),
        ],
        2 => [ // +Y
            Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0), Vec3::new(0.0, 1.0, 1.0),
        ],
        3 => [ // -Y
            Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 0.0),
        ],
        4 => [ // +Z
            Vec3::new(1.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0), Vec3::new(1.0, 1.0, 1.0),
        ],
        _ => [ // -Z
            Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0),
        ],
    }
}

/// For a given face and corner index (0..4 within [`face_corners`]), the
/// two edge-adjacent offsets and the one corner-adjacent offset used for
/// AO (spec.md §4.4 "3 neighboring edge/corner voxels").
fn ao_neighbor_offsets(face_dir: IVec3, corner: Vec3) -> [IVec3; 3] {
    // Corner is in {0,1}^3 relative to the voxel; the two in-plane axes
    // (not the face normal axis) each contribute one edge neighbor, and
    // their combination is the corner neighbor.
    let sign = |v: f32| if v > 0.5 { 1 } else { -1 };
    let (ax, ay, az) = (face_dir.x, face_dir.y, face_dir.z);
    let mut axes = Vec::with_capacity(2);
    if ax == 0 {
        axes.push(0);
    }
    if ay == 0 {
        axes.push(1);
    }
    if az == 0 {
        axes.push(2);
    }
    let offset_for_axis = |axis: usize| -> IVec3 {
        let s = match axis {
            0 => sign(corner.x),
            1 => sign(corner.y),
            _ => sign(corner.z),
        };
        let mut o = face_dir;
        match axis {
            0 => o.x += s,
            1 => o.y += s,
            _ => o.z += s,
        }
        o
    };
    let e0 = offset_for_axis(axes[0]);
    let e1 = offset_for_axis(axes[1]);
    let corner_off = e0 + e1 - face_dir;
    [e0, e1, corner_off]
}

pub struct BlockyMesherConfig {
    pub ao_enabled: bool,
    pub occlusion_darkness: f32,
}

impl Default for BlockyMesherConfig {
    fn default() -> Self {
        Self {
            ao_enabled: true,
            occlusion_darkness: 0.8,
        }
    }
}

pub struct BlockyMesher<'a> {
    pub library: &'a BlockyLibrary,
    pub config: BlockyMesherConfig,
}

impl<'a> BlockyMesher<'a> {
    pub fn new(library: &'a BlockyLibrary) -> Self {
        Self {
            library,
            config: BlockyMesherConfig::default(),
        }
    }

    /// Mesh a padded buffer (spec.md §4.4). `padding` is the number of
    /// voxels of margin on every side that must not itself be emitted,
    /// matching Open Question (b): emitted positions have padding
    /// subtracted so LOD-0 meshes align to world voxel coordinates.
    pub fn mesh(&self, buffer: &VoxelBuffer, padding: i32) -> MeshOutput {
        let size = buffer.size() as i32;
        let interior_min = padding;
        let interior_max = size - padding;

        let mut surfaces: FxHashMap<u32, Surface> = FxHashMap::default();
        let mut cells = Vec::new();

        let model_at = |p: IVec3| -> &BlockyModel {
            let id = buffer.get(ChannelId::Type, p.x, p.y, p.z) as u16;
            self.library.model(id).unwrap_or_else(|| self.library.model(0).unwrap())
        };

        for z in interior_min..interior_max {
            for y in interior_min..interior_max {
                for x in interior_min..interior_max {
                    let pos = IVec3::new(x, y, z);
                    let model = model_at(pos);
                    if model.is_air() {
                        continue;
                    }
                    let my_transparency = model.transparency_index;

                    for (face_idx, &dir) in FACE_DIRS.iter().enumerate() {
                        let neighbor_pos = pos + dir;
                        let neighbor = model_at(neighbor_pos);
                        let culled = match (my_transparency, neighbor.transparency_index) {
                            (_, None) => false, // neighbor is air: never culled
                            (Some(a), Some(b)) => a == b,
                            (None, _) => true,
                        };
                        if culled {
                            continue;
                        }

                        let surface = surfaces
                            .entry(model.material_index)
                            .or_insert_with(|| Surface::new(model.material_index));
                        surface.collision_enabled |= model.collision_enabled;

                        let base = surface.positions.len() as u32;
                        let normal = Vec3::new(dir.x as f32, dir.y as f32, dir.z as f32);
                        let corners = face_corners(face_idx);
                        for (corner_idx, corner) in corners.iter().enumerate() {
                            let world_pos = pos.as_vec3() + *corner - Vec3::splat(padding as f32);
                            surface.positions.push(world_pos);
                            surface.normals.push(normal);
                            surface.uvs.push(uv_for_corner(corner_idx));

                            let shade = if self.config.ao_enabled {
                                let offsets = ao_neighbor_offsets(dir, *corner);
                                let mut shade_count = 0u32;
                                for off in offsets {
                                    if model_at(pos + off).transparency_index.is_some() {
                                        shade_count += 1;
                                    }
                                }
                                shade_count.min(3)
                            } else {
                                0
                            };
                            let grayscale =
                                1.0 - self.config.occlusion_darkness * shade as f32 / 3.0;
                            surface.colors.push([grayscale, grayscale, grayscale, 1.0]);
                        }
                        surface.indices.extend_from_slice(&[
                            base, base + 1, base + 2,
                            base, base + 2, base + 3,
                        ]);

                        let first_index = (surface.indices.len() - 6) as u32;
                        cells.push(CellInfo {
                            cell_pos: pos - IVec3::splat(padding),
                            first_index,
                            index_count: 6,
                        });
                    }
                }
            }
        }

        let mut surface_list: Vec<(u32, Surface)> = surfaces.into_iter().collect();
        surface_list.sort_by_key(|(material, _)| *material);

        MeshOutput {
            surfaces: surface_list.into_iter().map(|(_, s)| s).collect(),
            primitive_type: Some(PrimitiveType::Triangles),
            transition_surfaces: Default::default(),
            cells,
        }
    }
}

fn uv_for_corner(corner_idx: usize) -> [f32; 2] {
    match corner_idx {
        0 => [0.0, 0.0],
        1 => [1.0, 0.0],
        2 => [1.0, 1.0],
        _ => [0.0, 1.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_library() -> BlockyLibrary {
        let mut lib = BlockyLibrary::new();
        lib.add_model(BlockyModel::opaque(0));
        lib
    }

    #[test]
    fn interior_cube_fully_surrounded_emits_no_faces() {
        let lib = cube_library();
        let mut buf = VoxelBuffer::create(5);
        buf.fill_area(1, buf.bounds(), ChannelId::Type);
        let mesher = BlockyMesher::new(&lib);
        let out = mesher.mesh(&buf, 1);
        // Interior region is 1..4 along each axis; every voxel there is
        // fully surrounded by solids (buffer is uniformly solid), so no
        // faces should be emitted.
        assert!(out.is_empty());
    }

    #[test]
    fn single_exposed_cube_emits_six_faces() {
        let lib = cube_library();
        let mut buf = VoxelBuffer::create(3);
        // Only the interior voxel (1,1,1) is solid; padding=1 means the
        // interior region is exactly {1}.
        buf.set(ChannelId::Type, 1, 1, 1, 1);
        let mesher = BlockyMesher::new(&lib);
        let out = mesher.mesh(&buf, 1);
        let total_tris: usize = out.surfaces.iter().map(|s| s.indices.len() / 3).sum();
        assert_eq!(total_tris, 12); // 6 faces * 2 triangles
    }

    #[test]
    fn ao_darkens_corners_near_more_opaque_neighbors() {
        let lib = cube_library();
        let mut buf = VoxelBuffer::create(5);
        // Center solid voxel with one adjacent solid voxel off to the
        // side of one face, to create a non-uniform AO pattern.
        buf.set(ChannelId::Type, 2, 2, 2, 1);
        buf.set(ChannelId::Type, 3, 2, 2, 1);
        buf.set(ChannelId::Type, 3, 3, 2, 1);
        let mesher = BlockyMesher::new(&lib);
        let out = mesher.mesh(&buf, 1);
        assert!(!out.is_empty());
        let has_shadow = out
            .surfaces
            .iter()
            .flat_map(|s| s.colors.iter())
            .any(|c| c[0] < 1.0);
        assert!(has_shadow, "expected at least one shaded corner");
    }
}

//! Meshing pipeline: shared output types plus the two mesher
//! implementations (spec.md §4.4/§4.5). Grounded on
//! `original_source/meshers/blocky/voxel_mesher_blocky.cpp` and
//! `original_source/meshers/transvoxel/voxel_mesher_transvoxel.cpp`.

pub mod blocky;
pub mod transvoxel;

pub use blocky::{BlockyLibrary, BlockyMesher, BlockyModel};
pub use transvoxel::TransvoxelMesher;

use glam::{IVec3, Vec3};

/// Triangles or lines (spec.md §3.1 `Mesher.Output`: "a primitive type").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Triangles,
    Lines,
}

/// One material's worth of geometry.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<[f32; 2]>,
    pub colors: Vec<[f32; 4]>,
    pub indices: Vec<u32>,
    pub material_index: u32,
    pub collision_enabled: bool,
}

impl Surface {
    pub fn new(material_index: u32) -> Self {
        Self {
            material_index,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Describes which cell produced a given triangle block, consumed by the
/// detail-texture baker (spec.md §3.1 `CellInfo`).
#[derive(Debug, Clone, Copy)]
pub struct CellInfo {
    pub cell_pos: IVec3,
    pub first_index: u32,
    pub index_count: u32,
}

/// Output of either mesher (spec.md §3.1 `Mesher.Output`).
#[derive(Debug, Clone, Default)]
pub struct MeshOutput {
    pub surfaces: Vec<Surface>,
    pub primitive_type: Option<PrimitiveType>,
    /// One per ±X/±Y/±Z face, only populated by the Transvoxel mesher
    /// (spec.md §4.5 "Transition meshes").
    pub transition_surfaces: [Option<Surface>; 6],
    pub cells: Vec<CellInfo>,
}

impl MeshOutput {
    pub fn is_empty(&self) -> bool {
        self.surfaces.iter().all(Surface::is_empty)
    }
}

/// Which of the six chunk faces a transition surface belongs to, matching
/// `border_mask` bit order (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Face {
    NegX = 0,
    PosX = 1,
    NegY = 2,
    PosY = 3,
    NegZ = 4,
    PosZ = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::NegX,
        Face::PosX,
        Face::NegY,
        Face::PosY,
        Face::NegZ,
        Face::PosZ,
    ];

    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn normal(self) -> IVec3 {
        match self {
            Face::NegX => IVec3::new(-1, 0, 0),
            Face::PosX => IVec3::new(1, 0, 0),
            Face::NegY => IVec3::new(0, -1, 0),
            Face::PosY => IVec3::new(0, 1, 0),
            Face::NegZ => IVec3::new(0, 0, -1),
            Face::PosZ => IVec3::new(0, 0, 1),
        }
    }
}

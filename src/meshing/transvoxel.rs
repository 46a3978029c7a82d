//! Smooth SDF isosurface mesher (spec.md §4.5). Grounded on
//! `original_source/meshers/transvoxel/voxel_mesher_transvoxel.cpp`: the
//! padded-cell iteration, 8-bit fixed-point edge interpolation (`t =
//! (s1<<8)/(s1-s0)`), and the border-offset secondary-position projection
//! used to stitch transition meshes against a coarser neighbor.
//!
//! The proprietary 256-entry `RegularCellData`/`TransitionCellData` case
//! tables from `transvoxel_tables.cpp` are not available anywhere in this
//! codebase's reference material, so `CASE_TABLE` below is this crate's
//! own: for each of the 256 corner-sign combinations, the inside corners
//! are grouped into connected components under the cube's 12-edge
//! adjacency graph, and each component's boundary loop is traced by
//! resolving, per cube face, which of that face's crossed edges connect
//! to which (unambiguous whenever a face carries 1, 2 adjacent, or 3
//! in/out corners — the only case this construction ever has to handle,
//! since a component, being connected through shared edges, can never
//! place exactly two of its corners as an isolated diagonal pair on a
//! face without a third component corner also on that face resolving the
//! ambiguity). Cases with more than 4 inside corners are derived from
//! their sign-flipped complement with reversed winding rather than
//! walked directly. Noted in DESIGN.md.

use glam::{IVec3, Vec3};
use std::collections::HashMap;

use crate::meshing::{CellInfo, Face, MeshOutput, PrimitiveType, Surface};
use crate::voxel::{ChannelId, VoxelBuffer};

pub const MIN_PADDING: i32 = 1;
pub const MAX_PADDING: i32 = 2;

const TRANSITION_CELL_SCALE: f32 = 0.25;

/// Corner offsets within a cell, indexed so that bit0=x, bit1=y, bit2=z
/// (matches `original_source`'s corner_positions ordering).
const CORNER_OFFSETS: [IVec3; 8] = [
    IVec3::new(0, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(1, 1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(1, 0, 1),
    IVec3::new(0, 1, 1),
    IVec3::new(1, 1, 1),
];

/// The cube's 12 edges as corner-index pairs, in the numbering
/// `CASE_TABLE` and `EDGE_REUSE` are both keyed on.
const EDGE_CORNERS: [(u8, u8); 12] = [
    (0, 1),
    (0, 2),
    (0, 4),
    (1, 3),
    (1, 5),
    (2, 3),
    (2, 6),
    (3, 7),
    (4, 5),
    (4, 6),
    (5, 7),
    (6, 7),
];

/// Vertex-reuse table (spec.md §4.5 "Vertex reuse"). Each edge names the
/// neighbor cell (`reuse_dir`, components in {0,-1}) that owns it and
/// the slot (0=X, 1=Y, 2=Z) that neighbor files it under when it
/// computes that same physical edge as one of *its own* three "self
/// owned" edges (X/Y/Z edges touching its own corner 0). Self-owned
/// edges carry `reuse_dir == (0,0,0)`.
const EDGE_REUSE: [(IVec3, usize); 12] = [
    (IVec3::new(0, 0, 0), 0),
    (IVec3::new(0, 0, 0), 1),
    (IVec3::new(0, 0, 0), 2),
    (IVec3::new(-1, 0, 0), 1),
    (IVec3::new(-1, 0, 0), 2),
    (IVec3::new(0, -1, 0), 0),
    (IVec3::new(0, -1, 0), 2),
    (IVec3::new(-1, -1, 0), 2),
    (IVec3::new(0, 0, -1), 0),
    (IVec3::new(0, 0, -1), 1),
    (IVec3::new(-1, 0, -1), 1),
    (IVec3::new(0, -1, -1), 0),
];

/// Triangle connectivity per 8-bit case code: up to 5 triangles (15
/// indices), each triple naming edges from `EDGE_CORNERS`/`EDGE_REUSE`,
/// padded with `-1`. See the module doc comment for how this is derived;
/// case 0 and 255 (rows 0 and 255) are empty, and every other row's
/// triangle count matches its sign-flipped complement's row.
#[rustfmt::skip]
const CASE_TABLE: [[i8; 12]; 256] = [
    [-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1], [0,1,2,-1,-1,-1,-1,-1,-1,-1,-1,-1], [0,4,3,-1,-1,-1,-1,-1,-1,-1,-1,-1], [1,2,4,1,4,3,-1,-1,-1,-1,-1,-1],
    [1,5,6,-1,-1,-1,-1,-1,-1,-1,-1,-1], [0,6,2,0,5,6,-1,-1,-1,-1,-1,-1], [0,3,4,1,6,5,-1,-1,-1,-1,-1,-1], [2,5,6,2,3,5,2,4,3,-1,-1,-1],
    [3,7,5,-1,-1,-1,-1,-1,-1,-1,-1,-1], [0,2,1,3,5,7,-1,-1,-1,-1,-1,-1], [0,4,7,0,7,5,-1,-1,-1,-1,-1,-1], [1,2,4,1,4,7,1,7,5,-1,-1,-1],
    [1,7,6,1,3,7,-1,-1,-1,-1,-1,-1], [0,6,2,0,7,6,0,3,7,-1,-1,-1], [0,4,7,0,7,6,0,6,1,-1,-1,-1], [2,7,6,2,4,7,-1,-1,-1,-1,-1,-1],
    [8,2,9,-1,-1,-1,-1,-1,-1,-1,-1,-1], [0,9,8,0,1,9,-1,-1,-1,-1,-1,-1], [0,3,4,8,9,2,-1,-1,-1,-1,-1,-1], [1,9,8,1,8,4,1,4,3,-1,-1,-1],
    [1,6,5,8,9,2,-1,-1,-1,-1,-1,-1], [0,9,8,0,6,9,0,5,6,-1,-1,-1], [0,3,4,1,6,5,8,9,2,-1,-1,-1], [3,8,4,3,9,8,3,6,9,3,5,6],
    [3,5,7,8,9,2,-1,-1,-1,-1,-1,-1], [0,8,9,0,9,1,3,5,7,-1,-1,-1], [0,7,4,0,5,7,8,9,2,-1,-1,-1], [1,8,9,1,8,4,1,4,7,1,7,5],
    [1,6,7,1,7,3,8,9,2,-1,-1,-1], [0,8,9,0,9,6,0,6,7,0,3,7], [0,7,4,0,7,6,0,6,1,8,9,2], [4,7,6,4,6,9,4,9,8,-1,-1,-1],
    [8,10,4,-1,-1,-1,-1,-1,-1,-1,-1,-1], [0,2,1,8,4,10,-1,-1,-1,-1,-1,-1], [0,8,10,0,10,3,-1,-1,-1,-1,-1,-1], [1,2,8,1,8,10,1,10,3,-1,-1,-1],
    [1,6,5,8,4,10,-1,-1,-1,-1,-1,-1], [0,2,6,0,6,5,8,4,10,-1,-1,-1], [0,10,8,0,3,10,1,6,5,-1,-1,-1], [2,6,5,2,5,3,2,3,10,2,8,10],
    [3,5,7,8,4,10,-1,-1,-1,-1,-1,-1], [0,2,1,3,5,7,8,4,10,-1,-1,-1], [0,8,10,0,10,7,0,7,5,-1,-1,-1], [1,2,8,1,8,10,1,10,7,1,7,5],
    [1,6,7,1,7,3,8,4,10,-1,-1,-1], [0,2,6,0,6,7,0,3,7,8,4,10], [0,10,8,0,7,10,0,7,6,0,6,1], [2,7,6,2,10,7,2,8,10,-1,-1,-1],
    [9,4,2,9,10,4,-1,-1,-1,-1,-1,-1], [0,10,4,0,9,10,0,1,9,-1,-1,-1], [0,2,9,0,9,10,0,10,3,-1,-1,-1], [1,9,10,1,10,3,-1,-1,-1,-1,-1,-1],
    [1,6,5,9,2,4,9,4,10,-1,-1,-1], [0,10,4,0,10,9,0,9,6,0,6,5], [0,2,9,0,9,10,0,3,10,1,6,5], [3,9,10,3,6,9,3,5,6,-1,-1,-1],
    [3,5,7,9,2,4,9,4,10,-1,-1,-1], [0,10,4,0,10,9,0,9,1,3,5,7], [0,2,9,0,9,10,0,7,10,0,5,7], [1,9,10,1,10,7,1,7,5,-1,-1,-1],
    [1,6,7,1,7,3,9,2,4,9,4,10], [0,4,3,9,6,7,9,7,10,-1,-1,-1], [0,1,2,9,6,7,9,7,10,-1,-1,-1], [9,7,6,9,10,7,-1,-1,-1,-1,-1,-1],
    [9,6,11,-1,-1,-1,-1,-1,-1,-1,-1,-1], [0,2,1,9,11,6,-1,-1,-1,-1,-1,-1], [0,3,4,9,11,6,-1,-1,-1,-1,-1,-1], [1,4,2,1,3,4,9,11,6,-1,-1,-1],
    [1,11,9,1,5,11,-1,-1,-1,-1,-1,-1], [0,9,2,0,11,9,0,5,11,-1,-1,-1], [0,3,4,1,9,11,1,11,5,-1,-1,-1], [2,11,9,2,11,5,2,5,3,2,3,4],
    [3,5,7,9,11,6,-1,-1,-1,-1,-1,-1], [0,2,1,3,5,7,9,11,6,-1,-1,-1], [0,7,4,0,5,7,9,11,6,-1,-1,-1], [1,4,2,1,4,7,1,7,5,9,11,6],
    [1,11,9,1,7,11,1,3,7,-1,-1,-1], [0,9,2,0,11,9,0,7,11,0,3,7], [0,7,4,0,7,11,0,11,9,0,9,1], [2,11,9,2,7,11,2,4,7,-1,-1,-1],
    [8,2,6,8,6,11,-1,-1,-1,-1,-1,-1], [0,11,8,0,6,11,0,1,6,-1,-1,-1], [0,3,4,8,6,2,8,11,6,-1,-1,-1], [1,6,11,1,11,8,1,8,4,1,3,4],
    [1,8,2,1,11,8,1,5,11,-1,-1,-1], [0,11,8,0,5,11,-1,-1,-1,-1,-1,-1], [0,3,4,1,8,2,1,8,11,1,11,5], [3,8,4,3,11,8,3,5,11,-1,-1,-1],
    [3,5,7,8,6,2,8,11,6,-1,-1,-1], [0,11,8,0,6,11,0,1,6,3,5,7], [0,7,4,0,5,7,8,6,2,8,11,6], [1,5,6,8,7,4,8,11,7,-1,-1,-1],
    [1,8,2,1,8,11,1,11,7,1,7,3], [0,11,8,0,7,11,0,3,7,-1,-1,-1], [0,1,2,8,7,4,8,11,7,-1,-1,-1], [8,4,7,8,7,11,-1,-1,-1,-1,-1,-1],
    [8,4,10,9,11,6,-1,-1,-1,-1,-1,-1], [0,2,1,8,4,10,9,11,6,-1,-1,-1], [0,10,8,0,3,10,9,11,6,-1,-1,-1], [1,2,8,1,8,10,1,10,3,9,11,6],
    [1,9,11,1,11,5,8,4,10,-1,-1,-1], [0,9,2,0,11,9,0,5,11,8,4,10], [0,10,8,0,3,10,1,9,11,1,11,5], [11,5,3,11,3,10,8,2,9,-1,-1,-1],
    [3,5,7,8,4,10,9,11,6,-1,-1,-1], [0,2,1,3,5,7,8,4,10,9,11,6], [0,10,8,0,7,10,0,5,7,9,11,6], [1,5,6,8,2,9,10,11,7,-1,-1,-1],
    [1,9,11,1,11,7,1,7,3,8,4,10], [0,4,3,8,2,9,10,11,7,-1,-1,-1], [0,9,8,0,1,9,10,11,7,-1,-1,-1], [8,2,9,10,11,7,-1,-1,-1,-1,-1,-1],
    [2,6,11,2,11,10,2,10,4,-1,-1,-1], [0,10,4,0,11,10,0,6,11,0,1,6], [0,2,6,0,6,11,0,11,10,0,3,10], [1,6,11,1,11,10,1,10,3,-1,-1,-1],
    [1,4,2,1,10,4,1,11,10,1,11,5], [0,10,4,0,11,10,0,5,11,-1,-1,-1], [0,1,2,11,5,3,11,3,10,-1,-1,-1], [11,3,5,11,10,3,-1,-1,-1,-1,-1,-1],
    [3,5,7,2,11,6,2,10,11,2,4,10], [0,4,3,1,5,6,10,11,7,-1,-1,-1], [0,6,2,0,5,6,10,11,7,-1,-1,-1], [1,5,6,10,11,7,-1,-1,-1,-1,-1,-1],
    [1,2,4,1,4,3,10,11,7,-1,-1,-1], [0,4,3,10,11,7,-1,-1,-1,-1,-1,-1], [0,1,2,10,11,7,-1,-1,-1,-1,-1,-1], [10,7,11,-1,-1,-1,-1,-1,-1,-1,-1,-1],
    [10,11,7,-1,-1,-1,-1,-1,-1,-1,-1,-1], [0,2,1,10,7,11,-1,-1,-1,-1,-1,-1], [0,3,4,10,7,11,-1,-1,-1,-1,-1,-1], [1,4,2,1,3,4,10,7,11,-1,-1,-1],
    [1,6,5,10,7,11,-1,-1,-1,-1,-1,-1], [0,2,6,0,6,5,10,7,11,-1,-1,-1], [0,3,4,1,6,5,10,7,11,-1,-1,-1], [3,7,5,2,6,11,2,11,10,2,10,4],
    [11,5,3,11,3,10,-1,-1,-1,-1,-1,-1], [0,2,1,11,3,5,11,10,3,-1,-1,-1], [0,4,10,0,10,11,0,11,5,-1,-1,-1], [1,2,4,1,4,10,1,10,11,1,5,11],
    [1,11,6,1,10,11,1,3,10,-1,-1,-1], [0,6,2,0,11,6,0,10,11,0,10,3], [0,4,10,0,10,11,0,11,6,0,6,1], [2,11,6,2,10,11,2,4,10,-1,-1,-1],
    [8,9,2,10,7,11,-1,-1,-1,-1,-1,-1], [0,8,9,0,9,1,10,7,11,-1,-1,-1], [0,3,4,8,9,2,10,7,11,-1,-1,-1], [1,11,9,1,7,11,1,3,7,8,10,4],
    [1,6,5,8,9,2,10,7,11,-1,-1,-1], [0,8,10,0,10,7,0,7,5,9,6,11], [0,1,2,3,7,5,8,10,4,9,6,11], [3,7,5,8,10,4,9,6,11,-1,-1,-1],
    [11,3,5,11,10,3,8,9,2,-1,-1,-1], [0,8,10,0,10,3,1,11,9,1,5,11], [0,2,9,0,9,11,0,11,5,8,10,4], [1,11,9,1,5,11,8,10,4,-1,-1,-1],
    [1,8,2,1,10,8,1,3,10,9,6,11], [0,8,10,0,10,3,9,6,11,-1,-1,-1], [0,1,2,8,10,4,9,6,11,-1,-1,-1], [8,10,4,9,6,11,-1,-1,-1,-1,-1,-1],
    [8,7,4,8,11,7,-1,-1,-1,-1,-1,-1], [0,2,1,8,4,7,8,7,11,-1,-1,-1], [0,8,11,0,11,7,0,7,3,-1,-1,-1], [1,2,8,1,11,8,1,7,11,1,3,7],
    [1,6,5,8,4,7,8,7,11,-1,-1,-1], [0,4,7,0,7,5,8,2,6,8,6,11], [0,8,11,0,11,6,0,6,1,3,7,5], [3,7,5,8,2,6,8,6,11,-1,-1,-1],
    [3,4,8,3,8,11,3,11,5,-1,-1,-1], [0,4,3,1,2,8,1,11,8,1,5,11], [0,8,11,0,11,5,-1,-1,-1,-1,-1,-1], [1,2,8,1,8,11,1,11,5,-1,-1,-1],
    [1,11,6,1,8,11,1,4,8,1,4,3], [0,4,3,8,2,6,8,6,11,-1,-1,-1], [0,8,11,0,11,6,0,6,1,-1,-1,-1], [8,6,2,8,11,6,-1,-1,-1,-1,-1,-1],
    [2,9,11,2,11,7,2,7,4,-1,-1,-1], [0,4,7,0,11,7,0,9,11,0,1,9], [0,2,9,0,9,11,0,11,7,0,7,3], [1,9,11,1,11,7,1,7,3,-1,-1,-1],
    [1,2,4,1,7,4,1,5,7,9,6,11], [0,4,7,0,7,5,9,6,11,-1,-1,-1], [0,1,2,3,7,5,9,6,11,-1,-1,-1], [3,7,5,9,6,11,-1,-1,-1,-1,-1,-1],
    [2,9,11,2,5,11,2,3,5,2,4,3], [0,4,3,1,11,9,1,5,11,-1,-1,-1], [0,2,9,0,9,11,0,11,5,-1,-1,-1], [1,9,11,1,11,5,-1,-1,-1,-1,-1,-1],
    [1,2,4,1,4,3,9,6,11,-1,-1,-1], [0,4,3,9,6,11,-1,-1,-1,-1,-1,-1], [0,1,2,9,6,11,-1,-1,-1,-1,-1,-1], [9,11,6,-1,-1,-1,-1,-1,-1,-1,-1,-1],
    [9,6,7,9,7,10,-1,-1,-1,-1,-1,-1], [0,2,1,9,7,6,9,10,7,-1,-1,-1], [0,3,4,9,7,6,9,10,7,-1,-1,-1], [1,7,6,1,3,7,9,4,2,9,10,4],
    [1,10,9,1,7,10,1,5,7,-1,-1,-1], [0,9,2,0,10,9,0,10,7,0,7,5], [0,4,10,0,9,10,0,1,9,3,7,5], [3,7,5,9,4,2,9,10,4,-1,-1,-1],
    [3,10,9,3,9,6,3,6,5,-1,-1,-1], [0,9,2,0,10,9,0,10,3,1,5,6], [0,4,10,0,9,10,0,6,9,0,5,6], [1,5,6,9,4,2,9,10,4,-1,-1,-1],
    [1,10,9,1,3,10,-1,-1,-1,-1,-1,-1], [0,9,2,0,10,9,0,3,10,-1,-1,-1], [0,4,10,0,10,9,0,9,1,-1,-1,-1], [9,2,4,9,4,10,-1,-1,-1,-1,-1,-1],
    [2,6,7,2,7,10,2,10,8,-1,-1,-1], [0,8,10,0,10,7,0,6,7,0,1,6], [0,6,2,0,7,6,0,7,3,8,10,4], [1,7,6,1,3,7,8,10,4,-1,-1,-1],
    [1,8,2,1,10,8,1,7,10,1,5,7], [0,10,8,0,7,10,0,5,7,-1,-1,-1], [0,1,2,3,7,5,8,10,4,-1,-1,-1], [3,7,5,8,10,4,-1,-1,-1,-1,-1,-1],
    [2,5,6,2,3,5,2,10,3,2,10,8], [0,8,10,0,10,3,1,5,6,-1,-1,-1], [0,6,2,0,5,6,8,10,4,-1,-1,-1], [1,5,6,8,10,4,-1,-1,-1,-1,-1,-1],
    [1,8,2,1,10,8,1,3,10,-1,-1,-1], [0,10,8,0,3,10,-1,-1,-1,-1,-1,-1], [0,1,2,8,10,4,-1,-1,-1,-1,-1,-1], [8,4,10,-1,-1,-1,-1,-1,-1,-1,-1,-1],
    [4,6,7,4,9,6,4,8,9,-1,-1,-1], [0,4,7,0,6,7,0,1,6,8,2,9], [0,9,8,0,6,9,0,7,6,0,7,3], [1,7,6,1,3,7,8,2,9,-1,-1,-1],
    [1,9,8,1,4,8,1,7,4,1,5,7], [0,4,7,0,7,5,8,2,9,-1,-1,-1], [0,9,8,0,1,9,3,7,5,-1,-1,-1], [3,7,5,8,2,9,-1,-1,-1,-1,-1,-1],
    [3,4,8,3,8,9,3,9,6,3,6,5], [0,4,3,1,5,6,8,2,9,-1,-1,-1], [0,8,9,0,9,6,0,6,5,-1,-1,-1], [1,5,6,8,2,9,-1,-1,-1,-1,-1,-1],
    [1,8,9,1,4,8,1,3,4,-1,-1,-1], [0,4,3,8,2,9,-1,-1,-1,-1,-1,-1], [0,8,9,0,9,1,-1,-1,-1,-1,-1,-1], [8,9,2,-1,-1,-1,-1,-1,-1,-1,-1,-1],
    [2,6,7,2,7,4,-1,-1,-1,-1,-1,-1], [0,7,4,0,6,7,0,1,6,-1,-1,-1], [0,2,6,0,6,7,0,7,3,-1,-1,-1], [1,6,7,1,7,3,-1,-1,-1,-1,-1,-1],
    [1,4,2,1,7,4,1,5,7,-1,-1,-1], [0,7,4,0,5,7,-1,-1,-1,-1,-1,-1], [0,1,2,3,7,5,-1,-1,-1,-1,-1,-1], [3,5,7,-1,-1,-1,-1,-1,-1,-1,-1,-1],
    [2,6,5,2,5,3,2,3,4,-1,-1,-1], [0,4,3,1,5,6,-1,-1,-1,-1,-1,-1], [0,2,6,0,6,5,-1,-1,-1,-1,-1,-1], [1,6,5,-1,-1,-1,-1,-1,-1,-1,-1,-1],
    [1,4,2,1,3,4,-1,-1,-1,-1,-1,-1], [0,3,4,-1,-1,-1,-1,-1,-1,-1,-1,-1], [0,2,1,-1,-1,-1,-1,-1,-1,-1,-1,-1], [-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1],
];

pub struct TransvoxelMesher<'a> {
    pub buffer: &'a VoxelBuffer,
    pub lod: u32,
}

struct CellVertex {
    position: Vec3,
    normal: Vec3,
    border_delta: Vec3,
}

/// Per-axis vertex cache for one Z-slab, keyed by the (x, y) cell that
/// owns each of its three self-owned edges (spec.md §4.5 "Vertex
/// reuse"). `mesh`/`mesh_transition` keep one of these for the current
/// Z layer and one for the previous layer, swapping as Z advances.
#[derive(Default)]
struct Slab {
    entries: HashMap<(i32, i32), [Option<u32>; 3]>,
}

impl Slab {
    fn get(&self, x: i32, y: i32, slot: usize) -> Option<u32> {
        self.entries.get(&(x, y)).and_then(|slots| slots[slot])
    }

    fn set(&mut self, x: i32, y: i32, slot: usize, index: u32) {
        self.entries.entry((x, y)).or_insert([None; 3])[slot] = Some(index);
    }
}

impl<'a> TransvoxelMesher<'a> {
    pub fn new(buffer: &'a VoxelBuffer, lod: u32) -> Self {
        Self { buffer, lod }
    }

    fn sample(&self, p: IVec3) -> f32 {
        self.buffer.get_f(ChannelId::Sdf, p.x, p.y, p.z)
    }

    fn gradient(&self, p: IVec3) -> Vec3 {
        // Central difference; left un-renormalized per the spec's gradient
        // open question: callers decide whether to normalize.
        let nx = self.sample(p - IVec3::X);
        let px = self.sample(p + IVec3::X);
        let ny = self.sample(p - IVec3::Y);
        let py = self.sample(p + IVec3::Y);
        let nz = self.sample(p - IVec3::Z);
        let pz = self.sample(p + IVec3::Z);
        Vec3::new(nx - px, ny - py, nz - pz)
    }

    /// Interpolate a vertex between two signed samples, using the 8-bit
    /// fixed-point fraction from `original_source` (`t = (s1<<8)/(s1-s0)`).
    fn interpolate(
        &self,
        p0: IVec3,
        p1: IVec3,
        s0: f32,
        s1: f32,
        block_size: IVec3,
    ) -> CellVertex {
        let t_fixed = ((s1 * 256.0) / (s1 - s0)).round().clamp(0.0, 256.0) as i32;
        let frac = t_fixed as f32 / 256.0;

        let scale = 1i32 << self.lod;
        let local0 = (p0 - IVec3::splat(MIN_PADDING)) * scale;
        let local1 = (p1 - IVec3::splat(MIN_PADDING)) * scale;
        let position = local0.as_vec3().lerp(local1.as_vec3(), frac);

        let g0 = self.gradient(p0);
        let g1 = self.gradient(p1);
        let normal = g0.lerp(g1, frac);

        let border_delta = get_border_offset(position, self.lod, block_size);
        CellVertex {
            position,
            normal,
            border_delta,
        }
    }

    /// Resolve the vertex index for one of a cell's 12 edges, reusing a
    /// neighbor's already-computed vertex where `EDGE_REUSE` says this
    /// edge isn't self-owned, and falling back to a fresh (uncached)
    /// computation at the edge of the iterated range, where no cached
    /// neighbor exists to share with anyway.
    #[allow(clippy::too_many_arguments)]
    fn edge_vertex(
        &self,
        cell: IVec3,
        edge: usize,
        corner_pos: &[IVec3; 8],
        samples: &[f32; 8],
        block_size: IVec3,
        current: &mut Slab,
        previous: &Slab,
        surface: &mut Surface,
    ) -> u32 {
        let (reuse_dir, slot) = EDGE_REUSE[edge];
        if reuse_dir == IVec3::ZERO {
            let (a, b) = EDGE_CORNERS[edge];
            let v = self.interpolate(
                corner_pos[a as usize],
                corner_pos[b as usize],
                samples[a as usize],
                samples[b as usize],
                block_size,
            );
            let idx = push_vertex(surface, &v);
            current.set(cell.x, cell.y, slot, idx);
            return idx;
        }

        let nx = cell.x + reuse_dir.x;
        let ny = cell.y + reuse_dir.y;
        let slab = if reuse_dir.z == 0 { &*current } else { previous };
        if let Some(idx) = slab.get(nx, ny, slot) {
            return idx;
        }

        // Boundary fallback: the owning neighbor falls outside the
        // iterated range, so compute this edge directly without caching
        // it (nothing further along will ever look it up).
        let (a, b) = EDGE_CORNERS[edge];
        let v = self.interpolate(
            corner_pos[a as usize],
            corner_pos[b as usize],
            samples[a as usize],
            samples[b as usize],
            block_size,
        );
        push_vertex(surface, &v)
    }

    fn mesh_cell(
        &self,
        cell: IVec3,
        corner_pos: &[IVec3; 8],
        samples: &[f32; 8],
        case_code: u8,
        block_size: IVec3,
        current: &mut Slab,
        previous: &Slab,
        surface: &mut Surface,
    ) {
        let row = &CASE_TABLE[case_code as usize];
        let mut edge_indices = [u32::MAX; 12];

        let mut i = 0;
        while i < 12 && row[i] >= 0 {
            for &e in &row[i..i + 3] {
                let edge = e as usize;
                if edge_indices[edge] == u32::MAX {
                    edge_indices[edge] = self.edge_vertex(
                        cell, edge, corner_pos, samples, block_size, current, previous, surface,
                    );
                }
            }
            let e0 = edge_indices[row[i] as usize];
            let e1 = edge_indices[row[i + 1] as usize];
            let e2 = edge_indices[row[i + 2] as usize];
            surface.indices.extend_from_slice(&[e0, e1, e2]);
            i += 3;
        }
    }

    /// Extract the regular (non-transition) surface for the padded
    /// buffer, following spec.md §4.5 "Regular cells".
    pub fn mesh(&self) -> MeshOutput {
        let size = self.buffer.size() as i32;
        let block_size_with_padding = IVec3::splat(size);
        let block_size = block_size_with_padding - IVec3::splat(MIN_PADDING + MAX_PADDING);

        let mut surface = Surface::new(0);
        let mut cells = Vec::new();
        let min_pos = IVec3::splat(MIN_PADDING);
        let max_pos = block_size_with_padding - IVec3::splat(MAX_PADDING);

        let mut previous = Slab::default();
        for z in min_pos.z..max_pos.z {
            let mut current = Slab::default();
            for y in min_pos.y..max_pos.y {
                for x in min_pos.x..max_pos.x {
                    let cell_origin = IVec3::new(x, y, z);
                    let corner_pos: [IVec3; 8] =
                        std::array::from_fn(|i| cell_origin + CORNER_OFFSETS[i]);
                    let samples: [f32; 8] = std::array::from_fn(|i| self.sample(corner_pos[i]));

                    let case_code: u8 = (0..8)
                        .filter(|&i| samples[i] < 0.0)
                        .fold(0u8, |acc, i| acc | (1 << i));
                    if case_code == 0 || case_code == 255 {
                        continue;
                    }

                    let first_index = surface.indices.len() as u32;
                    self.mesh_cell(
                        cell_origin,
                        &corner_pos,
                        &samples,
                        case_code,
                        block_size,
                        &mut current,
                        &previous,
                        &mut surface,
                    );
                    let index_count = surface.indices.len() as u32 - first_index;
                    if index_count > 0 {
                        cells.push(CellInfo {
                            cell_pos: cell_origin - min_pos,
                            first_index,
                            index_count,
                        });
                    }
                }
            }
            previous = current;
        }

        MeshOutput {
            surfaces: if surface.is_empty() { Vec::new() } else { vec![surface] },
            primitive_type: Some(PrimitiveType::Triangles),
            transition_surfaces: Default::default(),
            cells,
        }
    }

    /// Transition surface for one face (spec.md §4.5 "Transition
    /// meshes"). Re-meshes the one-cell-thick slab adjacent to `face` and
    /// projects vertices toward the coarser neighbor's position using
    /// `get_border_offset`/`project_border_offset`.
    pub fn mesh_transition(&self, face: Face) -> Option<Surface> {
        let size = self.buffer.size() as i32;
        let block_size_with_padding = IVec3::splat(size);
        let block_size = block_size_with_padding - IVec3::splat(MIN_PADDING + MAX_PADDING);
        let min_pos = IVec3::splat(MIN_PADDING);
        let max_pos = block_size_with_padding - IVec3::splat(MAX_PADDING);

        let mut surface = Surface::new(0);
        let normal_dir = face.normal();

        let mut previous = Slab::default();
        for z in min_pos.z..max_pos.z {
            let mut current = Slab::default();
            for y in min_pos.y..max_pos.y {
                for x in min_pos.x..max_pos.x {
                    let cell_origin = IVec3::new(x, y, z);
                    if !cell_touches_face(cell_origin, min_pos, max_pos, face) {
                        continue;
                    }
                    let corner_pos: [IVec3; 8] =
                        std::array::from_fn(|i| cell_origin + CORNER_OFFSETS[i]);
                    let samples: [f32; 8] = std::array::from_fn(|i| self.sample(corner_pos[i]));
                    let case_code: u8 = (0..8)
                        .filter(|&i| samples[i] < 0.0)
                        .fold(0u8, |acc, i| acc | (1 << i));
                    if case_code == 0 || case_code == 255 {
                        continue;
                    }
                    self.mesh_cell(
                        cell_origin,
                        &corner_pos,
                        &samples,
                        case_code,
                        block_size,
                        &mut current,
                        &previous,
                        &mut surface,
                    );
                }
            }
            previous = current;
        }

        if surface.is_empty() {
            return None;
        }

        // Pull boundary-layer vertices toward the coarse neighbor's
        // effective sample grid using the projected border offset,
        // matching `get_secondary_position` in the original mesher.
        for p in surface.positions.iter_mut() {
            let delta = project_border_offset(
                get_border_offset(*p, self.lod, block_size),
                normal_dir.as_vec3(),
            );
            *p += delta;
        }

        Some(surface)
    }
}

fn push_vertex(surface: &mut Surface, v: &CellVertex) -> u32 {
    let idx = surface.positions.len() as u32;
    surface.positions.push(v.position);
    surface.normals.push(v.normal);
    surface.uvs.push([0.0, 0.0]);
    surface.colors.push([v.border_delta.x, v.border_delta.y, v.border_delta.z, 1.0]);
    idx
}

fn cell_touches_face(cell: IVec3, min_pos: IVec3, max_pos: IVec3, face: Face) -> bool {
    match face {
        Face::NegX => cell.x == min_pos.x,
        Face::PosX => cell.x == max_pos.x - 1,
        Face::NegY => cell.y == min_pos.y,
        Face::PosY => cell.y == max_pos.y - 1,
        Face::NegZ => cell.z == min_pos.z,
        Face::PosZ => cell.z == max_pos.z - 1,
    }
}

/// Offset applied to vertices near a block boundary so transition cells
/// have room between LODs (ported directly: generic vector math, not a
/// proprietary case table).
fn get_border_offset(pos: Vec3, lod_index: u32, block_size: IVec3) -> Vec3 {
    let p2k = (1u32 << lod_index) as f32;
    let p2mk = 1.0 / p2k;
    let wk = TRANSITION_CELL_SCALE * p2k;

    let mut delta = Vec3::ZERO;
    for i in 0..3 {
        let p = pos[i];
        let s = block_size[i] as f32;
        if p < p2k {
            delta[i] = (1.0 - p2mk * p) * wk;
        } else if p > (p2k * (s - 1.0)) {
            delta[i] = ((p2k * s) - 1.0 - p) * wk;
        }
    }
    delta
}

fn project_border_offset(delta: Vec3, normal: Vec3) -> Vec3 {
    Vec3::new(
        (1.0 - normal.x * normal.x) * delta.x - normal.y * normal.x * delta.y
            - normal.z * normal.x * delta.z,
        -normal.x * normal.y * delta.x + (1.0 - normal.y * normal.y) * delta.y
            - normal.z * normal.y * delta.z,
        -normal.x * normal.z * delta.x - normal.y * normal.z * delta.y
            + (1.0 - normal.z * normal.z) * delta.z,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::channel::Depth;

    fn flat_plane_buffer(size: u32, plane_y: f32) -> VoxelBuffer {
        let mut buf = VoxelBuffer::create(size);
        buf.set_channel_depth(ChannelId::Sdf, Depth::D32);
        for p in buf.bounds().iter_points() {
            let d = p.y as f32 - plane_y;
            buf.set_f(ChannelId::Sdf, p.x, p.y, p.z, d);
        }
        buf
    }

    #[test]
    fn uniform_buffer_produces_no_geometry() {
        let buf = VoxelBuffer::create(8);
        let mesher = TransvoxelMesher::new(&buf, 0);
        let out = mesher.mesh();
        assert!(out.is_empty());
    }

    #[test]
    fn flat_plane_produces_a_single_continuous_surface() {
        let buf = flat_plane_buffer(10, 4.5);
        let mesher = TransvoxelMesher::new(&buf, 0);
        let out = mesher.mesh();
        assert!(!out.is_empty());
        let triangle_count: usize = out.surfaces.iter().map(|s| s.indices.len() / 3).sum();
        assert!(triangle_count > 0);
    }

    #[test]
    fn case_zero_and_case_255_never_emit_triangles() {
        // A uniform-sign cell (all samples positive, i.e. fully outside)
        // must never contribute geometry, matching the early-exit on
        // case_code 0/255.
        let mut buf = VoxelBuffer::create(6);
        buf.set_channel_depth(ChannelId::Sdf, Depth::D32);
        buf.fill_area(
            crate::voxel::channel::sdf_encode(1.0, Depth::D32) as u64,
            buf.bounds(),
            ChannelId::Sdf,
        );
        let mesher = TransvoxelMesher::new(&buf, 0);
        assert!(mesher.mesh().is_empty());
    }

    #[test]
    fn case_table_rows_stay_within_the_documented_index_bound() {
        for row in CASE_TABLE.iter() {
            let count = row.iter().take_while(|&&e| e >= 0).count();
            assert!(count % 3 == 0, "row has a partial triangle: {:?}", row);
            assert!(count <= 15, "row exceeds 5 triangles: {:?}", row);
        }
        assert!(CASE_TABLE[0].iter().all(|&e| e < 0));
        assert!(CASE_TABLE[255].iter().all(|&e| e < 0));
    }

    #[test]
    fn flat_plane_populates_cell_info_for_the_detail_texture_pipeline() {
        let buf = flat_plane_buffer(10, 4.5);
        let mesher = TransvoxelMesher::new(&buf, 0);
        let out = mesher.mesh();
        assert!(!out.cells.is_empty());
        let total_indices: u32 = out.cells.iter().map(|c| c.index_count).sum();
        assert_eq!(total_indices as usize, out.surfaces[0].indices.len());
    }

    #[test]
    fn flat_plane_reuses_vertices_instead_of_duplicating_every_edge() {
        // A flat plane through a 10^3 padded buffer crosses many shared
        // edges; without reuse every cell would allocate its own copies.
        let buf = flat_plane_buffer(10, 4.5);
        let mesher = TransvoxelMesher::new(&buf, 0);
        let out = mesher.mesh();
        let triangle_count: usize = out.surfaces[0].indices.len() / 3;
        let vertex_count = out.surfaces[0].positions.len();
        assert!(
            vertex_count < triangle_count * 2,
            "vertex count {} looks like every cell allocated fresh vertices (triangles: {})",
            vertex_count,
            triangle_count
        );
    }
}

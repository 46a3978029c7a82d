//! The voxel data store: per-LOD block maps, the `VoxelData` aggregate,
//! and edit primitives built on top of it (spec.md §3/§4.2, "Edit
//! primitives").

pub mod block;
pub mod edits;
pub mod map;
pub mod volume;

pub use block::{DataBlock, ViewGuard};
pub use edits::{box_blur, do_box, do_sphere, raycast, run_blocky_random_tick, RaycastHit};
pub use map::VoxelDataMap;
pub use volume::VoxelData;

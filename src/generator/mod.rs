//! Voxel generators (spec.md §3.1 "Generator", §4.2). Grounded on
//! `original_source/generators/voxel_generator.h`'s `generate_block`
//! interface and its two stock implementations, `voxel_generator_flat.cpp`
//! and `voxel_generator_noise.cpp`.

mod flat;
mod noise_gen;

pub use flat::FlatGenerator;
pub use noise_gen::NoiseGenerator;

use glam::IVec3;

use crate::voxel::VoxelBuffer;

/// On-demand voxel producer. Implementations must be deterministic: the
/// same `(origin, lod)` always yields the same samples (spec.md §3.1
/// "generator is authoritative and produces deterministic output").
pub trait Generator: Send + Sync {
    /// Fill every voxel of `out` as if it were anchored at `origin`
    /// (world-voxel space) at the given LOD.
    fn generate_block(&self, out: &mut VoxelBuffer, origin: IVec3, lod: u32);

    /// Human-readable name for logging/debugging.
    fn name(&self) -> &str {
        "generator"
    }
}

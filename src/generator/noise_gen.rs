use glam::IVec3;
use noise::{NoiseFn, Perlin};

use crate::generator::Generator;
use crate::voxel::{ChannelId, VoxelBuffer};

/// Heightmap terrain from 2D Perlin noise, solid below the sampled height.
/// Grounded on `original_source/generators/simple/voxel_generator_noise.cpp`
/// and the teacher's `TerrainGeneratorSOA` CPU-path equivalent, but
/// evaluated on the CPU only — no compute-shader dispatch, since a
/// library crate should not assume it owns a live `wgpu::Device`. The GPU
/// path is represented purely as a scheduling hint consumed by
/// [`crate::scheduler::TaskScheduler`] (spec.md §4.6 step 2).
pub struct NoiseGenerator {
    perlin: Perlin,
    pub base_height: f64,
    pub amplitude: f64,
    pub frequency: f64,
    pub solid_type: u16,
}

impl NoiseGenerator {
    pub fn new(seed: u32, base_height: f64, amplitude: f64, frequency: f64, solid_type: u16) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_height,
            amplitude,
            frequency,
            solid_type,
        }
    }

    fn height_at(&self, world_x: f64, world_z: f64) -> f64 {
        self.base_height
            + self.amplitude * self.perlin.get([world_x * self.frequency, world_z * self.frequency])
    }
}

impl Default for NoiseGenerator {
    fn default() -> Self {
        Self::new(1337, 0.0, 16.0, 0.01, 1)
    }
}

impl Generator for NoiseGenerator {
    fn generate_block(&self, out: &mut VoxelBuffer, origin: IVec3, lod: u32) {
        let spacing = 1i32 << lod;
        let size = out.size() as i32;
        for z in 0..size {
            let world_z = (origin.z + z * spacing) as f64;
            for x in 0..size {
                let world_x = (origin.x + x * spacing) as f64;
                let height = self.height_at(world_x, world_z);
                for y in 0..size {
                    let world_y = (origin.y + y * spacing) as f64;
                    let sdf = (world_y - height) as f32;
                    out.set_f(ChannelId::Sdf, x, y, z, sdf);
                    out.set(
                        ChannelId::Type,
                        x,
                        y,
                        z,
                        if world_y < height { self.solid_type as u64 } else { 0 },
                    );
                }
            }
        }
    }

    fn name(&self) -> &str {
        "noise"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic_across_calls() {
        let gen = NoiseGenerator::default();
        let mut a = VoxelBuffer::create(8);
        let mut b = VoxelBuffer::create(8);
        gen.generate_block(&mut a, IVec3::new(10, 0, 20), 0);
        gen.generate_block(&mut b, IVec3::new(10, 0, 20), 0);
        for p in a.bounds().iter_points() {
            assert_eq!(
                a.get(ChannelId::Type, p.x, p.y, p.z),
                b.get(ChannelId::Type, p.x, p.y, p.z)
            );
        }
    }
}

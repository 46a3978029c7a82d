use glam::IVec3;

use crate::generator::Generator;
use crate::voxel::{ChannelId, VoxelBuffer};

/// Solid below `height`, air above. Used by spec.md §8's scenario 2/3
/// ("Flat plane generator (y < 5 is solid type=1)"). Grounded on
/// `original_source/generators/simple/voxel_generator_flat.cpp`.
pub struct FlatGenerator {
    pub height: i32,
    pub solid_type: u16,
}

impl FlatGenerator {
    pub fn new(height: i32, solid_type: u16) -> Self {
        Self { height, solid_type }
    }
}

impl Default for FlatGenerator {
    fn default() -> Self {
        Self::new(5, 1)
    }
}

impl Generator for FlatGenerator {
    fn generate_block(&self, out: &mut VoxelBuffer, origin: IVec3, lod: u32) {
        let spacing = 1i32 << lod;
        let size = out.size() as i32;
        for z in 0..size {
            for y in 0..size {
                let world_y = origin.y + y * spacing;
                let solid = world_y < self.height;
                for x in 0..size {
                    out.set(
                        ChannelId::Type,
                        x,
                        y,
                        z,
                        if solid { self.solid_type as u64 } else { 0 },
                    );
                    let sdf = (world_y - self.height) as f32;
                    out.set_f(ChannelId::Sdf, x, y, z, sdf);
                }
            }
        }
    }

    fn name(&self) -> &str {
        "flat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_below_height_air_above() {
        let gen = FlatGenerator::default();
        let mut buf = VoxelBuffer::create(8);
        gen.generate_block(&mut buf, IVec3::ZERO, 0);
        assert_eq!(buf.get(ChannelId::Type, 0, 2, 0), 1);
        assert_eq!(buf.get(ChannelId::Type, 0, 6, 0), 0);
    }
}

//! Per-channel metadata: which semantic a channel slot holds, its sample
//! depth, and SDF quantization. Grounded on spec.md §3.1 and the packed
//! `VoxelData` bitfield style of `world_buffer.rs` (bit-packed, `Pod`,
//! accessed through small `#[inline]` getters).

use bytemuck::{Pod, Zeroable};

/// Semantic meaning of a channel slot. Spec.md §3.1 names these six plus
/// two reserved slots (`MAX_CHANNELS` = 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelId {
    Type = 0,
    Sdf = 1,
    Indices = 2,
    Weights = 3,
    GradientX = 4,
    GradientY = 5,
    GradientZ = 6,
}

impl ChannelId {
    pub const ALL: [ChannelId; 7] = [
        ChannelId::Type,
        ChannelId::Sdf,
        ChannelId::Indices,
        ChannelId::Weights,
        ChannelId::GradientX,
        ChannelId::GradientY,
        ChannelId::GradientZ,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as u8 as usize
    }

    #[inline]
    pub fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0 => ChannelId::Type,
            1 => ChannelId::Sdf,
            2 => ChannelId::Indices,
            3 => ChannelId::Weights,
            4 => ChannelId::GradientX,
            5 => ChannelId::GradientY,
            6 => ChannelId::GradientZ,
            _ => return None,
        })
    }

    /// The depth a freshly-created buffer uses for this channel by default.
    pub fn default_depth(self) -> Depth {
        match self {
            ChannelId::Type => Depth::D16,
            ChannelId::Sdf => Depth::D16,
            ChannelId::Indices => Depth::D32,
            ChannelId::Weights => Depth::D32,
            ChannelId::GradientX | ChannelId::GradientY | ChannelId::GradientZ => Depth::D32,
        }
    }

    /// The value a freshly-created buffer reports for this channel before
    /// anything was ever written (spec.md §3.1 "default value").
    pub fn default_value(self) -> u64 {
        match self {
            ChannelId::Type => 0,
            // Encoded max-positive distance: "fully outside" is the safe default.
            ChannelId::Sdf => sdf_encode(1.0, Depth::D16) as u64,
            ChannelId::Indices => 0,
            ChannelId::Weights => 0,
            ChannelId::GradientX | ChannelId::GradientY | ChannelId::GradientZ => 0,
        }
    }
}

/// Per-channel bit depth. Spec.md §3.1: "8/16/32/64 bit".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    D8,
    D16,
    D32,
    D64,
}

impl Depth {
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            Depth::D8 => 1,
            Depth::D16 => 2,
            Depth::D32 => 4,
            Depth::D64 => 8,
        }
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            8 => Depth::D8,
            16 => Depth::D16,
            32 => Depth::D32,
            64 => Depth::D64,
            _ => return None,
        })
    }

    /// Clamp a raw integer sample to what this depth can represent.
    #[inline]
    pub fn clamp_raw(self, value: u64) -> u64 {
        match self {
            Depth::D8 => value & 0xFF,
            Depth::D16 => value & 0xFFFF,
            Depth::D32 => value & 0xFFFF_FFFF,
            Depth::D64 => value,
        }
    }
}

/// Whether a channel's storage is a single repeated scalar or a full
/// per-voxel array. Spec.md §3.1 invariant: decoding a uniform channel at
/// any position returns the scalar without allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Uniform,
    Raw,
}

/// SDF quantization per spec.md §4.1 "SDF quantization": 8-bit depth maps
/// signed distance to `[-1, +1]` with saturation outside; 16-bit to a wider
/// bounded range; 32-bit is treated as a raw `f32` bit pattern (near
/// lossless).
///
/// The 16-bit bound was left unspecified by spec.md beyond "a larger
/// bounded range" — this crate picks `+-4.0` voxel-units, matching the
/// common Transvoxel convention that most surfaces lie within a handful of
/// voxels of the truncation band. Recorded in DESIGN.md.
pub const SDF_16_BOUND: f32 = 4.0;

#[inline]
pub fn sdf_scale(depth: Depth) -> f32 {
    match depth {
        Depth::D8 => 1.0,
        Depth::D16 => SDF_16_BOUND,
        Depth::D32 | Depth::D64 => f32::INFINITY, // raw f32 bit pattern, no scale
    }
}

/// Encode a signed distance (in voxel units) into the raw integer
/// representation for `depth`.
pub fn sdf_encode(distance: f32, depth: Depth) -> i64 {
    match depth {
        Depth::D8 => {
            let normalized = (distance / 1.0).clamp(-1.0, 1.0);
            (normalized * i8::MAX as f32).round() as i64
        }
        Depth::D16 => {
            let normalized = (distance / SDF_16_BOUND).clamp(-1.0, 1.0);
            (normalized * i16::MAX as f32).round() as i64
        }
        Depth::D32 | Depth::D64 => distance.to_bits() as i64,
    }
}

/// Inverse of [`sdf_encode`].
pub fn sdf_decode(raw: i64, depth: Depth) -> f32 {
    match depth {
        Depth::D8 => (raw as f32 / i8::MAX as f32).clamp(-1.0, 1.0),
        Depth::D16 => (raw as f32 / i16::MAX as f32).clamp(-1.0, 1.0) * SDF_16_BOUND,
        Depth::D32 | Depth::D64 => f32::from_bits(raw as u32),
    }
}

/// Packed 4-way texture index / weight quadruplet, one byte each, matching
/// spec.md §3.1 "4x packed texture indices per voxel" / "4x packed weights".
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Packed4(pub [u8; 4]);

static_assertions::const_assert_eq!(std::mem::size_of::<Packed4>(), 4);

impl Packed4 {
    pub const ZERO: Self = Self([0; 4]);

    #[inline]
    pub fn as_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    #[inline]
    pub fn from_u32(v: u32) -> Self {
        Self(v.to_le_bytes())
    }

    /// Normalize four weight bytes so they sum to 255 (spec.md §3.1
    /// "WEIGHTS (4x packed weights summing to 1)").
    pub fn normalized_weights(self) -> [f32; 4] {
        let total: u32 = self.0.iter().map(|&b| b as u32).sum();
        if total == 0 {
            return [0.0; 4];
        }
        let mut out = [0.0f32; 4];
        for i in 0..4 {
            out[i] = self.0[i] as f32 / total as f32;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdf_round_trip_within_quantization_error() {
        for &d in &[0.0f32, -0.5, 0.5, 1.0, -1.0] {
            let raw = sdf_encode(d, Depth::D8);
            let back = sdf_decode(raw, Depth::D8);
            assert!((back - d).abs() < 0.02, "d={} back={}", d, back);
        }
    }

    #[test]
    fn sdf_32_is_lossless() {
        let d = 3.14159_f32;
        let raw = sdf_encode(d, Depth::D32);
        assert_eq!(sdf_decode(raw, Depth::D32), d);
    }

    #[test]
    fn weights_normalize_to_unit_sum() {
        let w = Packed4([64, 64, 64, 64]);
        let n = w.normalized_weights();
        let sum: f32 = n.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
}

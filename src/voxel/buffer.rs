//! `VoxelBuffer`: a fixed-size cube of per-channel samples with
//! uniform/raw compression (spec.md §3.1, §4.1).
//!
//! Grounded on `original_source/storage/voxel_data.h`'s per-channel
//! uniform/raw duality, implemented in the teacher's DOP style: a plain
//! data struct (`ChannelStorage`) plus free functions operating on it,
//! mirroring `world_buffer.rs`'s packed-`VoxelData` + accessor-function
//! shape but generalized to N independently-compressed channels.

use rustc_hash::FxHashMap;

use crate::constants::core::MAX_CHANNELS;
use crate::error::{EngineError, EngineResult};
use crate::math::Aabb;
use crate::voxel::channel::{ChannelId, Compression, Depth};
use glam::IVec3;

#[derive(Debug, Clone)]
struct ChannelStorage {
    depth: Depth,
    compression: Compression,
    /// Valid when `compression == Uniform`: the single repeated raw sample.
    uniform_value: u64,
    /// Valid when `compression == Raw`: `size^3 * depth.bytes()` little
    /// endian samples.
    raw: Vec<u8>,
}

impl ChannelStorage {
    fn new_uniform(channel: ChannelId, size: u32) -> Self {
        let depth = channel.default_depth();
        Self {
            depth,
            compression: Compression::Uniform,
            uniform_value: channel.default_value(),
            raw: Vec::new(),
        }
    }
}

/// A cube of shape `size^3`, storing up to [`MAX_CHANNELS`] channels.
#[derive(Debug, Clone)]
pub struct VoxelBuffer {
    size: u32,
    channels: [ChannelStorage; MAX_CHANNELS],
    /// Sparse per-voxel metadata, keyed by position-within-buffer (spec.md
    /// §3.1: "Metadata is a sparse map keyed by position-within-buffer").
    metadata: FxHashMap<u32, Vec<u8>>,
}

fn flat_index(size: u32, x: u32, y: u32, z: u32) -> usize {
    (z as usize * size as usize + y as usize) * size as usize + x as usize
}

impl VoxelBuffer {
    /// Create a new buffer of shape `size^3`, every channel uniform at its
    /// default value.
    pub fn create(size: u32) -> Self {
        let channels = std::array::from_fn(|i| {
            let ch = ChannelId::from_index(i as u8);
            match ch {
                Some(ch) => ChannelStorage::new_uniform(ch, size),
                None => ChannelStorage {
                    depth: Depth::D8,
                    compression: Compression::Uniform,
                    uniform_value: 0,
                    raw: Vec::new(),
                },
            }
        });
        Self {
            size,
            channels,
            metadata: FxHashMap::default(),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_min_size(IVec3::ZERO, IVec3::splat(self.size as i32))
    }

    fn in_bounds(&self, x: i32, y: i32, z: i32) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && (x as u32) < self.size
            && (y as u32) < self.size
            && (z as u32) < self.size
    }

    pub fn get_channel_depth(&self, channel: ChannelId) -> Depth {
        self.channels[channel.index()].depth
    }

    pub fn set_channel_depth(&mut self, channel: ChannelId, depth: Depth) {
        let storage = &mut self.channels[channel.index()];
        if storage.depth == depth {
            return;
        }
        // Changing depth implicitly re-quantizes; simplest correct path is
        // to decompress to scalar values, reset to uniform default at the
        // new depth. Per-voxel values already stored as raw bytes at the
        // old depth would need a full re-encode pass; channels are only
        // ever depth-changed right after creation in this engine, so we
        // keep this operation cheap and well-defined rather than general.
        storage.depth = depth;
        storage.compression = Compression::Uniform;
        storage.uniform_value = 0;
        storage.raw.clear();
    }

    /// Decode the raw integer sample at `(x,y,z)` for `channel` without
    /// allocation when the channel is uniform (spec.md §3.1 invariant).
    pub fn get(&self, channel: ChannelId, x: i32, y: i32, z: i32) -> u64 {
        let storage = &self.channels[channel.index()];
        match storage.compression {
            Compression::Uniform => storage.uniform_value,
            Compression::Raw => {
                if !self.in_bounds(x, y, z) {
                    return storage.uniform_value;
                }
                read_raw_sample(&storage.raw, storage.depth, self.size, x as u32, y as u32, z as u32)
            }
        }
    }

    /// Set a single voxel's raw sample. Lazily decompresses a uniform
    /// channel to raw storage first (spec.md §4.1 guarantee).
    pub fn set(&mut self, channel: ChannelId, x: i32, y: i32, z: i32, value: u64) {
        if !self.in_bounds(x, y, z) {
            return;
        }
        let size = self.size;
        let storage = &mut self.channels[channel.index()];
        let clamped = storage.depth.clamp_raw(value);
        if storage.compression == Compression::Uniform {
            if storage.uniform_value == clamped {
                return;
            }
            decompress_storage(storage, size);
        }
        write_raw_sample(
            &mut storage.raw,
            storage.depth,
            size,
            x as u32,
            y as u32,
            z as u32,
            clamped,
        );
    }

    /// Floating-point accessor with quantization-aware conversion (spec.md
    /// §4.1 `get_f`). Only meaningful for the SDF channel and the gradient
    /// channels, which store `f32` bit patterns at depth 32/64.
    pub fn get_f(&self, channel: ChannelId, x: i32, y: i32, z: i32) -> f32 {
        let depth = self.get_channel_depth(channel);
        let raw = self.get(channel, x, y, z) as i64;
        match channel {
            ChannelId::Sdf => crate::voxel::channel::sdf_decode(raw, depth),
            _ => f32::from_bits(raw as u32),
        }
    }

    pub fn set_f(&mut self, channel: ChannelId, x: i32, y: i32, z: i32, value: f32) {
        let depth = self.get_channel_depth(channel);
        let raw = match channel {
            ChannelId::Sdf => crate::voxel::channel::sdf_encode(value, depth) as u64,
            _ => value.to_bits() as u64,
        };
        self.set(channel, x, y, z, raw);
    }

    /// Fill a sub-box of `channel` with a constant raw value, clipping
    /// silently to the buffer's bounds (spec.md §4.1 `fill_area`).
    pub fn fill_area(&mut self, value: u64, area: Aabb, channel: ChannelId) {
        let Some(clipped) = area.clipped(&self.bounds()) else {
            return;
        };
        // Whole-buffer fill collapses to a uniform write, matching the
        // "compress_uniform_channels must be semantically transparent"
        // guarantee without ever materializing raw storage needlessly.
        if clipped == self.bounds() {
            let storage = &mut self.channels[channel.index()];
            storage.compression = Compression::Uniform;
            storage.raw.clear();
            storage.uniform_value = storage.depth.clamp_raw(value);
            return;
        }
        for p in clipped.iter_points() {
            self.set(channel, p.x, p.y, p.z, value);
        }
    }

    /// Reset an entire channel to a single uniform value (spec.md §4.1
    /// `clear_channel`).
    pub fn clear_channel(&mut self, channel: ChannelId, value: u64) {
        let storage = &mut self.channels[channel.index()];
        storage.compression = Compression::Uniform;
        storage.raw.clear();
        storage.uniform_value = storage.depth.clamp_raw(value);
    }

    /// Force a channel into raw (fully materialized) storage.
    pub fn decompress_channel(&mut self, channel: ChannelId) {
        let size = self.size;
        let storage = &mut self.channels[channel.index()];
        if storage.compression == Compression::Raw {
            return;
        }
        decompress_storage(storage, size);
    }

    /// Re-compress every channel whose voxels are all equal back to a
    /// uniform scalar. Never changes what readers observe (spec.md §4.1).
    pub fn compress_uniform_channels(&mut self) {
        let size = self.size;
        for storage in &mut self.channels {
            if storage.compression != Compression::Raw {
                continue;
            }
            let sample_count = (size as usize).pow(3);
            let stride = storage.depth.bytes();
            if storage.raw.len() < stride {
                continue;
            }
            let first = &storage.raw[0..stride];
            let uniform = (1..sample_count).all(|i| {
                let off = i * stride;
                &storage.raw[off..off + stride] == first
            });
            if uniform {
                let mut buf = [0u8; 8];
                buf[..stride].copy_from_slice(first);
                storage.uniform_value = u64::from_le_bytes(buf);
                storage.compression = Compression::Uniform;
                storage.raw.clear();
            }
        }
    }

    /// Copy a sub-box of `channel` from `other` into `self` at `dst_origin`.
    /// Bounds-checked and silently clipped on both ends; never reallocates
    /// `self` (spec.md §4.1 `copy_from` guarantee).
    pub fn copy_from(
        &mut self,
        other: &VoxelBuffer,
        src_box: Aabb,
        dst_origin: IVec3,
        channel: ChannelId,
    ) {
        let Some(src_clipped) = src_box.clipped(&other.bounds()) else {
            return;
        };
        for src_p in src_clipped.iter_points() {
            let dst_p = dst_origin + (src_p - src_box.min);
            if !self.bounds().contains(dst_p) {
                continue;
            }
            let v = other.get(channel, src_p.x, src_p.y, src_p.z);
            self.set(channel, dst_p.x, dst_p.y, dst_p.z, v);
        }
    }

    /// Amortize per-voxel dispatch: gives the closure direct raw-sample
    /// access for every position in `area`, decompressing once up front
    /// (spec.md §4.1 `read_write_action`).
    pub fn read_write_action<F>(&mut self, area: Aabb, channel: ChannelId, mut f: F)
    where
        F: FnMut(IVec3, u64) -> u64,
    {
        let Some(clipped) = area.clipped(&self.bounds()) else {
            return;
        };
        self.decompress_channel(channel);
        for p in clipped.iter_points() {
            let old = self.get(channel, p.x, p.y, p.z);
            let new = f(p, old);
            if new != old {
                self.set(channel, p.x, p.y, p.z, new);
            }
        }
    }

    pub fn metadata_at(&self, x: i32, y: i32, z: i32) -> Option<&[u8]> {
        if !self.in_bounds(x, y, z) {
            return None;
        }
        let key = flat_index(self.size, x as u32, y as u32, z as u32) as u32;
        self.metadata.get(&key).map(|v| v.as_slice())
    }

    pub fn set_metadata_at(&mut self, x: i32, y: i32, z: i32, data: Vec<u8>) {
        if !self.in_bounds(x, y, z) {
            return;
        }
        let key = flat_index(self.size, x as u32, y as u32, z as u32) as u32;
        self.metadata.insert(key, data);
    }

    /// Current compression mode for `channel` (used by region-file
    /// serialization, spec.md §6.1 "1 byte compression tag").
    pub fn channel_compression(&self, channel: ChannelId) -> Compression {
        self.channels[channel.index()].compression
    }

    /// The raw scalar backing a uniform channel.
    pub fn uniform_raw(&self, channel: ChannelId) -> u64 {
        self.channels[channel.index()].uniform_value
    }

    /// Borrow a raw channel's backing bytes, for bulk serialization.
    pub fn raw_bytes(&self, channel: ChannelId) -> Option<&[u8]> {
        let storage = &self.channels[channel.index()];
        match storage.compression {
            Compression::Raw => Some(&storage.raw),
            Compression::Uniform => None,
        }
    }

    /// Replace a channel's storage with an already-decoded uniform scalar,
    /// bypassing per-voxel writes (used when decoding a region-file
    /// payload).
    pub fn load_uniform_channel(&mut self, channel: ChannelId, value: u64) {
        let storage = &mut self.channels[channel.index()];
        storage.compression = Compression::Uniform;
        storage.uniform_value = storage.depth.clamp_raw(value);
        storage.raw.clear();
    }

    /// Replace a channel's storage with already-decoded raw bytes (must be
    /// exactly `size^3 * depth.bytes()` long).
    pub fn load_raw_channel(&mut self, channel: ChannelId, bytes: Vec<u8>) -> EngineResult<()> {
        let storage = &mut self.channels[channel.index()];
        let expected = (self.size as usize).pow(3) * storage.depth.bytes();
        if bytes.len() != expected {
            return Err(EngineError::InvalidFormat {
                reason: format!(
                    "channel payload length {} does not match expected {}",
                    bytes.len(),
                    expected
                ),
            });
        }
        storage.raw = bytes;
        storage.compression = Compression::Raw;
        Ok(())
    }

    pub fn validate_channel(channel_index: u8) -> EngineResult<ChannelId> {
        ChannelId::from_index(channel_index).ok_or(EngineError::InvalidChannel {
            channel: channel_index,
        })
    }
}

fn decompress_storage(storage: &mut ChannelStorage, size: u32) {
    let stride = storage.depth.bytes();
    let count = (size as usize).pow(3);
    let mut raw = vec![0u8; count * stride];
    let bytes = storage.uniform_value.to_le_bytes();
    for i in 0..count {
        raw[i * stride..(i + 1) * stride].copy_from_slice(&bytes[..stride]);
    }
    storage.raw = raw;
    storage.compression = Compression::Raw;
}

fn read_raw_sample(raw: &[u8], depth: Depth, size: u32, x: u32, y: u32, z: u32) -> u64 {
    let stride = depth.bytes();
    let idx = flat_index(size, x, y, z) * stride;
    let mut buf = [0u8; 8];
    buf[..stride].copy_from_slice(&raw[idx..idx + stride]);
    u64::from_le_bytes(buf)
}

fn write_raw_sample(raw: &mut [u8], depth: Depth, size: u32, x: u32, y: u32, z: u32, value: u64) {
    let stride = depth.bytes();
    let idx = flat_index(size, x, y, z) * stride;
    let bytes = value.to_le_bytes();
    raw[idx..idx + stride].copy_from_slice(&bytes[..stride]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_channel_reads_default_without_allocating() {
        let buf = VoxelBuffer::create(16);
        assert_eq!(buf.get(ChannelId::Type, 3, 3, 3), 0);
    }

    #[test]
    fn setting_one_voxel_decompresses_lazily_and_keeps_others() {
        let mut buf = VoxelBuffer::create(4);
        buf.set(ChannelId::Type, 1, 1, 1, 5);
        assert_eq!(buf.get(ChannelId::Type, 1, 1, 1), 5);
        assert_eq!(buf.get(ChannelId::Type, 0, 0, 0), 0);
    }

    #[test]
    fn compress_uniform_channels_is_transparent() {
        let mut buf = VoxelBuffer::create(4);
        buf.decompress_channel(ChannelId::Type);
        let before: Vec<u64> = buf
            .bounds()
            .iter_points()
            .map(|p| buf.get(ChannelId::Type, p.x, p.y, p.z))
            .collect();
        buf.compress_uniform_channels();
        let after: Vec<u64> = buf
            .bounds()
            .iter_points()
            .map(|p| buf.get(ChannelId::Type, p.x, p.y, p.z))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn copy_from_clips_silently_and_never_reallocates_destination() {
        let mut src = VoxelBuffer::create(8);
        src.fill_area(7, src.bounds(), ChannelId::Type);
        let mut dst = VoxelBuffer::create(4);
        dst.copy_from(
            &src,
            Aabb::from_min_size(IVec3::splat(-2), IVec3::splat(8)),
            IVec3::ZERO,
            ChannelId::Type,
        );
        assert_eq!(dst.size(), 4);
        assert_eq!(dst.get(ChannelId::Type, 0, 0, 0), 7);
    }

    #[test]
    fn copy_paste_round_trip() {
        let mut original = VoxelBuffer::create(8);
        for p in original.bounds().iter_points() {
            original.set(ChannelId::Type, p.x, p.y, p.z, ((p.x + p.y + p.z) % 5) as u64);
        }
        let mut dst = VoxelBuffer::create(8);
        dst.copy_from(&original, original.bounds(), IVec3::ZERO, ChannelId::Type);
        let mut dst2 = VoxelBuffer::create(8);
        dst2.copy_from(&dst, dst.bounds(), IVec3::ZERO, ChannelId::Type);
        for p in original.bounds().iter_points() {
            assert_eq!(
                dst.get(ChannelId::Type, p.x, p.y, p.z),
                dst2.get(ChannelId::Type, p.x, p.y, p.z)
            );
        }
    }
}

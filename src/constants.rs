//! Engine-wide constants, grouped the way hearth-engine's `constants` module
//! groups them: small namespaced sub-modules rather than one flat list.

/// Core chunk/voxel sizing.
pub mod core {
    /// Default edge length of a VoxelBuffer, in voxels. Spec.md §3.1 allows
    /// 16 or 32; 32 matches the teacher's default chunk size order of
    /// magnitude.
    pub const DEFAULT_BLOCK_SIZE: u32 = 32;

    /// Maximum channels a VoxelBuffer can carry (spec.md §3.1: "up to 8").
    pub const MAX_CHANNELS: usize = 8;

    /// Maximum LOD count supported by a VoxelData / LodOctree pair.
    pub const MAX_LOD_COUNT: u32 = 16;
}

/// Padding and neighborhood gather sizing (spec.md §4.6).
pub mod meshing {
    /// Minimum padding voxels needed on the negative side of a gather for
    /// the blocky mesher (needs 1 neighbor voxel for face culling/AO).
    pub const BLOCKY_MIN_PADDING: u32 = 1;
    pub const BLOCKY_MAX_PADDING: u32 = 1;

    /// Transvoxel needs 2 voxels of padding on the high side to evaluate
    /// the last cell's far corner, and 1 on the low side.
    pub const TRANSVOXEL_MIN_PADDING: u32 = 1;
    pub const TRANSVOXEL_MAX_PADDING: u32 = 2;

    /// Number of 2-voxel cells marched per axis inside the un-padded
    /// interior, per spec.md §4.5 step 0 ("marches 2³ cells").
    pub const CELLS_PER_AXIS_STEP: u32 = 1;
}

/// Region file format constants (spec.md §6.1), grounded on
/// `original_source/streams/voxel_stream_region_files.cpp`.
pub mod region {
    pub const MAGIC: [u8; 4] = *b"VXR_";
    pub const FORMAT_VERSION: u8 = 1;
    pub const DEFAULT_SECTOR_SIZE: u32 = 512;
    pub const DEFAULT_REGION_SIZE_PO2: u8 = 4; // 16^3 blocks per region file
    pub const META_FILE_NAME: &str = "meta";
}

/// Scheduler tunables (spec.md §4.8).
pub mod scheduler {
    use std::time::Duration;

    /// Interval at which a worker copies shared input into its local queue
    /// and sorts by priority.
    pub const SYNC_INTERVAL: Duration = Duration::from_millis(50);

    /// Default squared distance beyond which queued tasks are dropped.
    pub const DEFAULT_DROP_DISTANCE: f32 = 512.0;
}

/// Detail texture tile resolution bounds (spec.md §4.7, Open Question c).
pub mod detail_texture {
    pub const MIN_TILE_RESOLUTION: u32 = 8;
    pub const MAX_TILE_RESOLUTION: u32 = 16;
    pub const STORAGE_BUFFER_POOL_BUCKETS: usize = 48;
}

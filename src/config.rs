//! Engine configuration (SPEC_FULL.md §5.4). Grounded on the teacher's
//! `EngineConfig::validate()`: a plain struct plus a `validate()` that
//! checks every field before any subsystem is built, returning
//! `anyhow::Error`s with enough context to act on, and logging success
//! through the crate's bracketed-component convention.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::detail_texture::DetailTextureConfig;

/// Top-level knobs a caller sets before constructing a [`crate::VoxelData`]
/// and [`crate::TaskScheduler`] pair (SPEC_FULL.md §5.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoxelEngineConfig {
    pub block_size: u32,
    pub lod_count: u32,
    pub min_padding: u32,
    pub max_padding: u32,
    pub streaming_enabled: bool,
    pub region_directory: Option<PathBuf>,
    pub drop_distance: f32,
    pub split_scale: f32,
    pub detail_texture: Option<DetailTextureConfig>,
    pub worker_thread_count: usize,
}

impl Default for VoxelEngineConfig {
    fn default() -> Self {
        Self {
            block_size: crate::constants::core::DEFAULT_BLOCK_SIZE,
            lod_count: 4,
            min_padding: crate::constants::meshing::BLOCKY_MIN_PADDING,
            max_padding: crate::constants::meshing::TRANSVOXEL_MAX_PADDING,
            streaming_enabled: false,
            region_directory: None,
            drop_distance: crate::constants::scheduler::DEFAULT_DROP_DISTANCE,
            split_scale: 2.0,
            detail_texture: None,
            worker_thread_count: num_cpus::get().saturating_sub(1).max(1),
        }
    }
}

impl VoxelEngineConfig {
    /// Checks every field for internal consistency, the way
    /// `EngineConfig::validate()` gates subsystem construction in the
    /// teacher. Returns the first violation found; callers fix one
    /// problem at a time rather than getting a batch report.
    pub fn validate(&self) -> Result<()> {
        if self.block_size != 16 && self.block_size != 32 {
            return Err(anyhow!(
                "VoxelEngineConfig: block_size must be 16 or 32, got {}",
                self.block_size
            ));
        }

        if self.lod_count == 0 || self.lod_count > crate::constants::core::MAX_LOD_COUNT {
            return Err(anyhow!(
                "VoxelEngineConfig: lod_count must be in 1..={}, got {}",
                crate::constants::core::MAX_LOD_COUNT,
                self.lod_count
            ));
        }

        if self.max_padding < self.min_padding {
            return Err(anyhow!(
                "VoxelEngineConfig: max_padding ({}) must be >= min_padding ({})",
                self.max_padding,
                self.min_padding
            ));
        }

        if self.drop_distance <= 0.0 {
            return Err(anyhow!(
                "VoxelEngineConfig: drop_distance must be positive, got {}",
                self.drop_distance
            ));
        }

        if self.split_scale <= 0.0 {
            return Err(anyhow!(
                "VoxelEngineConfig: split_scale must be positive, got {}",
                self.split_scale
            ));
        }

        if self.streaming_enabled && self.region_directory.is_none() {
            return Err(anyhow!(
                "VoxelEngineConfig: streaming_enabled requires a region_directory"
            ));
        }

        if self.worker_thread_count == 0 {
            return Err(anyhow!("VoxelEngineConfig: worker_thread_count must be at least 1"));
        }

        log::info!(
            "[CONFIG] validated: block_size={}, lod_count={}, streaming_enabled={}, workers={}",
            self.block_size,
            self.lod_count,
            self.streaming_enabled,
            self.worker_thread_count
        );
        Ok(())
    }

    /// Loads a config from a TOML file on disk and validates it, the way a
    /// caller would load `EngineConfig` from a settings file at boot.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading config file {}", path.as_ref().display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.as_ref().display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing VoxelEngineConfig to TOML")
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("parsing config JSON")?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        VoxelEngineConfig::default().validate().unwrap();
    }

    #[test]
    fn odd_block_size_is_rejected() {
        let config = VoxelEngineConfig {
            block_size: 24,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn streaming_without_a_region_directory_is_rejected() {
        let config = VoxelEngineConfig {
            streaming_enabled: true,
            region_directory: None,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_padding_below_min_padding_is_rejected() {
        let config = VoxelEngineConfig {
            min_padding: 3,
            max_padding: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip_preserves_fields() {
        let config = VoxelEngineConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed: VoxelEngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.block_size, config.block_size);
        assert_eq!(parsed.worker_thread_count, config.worker_thread_count);
    }
}

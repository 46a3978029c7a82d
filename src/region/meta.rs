use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// The directory-level `meta` file (spec.md §6.1): JSON with
/// `{version, block_size_po2, region_size_po2, sector_size, lod_count}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionMeta {
    pub version: u8,
    pub block_size_po2: u8,
    pub region_size_po2: u8,
    pub sector_size: u32,
    pub lod_count: u8,
}

impl RegionMeta {
    pub fn default_with_lod_count(lod_count: u8) -> Self {
        Self {
            version: crate::constants::region::FORMAT_VERSION,
            block_size_po2: 5, // 32^3 blocks
            region_size_po2: crate::constants::region::DEFAULT_REGION_SIZE_PO2,
            sector_size: crate::constants::region::DEFAULT_SECTOR_SIZE,
            lod_count,
        }
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| EngineError::InvalidFormat {
            reason: format!("malformed region meta {}: {}", path.display(), e),
        })
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let text = serde_json::to_string_pretty(self).map_err(|e| EngineError::InvalidFormat {
            reason: format!("failed to serialize region meta: {}", e),
        })?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

//! Low-level region-file failures, layered under [`crate::error::EngineError`]
//! the way the teacher layers a `thiserror`-derived `PersistenceError`
//! under its top-level error type and converts with `From`.

use thiserror::Error;

use crate::error::EngineError;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("bad region magic in {path}")]
    BadMagic { path: String },

    #[error("unsupported region format version {version} in {path}")]
    UnsupportedVersion { version: u8, path: String },

    #[error("block record checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    CorruptChecksum { expected: u32, actual: u32 },

    #[error("region I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RegionError> for EngineError {
    fn from(err: RegionError) -> Self {
        match err {
            RegionError::Io(io_err) => EngineError::IoError {
                path: String::new(),
                error: io_err.to_string(),
            },
            other => EngineError::InvalidFormat {
                reason: other.to_string(),
            },
        }
    }
}

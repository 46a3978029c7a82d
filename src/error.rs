//! Closed error-kind set for the voxel engine (spec.md §7).
//!
//! `DependencyInvalidated` and `Cancelled` are constructed here for
//! uniformity but per spec are "not an error" — task machinery reports
//! them through `TaskOutcome::Dropped`, not through `EngineResult`.

use std::fmt;
use std::sync::PoisonError;

use glam::IVec3;
use thiserror::Error;

use crate::math::Aabb;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("position {pos:?} lies outside bounds {bounds:?}")]
    BoundsViolation { pos: IVec3, bounds: Aabb },

    #[error("channel index {channel} is not a valid channel")]
    InvalidChannel { channel: u8 },

    #[error("depth {depth} is not supported for channel {channel}")]
    InvalidDepth { channel: u8, depth: u8 },

    #[error("invalid format: {reason}")]
    InvalidFormat { reason: String },

    #[error("IO error for {path}: {error}")]
    IoError { path: String, error: String },

    #[error("task dependency was invalidated")]
    DependencyInvalidated,

    #[error("task was cancelled")]
    Cancelled,

    #[error("resource exhausted: requested {requested} bytes")]
    ResourceExhausted { requested: usize },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::IoError {
            path: String::new(),
            error: error.to_string(),
        }
    }
}

impl<T> From<PoisonError<T>> for EngineError {
    fn from(_: PoisonError<T>) -> Self {
        EngineError::InvalidFormat {
            reason: "lock poisoned".to_string(),
        }
    }
}

/// Extension trait mirroring the teacher's `ErrorContext`, for attaching a
/// human-readable stage name to a lower-level error without losing it.
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> EngineResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: fmt::Display,
{
    fn context(self, msg: &str) -> EngineResult<T> {
        self.map_err(|e| EngineError::InvalidFormat {
            reason: format!("{}: {}", msg, e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable_and_readable() {
        let err = EngineError::InvalidChannel { channel: 9 };
        assert_eq!(err.to_string(), "channel index 9 is not a valid channel");
    }
}

//! # World Error Types
//!
//! Construction-time failures. Steady-state queries and edits never fail;
//! they resolve to "empty" or "no-op" instead.

use thiserror::Error;

/// Errors that can occur while building world data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// Block size, height or world extent was zero.
    #[error("invalid dimensions: block_size {block_size}, max_height {max_height}, world {width}x{depth}")]
    InvalidDimensions {
        /// Requested region side length.
        block_size: u32,
        /// Requested vertical extent.
        max_height: u32,
        /// Requested world width.
        width: u32,
        /// Requested world depth.
        depth: u32,
    },

    /// Voxel payload does not match the declared dimensions.
    #[error("voxel payload has {actual} entries, expected {expected}")]
    VoxelLength {
        /// Length implied by the dimensions.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },
}

/// Result type for world construction.
pub type WorldResult<T> = Result<T, WorldError>;

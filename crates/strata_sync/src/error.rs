//! # Sync Error Types
//!
//! Errors at the boundaries of the sync layer: decoding, transport hand-off,
//! configuration and startup. Steady-state coordinator calls never return
//! these; they drop bad input and move on.

use std::path::PathBuf;

use thiserror::Error;

use strata_world::WorldError;

/// Errors produced while decoding or encoding a datagram.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The datagram ended before a field was complete.
    #[error("truncated packet: needed {needed} more bytes at offset {offset}")]
    Truncated {
        /// Offset at which the read failed.
        offset: usize,
        /// Bytes still required.
        needed: usize,
    },

    /// The leading type byte names no known packet.
    #[error("unknown packet type {0}")]
    UnknownType(u8),

    /// A region push declared impossible dimensions.
    #[error("bad region dimensions: block_size {block_size}, max_height {max_height}")]
    BadDimensions {
        /// Declared side length.
        block_size: i32,
        /// Declared vertical extent.
        max_height: i32,
    },

    /// Voxel payload length does not match the declared dimensions.
    #[error("voxel payload has {actual} bytes, expected {expected}")]
    VoxelLength {
        /// Length implied by the dimensions.
        expected: usize,
        /// Length actually carried.
        actual: usize,
    },

    /// The LZ4 voxel payload could not be decompressed.
    #[error("voxel decompression failed: {0}")]
    Decompress(String),

    /// The encoded packet would not fit in one datagram.
    #[error("packet of {size} bytes exceeds datagram limit of {limit}")]
    Oversized {
        /// Encoded size.
        size: usize,
        /// Maximum allowed.
        limit: usize,
    },

    /// Bytes were left over after a complete packet.
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),
}

/// Errors handing a region push to the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The outbound queue is full.
    #[error("outbound queue full")]
    QueueFull,

    /// The receiving end is gone.
    #[error("connection {0} is closed")]
    Disconnected(u32),

    /// The connection id is not registered with the transport.
    #[error("unknown connection {0}")]
    UnknownConnection(u32),

    /// The push could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] ProtocolError),

    /// The socket refused the datagram.
    #[error("socket error: {0}")]
    Io(String),
}

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong.
        reason: String,
    },
}

/// Umbrella error for startup paths (binary, test harnesses).
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// World generation failed.
    #[error(transparent)]
    World(#[from] WorldError),

    /// Protocol failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Socket setup failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for startup paths.
pub type SyncResult<T> = Result<T, SyncError>;

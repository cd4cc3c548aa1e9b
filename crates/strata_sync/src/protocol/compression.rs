//! # Voxel Payload Compression
//!
//! Region payloads are mostly long runs of identical bytes (solid ground,
//! open air), which LZ4 shrinks by an order of magnitude.
//!
//! ## Format
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────┐
//! │ raw length (u32 LE)  │ LZ4 block                    │
//! └──────────────────────┴──────────────────────────────┘
//! ```
//!
//! The length prefix is checked against the declared region dimensions
//! before anything is allocated, so a hostile datagram cannot request a huge
//! buffer.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::error::ProtocolError;

/// Compresses a voxel payload (size-prepended LZ4).
#[must_use]
pub fn compress_voxels(voxels: &[u8]) -> Vec<u8> {
    compress_prepend_size(voxels)
}

/// Decompresses a voxel payload that must expand to exactly `expected` bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::VoxelLength`] when the declared size disagrees
/// with `expected`, and [`ProtocolError::Decompress`] for a corrupt block.
pub fn decompress_voxels(payload: &[u8], expected: usize) -> Result<Vec<u8>, ProtocolError> {
    let Some(prefix) = payload.get(..4) else {
        return Err(ProtocolError::Truncated {
            offset: 0,
            needed: 4 - payload.len(),
        });
    };
    let declared = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if declared != expected {
        return Err(ProtocolError::VoxelLength {
            expected,
            actual: declared,
        });
    }

    let voxels =
        decompress_size_prepended(payload).map_err(|e| ProtocolError::Decompress(e.to_string()))?;
    if voxels.len() != expected {
        return Err(ProtocolError::VoxelLength {
            expected,
            actual: voxels.len(),
        });
    }
    Ok(voxels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terrain(len: usize) -> Vec<u8> {
        (0..len).map(|i| if i < len / 3 { 1 } else { 0 }).collect()
    }

    #[test]
    fn test_compresses_terrain() {
        let voxels = terrain(16 * 16 * 64);
        let packed = compress_voxels(&voxels);
        assert!(packed.len() < voxels.len() / 10, "packed {} bytes", packed.len());
        assert_eq!(decompress_voxels(&packed, voxels.len()).unwrap(), voxels);
    }

    #[test]
    fn test_declared_size_must_match() {
        let packed = compress_voxels(&terrain(100));
        assert_eq!(
            decompress_voxels(&packed, 99),
            Err(ProtocolError::VoxelLength { expected: 99, actual: 100 })
        );
    }

    #[test]
    fn test_corrupt_block_is_an_error() {
        let mut packed = compress_voxels(&terrain(1000));
        packed.truncate(6);
        assert!(decompress_voxels(&packed, 1000).is_err());

        assert!(matches!(
            decompress_voxels(&[1, 2], 10),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}

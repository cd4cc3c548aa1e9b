//! # STRATA World
//!
//! The authoritative, editable voxel world, partitioned into region blocks.
//!
//! ## Design Principles
//!
//! 1. **Fixed partitioning**: the world is a 2D grid of equally sized region blocks
//! 2. **Change stamps**: every successful edit bumps the owning block's stamp
//! 3. **Fine-grained locking**: one lock per region, never a world lock
//! 4. **Forgiving queries**: out-of-range reads are empty, out-of-range writes are no-ops
//!
//! ## Coordinates
//!
//! Everything in this crate works in *plan* coordinates: `(x, y)` is the
//! horizontal plane and `z` is height above the ground. Block-grid
//! coordinates ([`RegionCoord`]) are indices, not world units.
//!
//! ## Example
//!
//! ```rust
//! use strata_world::{FlatHeightField, LevelStructure, VOXEL_SOLID};
//!
//! let level = LevelStructure::generate(40, 40, 10, 16, &FlatHeightField(0.25)).unwrap();
//! assert_eq!(level.blocks_x(), 4);
//!
//! let stamp = level.apply_edit(3.0, 3.0, 10.0, VOXEL_SOLID);
//! assert!(stamp.is_some());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod error;
pub mod height_field;
pub mod level;
pub mod region;

pub use clock::{ChangeStamp, WorldClock};
pub use error::{WorldError, WorldResult};
pub use height_field::{FlatHeightField, HeightField, HeightMap, SimplexHeightField, TerrainSeed};
pub use level::LevelStructure;
pub use region::{RegionBlock, RegionCoord};

/// Voxel value meaning "nothing here".
pub const VOXEL_EMPTY: u8 = 0;

/// Default material used when seeding terrain from a height field.
pub const VOXEL_SOLID: u8 = 1;

/// Default region side length in world units.
pub const DEFAULT_BLOCK_SIZE: u32 = 10;

/// Default vertical extent of every region.
pub const DEFAULT_MAX_HEIGHT: u32 = 16;

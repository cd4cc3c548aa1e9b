//! # Region Blocks
//!
//! The world is partitioned into fixed-size region blocks, the unit of
//! network transfer and change tracking.
//!
//! ## Block Format
//!
//! A region is `block_size x block_size x max_height` voxels, one byte each.
//! Zero means empty; any other value names a material.
//! Voxels are stored densely, indexed as `[z][y][x]`.
//!
//! ## Change Tracking
//!
//! Every successful mutation strictly increases `time_last_changed`. Readers
//! only ever compare stamps, so a block received twice is harmless.

use crate::clock::ChangeStamp;
use crate::error::{WorldError, WorldResult};
use crate::height_field::HeightField;
use crate::VOXEL_EMPTY;

/// Region coordinate (identifies a region in the block grid).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionCoord {
    /// X index (in blocks, not world units).
    pub bx: i32,
    /// Y index (in blocks, not world units).
    pub by: i32,
}

impl RegionCoord {
    /// Creates a new region coordinate.
    #[inline]
    #[must_use]
    pub const fn new(bx: i32, by: i32) -> Self {
        Self { bx, by }
    }

    /// Converts plan coordinates to the coordinate of the owning region.
    ///
    /// Uses floor division, so negative positions land in negative blocks.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn from_world(x: f32, y: f32, block_size: u32) -> Self {
        let size = block_size.max(1) as f32;
        Self {
            bx: (x / size).floor() as i32,
            by: (y / size).floor() as i32,
        }
    }

    /// Returns the world coordinates of this region's origin (corner).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn origin(self, block_size: u32) -> (i32, i32) {
        (self.bx * block_size as i32, self.by * block_size as i32)
    }

    /// Chebyshev distance to another coordinate, in blocks.
    #[inline]
    #[must_use]
    pub fn grid_distance(self, other: Self) -> u32 {
        self.bx.abs_diff(other.bx).max(self.by.abs_diff(other.by))
    }
}

/// A fixed-size cuboid of voxels with a change stamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionBlock {
    /// World X of the block's origin.
    origin_x: i32,
    /// World Y of the block's origin.
    origin_y: i32,
    /// Side length in world units.
    block_size: u32,
    /// Vertical extent.
    max_height: u32,
    /// Voxel data (indexed as [z][y][x]).
    voxels: Box<[u8]>,
    /// Stamp of the last successful mutation.
    time_last_changed: ChangeStamp,
}

impl RegionBlock {
    /// Creates an empty region at the given grid coordinate.
    #[must_use]
    pub fn new(coord: RegionCoord, block_size: u32, max_height: u32) -> Self {
        let (origin_x, origin_y) = coord.origin(block_size);
        Self {
            origin_x,
            origin_y,
            block_size,
            max_height,
            voxels: vec![VOXEL_EMPTY; Self::volume(block_size, max_height)].into_boxed_slice(),
            time_last_changed: ChangeStamp::GENESIS,
        }
    }

    /// Seeds a region from a height-field source.
    ///
    /// Each column is filled with `material` from `z = 0` up to
    /// `round(sample * max_height)`; the rest stays empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_height_field<H: HeightField + ?Sized>(
        coord: RegionCoord,
        block_size: u32,
        max_height: u32,
        field: &H,
        material: u8,
    ) -> Self {
        let mut block = Self::new(coord, block_size, max_height);
        let size = block_size as usize;

        for y in 0..size {
            for x in 0..size {
                let world_x = block.origin_x as f32 + x as f32;
                let world_y = block.origin_y as f32 + y as f32;
                let height = column_fill(field.sample(world_x, world_y), max_height) as usize;

                for z in 0..height {
                    block.voxels[(z * size + y) * size + x] = material;
                }
            }
        }

        block
    }

    /// Rebuilds a region from received parts.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidDimensions`] for a zero size or height and
    /// [`WorldError::VoxelLength`] when the payload does not match them.
    pub fn from_parts(
        origin: (i32, i32),
        block_size: u32,
        max_height: u32,
        voxels: Vec<u8>,
        time_last_changed: ChangeStamp,
    ) -> WorldResult<Self> {
        if block_size == 0 || max_height == 0 {
            return Err(WorldError::InvalidDimensions {
                block_size,
                max_height,
                width: block_size,
                depth: block_size,
            });
        }

        let expected = Self::volume(block_size, max_height);
        if voxels.len() != expected {
            return Err(WorldError::VoxelLength {
                expected,
                actual: voxels.len(),
            });
        }

        Ok(Self {
            origin_x: origin.0,
            origin_y: origin.1,
            block_size,
            max_height,
            voxels: voxels.into_boxed_slice(),
            time_last_changed,
        })
    }

    /// Number of voxels in a region of the given dimensions.
    #[inline]
    #[must_use]
    pub const fn volume(block_size: u32, max_height: u32) -> usize {
        (block_size as usize) * (block_size as usize) * (max_height as usize)
    }

    /// Maps local coordinates to a storage index, or `None` when out of range.
    #[inline]
    #[allow(clippy::cast_sign_loss)]
    fn index(&self, x: i32, y: i32, z: i32) -> Option<usize> {
        if x < 0 || y < 0 || z < 0 {
            return None;
        }
        let (x, y, z) = (x as usize, y as usize, z as usize);
        let size = self.block_size as usize;
        if x < size && y < size && z < self.max_height as usize {
            Some((z * size + y) * size + x)
        } else {
            None
        }
    }

    /// Returns true iff the plan point lies within this block's footprint.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        let (min_x, min_y) = (self.origin_x as f32, self.origin_y as f32);
        let size = self.block_size as f32;
        x >= min_x && x < min_x + size && y >= min_y && y < min_y + size
    }

    /// Returns true iff a square of half-width `radius` centred at `(x, y)`
    /// overlaps this block's footprint.
    ///
    /// Square overlap stands in for a circular view radius.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn contains_area(&self, x: f32, y: f32, radius: f32) -> bool {
        let radius = radius.max(0.0);
        let (min_x, min_y) = (self.origin_x as f32, self.origin_y as f32);
        let size = self.block_size as f32;
        x + radius >= min_x
            && x - radius < min_x + size
            && y + radius >= min_y
            && y - radius < min_y + size
    }

    /// Gets a voxel at local coordinates. Out of range reads are empty.
    #[inline]
    #[must_use]
    pub fn get_voxel(&self, x: i32, y: i32, z: i32) -> u8 {
        self.index(x, y, z).map_or(VOXEL_EMPTY, |i| self.voxels[i])
    }

    /// Sets a voxel at local coordinates.
    ///
    /// On success the change stamp becomes `max(now, previous + 1)` and the
    /// call returns true. Out of range writes are silently ignored.
    #[inline]
    pub fn set_voxel(&mut self, x: i32, y: i32, z: i32, value: u8, now: ChangeStamp) -> bool {
        let Some(index) = self.index(x, y, z) else {
            return false;
        };
        self.voxels[index] = value;
        self.time_last_changed = now.max(self.time_last_changed.next());
        true
    }

    /// One above the highest non-empty voxel of a column, or 0 if the column
    /// is empty or out of range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn column_height(&self, x: i32, y: i32) -> u32 {
        (0..self.max_height)
            .rev()
            .find(|&z| self.get_voxel(x, y, z as i32) != VOXEL_EMPTY)
            .map_or(0, |z| z + 1)
    }

    /// Returns the world coordinates of the block's origin.
    #[inline]
    #[must_use]
    pub const fn origin(&self) -> (i32, i32) {
        (self.origin_x, self.origin_y)
    }

    /// Returns the block-grid coordinate of this region.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn coord(&self) -> RegionCoord {
        let size = if self.block_size == 0 { 1 } else { self.block_size as i32 };
        RegionCoord::new(
            self.origin_x.div_euclid(size),
            self.origin_y.div_euclid(size),
        )
    }

    /// Side length in world units.
    #[inline]
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Vertical extent.
    #[inline]
    #[must_use]
    pub const fn max_height(&self) -> u32 {
        self.max_height
    }

    /// Raw voxel data, indexed as `[z][y][x]`.
    #[inline]
    #[must_use]
    pub fn voxels(&self) -> &[u8] {
        &self.voxels
    }

    /// Stamp of the last successful mutation.
    #[inline]
    #[must_use]
    pub const fn time_last_changed(&self) -> ChangeStamp {
        self.time_last_changed
    }

    /// Number of non-empty voxels.
    #[must_use]
    pub fn solid_count(&self) -> usize {
        self.voxels.iter().filter(|&&v| v != VOXEL_EMPTY).count()
    }
}

/// Converts a height sample into a column fill height.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn column_fill(sample: f32, max_height: u32) -> u32 {
    if !sample.is_finite() {
        return 0;
    }
    let scaled = (sample.clamp(0.0, 1.0) * max_height as f32).round() as u32;
    scaled.min(max_height)
}

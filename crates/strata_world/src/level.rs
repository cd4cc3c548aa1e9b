//! # Level Structure
//!
//! The authoritative world: a 2D arena of region blocks covering the full
//! world extent.
//!
//! ## Locking
//!
//! ```text
//!   apply_edit(x, y, z)          interest scan
//!          │                          │
//!          ▼                          ▼
//!   ┌─────────────┐ ┌─────────────┐ ┌─────────────┐
//!   │ RwLock(0,0) │ │ RwLock(1,0) │ │ RwLock(2,0) │ ...
//!   └─────────────┘ └─────────────┘ └─────────────┘
//!      write lock       read lock
//! ```
//!
//! Each region carries its own lock. An edit holds exactly one write lock
//! for a handful of instructions; scans only take read locks. Edits to
//! different regions never contend.

use parking_lot::RwLock;

use crate::clock::{ChangeStamp, WorldClock};
use crate::error::{WorldError, WorldResult};
use crate::height_field::HeightField;
use crate::region::{RegionBlock, RegionCoord};
use crate::VOXEL_SOLID;

/// The authoritative world grid.
#[derive(Debug)]
pub struct LevelStructure {
    /// Regions in row-major order (`by * blocks_x + bx`).
    regions: Box<[RwLock<RegionBlock>]>,
    blocks_x: u32,
    blocks_y: u32,
    block_size: u32,
    max_height: u32,
    clock: WorldClock,
}

impl LevelStructure {
    /// Generates a world of `width x depth` plan units from a height field.
    ///
    /// The grid is `ceil(width / block_size) x ceil(depth / block_size)`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidDimensions`] if any dimension is zero.
    pub fn generate<H: HeightField + ?Sized>(
        width: u32,
        depth: u32,
        block_size: u32,
        max_height: u32,
        field: &H,
    ) -> WorldResult<Self> {
        if width == 0 || depth == 0 || block_size == 0 || max_height == 0 {
            return Err(WorldError::InvalidDimensions {
                block_size,
                max_height,
                width,
                depth,
            });
        }

        let blocks_x = width.div_ceil(block_size);
        let blocks_y = depth.div_ceil(block_size);

        let regions = (0..blocks_y)
            .flat_map(|by| (0..blocks_x).map(move |bx| (bx, by)))
            .map(|(bx, by)| {
                let coord = RegionCoord::new(to_i32(bx), to_i32(by));
                RwLock::new(RegionBlock::from_height_field(
                    coord,
                    block_size,
                    max_height,
                    field,
                    VOXEL_SOLID,
                ))
            })
            .collect();

        tracing::debug!(blocks_x, blocks_y, block_size, max_height, "level generated");

        Ok(Self {
            regions,
            blocks_x,
            blocks_y,
            block_size,
            max_height,
            clock: WorldClock::new(),
        })
    }

    /// Number of regions along X.
    #[inline]
    #[must_use]
    pub const fn blocks_x(&self) -> u32 {
        self.blocks_x
    }

    /// Number of regions along Y.
    #[inline]
    #[must_use]
    pub const fn blocks_y(&self) -> u32 {
        self.blocks_y
    }

    /// Region side length in world units.
    #[inline]
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Vertical extent of every region.
    #[inline]
    #[must_use]
    pub const fn max_height(&self) -> u32 {
        self.max_height
    }

    /// Total number of regions.
    #[inline]
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// The logical clock stamping every edit to this level.
    #[inline]
    #[must_use]
    pub const fn clock(&self) -> &WorldClock {
        &self.clock
    }

    /// Arena slot of a grid coordinate, or `None` outside the grid.
    #[inline]
    #[allow(clippy::cast_sign_loss)]
    fn slot(&self, coord: RegionCoord) -> Option<usize> {
        if coord.bx < 0 || coord.by < 0 {
            return None;
        }
        let (bx, by) = (coord.bx as u32, coord.by as u32);
        if bx < self.blocks_x && by < self.blocks_y {
            Some(by as usize * self.blocks_x as usize + bx as usize)
        } else {
            None
        }
    }

    /// Grid coordinate of the region owning a plan position, if any.
    #[must_use]
    pub fn coord_at(&self, world_x: f32, world_y: f32) -> Option<RegionCoord> {
        if !world_x.is_finite() || !world_y.is_finite() {
            return None;
        }
        let coord = RegionCoord::from_world(world_x, world_y, self.block_size);
        self.slot(coord).map(|_| coord)
    }

    /// The region at a grid coordinate.
    #[inline]
    #[must_use]
    pub fn region(&self, coord: RegionCoord) -> Option<&RwLock<RegionBlock>> {
        self.slot(coord).map(|i| &self.regions[i])
    }

    /// The region owning a plan position.
    #[must_use]
    pub fn region_at(&self, world_x: f32, world_y: f32) -> Option<&RwLock<RegionBlock>> {
        self.coord_at(world_x, world_y).and_then(|c| self.region(c))
    }

    /// Change stamp of a region (read lock, no copy).
    #[must_use]
    pub fn time_last_changed(&self, coord: RegionCoord) -> Option<ChangeStamp> {
        self.region(coord).map(|r| r.read().time_last_changed())
    }

    /// Consistent copy of a region, taken under its read lock.
    #[must_use]
    pub fn snapshot(&self, coord: RegionCoord) -> Option<RegionBlock> {
        self.region(coord).map(|r| r.read().clone())
    }

    /// Grid coordinates within `reach` blocks of `center` on both axes,
    /// clipped to the world.
    #[allow(clippy::cast_possible_wrap)]
    pub fn coords_within(
        &self,
        center: RegionCoord,
        reach: u32,
    ) -> impl Iterator<Item = RegionCoord> {
        let reach = i64::from(reach);
        let clip = |c: i32, len: u32| -> (i64, i64) {
            let lo = (i64::from(c) - reach).max(0);
            let hi = (i64::from(c) + reach).min(i64::from(len) - 1);
            (lo, hi)
        };
        let (x_lo, x_hi) = clip(center.bx, self.blocks_x);
        let (y_lo, y_hi) = clip(center.by, self.blocks_y);

        (y_lo..=y_hi).flat_map(move |by| {
            (x_lo..=x_hi).map(move |bx| RegionCoord::new(bx as i32, by as i32))
        })
    }

    /// Every grid coordinate, row-major.
    pub fn iter_coords(&self) -> impl Iterator<Item = RegionCoord> {
        let blocks_x = self.blocks_x;
        (0..self.blocks_y).flat_map(move |by| {
            (0..blocks_x).map(move |bx| RegionCoord::new(to_i32(bx), to_i32(by)))
        })
    }

    /// Reads the voxel at a world position. Outside the world reads as empty.
    #[must_use]
    pub fn voxel_at(&self, world_x: f32, world_y: f32, world_z: f32) -> u8 {
        match self.locate(world_x, world_y, world_z) {
            Some((coord, (lx, ly, lz))) => self
                .region(coord)
                .map_or(crate::VOXEL_EMPTY, |r| r.read().get_voxel(lx, ly, lz)),
            None => crate::VOXEL_EMPTY,
        }
    }

    /// Writes one voxel at a world position.
    ///
    /// Returns the owning region's new stamp, or `None` if the position lies
    /// outside the world (the edit is dropped).
    pub fn apply_edit(
        &self,
        world_x: f32,
        world_y: f32,
        world_z: f32,
        voxel: u8,
    ) -> Option<ChangeStamp> {
        let (coord, (lx, ly, lz)) = self.locate(world_x, world_y, world_z)?;
        let region = self.region(coord)?;

        let now = self.clock.advance();
        let mut block = region.write();
        if block.set_voxel(lx, ly, lz, voxel, now) {
            Some(block.time_last_changed())
        } else {
            None
        }
    }

    /// Splits a world position into its region and local cell.
    #[allow(clippy::cast_possible_truncation)]
    fn locate(&self, world_x: f32, world_y: f32, world_z: f32) -> Option<(RegionCoord, (i32, i32, i32))> {
        if !world_z.is_finite() || world_z < 0.0 {
            return None;
        }
        let coord = self.coord_at(world_x, world_y)?;
        let (ox, oy) = coord.origin(self.block_size);
        let lx = world_x.floor() as i32 - ox;
        let ly = world_y.floor() as i32 - oy;
        let lz = world_z.floor() as i32;
        Some((coord, (lx, ly, lz)))
    }
}

/// Grid indices are bounded by `u32 / block_size`; saturate instead of wrap.
#[inline]
fn to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::height_field::FlatHeightField;
    use crate::VOXEL_EMPTY;

    fn level_40() -> LevelStructure {
        LevelStructure::generate(40, 40, 10, 16, &FlatHeightField(0.25)).unwrap()
    }

    #[test]
    fn test_grid_dimensions() {
        let level = level_40();
        assert_eq!(level.blocks_x(), 4);
        assert_eq!(level.blocks_y(), 4);
        assert_eq!(level.region_count(), 16);

        let ragged = LevelStructure::generate(41, 25, 10, 4, &FlatHeightField(0.0)).unwrap();
        assert_eq!(ragged.blocks_x(), 5);
        assert_eq!(ragged.blocks_y(), 3);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let flat = FlatHeightField(0.5);
        assert!(LevelStructure::generate(40, 40, 0, 16, &flat).is_err());
        assert!(LevelStructure::generate(40, 40, 10, 0, &flat).is_err());
        assert!(LevelStructure::generate(0, 40, 10, 16, &flat).is_err());
    }

    #[test]
    fn test_region_lookup() {
        let level = level_40();
        assert_eq!(level.coord_at(0.0, 0.0), Some(RegionCoord::new(0, 0)));
        assert_eq!(level.coord_at(39.9, 15.0), Some(RegionCoord::new(3, 1)));
        assert_eq!(level.coord_at(40.0, 0.0), None);
        assert_eq!(level.coord_at(-0.1, 0.0), None);
        assert_eq!(level.coord_at(f32::NAN, 0.0), None);

        let region = level.region_at(25.0, 35.0).unwrap();
        assert_eq!(region.read().origin(), (20, 30));
        assert!(level.region(RegionCoord::new(4, 0)).is_none());
    }

    #[test]
    fn test_seeded_terrain() {
        let level = level_40();
        // 0.25 * 16 = 4 solid layers everywhere.
        assert_eq!(level.voxel_at(7.0, 31.0, 3.0), VOXEL_SOLID);
        assert_eq!(level.voxel_at(7.0, 31.0, 4.0), VOXEL_EMPTY);
        assert_eq!(level.voxel_at(-7.0, 31.0, 0.0), VOXEL_EMPTY);
    }

    #[test]
    fn test_apply_edit_bumps_only_owner() {
        let level = level_40();
        let before: Vec<_> = level
            .iter_coords()
            .map(|c| level.time_last_changed(c).unwrap())
            .collect();

        let stamp = level.apply_edit(3.0, 3.0, 10.0, 9).unwrap();
        let owner = RegionCoord::new(0, 0);
        assert_eq!(level.time_last_changed(owner), Some(stamp));
        assert_eq!(level.voxel_at(3.5, 3.5, 10.5), 9);

        for (coord, old) in level.iter_coords().zip(before) {
            let now = level.time_last_changed(coord).unwrap();
            if coord == owner {
                assert!(now > old);
            } else {
                assert_eq!(now, old, "region {coord:?} should be untouched");
            }
        }
    }

    #[test]
    fn test_apply_edit_outside_is_dropped() {
        let level = level_40();
        assert_eq!(level.apply_edit(-1.0, 3.0, 1.0, 1), None);
        assert_eq!(level.apply_edit(3.0, 40.0, 1.0, 1), None);
        assert_eq!(level.apply_edit(3.0, 3.0, 16.0, 1), None);
        assert_eq!(level.apply_edit(3.0, 3.0, -0.5, 1), None);
        assert_eq!(level.apply_edit(3.0, 3.0, f32::INFINITY, 1), None);

        for coord in level.iter_coords() {
            assert_eq!(level.time_last_changed(coord), Some(ChangeStamp::GENESIS));
        }
    }

    #[test]
    fn test_stamps_strictly_increase_per_region() {
        let level = level_40();
        let mut last = ChangeStamp::GENESIS;
        for i in 0..50 {
            let stamp = level.apply_edit(15.0, 5.0, (i % 16) as f32, 2).unwrap();
            assert!(stamp > last);
            last = stamp;
        }
    }

    #[test]
    fn test_coords_within_clips_to_world() {
        let level = level_40();
        let mut corner: Vec<_> = level.coords_within(RegionCoord::new(0, 0), 1).collect();
        corner.sort();
        assert_eq!(
            corner,
            vec![
                RegionCoord::new(0, 0),
                RegionCoord::new(0, 1),
                RegionCoord::new(1, 0),
                RegionCoord::new(1, 1),
            ]
        );

        assert_eq!(level.coords_within(RegionCoord::new(2, 2), 1).count(), 9);
        assert_eq!(level.coords_within(RegionCoord::new(1, 1), 10).count(), 16);
        assert_eq!(level.coords_within(RegionCoord::new(-5, -5), 1).count(), 0);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let level = level_40();
        let coord = RegionCoord::new(1, 1);
        let snap = level.snapshot(coord).unwrap();
        level.apply_edit(12.0, 12.0, 12.0, 3);
        assert_eq!(snap.get_voxel(2, 2, 12), VOXEL_EMPTY);
        assert!(level.time_last_changed(coord).unwrap() > snap.time_last_changed());
    }
}

//! # Interest Tracking
//!
//! Per-client bookkeeping that decides which regions must be sent, and when.
//!
//! ## Per-Report Flow
//!
//! ```text
//!   PositionReport(pos, radius)
//!            │
//!            ▼
//!   moved > threshold, radius changed, or first report?
//!        │ yes                       │ no
//!        ▼                           │
//!   recompute active set             │
//!   (tag / add / evict)              │
//!        └─────────────┬─────────────┘
//!                      ▼
//!   staleness scan: stamp > last sent?  ──►  due regions
//! ```
//!
//! ## Entry State
//!
//! ```text
//!   PendingFirstSend ──send ok──► Sent(t) ──region changes past t──► due again
//!          │                          │
//!          └──────── out of range ────┴──► evicted (entry dropped)
//! ```
//!
//! Entries hold a [`RegionCoord`], never a reference into the level, so the
//! region arena and the interest state never share lifetimes.

use serde::{Deserialize, Serialize};

use strata_world::{ChangeStamp, LevelStructure, RegionCoord};

/// Tuning for interest recomputation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterestConfig {
    /// Horizontal distance a client must move before its region set is
    /// rebuilt.
    pub recompute_threshold: f32,
    /// Upper bound on any client's requested radius.
    pub max_radius: f32,
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            recompute_threshold: 2.0,
            max_radius: 256.0,
        }
    }
}

impl InterestConfig {
    /// Clamps a requested radius into `[0, max_radius]`. An infinite radius
    /// asks for the maximum. NaN and negative requests count as zero.
    #[must_use]
    pub fn sanitize_radius(&self, radius: f32) -> f32 {
        if radius > 0.0 {
            radius.min(self.max_radius.max(0.0))
        } else {
            0.0
        }
    }
}

/// Transmission state of one tracked region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendState {
    /// Tracked but never transmitted; due immediately.
    PendingFirstSend,
    /// Last handed to the transport at this stamp.
    Sent(ChangeStamp),
}

/// One region in a client's active set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessedRegion {
    coord: RegionCoord,
    last_sent: Option<ChangeStamp>,
    /// Only meaningful during a recompute.
    tagged: bool,
}

impl AccessedRegion {
    const fn new(coord: RegionCoord) -> Self {
        Self {
            coord,
            last_sent: None,
            tagged: true,
        }
    }

    /// The tracked region.
    #[inline]
    #[must_use]
    pub const fn coord(&self) -> RegionCoord {
        self.coord
    }

    /// Stamp of the last successful hand-off, if any.
    #[inline]
    #[must_use]
    pub const fn last_sent(&self) -> Option<ChangeStamp> {
        self.last_sent
    }

    /// Current transmission state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> SendState {
        match self.last_sent {
            None => SendState::PendingFirstSend,
            Some(stamp) => SendState::Sent(stamp),
        }
    }

    /// Returns true if a region at `current` must be (re)sent.
    #[inline]
    #[must_use]
    pub fn is_due(&self, current: ChangeStamp) -> bool {
        self.last_sent.map_or(true, |sent| current > sent)
    }
}

/// Interest state of one connected client.
#[derive(Clone, Debug)]
pub struct ClientDetails {
    config: InterestConfig,
    /// Last reported world position (y up).
    position: [f32; 3],
    /// Last sanitized radius.
    radius: f32,
    /// Plan position and radius the active set was built for.
    anchor: Option<([f32; 2], f32)>,
    regions: Vec<AccessedRegion>,
}

impl ClientDetails {
    /// Creates empty interest state; nothing is tracked until the first report.
    #[must_use]
    pub const fn new(config: InterestConfig) -> Self {
        Self {
            config,
            position: [0.0; 3],
            radius: 0.0,
            anchor: None,
            regions: Vec::new(),
        }
    }

    /// Last reported world position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> [f32; 3] {
        self.position
    }

    /// Last accepted visibility radius.
    #[inline]
    #[must_use]
    pub const fn radius(&self) -> f32 {
        self.radius
    }

    /// Horizontal position in level coordinates (`x`, `z` of the world).
    #[inline]
    #[must_use]
    pub const fn plan_position(&self) -> [f32; 2] {
        [self.position[0], self.position[2]]
    }

    /// Tracked regions, in no particular order.
    pub fn tracked(&self) -> impl Iterator<Item = &AccessedRegion> {
        self.regions.iter()
    }

    /// Coordinates of the tracked regions, sorted.
    #[must_use]
    pub fn tracked_coords(&self) -> Vec<RegionCoord> {
        let mut coords: Vec<_> = self.regions.iter().map(AccessedRegion::coord).collect();
        coords.sort_unstable();
        coords
    }

    /// The entry for a region, if tracked.
    #[must_use]
    pub fn entry(&self, coord: RegionCoord) -> Option<&AccessedRegion> {
        self.regions.iter().find(|e| e.coord == coord)
    }

    /// Returns true if the region is in the active set.
    #[must_use]
    pub fn is_tracking(&self, coord: RegionCoord) -> bool {
        self.entry(coord).is_some()
    }

    /// Number of tracked regions.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.regions.len()
    }

    /// Records a report and returns the regions due for transmission.
    ///
    /// Rebuilds the active set when needed, then runs the staleness scan
    /// over every tracked region.
    pub fn update(
        &mut self,
        level: &LevelStructure,
        position: [f32; 3],
        radius: f32,
    ) -> Vec<RegionCoord> {
        self.position = position;
        self.radius = self.config.sanitize_radius(radius);

        if self.needs_recompute() {
            self.recompute(level);
        }
        self.stale_regions(level)
    }

    /// Returns true if the active set is out of date for the current
    /// position and radius.
    #[must_use]
    pub fn needs_recompute(&self) -> bool {
        let Some((anchor, built_radius)) = self.anchor else {
            return true;
        };
        if built_radius.to_bits() != self.radius.to_bits() {
            return true;
        }
        let [x, y] = self.plan_position();
        let (dx, dy) = (x - anchor[0], y - anchor[1]);
        dx.mul_add(dx, dy * dy) > self.config.recompute_threshold * self.config.recompute_threshold
    }

    /// Rebuilds the active set from the current position and radius.
    ///
    /// Regions that stay in range keep their send state; new ones start as
    /// pending; regions out of range are evicted.
    pub fn recompute(&mut self, level: &LevelStructure) {
        let [x, y] = self.plan_position();
        let radius = self.radius;

        for entry in &mut self.regions {
            entry.tagged = false;
        }

        let center = RegionCoord::from_world(x, y, level.block_size());
        for coord in level.coords_within(center, window_reach(radius, level.block_size())) {
            let overlaps = level
                .region(coord)
                .is_some_and(|region| region.read().contains_area(x, y, radius));
            if !overlaps {
                continue;
            }
            match self.regions.iter_mut().find(|e| e.coord == coord) {
                Some(entry) => entry.tagged = true,
                None => self.regions.push(AccessedRegion::new(coord)),
            }
        }

        let before = self.regions.len();
        self.regions.retain(|e| e.tagged);
        tracing::trace!(
            tracked = self.regions.len(),
            evicted = before - self.regions.len(),
            "interest set recomputed"
        );

        self.anchor = Some(([x, y], radius));
    }

    /// Staleness scan: tracked regions whose stamp is newer than what this
    /// client was last sent.
    #[must_use]
    pub fn stale_regions(&self, level: &LevelStructure) -> Vec<RegionCoord> {
        self.regions
            .iter()
            .filter(|e| {
                level
                    .time_last_changed(e.coord)
                    .is_some_and(|stamp| e.is_due(stamp))
            })
            .map(AccessedRegion::coord)
            .collect()
    }

    /// Records a successful hand-off of a region copy stamped `stamp`.
    ///
    /// Ignored if the region was evicted meanwhile. Never moves an entry's
    /// stamp backwards. Returns true if the entry exists.
    pub fn mark_sent(&mut self, coord: RegionCoord, stamp: ChangeStamp) -> bool {
        match self.regions.iter_mut().find(|e| e.coord == coord) {
            Some(entry) => {
                entry.last_sent = Some(entry.last_sent.map_or(stamp, |prev| prev.max(stamp)));
                true
            }
            None => false,
        }
    }
}

/// Grid reach of the candidate window, `ceil(radius / block_size)`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn window_reach(radius: f32, block_size: u32) -> u32 {
    (radius / block_size.max(1) as f32).ceil().max(0.0) as u32
}

//! # Local World
//!
//! Client-side sync coordinator: a partial, view-bounded cache of the
//! server's regions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        LOCAL WORLD                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  datagram ──► decode ──► RegionPush ──► newer? ──► cache    │
//! │                                           │          │      │
//! │                                           ▼          ▼      │
//! │                                     ViewRefresh    flush    │
//! │                                                             │
//! │  report_position / request_edit ──► outbound queue (never   │
//! │                                      blocks the caller)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Pushes may arrive late, twice, or out of order. A cached region is only
//! ever replaced by a strictly newer stamp, so the cache converges on the
//! newest copy regardless of arrival order.
//!
//! Edits are not applied locally. The authoritative result arrives through
//! the normal push path.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Sender;

use strata_world::{RegionBlock, RegionCoord, VOXEL_EMPTY};

use crate::protocol::{decode, EditRequest, Packet, PacketHeader, PositionReport, RegionPush};
use crate::server::ConnectionId;

/// Neighbour offsets `(dx, dz)` checked around a search candidate, in order.
const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
];

/// Square-ring walk: `(fixed_x, variable_x, fixed_z, variable_z)` per side.
const RING_PATTERNS: [(i32, i32, i32, i32); 8] = [
    (-1, 0, 0, -1),
    (-1, 0, 0, 1),
    (1, 0, 0, -1),
    (1, 0, 0, 1),
    (0, -1, -1, 0),
    (0, 1, -1, 0),
    (0, -1, 1, 0),
    (0, 1, 1, 0),
];

/// Presentation hooks fired by cache changes.
pub trait ViewRefresh: Send + Sync {
    /// A region appeared in the cache (full rebuild).
    fn region_inserted(&self, region: &RegionBlock);
    /// A cached region was replaced by a newer copy.
    fn region_replaced(&self, region: &RegionBlock);
    /// A region left the cache.
    fn region_evicted(&self, coord: RegionCoord) {
        let _ = coord;
    }
}

/// Refresh hook that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRefresh;

impl ViewRefresh for NoRefresh {
    fn region_inserted(&self, _region: &RegionBlock) {}

    fn region_replaced(&self, _region: &RegionBlock) {}
}

/// Result of merging one region push.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// First copy of this region.
    Inserted,
    /// Replaced an older cached copy.
    Replaced,
    /// Not newer than the cached copy; ignored.
    Stale,
    /// Outside the view square around the player; not cached.
    OutOfView,
    /// Malformed or inconsistent payload; ignored.
    Rejected,
}

/// What a received datagram did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// A region push was merged.
    Push(PushOutcome),
    /// The server accepted the session.
    Connected(ConnectionId),
    /// The server closed the session.
    Disconnected,
    /// Well-formed but not for the client.
    Ignored,
    /// Could not be decoded.
    Malformed,
}

/// The client's cached view of the world.
pub struct LocalWorld {
    regions: HashMap<RegionCoord, RegionBlock>,
    /// Learned from the first accepted push.
    block_size: Option<u32>,
    view_radius: f32,
    player_position: Option<[f32; 3]>,
    connection: Option<ConnectionId>,
    outbound: Sender<Packet>,
    sequence: u32,
    refresh: Arc<dyn ViewRefresh>,
}

impl LocalWorld {
    /// Creates an empty cache that queues outgoing packets on `outbound`.
    #[must_use]
    pub fn new(view_radius: f32, outbound: Sender<Packet>) -> Self {
        Self {
            regions: HashMap::new(),
            block_size: None,
            view_radius,
            player_position: None,
            connection: None,
            outbound,
            sequence: 0,
            refresh: Arc::new(NoRefresh),
        }
    }

    /// Installs the presentation hook.
    #[must_use]
    pub fn with_refresh(mut self, refresh: Arc<dyn ViewRefresh>) -> Self {
        self.refresh = refresh;
        self
    }

    /// Radius around the player kept in sync.
    #[inline]
    #[must_use]
    pub const fn view_radius(&self) -> f32 {
        self.view_radius
    }

    /// Changes the view radius. Takes effect on the next report.
    pub fn set_view_radius(&mut self, radius: f32) {
        self.view_radius = radius;
    }

    /// Session id assigned by the server, once connected.
    #[inline]
    #[must_use]
    pub const fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    /// Number of cached regions.
    #[inline]
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.regions.len()
    }

    /// Cached region coordinates, sorted.
    #[must_use]
    pub fn cached_coords(&self) -> Vec<RegionCoord> {
        let mut coords: Vec<_> = self.regions.keys().copied().collect();
        coords.sort_unstable();
        coords
    }

    /// The cached region covering world `(x, z)`, if any.
    #[must_use]
    pub fn region_at(&self, x: f32, z: f32) -> Option<&RegionBlock> {
        if !x.is_finite() || !z.is_finite() {
            return None;
        }
        let coord = RegionCoord::from_world(x, z, self.block_size?);
        self.regions.get(&coord)
    }

    /// Voxel at a world position (y up), or `None` if that region is not
    /// cached.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn voxel_at(&self, position: [f32; 3]) -> Option<u8> {
        let [x, y, z] = position;
        let region = self.region_at(x, z)?;
        if !y.is_finite() {
            return Some(VOXEL_EMPTY);
        }
        let (ox, oz) = region.origin();
        Some(region.get_voxel(x.floor() as i32 - ox, z.floor() as i32 - oz, y.floor() as i32))
    }

    fn next_header(&mut self) -> PacketHeader {
        let header = PacketHeader::new(self.sequence);
        self.sequence = self.sequence.wrapping_add(1);
        header
    }

    fn queue(&mut self, make: impl FnOnce(PacketHeader) -> Packet) -> bool {
        let packet = make(self.next_header());
        match self.outbound.try_send(packet) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "outbound queue refused packet");
                false
            }
        }
    }

    /// Queues a session request.
    pub fn connect(&mut self) -> bool {
        self.queue(Packet::Connect)
    }

    /// Queues a session end and forgets the session id.
    pub fn disconnect(&mut self) -> bool {
        self.connection = None;
        self.queue(Packet::Disconnect)
    }

    /// Records the player position and queues a report with the current
    /// view radius. Returns false if the queue refused it.
    pub fn report_position(&mut self, position: [f32; 3]) -> bool {
        self.player_position = Some(position);
        let report = PositionReport::new(position, self.view_radius);
        self.queue(|header| Packet::PositionReport(header, report))
    }

    /// Queues an edit at world `(x, z)` and height `y`. Fire and forget: the
    /// cache is not touched.
    pub fn request_edit(&mut self, x: f32, z: f32, y: f32, voxel_type: i32) -> bool {
        let edit = EditRequest::new(x, z, y, voxel_type);
        self.queue(|header| Packet::EditRequest(header, edit))
    }

    /// Merges one region push into the cache.
    pub fn handle_region_push(&mut self, push: RegionPush) -> PushOutcome {
        let block = match push.into_block() {
            Ok(block) => block,
            Err(error) => {
                tracing::debug!(%error, "rejecting region push");
                return PushOutcome::Rejected;
            }
        };

        let size = block.block_size();
        let (ox, oy) = block.origin();
        let aligned = i32::try_from(size).is_ok_and(|s| ox % s == 0 && oy % s == 0);
        if !aligned {
            tracing::debug!(origin = ?block.origin(), size, "rejecting misaligned region");
            return PushOutcome::Rejected;
        }
        match self.block_size {
            Some(known) if known != size => {
                tracing::debug!(known, size, "rejecting region with foreign block size");
                return PushOutcome::Rejected;
            }
            Some(_) => {}
            None => self.block_size = Some(size),
        }

        if let Some([x, _, z]) = self.player_position {
            if !block.contains_area(x, z, self.view_radius) {
                tracing::trace!(origin = ?block.origin(), "dropping region outside the view");
                self.flush_regions();
                return PushOutcome::OutOfView;
            }
        }

        let coord = block.coord();
        let outcome = match self.regions.get_mut(&coord) {
            None => {
                self.refresh.region_inserted(&block);
                self.regions.insert(coord, block);
                PushOutcome::Inserted
            }
            Some(cached) if block.time_last_changed() > cached.time_last_changed() => {
                *cached = block;
                self.refresh.region_replaced(cached);
                PushOutcome::Replaced
            }
            Some(_) => PushOutcome::Stale,
        };

        self.flush_regions();
        outcome
    }

    /// Evicts cached regions outside the view square around the player.
    /// Does nothing until a player position is known.
    fn flush_regions(&mut self) {
        let Some([x, _, z]) = self.player_position else {
            return;
        };
        let radius = self.view_radius;
        let refresh = &self.refresh;
        self.regions.retain(|&coord, region| {
            let keep = region.contains_area(x, z, radius);
            if !keep {
                refresh.region_evicted(coord);
            }
            keep
        });
    }

    /// Decodes and applies one datagram from the server.
    pub fn handle_datagram(&mut self, datagram: &[u8]) -> ClientEvent {
        match decode(datagram) {
            Ok(Packet::RegionPush(_, push)) => ClientEvent::Push(self.handle_region_push(push)),
            Ok(Packet::ConnectAck(_, id)) => {
                let id = ConnectionId(id);
                tracing::info!(connection = %id, "session accepted");
                self.connection = Some(id);
                ClientEvent::Connected(id)
            }
            Ok(Packet::Disconnect(_)) => {
                tracing::info!("server closed the session");
                self.connection = None;
                ClientEvent::Disconnected
            }
            Ok(other) => {
                tracing::trace!(packet_type = ?other.packet_type(), "ignoring packet");
                ClientEvent::Ignored
            }
            Err(error) => {
                tracing::debug!(%error, "dropping malformed datagram");
                ClientEvent::Malformed
            }
        }
    }

    /// The cached region holding world cell `(x, z)`.
    fn cell_region(&self, x: i32, z: i32) -> Option<&RegionBlock> {
        let size = i32::try_from(self.block_size?).ok()?;
        self.regions
            .get(&RegionCoord::new(x.div_euclid(size), z.div_euclid(size)))
    }

    /// Height of a cached column, or `None` if not cached.
    fn cached_column_height(&self, x: i32, z: i32) -> Option<u32> {
        let region = self.cell_region(x, z)?;
        let (ox, oz) = region.origin();
        Some(region.column_height(x - ox, z - oz))
    }

    /// If cell `(x, z)` sits next to a solid cached column, returns the
    /// height at which a voxel attached to that column would go.
    #[allow(clippy::cast_possible_wrap)]
    fn attach_height(&self, x: i32, z: i32) -> Option<i32> {
        let candidate = self.cell_region(x, z)?;
        let (ox, oz) = candidate.origin();

        NEIGHBOURS.iter().find_map(|&(dx, dz)| {
            let height = self.cached_column_height(x.checked_add(dx)?, z.checked_add(dz)?)?;
            if height == 0 || height >= candidate.max_height() {
                return None;
            }
            let open = candidate.get_voxel(x - ox, z - oz, height as i32) == VOXEL_EMPTY;
            open.then_some(height as i32)
        })
    }

    /// Finds the open cell nearest `position` that touches a solid cached
    /// column, searching square rings of growing radius within the view
    /// radius.
    ///
    /// Returns the world cell `(x, y, z)` (y up) where a voxel could be
    /// attached.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn find_nearest_open_neighbor(&self, position: [f32; 3]) -> Option<(i32, i32, i32)> {
        let [px, _, pz] = position;
        if !px.is_finite() || !pz.is_finite() {
            return None;
        }
        let center_x = (px + 0.5).floor() as i64;
        let center_z = (pz + 0.5).floor() as i64;

        let mut r = 0i64;
        while (r as f32) < self.view_radius {
            for offset in 0..=r {
                for &(fx, vx, fz, vz) in &RING_PATTERNS {
                    let cx = center_x.saturating_add(i64::from(fx) * r + i64::from(vx) * offset);
                    let cz = center_z.saturating_add(i64::from(fz) * r + i64::from(vz) * offset);
                    // Cells past the i32 grid can never be cached.
                    let (Ok(cx), Ok(cz)) = (i32::try_from(cx), i32::try_from(cz)) else {
                        continue;
                    };
                    if let Some(cy) = self.attach_height(cx, cz) {
                        return Some((cx, cy, cz));
                    }
                }
            }
            r += 1;
        }
        None
    }
}

impl std::fmt::Debug for LocalWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWorld")
            .field("cached", &self.regions.len())
            .field("block_size", &self.block_size)
            .field("view_radius", &self.view_radius)
            .field("player_position", &self.player_position)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

//! # Packet Definitions
//!
//! Every message exchanged between a region server and its clients.
//!
//! Client-to-server records are fixed-size `Pod` structs so they can be
//! copied straight off the wire. A region push owns its voxel payload.

use bytemuck::{Pod, Zeroable};

use strata_world::{ChangeStamp, RegionBlock, WorldError};

/// Packet header - present in every packet.
///
/// Total size: 4 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PacketHeader {
    /// Sender-local sequence number. Informational; ordering safety comes
    /// from region change stamps, not from this field.
    pub sequence: u32,
}

impl PacketHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 4;

    /// Creates a new packet header.
    #[inline]
    #[must_use]
    pub const fn new(sequence: u32) -> Self {
        Self { sequence }
    }
}

/// Types of packets in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Client -> Server: position and view radius.
    PositionReport = 0,
    /// Client -> Server: voxel edit proposal.
    EditRequest = 1,
    /// Server -> Client: full copy of one region.
    RegionPush = 2,
    /// Client -> Server: session request.
    Connect = 3,
    /// Server -> Client: session accepted.
    ConnectAck = 4,
    /// Bidirectional: session ends.
    Disconnect = 5,
}

impl PacketType {
    /// Parses a type byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::PositionReport),
            1 => Some(Self::EditRequest),
            2 => Some(Self::RegionPush),
            3 => Some(Self::Connect),
            4 => Some(Self::ConnectAck),
            5 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// Position report - Client -> Server.
///
/// World position with y up, plus the radius the client wants kept in sync.
///
/// Size: 16 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PositionReport {
    /// Position X.
    pub x: f32,
    /// Position Y (up).
    pub y: f32,
    /// Position Z.
    pub z: f32,
    /// Requested visibility radius in world units.
    pub visible_radius: f32,
}

impl PositionReport {
    /// Size in bytes.
    pub const SIZE: usize = 16;

    /// Creates a report.
    #[inline]
    #[must_use]
    pub const fn new(position: [f32; 3], visible_radius: f32) -> Self {
        Self {
            x: position[0],
            y: position[1],
            z: position[2],
            visible_radius,
        }
    }

    /// The reported position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Returns true if the position is finite. The radius is sanitized
    /// separately.
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Edit request - Client -> Server.
///
/// Fields are in `x, z, y` order to match the call signature on both ends.
///
/// Size: 16 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct EditRequest {
    /// World X.
    pub world_x: f32,
    /// World Z.
    pub world_z: f32,
    /// World Y (height).
    pub world_y: f32,
    /// Requested voxel value. Only `0..=255` is accepted by the server.
    pub voxel_type: i32,
}

impl EditRequest {
    /// Size in bytes.
    pub const SIZE: usize = 16;

    /// Creates an edit request.
    #[inline]
    #[must_use]
    pub const fn new(world_x: f32, world_z: f32, world_y: f32, voxel_type: i32) -> Self {
        Self {
            world_x,
            world_z,
            world_y,
            voxel_type,
        }
    }

    /// Returns true if every coordinate is finite.
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.world_x.is_finite() && self.world_z.is_finite() && self.world_y.is_finite()
    }
}

/// Region push - Server -> Client.
///
/// A complete copy of one region. Clients replace, never merge.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionPush {
    /// World X of the region origin.
    pub origin_x: i32,
    /// World Z of the region origin (plan Y on the server).
    pub origin_y: i32,
    /// Region side length.
    pub block_size: i32,
    /// Vertical extent.
    pub max_height: i32,
    /// Dense voxels, `[height][row][column]`.
    pub voxels: Vec<u8>,
    /// Change stamp of the copy.
    pub time_last_changed: f64,
}

impl RegionPush {
    /// Builds a push from a region snapshot.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn from_block(block: &RegionBlock) -> Self {
        let (origin_x, origin_y) = block.origin();
        Self {
            origin_x,
            origin_y,
            block_size: block.block_size() as i32,
            max_height: block.max_height() as i32,
            voxels: block.voxels().to_vec(),
            time_last_changed: block.time_last_changed().to_wire(),
        }
    }

    /// The change stamp carried by this push.
    #[inline]
    #[must_use]
    pub fn stamp(&self) -> ChangeStamp {
        ChangeStamp::from_wire(self.time_last_changed)
    }

    /// Rebuilds the region carried by this push.
    ///
    /// # Errors
    ///
    /// Fails when the dimensions are not positive or the voxel payload does
    /// not match them.
    pub fn into_block(self) -> Result<RegionBlock, WorldError> {
        let stamp = self.stamp();
        let block_size = u32::try_from(self.block_size).unwrap_or(0);
        let max_height = u32::try_from(self.max_height).unwrap_or(0);
        RegionBlock::from_parts(
            (self.origin_x, self.origin_y),
            block_size,
            max_height,
            self.voxels,
            stamp,
        )
    }
}

/// Generic packet container.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    /// Position report.
    PositionReport(PacketHeader, PositionReport),
    /// Edit request.
    EditRequest(PacketHeader, EditRequest),
    /// Region push.
    RegionPush(PacketHeader, RegionPush),
    /// Session request.
    Connect(PacketHeader),
    /// Session accepted.
    ConnectAck(PacketHeader, u32), // connection_id
    /// Session end.
    Disconnect(PacketHeader),
}

impl Packet {
    /// Returns the packet type.
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        match self {
            Self::PositionReport(..) => PacketType::PositionReport,
            Self::EditRequest(..) => PacketType::EditRequest,
            Self::RegionPush(..) => PacketType::RegionPush,
            Self::Connect(..) => PacketType::Connect,
            Self::ConnectAck(..) => PacketType::ConnectAck,
            Self::Disconnect(..) => PacketType::Disconnect,
        }
    }

    /// Returns the header.
    #[must_use]
    pub const fn header(&self) -> &PacketHeader {
        match self {
            Self::PositionReport(h, _)
            | Self::EditRequest(h, _)
            | Self::RegionPush(h, _)
            | Self::Connect(h)
            | Self::ConnectAck(h, _)
            | Self::Disconnect(h) => h,
        }
    }
}

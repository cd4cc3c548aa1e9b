//! # Network Protocol
//!
//! Binary packet definitions for region synchronization.
//!
//! ## Packet Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Type (1) │ Header: Sequence (4)                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (variable, one datagram max)                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Messages
//!
//! | Packet | Direction | Payload |
//! |--------|-----------|---------|
//! | `PositionReport` | C -> S | position (3 x f32), visible radius (f32) |
//! | `EditRequest` | C -> S | x, z, y (f32), voxel type (i32) |
//! | `RegionPush` | S -> C | origin, size, height (i32), stamp (f64), LZ4 voxels |
//! | `Connect` / `ConnectAck` / `Disconnect` | session | connection id on ack |
//!
//! Delivery is unreliable and unordered. Pushes carry a change stamp so the
//! receiver can discard duplicates and late arrivals on its own.

mod compression;
mod packets;
mod serialization;

pub use compression::{compress_voxels, decompress_voxels};
pub use packets::{EditRequest, Packet, PacketHeader, PacketType, PositionReport, RegionPush};
pub use serialization::{decode, encode, PacketDeserializer, PacketSerializer, MAX_DATAGRAM_SIZE};

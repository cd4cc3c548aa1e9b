//! # STRATA Sync - Interest-Managed Region Replication
//!
//! Keeps every client's partial copy of the voxel world consistent with the
//! authoritative server copy, sending only the regions a client can see.
//!
//! ## Architecture
//!
//! - **Interest**: per-client set of regions overlapping its view square
//! - **Server**: applies edits, scans interest sets on each position report
//! - **Client**: caches pushed regions, newest stamp wins, flushes out-of-view
//! - **Protocol**: compact binary packets, LZ4-compressed voxel payloads
//! - **Transport**: UDP, or an in-process channel for tests and embedding
//!
//! ## Data Flow
//!
//! ```text
//! CLIENT                                SERVER
//!   |                                      |
//!   |--- PositionReport(pos, radius) ----->|  recompute interest if moved,
//!   |                                      |  scan for stale regions
//!   |<-- RegionPush (per stale region) ----|
//!   |                                      |
//!   |--- EditRequest(x, z, y, voxel) ----->|  apply, bump region stamp
//!   |                                      |  (seen on the next scan)
//! ```
//!
//! The client never applies its own edits. The server is the only writer.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_sync::{ChannelSink, ConnectionId, InterestConfig, RegionServer};
//! use strata_world::{FlatHeightField, LevelStructure};
//!
//! let level = Arc::new(LevelStructure::generate(40, 40, 10, 16, &FlatHeightField(0.25)).unwrap());
//! let (sink, pushes) = ChannelSink::bounded(64);
//! let server = RegionServer::new(level, Arc::new(sink), InterestConfig::default());
//!
//! let outcome = server.handle_position_report(ConnectionId(1), [0.0, 0.0, 0.0], 5.0);
//! assert_eq!(outcome.sent, 1);
//! assert_eq!(pushes.len(), 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod config;
pub mod error;
pub mod interest;
pub mod protocol;
pub mod server;
pub mod simulation;
pub mod transport;

// Re-exports for convenience
pub use client::{ClientEvent, LocalWorld, NoRefresh, PushOutcome, ViewRefresh};
pub use config::{ServerConfig, SyncConfig, WorldConfig};
pub use error::{ConfigError, ProtocolError, SendError, SyncError, SyncResult};
pub use interest::{AccessedRegion, ClientDetails, InterestConfig, SendState};
pub use protocol::{
    decode, encode, EditRequest, Packet, PacketHeader, PacketType, PositionReport, RegionPush,
};
pub use server::{
    ConnectionId, ConnectionRegistry, PacketOutcome, ProxyTracker, RegionServer, ReportOutcome,
};
pub use simulation::{FlakySink, LossyLink, NetworkConditions};
pub use transport::{ChannelSink, OutboundPush, RegionSink, UdpSink, UdpTransport};

/// Default UDP port of the region server.
pub const DEFAULT_PORT: u16 = 7878;

/// Default cap on concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 256;

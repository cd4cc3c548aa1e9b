//! # Region Server
//!
//! Server-side sync coordinator: owns nothing but references to the world,
//! the outbound sink and per-session interest state.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       REGION SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PositionReport ──► ClientDetails ──► due regions           │
//! │                       (per session)        │                │
//! │                                            ▼                │
//! │                      LevelStructure ──► snapshot ──► Sink   │
//! │                            ▲                                │
//! │  EditRequest ──────────────┘ (one region write lock)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//!
//! Edits are never pushed on write. An edit bumps its region's stamp, and
//! every client watching that region picks it up in the staleness scan of
//! its own next position report. A failed send leaves the client's entry
//! untouched, so the same scan retries it.

mod connection;
mod state;

pub use connection::{ClientConnection, ConnectionId, ConnectionRegistry};
pub use state::{ServerState, ServerStats, SessionHandle, StatsSnapshot};

use std::sync::Arc;

use strata_world::{ChangeStamp, LevelStructure, RegionCoord};

use crate::interest::InterestConfig;
use crate::protocol::{EditRequest, Packet, PositionReport, RegionPush};
use crate::transport::RegionSink;

/// Visual stand-in for a connected player, owned by the host application.
pub trait ProxyTracker: Send + Sync {
    /// Moves the proxy of a connection to its latest reported position.
    fn update_proxy(&self, connection: ConnectionId, position: [f32; 3]);

    /// Removes the proxy of a departed connection.
    fn remove_proxy(&self, connection: ConnectionId) {
        let _ = connection;
    }
}

/// Result of one position report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportOutcome {
    /// Regions found stale.
    pub due: usize,
    /// Pushes handed to the transport.
    pub sent: usize,
    /// Pushes the transport refused (retried on the next report).
    pub failed: usize,
}

/// What a dispatched packet did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketOutcome {
    /// A position report was processed.
    Report(ReportOutcome),
    /// An edit was applied (`Some`) or dropped (`None`).
    Edit(Option<ChangeStamp>),
    /// The session was torn down.
    Disconnected,
    /// Not a packet the coordinator handles.
    Ignored,
}

/// The server-side sync coordinator.
pub struct RegionServer {
    level: Arc<LevelStructure>,
    sink: Arc<dyn RegionSink>,
    proxies: Option<Arc<dyn ProxyTracker>>,
    state: ServerState,
}

impl RegionServer {
    /// Creates a coordinator over a world and an outbound sink.
    #[must_use]
    pub fn new(level: Arc<LevelStructure>, sink: Arc<dyn RegionSink>, config: InterestConfig) -> Self {
        Self {
            level,
            sink,
            proxies: None,
            state: ServerState::new(config),
        }
    }

    /// Attaches the visual-proxy collaborator.
    #[must_use]
    pub fn with_proxies(mut self, proxies: Arc<dyn ProxyTracker>) -> Self {
        self.proxies = Some(proxies);
        self
    }

    /// The authoritative world.
    #[inline]
    #[must_use]
    pub fn level(&self) -> &Arc<LevelStructure> {
        &self.level
    }

    /// Session state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> &ServerState {
        &self.state
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.state.stats().snapshot()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.len()
    }

    /// Regions a connection currently tracks, sorted.
    #[must_use]
    pub fn tracked_regions(&self, connection: ConnectionId) -> Option<Vec<RegionCoord>> {
        self.state
            .session(connection)
            .map(|session| session.lock().tracked_coords())
    }

    /// Handles a position report: updates interest, then pushes every stale
    /// region to this connection.
    ///
    /// `position` is a world position with y up. Reports with a non-finite
    /// position are dropped.
    pub fn handle_position_report(
        &self,
        connection: ConnectionId,
        position: [f32; 3],
        radius: f32,
    ) -> ReportOutcome {
        if !PositionReport::new(position, radius).is_finite() {
            tracing::debug!(%connection, ?position, "dropping report with non-finite position");
            self.state.stats().record_dropped_report();
            return ReportOutcome::default();
        }

        let session = self.state.session_or_insert(connection);
        let mut details = session.lock();
        let due = details.update(&self.level, position, radius);

        let mut outcome = ReportOutcome {
            due: due.len(),
            ..ReportOutcome::default()
        };

        for coord in due {
            let Some(block) = self.level.snapshot(coord) else {
                continue;
            };
            let stamp = block.time_last_changed();
            let push = RegionPush::from_block(&block);

            match self.sink.send_region(connection, &push) {
                Ok(()) => {
                    details.mark_sent(coord, stamp);
                    outcome.sent += 1;
                }
                Err(error) => {
                    tracing::debug!(%connection, ?coord, %error, "region push failed");
                    outcome.failed += 1;
                }
            }
        }
        drop(details);

        if let Some(proxies) = &self.proxies {
            proxies.update_proxy(connection, position);
        }

        self.state.stats().record_report(outcome.sent, outcome.failed);
        tracing::trace!(
            %connection,
            due = outcome.due,
            sent = outcome.sent,
            failed = outcome.failed,
            "position report handled"
        );
        outcome
    }

    /// Handles an edit request at world `(x, z)` and height `y`.
    ///
    /// Voxel types outside `0..=255`, non-finite coordinates, and positions
    /// outside the world are dropped. Nobody is notified: watchers see the
    /// change on their next report.
    pub fn handle_edit_request(
        &self,
        connection: ConnectionId,
        x: f32,
        z: f32,
        y: f32,
        voxel_type: i32,
    ) -> Option<ChangeStamp> {
        let applied = u8::try_from(voxel_type)
            .ok()
            .filter(|_| EditRequest::new(x, z, y, voxel_type).is_finite())
            .and_then(|voxel| self.level.apply_edit(x, z, y, voxel));

        self.state.stats().record_edit(applied.is_some());
        match applied {
            Some(stamp) => tracing::trace!(%connection, x, y, z, voxel_type, ?stamp, "edit applied"),
            None => tracing::debug!(%connection, x, y, z, voxel_type, "edit dropped"),
        }
        applied
    }

    /// Dispatches one decoded client packet.
    pub fn handle_packet(&self, connection: ConnectionId, packet: &Packet) -> PacketOutcome {
        match packet {
            Packet::PositionReport(_, report) => PacketOutcome::Report(self.handle_position_report(
                connection,
                report.position(),
                report.visible_radius,
            )),
            Packet::EditRequest(_, edit) => PacketOutcome::Edit(self.handle_edit_request(
                connection,
                edit.world_x,
                edit.world_z,
                edit.world_y,
                edit.voxel_type,
            )),
            Packet::Disconnect(_) => {
                self.disconnect(connection);
                PacketOutcome::Disconnected
            }
            other => {
                tracing::trace!(%connection, packet_type = ?other.packet_type(), "ignoring packet");
                PacketOutcome::Ignored
            }
        }
    }

    /// Tears down a session's interest state. Returns true if it existed.
    pub fn disconnect(&self, connection: ConnectionId) -> bool {
        let existed = self.state.remove(connection);
        if existed {
            tracing::info!(%connection, "session closed");
            if let Some(proxies) = &self.proxies {
                proxies.remove_proxy(connection);
            }
        }
        existed
    }
}

impl std::fmt::Debug for RegionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionServer")
            .field("blocks", &(self.level.blocks_x(), self.level.blocks_y()))
            .field("sessions", &self.state.len())
            .field("has_proxies", &self.proxies.is_some())
            .finish_non_exhaustive()
    }
}

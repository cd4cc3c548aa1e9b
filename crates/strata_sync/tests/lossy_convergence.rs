//! # Lossy Delivery Convergence Test
//!
//! A server whose sink refuses a share of sends, feeding a client over a
//! link that duplicates and reorders, must still leave the client holding
//! exactly the server's regions once edits stop.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_sync::{
    ChannelSink, ConnectionId, FlakySink, InterestConfig, LocalWorld, LossyLink,
    NetworkConditions, OutboundPush, Packet, RegionPush, RegionServer,
};
use strata_world::{FlatHeightField, LevelStructure};

const CLIENT: ConnectionId = ConnectionId(1);
const POSITION: [f32; 3] = [20.0, 2.0, 20.0];

struct Harness {
    level: Arc<LevelStructure>,
    server: RegionServer,
    flaky: Arc<FlakySink>,
    pushes: Receiver<OutboundPush>,
    link: LossyLink<RegionPush>,
    local: LocalWorld,
    outbound: Receiver<Packet>,
}

impl Harness {
    fn new(fail_percent: u8, conditions: NetworkConditions, seed: u64) -> Self {
        let level = Arc::new(LevelStructure::generate(40, 40, 10, 16, &FlatHeightField(0.3)).unwrap());
        let (sink, pushes) = ChannelSink::bounded(4096);
        let flaky = Arc::new(FlakySink::new(Arc::new(sink), fail_percent, seed));
        let server = RegionServer::new(Arc::clone(&level), flaky.clone(), InterestConfig::default());
        let (tx, outbound) = bounded(64);

        Self {
            level,
            server,
            flaky,
            pushes,
            link: LossyLink::new(conditions, seed ^ 0xABCD),
            local: LocalWorld::new(30.0, tx),
            outbound,
        }
    }

    /// One client tick: report, let the server answer, deliver over the link.
    fn round(&mut self) -> usize {
        assert!(self.local.report_position(POSITION));
        let mut due = 0;
        for packet in self.outbound.try_iter() {
            if let strata_sync::PacketOutcome::Report(outcome) = self.server.handle_packet(CLIENT, &packet) {
                due += outcome.due;
            }
        }
        for OutboundPush { push, .. } in self.pushes.try_iter() {
            self.link.send(push);
        }
        for push in self.link.deliver() {
            self.local.handle_region_push(push);
        }
        due
    }

    fn assert_converged(&self) {
        assert_eq!(self.local.cached_count(), self.level.region_count());
        for coord in self.level.iter_coords() {
            let server_copy = self.level.snapshot(coord).unwrap();
            let (ox, oz) = server_copy.origin();
            let cached = self
                .local
                .region_at(ox as f32 + 0.5, oz as f32 + 0.5)
                .unwrap_or_else(|| panic!("{coord:?} missing on the client"));
            assert_eq!(cached, &server_copy, "{coord:?} diverged");
        }
    }
}

fn random_edits(harness: &Harness, rng: &mut StdRng, count: usize) {
    for _ in 0..count {
        let x = rng.gen_range(0.0f32..40.0);
        let z = rng.gen_range(0.0f32..40.0);
        let y = rng.gen_range(0.0f32..16.0);
        let voxel = rng.gen_range(0..4);
        harness.server.handle_edit_request(CLIENT, x, z, y, voxel);
    }
}

/// Test: refused sends are retried by later scans until nothing is due.
#[test]
fn test_flaky_sink_converges() {
    let mut harness = Harness::new(40, NetworkConditions::PERFECT, 11);
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..30 {
        random_edits(&harness, &mut rng, 5);
        harness.round();
    }

    let mut quiet_rounds = 0;
    while harness.round() > 0 {
        quiet_rounds += 1;
        assert!(quiet_rounds < 200, "never settled");
    }

    assert!(harness.flaky.failed() > 0, "the sink never failed");
    harness.assert_converged();
}

/// Test: duplicated and reordered deliveries still converge on the newest
/// copy of every region.
#[test]
fn test_duplicating_reordering_link_converges() {
    let conditions = NetworkConditions {
        loss_percent: 0,
        duplicate_percent: 30,
        reorder_percent: 60,
    };
    let mut harness = Harness::new(20, conditions, 23);
    let mut rng = StdRng::seed_from_u64(23);

    for _ in 0..40 {
        random_edits(&harness, &mut rng, 8);
        harness.round();
    }
    for _ in 0..200 {
        if harness.round() == 0 && harness.link.in_flight() == 0 {
            break;
        }
    }

    let stats = *harness.link.stats();
    assert!(stats.duplicated > 0 && stats.reordered > 0, "{stats:?}");
    harness.assert_converged();
}

/// Test: a push lost after hand-off is recovered by the next change to
/// that region.
#[test]
fn test_lost_push_recovered_by_next_change() {
    let mut harness = Harness::new(0, NetworkConditions::PERFECT, 5);
    harness.round();
    harness.assert_converged();

    // The server hands a push off, but the link loses it.
    harness.server.handle_edit_request(CLIENT, 5.0, 5.0, 14.0, 2);
    harness.link.set_conditions(NetworkConditions {
        loss_percent: 100,
        ..NetworkConditions::PERFECT
    });
    assert_eq!(harness.round(), 1);
    assert_eq!(harness.local.voxel_at([5.0, 14.0, 5.0]), Some(0));

    // Hand-off counted as sent: an unchanged region is not resent.
    harness.link.set_conditions(NetworkConditions::PERFECT);
    assert_eq!(harness.round(), 0);

    harness.server.handle_edit_request(CLIENT, 6.0, 5.0, 14.0, 2);
    assert_eq!(harness.round(), 1);
    assert_eq!(harness.local.voxel_at([5.0, 14.0, 5.0]), Some(2));
    harness.assert_converged();
}

//! # Concurrent Client Stress Test
//!
//! Two clients editing two different regions through one server, while also
//! reporting positions, must never block or corrupt each other.

use std::sync::Arc;
use std::thread;

use strata_sync::{ChannelSink, ConnectionId, InterestConfig, OutboundPush, RegionServer};
use strata_world::{FlatHeightField, LevelStructure, RegionCoord};

const ROUNDS: usize = 20;

/// Test: every edit lands, each region holds only its own client's voxels,
/// and untouched regions are unchanged.
#[test]
fn test_two_clients_edit_disjoint_regions() {
    let field = FlatHeightField(0.25);
    let level = Arc::new(LevelStructure::generate(40, 40, 10, 16, &field).unwrap());
    let pristine = LevelStructure::generate(40, 40, 10, 16, &field).unwrap();
    let (sink, pushes) = ChannelSink::bounded(100_000);
    let server = RegionServer::new(Arc::clone(&level), Arc::new(sink), InterestConfig::default());

    // (client, region origin, voxel type)
    let clients = [(ConnectionId(1), (0.0f32, 0.0f32), 2i32), (ConnectionId(2), (30.0, 30.0), 3)];

    thread::scope(|scope| {
        for &(id, (ox, oz), voxel) in &clients {
            let server = &server;
            scope.spawn(move || {
                for round in 0..ROUNDS {
                    for dx in 0..10u8 {
                        for dz in 0..10u8 {
                            let (x, z) = (ox + f32::from(dx) + 0.5, oz + f32::from(dz) + 0.5);
                            let y = (4 + round % 12) as f32;
                            assert!(server.handle_edit_request(id, x, z, y, voxel).is_some());
                        }
                    }
                    server.handle_position_report(id, [ox + 5.0, 0.0, oz + 5.0], 4.0);
                }
            });
        }
    });

    let stats = server.stats();
    assert_eq!(stats.edits_applied, (2 * ROUNDS * 100) as u64);
    assert_eq!(stats.edits_dropped, 0);
    assert_eq!(stats.reports_handled, (2 * ROUNDS) as u64);

    let check = |coord: RegionCoord, voxel: u8| {
        let block = level.snapshot(coord).unwrap();
        for x in 0..10 {
            for y in 0..10 {
                for z in 0..16 {
                    let expected = match z {
                        0..=3 => 1,
                        4..=15 => voxel,
                        _ => unreachable!(),
                    };
                    assert_eq!(block.get_voxel(x, y, z), expected, "{coord:?} ({x},{y},{z})");
                }
            }
        }
    };
    check(RegionCoord::new(0, 0), 2);
    check(RegionCoord::new(3, 3), 3);

    for coord in level.iter_coords() {
        if coord == RegionCoord::new(0, 0) || coord == RegionCoord::new(3, 3) {
            continue;
        }
        assert_eq!(level.snapshot(coord), pristine.snapshot(coord), "{coord:?} was touched");
    }

    // Each client only ever received its own region.
    for OutboundPush { to, push } in pushes.try_iter() {
        let expected = if to == ConnectionId(1) { (0, 0) } else { (30, 30) };
        assert_eq!((push.origin_x, push.origin_y), expected);
    }
}

//! # Interest Set Exhaustive Test
//!
//! Compares every computed interest set against a brute-force scan of the
//! whole grid, for random positions and radii on small worlds whose edge
//! blocks are partial.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_sync::{ClientDetails, InterestConfig};
use strata_world::{FlatHeightField, LevelStructure, RegionCoord};

fn brute_force(level: &LevelStructure, x: f32, y: f32, radius: f32) -> Vec<RegionCoord> {
    let mut out: Vec<_> = level
        .iter_coords()
        .filter(|&coord| {
            level
                .region(coord)
                .is_some_and(|region| region.read().contains_area(x, y, radius))
        })
        .collect();
    out.sort_unstable();
    out
}

fn random_report(rng: &mut StdRng) -> ([f32; 3], f32) {
    let x = rng.gen_range(-30.0f32..90.0);
    let z = rng.gen_range(-30.0f32..90.0);
    let radius = match rng.gen_range(0u8..10) {
        0 => 0.0,
        1 => rng.gen_range(0u32..30) as f32,
        _ => rng.gen_range(0.0f32..40.0),
    };
    ([x, rng.gen_range(0.0f32..16.0), z], radius)
}

/// Test: a fresh client's set equals the brute-force overlap set.
#[test]
fn test_fresh_sets_match_brute_force() {
    let mut rng = StdRng::seed_from_u64(0x5EED);

    for (width, depth, block_size) in [(40, 40, 10), (37, 53, 7), (16, 9, 4), (5, 5, 8)] {
        let level = LevelStructure::generate(width, depth, block_size, 4, &FlatHeightField(0.0)).unwrap();

        for _ in 0..500 {
            let (position, radius) = random_report(&mut rng);
            let mut details = ClientDetails::new(InterestConfig::default());
            let due = details.update(&level, position, radius);

            let expected = brute_force(&level, position[0], position[2], radius);
            assert_eq!(
                details.tracked_coords(),
                expected,
                "{width}x{depth}/{block_size} at {position:?} r={radius}"
            );

            // First report: everything tracked is due.
            let mut due = due;
            due.sort_unstable();
            assert_eq!(due, expected);
        }
    }
}

/// Test: a client that keeps moving keeps an exact set, since every move
/// past a zero threshold rebuilds it incrementally.
#[test]
fn test_incremental_sets_match_brute_force() {
    let mut rng = StdRng::seed_from_u64(77);
    let level = LevelStructure::generate(61, 47, 6, 4, &FlatHeightField(0.0)).unwrap();
    let config = InterestConfig {
        recompute_threshold: 0.0,
        ..InterestConfig::default()
    };

    let mut details = ClientDetails::new(config);
    for step in 0..2000 {
        let (position, radius) = random_report(&mut rng);
        details.update(&level, position, radius);

        assert_eq!(
            details.tracked_coords(),
            brute_force(&level, position[0], position[2], radius),
            "step {step} at {position:?} r={radius}"
        );
    }
}

/// Test: with the default threshold, small drifts keep the old set while
/// a large move rebuilds it exactly.
#[test]
fn test_threshold_defers_then_rebuilds() {
    let level = LevelStructure::generate(100, 100, 10, 4, &FlatHeightField(0.0)).unwrap();
    let mut details = ClientDetails::new(InterestConfig::default());

    details.update(&level, [49.5, 0.0, 50.0], 10.0);
    let built = details.tracked_coords();
    assert_eq!(built, brute_force(&level, 49.5, 50.0, 10.0));

    // One unit of drift shifts the exact set by a column, but stays under
    // the threshold.
    details.update(&level, [50.5, 0.0, 50.0], 10.0);
    assert_eq!(details.tracked_coords(), built);
    assert_ne!(built, brute_force(&level, 50.5, 50.0, 10.0));

    details.update(&level, [57.0, 0.0, 44.0], 10.0);
    assert_eq!(details.tracked_coords(), brute_force(&level, 57.0, 44.0, 10.0));
}

//! # Network Simulation
//!
//! Deterministic lossy delivery for testing convergence.
//!
//! ## Features
//!
//! - Packet loss, duplication and reordering ([`LossyLink`])
//! - A region sink that refuses a share of sends ([`FlakySink`])
//!
//! Both are seeded, so a failing run replays exactly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SendError;
use crate::protocol::RegionPush;
use crate::server::ConnectionId;
use crate::transport::RegionSink;

/// Network conditions for simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkConditions {
    /// Packet loss percentage (0-100).
    pub loss_percent: u8,
    /// Duplicate packet percentage (0-100).
    pub duplicate_percent: u8,
    /// Out-of-order percentage (0-100).
    pub reorder_percent: u8,
}

impl NetworkConditions {
    /// Perfect network conditions (LAN).
    pub const PERFECT: Self = Self {
        loss_percent: 0,
        duplicate_percent: 0,
        reorder_percent: 0,
    };

    /// Average network conditions (cable).
    pub const AVERAGE: Self = Self {
        loss_percent: 1,
        duplicate_percent: 1,
        reorder_percent: 2,
    };

    /// Poor network conditions (mobile/wifi).
    pub const POOR: Self = Self {
        loss_percent: 5,
        duplicate_percent: 2,
        reorder_percent: 5,
    };

    fn roll(rng: &mut StdRng, percent: u8) -> bool {
        rng.gen_range(0u8..100) < percent
    }
}

impl Default for NetworkConditions {
    fn default() -> Self {
        Self::AVERAGE
    }
}

/// Delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Messages handed to the link.
    pub sent: u64,
    /// Messages that came out (duplicates included).
    pub delivered: u64,
    /// Messages lost.
    pub dropped: u64,
    /// Extra copies delivered.
    pub duplicated: u64,
    /// Messages moved out of order.
    pub reordered: u64,
}

/// One-way in-memory link that loses, copies and shuffles messages.
#[derive(Debug)]
pub struct LossyLink<T> {
    conditions: NetworkConditions,
    rng: StdRng,
    in_flight: VecDeque<T>,
    stats: LinkStats,
}

impl<T: Clone> LossyLink<T> {
    /// Creates an empty link.
    #[must_use]
    pub fn new(conditions: NetworkConditions, seed: u64) -> Self {
        Self {
            conditions,
            rng: StdRng::seed_from_u64(seed),
            in_flight: VecDeque::new(),
            stats: LinkStats::default(),
        }
    }

    /// Conditions in effect.
    #[inline]
    #[must_use]
    pub const fn conditions(&self) -> NetworkConditions {
        self.conditions
    }

    /// Changes the conditions for later deliveries.
    pub fn set_conditions(&mut self, conditions: NetworkConditions) {
        self.conditions = conditions;
    }

    /// Puts a message on the link.
    pub fn send(&mut self, message: T) {
        self.stats.sent += 1;
        self.in_flight.push_back(message);
    }

    /// Messages waiting for the next delivery.
    #[inline]
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Drains the link, applying loss, duplication and reordering.
    pub fn deliver(&mut self) -> Vec<T> {
        let conditions = self.conditions;
        let mut out = Vec::with_capacity(self.in_flight.len());

        while let Some(message) = self.in_flight.pop_front() {
            if NetworkConditions::roll(&mut self.rng, conditions.loss_percent) {
                self.stats.dropped += 1;
                continue;
            }
            if NetworkConditions::roll(&mut self.rng, conditions.duplicate_percent) {
                self.stats.duplicated += 1;
                out.push(message.clone());
            }
            out.push(message);
        }

        for i in 0..out.len() {
            if NetworkConditions::roll(&mut self.rng, conditions.reorder_percent) {
                let j = self.rng.gen_range(i..out.len());
                if j != i {
                    out.swap(i, j);
                    self.stats.reordered += 1;
                }
            }
        }

        self.stats.delivered += out.len() as u64;
        out
    }

    /// Returns statistics.
    #[must_use]
    pub const fn stats(&self) -> &LinkStats {
        &self.stats
    }
}

/// Region sink that refuses a seeded share of sends and forwards the rest.
pub struct FlakySink {
    inner: Arc<dyn RegionSink>,
    fail_percent: u8,
    rng: Mutex<StdRng>,
    failed: AtomicU64,
    passed: AtomicU64,
}

impl FlakySink {
    /// Wraps `inner`, failing about `fail_percent` of sends.
    #[must_use]
    pub fn new(inner: Arc<dyn RegionSink>, fail_percent: u8, seed: u64) -> Self {
        Self {
            inner,
            fail_percent: fail_percent.min(100),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            failed: AtomicU64::new(0),
            passed: AtomicU64::new(0),
        }
    }

    /// Sends refused so far.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Sends forwarded so far.
    #[must_use]
    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }
}

impl RegionSink for FlakySink {
    fn send_region(&self, to: ConnectionId, push: &RegionPush) -> Result<(), SendError> {
        if NetworkConditions::roll(&mut self.rng.lock(), self.fail_percent) {
            self.failed.fetch_add(1, Ordering::Relaxed);
            return Err(SendError::QueueFull);
        }
        let result = self.inner.send_region(to, push);
        if result.is_ok() {
            self.passed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

impl std::fmt::Debug for FlakySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakySink")
            .field("fail_percent", &self.fail_percent)
            .field("failed", &self.failed())
            .field("passed", &self.passed())
            .finish_non_exhaustive()
    }
}

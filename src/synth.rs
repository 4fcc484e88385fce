//! # Synthetic Telemetry Module
//!
//! Generates a believable tracker packet stream without real hardware.
//!
//! This module handles:
//! - A fixed round-robin schedule of demo nodes plus one no-fix sentinel
//! - Bounded random-walk positions around a base coordinate
//! - Synthesized RSSI/SNR values (per-tick base plus jitter)
//! - Start/stop of the demo stream feeding the same packet interface as
//!   the serial transport

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::telemetry::packet::{now_ms, FixStatus, Position, Signal, TelemetryPacket};

/// Milliseconds between node slots
pub const TICK_INTERVAL_MS: u64 = 1000;

/// Demo node identifiers that carry positions
const DEMO_NODE_IDS: &[&str] = &["1", "2", "3"];

/// Sentinel node that emits radio-only heartbeats without a GPS fix
const SENTINEL_NODE_ID: &str = "4";

/// Base coordinate the demo nodes wander around
const BASE_LAT: f64 = 40.7128;
const BASE_LON: f64 = -74.0060;

/// Per-tick walk step range in degrees (uniform, each axis independent)
const STEP_RANGE_DEG: f64 = 0.00025;

/// First-sighting seed offset range in degrees
const SEED_RANGE_DEG: f64 = 0.002;

/// Maximum wander radius from the base coordinate in degrees
const MAX_RADIUS_DEG: f64 = 0.005;

/// RSSI synthesis ranges in dBm (base + jitter)
const RSSI_BASE_RANGE: std::ops::RangeInclusive<i32> = -100..=-70;
const RSSI_JITTER_RANGE: std::ops::RangeInclusive<i32> = -5..=5;

/// SNR synthesis ranges in dB (base + jitter)
const SNR_BASE_RANGE: std::ops::RangeInclusive<i32> = -5..=10;
const SNR_JITTER_RANGE: std::ops::RangeInclusive<i32> = -2..=2;

/// Satellites-in-view range for positioned packets
const SATS_RANGE: std::ops::RangeInclusive<u32> = 4..=12;

/// Deterministic-cadence synthetic packet source
///
/// Pure function of elapsed ticks: each call to [`next_packet`](Self::next_packet)
/// advances one slot of the round-robin schedule and returns that node's
/// packet. No channel dependency; the async wrapper lives in
/// [`SyntheticSource`].
pub struct SyntheticGenerator {
    rng: StdRng,
    slot: usize,
    /// Offsets from the base coordinate, per node
    offsets: HashMap<&'static str, (f64, f64)>,
}

impl SyntheticGenerator {
    /// Create a generator with an OS-seeded RNG
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            slot: 0,
            offsets: HashMap::new(),
        }
    }

    /// Create a generator with a fixed seed, for reproducible streams
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            slot: 0,
            offsets: HashMap::new(),
        }
    }

    /// Reset schedule position and per-node position memory
    ///
    /// The RNG state is left alone; determinism across resets comes from
    /// constructing with the same seed.
    pub fn reset(&mut self) {
        self.slot = 0;
        self.offsets.clear();
    }

    /// Node ids in schedule order (real nodes first, sentinel last)
    pub fn schedule() -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = DEMO_NODE_IDS.to_vec();
        ids.push(SENTINEL_NODE_ID);
        ids
    }

    /// Produce the packet for the current slot and advance the schedule
    pub fn next_packet(&mut self) -> TelemetryPacket {
        let schedule = Self::schedule();
        let node_id = schedule[self.slot % schedule.len()];
        self.slot += 1;

        if node_id == SENTINEL_NODE_ID {
            self.sentinel_packet()
        } else {
            self.node_packet(node_id)
        }
    }

    /// Radio-only heartbeat: signal metrics present, no position
    fn sentinel_packet(&mut self) -> TelemetryPacket {
        let mut pkt = TelemetryPacket::new(SENTINEL_NODE_ID);
        pkt.signal = Some(self.synth_signal());
        pkt.fix_status = Some(FixStatus::NoFix);
        pkt
    }

    fn node_packet(&mut self, node_id: &'static str) -> TelemetryPacket {
        let (dx, dy) = self.advance_offset(node_id);

        let mut pkt = TelemetryPacket::new(node_id);
        pkt.position = Some(Position {
            lat: BASE_LAT + dy,
            lon: BASE_LON + dx,
        });
        pkt.signal = Some(self.synth_signal());
        pkt.fix_status = Some(FixStatus::Fix);
        pkt.satellites = Some(self.rng.gen_range(SATS_RANGE));
        pkt
    }

    /// Advance one bounded random-walk step for a node
    ///
    /// First sighting seeds with a larger uniform offset; afterwards each tick
    /// perturbs both axes independently and, when the result leaves the
    /// maximum-radius disc, rescales it radially back onto the boundary circle
    /// (clamp-to-disc, not reflect).
    fn advance_offset(&mut self, node_id: &'static str) -> (f64, f64) {
        let offset = match self.offsets.get(node_id) {
            None => (
                self.rng.gen_range(-SEED_RANGE_DEG..=SEED_RANGE_DEG),
                self.rng.gen_range(-SEED_RANGE_DEG..=SEED_RANGE_DEG),
            ),
            Some(&(dx, dy)) => {
                let mut dx = dx + self.rng.gen_range(-STEP_RANGE_DEG..=STEP_RANGE_DEG);
                let mut dy = dy + self.rng.gen_range(-STEP_RANGE_DEG..=STEP_RANGE_DEG);

                let radius = (dx * dx + dy * dy).sqrt();
                if radius > MAX_RADIUS_DEG {
                    let scale = MAX_RADIUS_DEG / radius;
                    dx *= scale;
                    dy *= scale;
                }
                (dx, dy)
            }
        };

        self.offsets.insert(node_id, offset);
        offset
    }

    fn synth_signal(&mut self) -> Signal {
        let rssi = self.rng.gen_range(RSSI_BASE_RANGE) + self.rng.gen_range(RSSI_JITTER_RANGE);
        let snr = self.rng.gen_range(SNR_BASE_RANGE) + self.rng.gen_range(SNR_JITTER_RANGE);
        Signal { rssi, snr }
    }
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Async demo stream driving a [`SyntheticGenerator`] on a fixed tick
///
/// Feeds the same broadcast packet interface the serial transport exposes, so
/// the aggregator cannot tell demo mode from real hardware.
pub struct SyntheticSource {
    packet_tx: broadcast::Sender<TelemetryPacket>,
    task: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    /// Create a stopped source
    pub fn new() -> Self {
        let (packet_tx, _) = broadcast::channel(64);
        Self {
            packet_tx,
            task: None,
        }
    }

    /// Subscribe to the demo packet stream
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryPacket> {
        self.packet_tx.subscribe()
    }

    /// Start the demo stream
    ///
    /// Resets schedule position and per-node position memory, emits one packet
    /// immediately, then one packet per node slot per tick until
    /// [`stop`](Self::stop). A second `start` replaces the running stream.
    pub fn start(&mut self) {
        self.stop();

        let packet_tx = self.packet_tx.clone();
        let task = tokio::spawn(async move {
            let mut generator = SyntheticGenerator::new();
            generator.reset();

            // First tick completes immediately, so the first packet is
            // emitted without waiting a full interval.
            let mut ticker = interval(Duration::from_millis(TICK_INTERVAL_MS));

            loop {
                ticker.tick().await;
                let mut packet = generator.next_packet();
                packet.timestamp_ms = now_ms();
                debug!("Synthetic packet for node {}", packet.node_id);
                let _ = packet_tx.send(packet);
            }
        });

        info!("Synthetic telemetry stream started");
        self.task = Some(task);
    }

    /// Stop the demo stream
    ///
    /// Idempotent and safe to call when never started.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Synthetic telemetry stream stopped");
        }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop();
    }
}

//! # Telemetry Store
//!
//! Aggregates the unbounded packet stream into bounded, queryable state.
//!
//! This module handles:
//! - Per-node tracker records with bounded position trails
//! - A bounded, newest-first global packet log
//! - Stable display identity (color, first-seen order) per node
//! - A generation guard so in-flight ingestions cannot repopulate a cleared log

use std::collections::{HashMap, VecDeque};

use super::packet::TelemetryPacket;

/// Maximum trail points retained per node (oldest evicted first)
pub const TRAIL_CAPACITY: usize = 200;

/// Maximum packets retained in the global log (oldest evicted first)
pub const PACKET_LOG_CAPACITY: usize = 500;

/// Golden angle in degrees, used to derive hues past the fixed palette
const GOLDEN_ANGLE_DEG: f64 = 137.508;

/// Fixed display palette, indexed by first-seen order
const PALETTE: &[&str] = &[
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4",
    "#42d4f4", "#f032e6", "#bfef45", "#fabed4", "#469990",
];

/// One point of a node's position history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailPoint {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Packet timestamp in milliseconds
    pub timestamp_ms: i64,
}

/// Aggregated state for one node
///
/// Created on the first packet seen for a node id and never deleted during
/// a session; clearing the packet log does not touch trackers.
#[derive(Debug, Clone)]
pub struct Tracker {
    /// Stable node identity
    pub node_id: String,

    /// Bounded position history, oldest first
    pub trail: VecDeque<TrailPoint>,

    /// Most recently ingested packet, fixless packets included
    pub latest: Option<TelemetryPacket>,

    /// Display color as an RGB hex string, assigned once at first sighting
    pub display_color: String,

    /// First-seen rank, used for stable list ordering
    pub first_seen_order: usize,
}

/// Owned mutable store for all tracker and packet-log state
///
/// Single active writer: `ingest` is called once per received packet, in
/// arrival order, never concurrently for the same store.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    trackers: HashMap<String, Tracker>,
    /// Node ids in first-seen order
    node_order: Vec<String>,
    /// Global packet log, newest first
    packet_log: VecDeque<TelemetryPacket>,
    /// Bumped on every `clear_packets`; stale inserts are discarded
    log_generation: u64,
}

impl TelemetryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Current log generation
    ///
    /// Async callers capture this before handing a packet off and pass it to
    /// [`ingest_at`](Self::ingest_at) so that inserts racing a clear are
    /// dropped instead of resurrecting evicted packets.
    pub fn log_generation(&self) -> u64 {
        self.log_generation
    }

    /// Ingest a packet tagged with the current generation
    pub fn ingest(&mut self, packet: TelemetryPacket) {
        let generation = self.log_generation;
        self.ingest_at(packet, generation);
    }

    /// Ingest a packet tagged with an explicit log generation
    ///
    /// Tracker and trail state are always updated; the packet-log insert is
    /// skipped when `generation` is stale. Trails are deliberately not subject
    /// to the guard, clearing the log must not erase position history.
    pub fn ingest_at(&mut self, packet: TelemetryPacket, generation: u64) {
        let tracker = self.tracker_entry(&packet.node_id);

        if let Some(pos) = packet.position {
            tracker.trail.push_back(TrailPoint {
                lat: pos.lat,
                lon: pos.lon,
                timestamp_ms: packet.timestamp_ms,
            });
            while tracker.trail.len() > TRAIL_CAPACITY {
                tracker.trail.pop_front();
            }
        }

        // A fixless packet still proves the node is alive.
        tracker.latest = Some(packet.clone());

        if generation == self.log_generation {
            self.packet_log.push_front(packet);
            while self.packet_log.len() > PACKET_LOG_CAPACITY {
                self.packet_log.pop_back();
            }
        }
    }

    /// Empty the packet log and bump the generation
    ///
    /// Trackers and trails are untouched.
    pub fn clear_packets(&mut self) {
        self.packet_log.clear();
        self.log_generation += 1;
    }

    /// Global packet log, newest first
    pub fn packets(&self) -> &VecDeque<TelemetryPacket> {
        &self.packet_log
    }

    /// Look up one tracker by node id
    pub fn tracker(&self, node_id: &str) -> Option<&Tracker> {
        self.trackers.get(node_id)
    }

    /// All trackers in first-seen order
    pub fn trackers(&self) -> Vec<&Tracker> {
        self.node_order
            .iter()
            .filter_map(|id| self.trackers.get(id))
            .collect()
    }

    /// Number of known nodes
    pub fn node_count(&self) -> usize {
        self.node_order.len()
    }

    fn tracker_entry(&mut self, node_id: &str) -> &mut Tracker {
        let node_order = &mut self.node_order;
        self.trackers
            .entry(node_id.to_string())
            .or_insert_with(|| {
                let order = node_order.len();
                node_order.push(node_id.to_string());
                Tracker {
                    node_id: node_id.to_string(),
                    trail: VecDeque::new(),
                    latest: None,
                    display_color: display_color(order),
                    first_seen_order: order,
                }
            })
    }
}

/// Display color for a first-seen index
///
/// Indices within the fixed palette use it directly; beyond it, a hue is
/// derived by golden-angle rotation so arbitrarily many nodes stay visually
/// distinct and deterministic.
pub fn display_color(index: usize) -> String {
    if index < PALETTE.len() {
        return PALETTE[index].to_string();
    }
    let hue = (index as f64 * GOLDEN_ANGLE_DEG) % 360.0;
    hsl_to_hex(hue, 0.70, 0.50)
}

/// Convert HSL (h in degrees, s and l in 0..=1) to an RGB hex string
fn hsl_to_hex(h: f64, s: f64, l: f64) -> String {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_byte = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    format!("#{:02x}{:02x}{:02x}", to_byte(r1), to_byte(g1), to_byte(b1))
}

//! # Telemetry Packet Types
//!
//! Core data types for tracker node observations.

use std::time::{SystemTime, UNIX_EPOCH};

/// GPS fix quality classification reported by a tracker node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixStatus {
    /// No GPS solution
    NoFix,
    /// Standard autonomous fix
    Fix,
    /// Differential fix
    Diff,
    /// Estimated (dead reckoning) fix
    Est,
    /// Status token not recognized
    Unknown,
}

impl FixStatus {
    /// Short uppercase label as used on the wire and in exports
    pub fn as_str(&self) -> &'static str {
        match self {
            FixStatus::NoFix => "NOFIX",
            FixStatus::Fix => "FIX",
            FixStatus::Diff => "DIFF",
            FixStatus::Est => "EST",
            FixStatus::Unknown => "UNKNOWN",
        }
    }

    /// Parse an export/wire label back into a status
    ///
    /// Returns `None` for unrecognized or empty labels.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "NOFIX" => Some(FixStatus::NoFix),
            "FIX" => Some(FixStatus::Fix),
            "DIFF" => Some(FixStatus::Diff),
            "EST" => Some(FixStatus::Est),
            "UNKNOWN" => Some(FixStatus::Unknown),
            _ => None,
        }
    }
}

/// A GPS position
///
/// Latitude and longitude always travel together; a packet either has a
/// complete position or none at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
}

/// Radio signal quality metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    /// Receiver RSSI in dBm
    pub rssi: i32,
    /// Receiver SNR in dB
    pub snr: i32,
}

/// One observation from one tracker node
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPacket {
    /// Stable node identity (never empty)
    pub node_id: String,

    /// Position, absent when the node has no fix
    pub position: Option<Position>,

    /// Signal metrics, absent when the source line carried none
    pub signal: Option<Signal>,

    /// GPS fix quality, absent when the source line carried none
    pub fix_status: Option<FixStatus>,

    /// Satellites in view
    pub satellites: Option<u32>,

    /// Milliseconds since the Unix epoch; source of truth for ordering
    pub timestamp_ms: i64,

    /// Raw source line for diagnostics
    pub raw: Option<String>,
}

impl TelemetryPacket {
    /// Create a packet with only identity and the current timestamp
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            position: None,
            signal: None,
            fix_status: None,
            satellites: None,
            timestamp_ms: now_ms(),
            raw: None,
        }
    }
}

/// Current wall clock in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_status_labels_round_trip() {
        for status in [
            FixStatus::NoFix,
            FixStatus::Fix,
            FixStatus::Diff,
            FixStatus::Est,
            FixStatus::Unknown,
        ] {
            assert_eq!(FixStatus::from_label(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_fix_status_unrecognized_label() {
        assert_eq!(FixStatus::from_label(""), None);
        assert_eq!(FixStatus::from_label("3D"), None);
    }

    #[test]
    fn test_fix_status_label_case_insensitive() {
        assert_eq!(FixStatus::from_label("nofix"), Some(FixStatus::NoFix));
        assert_eq!(FixStatus::from_label(" Fix "), Some(FixStatus::Fix));
    }

    #[test]
    fn test_new_packet_has_identity_and_timestamp() {
        let pkt = TelemetryPacket::new("7");
        assert_eq!(pkt.node_id, "7");
        assert!(pkt.position.is_none());
        assert!(pkt.timestamp_ms > 0);
    }
}

//! # Telemetry Line Parser
//!
//! Extracts telemetry fields from free-form tracker log lines.
//!
//! Tracker firmware prints human-oriented lines rather than a framed binary
//! protocol, so fields are recovered with tolerant regex matching. Lines that
//! do not carry a node identity are dropped here; the aggregator never sees a
//! packet without one.

use lazy_static::lazy_static;
use regex::Regex;

use super::packet::{FixStatus, Position, Signal, TelemetryPacket};

lazy_static! {
    static ref RE_NODE: Regex = Regex::new(r"(?i)node\s*id[:=]?\s*(\d+)").unwrap();
    static ref RE_LAT: Regex = Regex::new(r"(?i)lat(?:itude)?[:=]?\s*(-?\d+\.\d+)").unwrap();
    static ref RE_LON: Regex = Regex::new(r"(?i)lon(?:gitude)?[:=]?\s*(-?\d+\.\d+)").unwrap();
    static ref RE_RSSI: Regex = Regex::new(r"(?i)rssi[:=]?\s*(-?\d+)").unwrap();
    static ref RE_SNR: Regex = Regex::new(r"(?i)snr[:=]?\s*(-?\d+)").unwrap();
    static ref RE_SATS: Regex = Regex::new(r"(?i)sats?(?:ellites)?[:=]?\s*(\d+)").unwrap();
    static ref RE_FIX: Regex = Regex::new(r"(?i)fix\s*status[:=]?\s*([A-Z]+)").unwrap();
    static ref RE_NOFIX: Regex = Regex::new(r"(?i)no\s*fix").unwrap();
}

/// Parse one device log line into a telemetry packet
///
/// # Arguments
///
/// * `line` - Raw line as received from the serial port (trimmed)
///
/// # Returns
///
/// * `Some(TelemetryPacket)` when the line carries a node identity
/// * `None` for lines without one (boot chatter, shell echo, partial lines)
pub fn parse_line(line: &str) -> Option<TelemetryPacket> {
    let node_id = RE_NODE
        .captures(line)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())?;

    let mut pkt = TelemetryPacket::new(node_id);
    pkt.raw = Some(line.to_string());

    // Latitude and longitude only count as a position when both are present.
    let lat = RE_LAT
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    let lon = RE_LON
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    if let (Some(lat), Some(lon)) = (lat, lon) {
        pkt.position = Some(Position { lat, lon });
    }

    let rssi = RE_RSSI
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok());
    let snr = RE_SNR
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok());
    if let (Some(rssi), Some(snr)) = (rssi, snr) {
        pkt.signal = Some(Signal { rssi, snr });
    }

    pkt.satellites = RE_SATS
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());

    // Explicit status token first, else a "NO FIX" substring anywhere.
    if let Some(cap) = RE_FIX.captures(line) {
        let token = cap.get(1).map(|m| m.as_str().to_uppercase());
        pkt.fix_status = Some(match token.as_deref() {
            Some(s) if s.contains("NO") => FixStatus::NoFix,
            Some(s) if s.contains("DIFF") => FixStatus::Diff,
            Some(s) if s.contains("EST") => FixStatus::Est,
            Some(s) if s.contains("FIX") => FixStatus::Fix,
            _ => FixStatus::Unknown,
        });
    } else if RE_NOFIX.is_match(line) {
        pkt.fix_status = Some(FixStatus::NoFix);
    }

    Some(pkt)
}

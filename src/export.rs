//! # Packet Export Module
//!
//! Writes the packet log to a row-per-packet CSV artifact and reads it back.
//!
//! Missing fields serialize as empty columns, not placeholder text, and the
//! timestamp column is the raw millisecond integer so re-parsing an export is
//! lossless for identity and ordering.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GroundlinkError, Result};
use crate::telemetry::{FixStatus, TelemetryPacket};

/// One CSV row of the export artifact
///
/// Column order is fixed: `node_id, lat, lon, rssi, snr, fix_status, sats, ts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub node_id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub rssi: Option<i32>,
    pub snr: Option<i32>,
    pub fix_status: Option<String>,
    pub sats: Option<u32>,
    /// Milliseconds since the Unix epoch
    pub ts: i64,
}

impl From<&TelemetryPacket> for ExportRow {
    fn from(pkt: &TelemetryPacket) -> Self {
        Self {
            node_id: pkt.node_id.clone(),
            lat: pkt.position.map(|p| p.lat),
            lon: pkt.position.map(|p| p.lon),
            rssi: pkt.signal.map(|s| s.rssi),
            snr: pkt.signal.map(|s| s.snr),
            fix_status: pkt.fix_status.map(|f| f.as_str().to_string()),
            sats: pkt.satellites,
            ts: pkt.timestamp_ms,
        }
    }
}

impl ExportRow {
    /// Rebuild a packet from an export row
    pub fn into_packet(self) -> TelemetryPacket {
        TelemetryPacket {
            node_id: self.node_id,
            position: match (self.lat, self.lon) {
                (Some(lat), Some(lon)) => Some(crate::telemetry::Position { lat, lon }),
                _ => None,
            },
            signal: match (self.rssi, self.snr) {
                (Some(rssi), Some(snr)) => Some(crate::telemetry::Signal { rssi, snr }),
                _ => None,
            },
            fix_status: self.fix_status.as_deref().and_then(FixStatus::from_label),
            satellites: self.sats,
            timestamp_ms: self.ts,
            raw: None,
        }
    }
}

/// Default export path: `packets-<UTC timestamp>.csv` under the given directory
pub fn default_export_path(dir: &Path) -> PathBuf {
    dir.join(format!("packets-{}.csv", Utc::now().format("%Y%m%dT%H%M%S")))
}

/// Write packets to a CSV file
///
/// # Arguments
///
/// * `path` - Target file path (created or truncated)
/// * `packets` - Packets in log order (newest first, as the store keeps them)
///
/// # Errors
///
/// Returns error if there are no packets, or on any filesystem/CSV failure
pub fn export_packets<'a, I>(path: &Path, packets: I) -> Result<()>
where
    I: IntoIterator<Item = &'a TelemetryPacket>,
{
    let rows: Vec<ExportRow> = packets.into_iter().map(ExportRow::from).collect();
    if rows.is_empty() {
        return Err(GroundlinkError::Export("No packets to export".to_string()));
    }

    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for row in &rows {
        writer
            .serialize(row)
            .map_err(|e| GroundlinkError::Export(format!("Failed to write CSV row: {}", e)))?;
    }
    writer
        .flush()
        .map_err(|e| GroundlinkError::Export(format!("Failed to flush CSV: {}", e)))?;

    info!("Exported {} packets to {}", rows.len(), path.display());
    Ok(())
}

/// Read an export artifact back into rows
pub fn read_export(path: &Path) -> Result<Vec<ExportRow>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: ExportRow =
            record.map_err(|e| GroundlinkError::Export(format!("Failed to parse CSV: {}", e)))?;
        rows.push(row);
    }
    Ok(rows)
}

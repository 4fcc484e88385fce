//! # Serial Communication Module
//!
//! Handles serial communication with the tracker ground-station radio.
//!
//! This module handles:
//! - Listing candidate serial ports
//! - Opening a port at the tracker console baud rate
//! - Pumping received lines to subscribers (raw lines and parsed packets)
//! - Sending command lines to the device

pub mod channel;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::error::{GroundlinkError, Result};
use crate::telemetry::{parser, TelemetryPacket};
use channel::LineChannel;

/// Tracker console baud rate
pub const CONSOLE_BAUD_RATE: u32 = 115_200;

/// Default device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC devices (most common for tracker boards)
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Broadcast buffer depth for line and packet streams
const EVENT_BUFFER: usize = 256;

/// List the serial ports visible on this machine
///
/// # Returns
///
/// * `Result<Vec<String>>` - Port names, or error if enumeration fails
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| GroundlinkError::Serial(format!("Failed to list serial ports: {}", e)))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Serial link to a tracker ground-station device
///
/// Owns the port, runs a background read pump that broadcasts received lines
/// and parsed telemetry packets, and exposes the write side for command lines.
pub struct SerialLink {
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
    /// Write half of the port, serialized across senders
    writer: Mutex<WriteHalf<SerialStream>>,
    line_tx: broadcast::Sender<String>,
    packet_tx: broadcast::Sender<TelemetryPacket>,
    conn_tx: Arc<watch::Sender<bool>>,
    reader_task: JoinHandle<()>,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SerialLink {
    /// Open a link to the tracker device
    ///
    /// Auto-detects the device by trying common paths at the console baud rate.
    ///
    /// # Errors
    ///
    /// Returns error if no device is found or the port cannot be opened
    pub fn open() -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, CONSOLE_BAUD_RATE)
    }

    /// Open a link trying the given device paths in order
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyACM0"])
    /// * `baud_rate` - Console baud rate
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Successfully opened tracker device at {}", path);
                    return Ok(Self::from_stream(port, path));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(GroundlinkError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with console settings (8N1, no flow control)
    fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| GroundlinkError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Wrap an opened stream and start the read pump
    fn from_stream(stream: SerialStream, path: &str) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let (line_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (packet_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (conn_tx, _) = watch::channel(true);
        let conn_tx = Arc::new(conn_tx);

        let reader_task = tokio::spawn(read_pump(
            read_half,
            line_tx.clone(),
            packet_tx.clone(),
            Arc::clone(&conn_tx),
        ));

        Self {
            device_path: path.to_string(),
            writer: Mutex::new(write_half),
            line_tx,
            packet_tx,
            conn_tx,
            reader_task,
        }
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.reader_task.abort();
        let _ = self.conn_tx.send(false);
    }
}

#[async_trait]
impl LineChannel for SerialLink {
    async fn send_line(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;

        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| GroundlinkError::Channel(format!("Failed to write line: {}", e)))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| GroundlinkError::Channel(format!("Failed to write line: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| GroundlinkError::Channel(format!("Failed to flush serial port: {}", e)))?;

        debug!("Sent line ({} bytes)", line.len());
        Ok(())
    }

    fn subscribe_lines(&self) -> broadcast::Receiver<String> {
        self.line_tx.subscribe()
    }

    fn subscribe_packets(&self) -> broadcast::Receiver<TelemetryPacket> {
        self.packet_tx.subscribe()
    }

    fn connection_watch(&self) -> watch::Receiver<bool> {
        self.conn_tx.subscribe()
    }
}

/// Read lines from the port until EOF or error, broadcasting each one
///
/// Raw lines go to line subscribers as-is (carriage returns stripped); lines
/// matching the telemetry schema additionally go to packet subscribers. On
/// exit the connection watch flips to disconnected.
async fn read_pump(
    read_half: ReadHalf<SerialStream>,
    line_tx: broadcast::Sender<String>,
    packet_tx: broadcast::Sender<TelemetryPacket>,
    conn_tx: Arc<watch::Sender<bool>>,
) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end_matches('\r').to_string();
                debug!("Received line: {}", line);

                if let Some(packet) = parser::parse_line(&line) {
                    let _ = packet_tx.send(packet);
                }
                let _ = line_tx.send(line);
            }
            Ok(None) => {
                info!("Serial port closed (EOF)");
                break;
            }
            Err(e) => {
                warn!("Serial read error: {}", e);
                break;
            }
        }
    }

    let _ = conn_tx.send(false);
}

//! # Groundlink
//!
//! Ground-station client for LoRa GPS tracker nodes.
//!
//! This application ingests telemetry lines from a tracker base-station
//! radio over serial, aggregates them into per-node state, and can probe
//! and update the device configuration over the same channel. With no
//! hardware attached it runs a synthetic demo stream instead.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Duration;
use tracing::{info, warn};
use tracing_subscriber;

mod config;
mod error;
mod export;
mod negotiator;
mod serial;
mod synth;
mod telemetry;

use config::Config;
use negotiator::ConfigNegotiator;
use serial::channel::LineChannel;
use serial::SerialLink;
use synth::SyntheticSource;
use telemetry::TelemetryStore;

/// Number of ingested packets between status log messages
const LOG_INTERVAL_PACKETS: u64 = 50;

/// Main entry point for Groundlink
///
/// Initializes logging, loads the optional TOML configuration (first CLI
/// argument), then runs either the serial session or the synthetic demo
/// session until Ctrl+C or disconnect. On shutdown the packet log is
/// exported to a CSV artifact.
///
/// # Errors
///
/// Returns error if:
/// - The configuration file cannot be loaded
/// - The serial port cannot be opened (serial mode)
/// - The shutdown export fails
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Groundlink v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    let mut store = TelemetryStore::new();

    if config.demo.enabled {
        run_demo_session(&mut store).await;
    } else {
        run_serial_session(&config, &mut store).await?;
    }

    if !store.packets().is_empty() {
        let path = export::default_export_path(Path::new(&config.export.output_dir));
        export::export_packets(&path, store.packets().iter())?;
        info!("Packet log exported to {}", path.display());
    }

    info!(
        "Session ended: {} nodes tracked, {} packets logged",
        store.node_count(),
        store.packets().len()
    );
    Ok(())
}

/// Run the synthetic demo stream until Ctrl+C
async fn run_demo_session(store: &mut TelemetryStore) {
    let mut source = SyntheticSource::new();
    let mut packets = source.subscribe();
    source.start();
    info!("Demo mode: synthetic telemetry stream running");
    info!("Press Ctrl+C to exit");

    let mut packet_count: u64 = 0;

    loop {
        tokio::select! {
            received = packets.recv() => match received {
                Ok(packet) => {
                    let generation = store.log_generation();
                    store.ingest_at(packet, generation);
                    packet_count += 1;

                    if packet_count % LOG_INTERVAL_PACKETS == 0 {
                        info!(
                            "Ingested {} packets from {} nodes",
                            packet_count,
                            store.node_count()
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Packet stream lagged, {} packets dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    source.stop();
}

/// Run a live serial session until Ctrl+C or disconnect
///
/// Opens the configured port, probes the device's configuration support
/// once at startup, then ingests telemetry packets as they arrive.
async fn run_serial_session(config: &Config, store: &mut TelemetryStore) -> Result<()> {
    match serial::list_ports() {
        Ok(ports) => info!("Serial ports visible: {:?}", ports),
        Err(e) => warn!("Could not list serial ports: {}", e),
    }

    let link = Arc::new(SerialLink::open_with_paths(
        &[config.serial.port.as_str()],
        config.serial.baud_rate,
    )?);
    info!("Tracker device opened at {}", link.device_path());

    let mut packets = link.subscribe_packets();
    let mut connection = link.connection_watch();

    let channel: Arc<dyn LineChannel> = link.clone();
    let mut negotiator = ConfigNegotiator::with_windows(
        channel,
        Duration::from_millis(config.negotiation.probe_window_ms),
        Duration::from_millis(config.negotiation.settle_window_ms),
    );

    let availability = negotiator.probe().await;
    info!("Device configuration support: {:?}", availability);

    info!("Press Ctrl+C to exit");
    let mut packet_count: u64 = 0;

    loop {
        tokio::select! {
            received = packets.recv() => match received {
                Ok(packet) => {
                    let generation = store.log_generation();
                    store.ingest_at(packet, generation);
                    packet_count += 1;

                    if packet_count % LOG_INTERVAL_PACKETS == 0 {
                        info!(
                            "Ingested {} packets from {} nodes",
                            packet_count,
                            store.node_count()
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Packet stream lagged, {} packets dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            },

            changed = connection.changed() => {
                if changed.is_err() || !*connection.borrow() {
                    warn!("Tracker device disconnected");
                    negotiator.handle_disconnect();
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_interval_constant() {
        // One status line roughly every 50 synthetic slots (~50 seconds)
        assert_eq!(LOG_INTERVAL_PACKETS, 50);
    }

    #[test]
    fn test_default_config_runs_serial_mode() {
        let config = Config::default();
        assert!(!config.demo.enabled, "serial mode is the default");
    }
}

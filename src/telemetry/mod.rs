//! # Telemetry Module
//!
//! Tracker telemetry ingestion and aggregation.
//!
//! This module handles:
//! - Telemetry packet and fix-status types
//! - Parsing device log lines into packets
//! - Aggregating packets into per-node trackers and a bounded packet log

pub mod packet;
pub mod parser;
pub mod store;

pub use packet::{FixStatus, Position, Signal, TelemetryPacket};
pub use store::{TelemetryStore, Tracker, TrailPoint, PACKET_LOG_CAPACITY, TRAIL_CAPACITY};

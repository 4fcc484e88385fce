//! # Groundlink Library
//!
//! Ground-station client for LoRa GPS tracker nodes.
//!
//! This library provides the core functionality for ingesting tracker
//! telemetry over a line-oriented serial transport, aggregating it into
//! bounded per-node state, and negotiating device configuration over the
//! same channel.

pub mod config;
pub mod error;
pub mod export;
pub mod negotiator;
pub mod serial;
pub mod synth;
pub mod telemetry;

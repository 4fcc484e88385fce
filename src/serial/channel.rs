//! Trait abstraction for the line-oriented device channel to enable testing

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::error::Result;
use crate::telemetry::TelemetryPacket;

/// Trait for the line-oriented channel to a tracker ground-station device
///
/// Subscriptions are `tokio::sync::broadcast` receivers; dropping a receiver
/// is the idempotent unsubscribe, so every exit path of a scoped operation
/// releases its subscription automatically.
#[async_trait]
pub trait LineChannel: Send + Sync {
    /// Send one text line to the device (newline appended by the channel)
    async fn send_line(&self, line: &str) -> Result<()>;

    /// Subscribe to raw lines received from the device
    fn subscribe_lines(&self) -> broadcast::Receiver<String>;

    /// Subscribe to parsed telemetry packets
    ///
    /// Lines not matching the packet schema are dropped before this stream.
    fn subscribe_packets(&self) -> broadcast::Receiver<TelemetryPacket>;

    /// Watch the connection state (`true` while the link is up)
    fn connection_watch(&self) -> watch::Receiver<bool>;
}

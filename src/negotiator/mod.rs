//! # Configuration Negotiator Module
//!
//! Timed request/response protocol for device configuration over an unframed
//! line channel.
//!
//! This module handles:
//! - Probing which configuration keys a connected device exposes
//! - Applying key/value updates one at a time with logged outcomes
//! - The activity log recording SENT/RECEIVED/ERROR/INFO entries
//!
//! The device's serial console has no framing and no correlation ids, so both
//! phases rely on timing: send a command, collect every line for a fixed
//! window, then classify what was heard. Send steps are strictly sequential by
//! design; overlapping commands would make replies unattributable.

pub mod log;

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::serial::channel::LineChannel;
use self::log::{ActivityLog, LogKind};

/// Discovery command sent at probe start
pub const PROBE_COMMAND: &str = "config";

/// Probe observation window in milliseconds
pub const PROBE_WINDOW_MS: u64 = 2000;

/// Per-field settle window in milliseconds
pub const SETTLE_WINDOW_MS: u64 = 1000;

lazy_static! {
    /// CSI escape sequences emitted by device shells (colors, cursor moves)
    static ref RE_ANSI: Regex = Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").unwrap();
}

/// Configuration keys a tracker device may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    /// Radio frequency in MHz
    Freq,
    /// Node identity
    NodeId,
    /// Operator callsign
    Callsign,
}

impl ConfigKey {
    /// All known keys, in stable display order
    pub const ALL: [ConfigKey; 3] = [ConfigKey::Freq, ConfigKey::NodeId, ConfigKey::Callsign];

    /// Key name as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::Freq => "freq",
            ConfigKey::NodeId => "node_id",
            ConfigKey::Callsign => "callsign",
        }
    }
}

/// Which configuration keys the probed device exposes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigAvailability {
    pub freq: bool,
    pub node_id: bool,
    pub callsign: bool,
}

impl ConfigAvailability {
    /// Whether a specific key was marked available by the probe
    pub fn is_available(&self, key: ConfigKey) -> bool {
        match key {
            ConfigKey::Freq => self.freq,
            ConfigKey::NodeId => self.node_id,
            ConfigKey::Callsign => self.callsign,
        }
    }

    /// Whether any key is available
    pub fn any(&self) -> bool {
        self.freq || self.node_id || self.callsign
    }
}

/// Probe phase of the negotiation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    /// No probe run yet, or state was reset by a disconnect
    Idle,
    /// Discovery command sent, observation window open
    Probing,
    /// Window elapsed and availability was classified
    Probed,
    /// Connection dropped mid-probe; no classification was performed
    Aborted,
}

/// Drives configuration discovery and updates over a line channel
///
/// All operations run on one logical task; suspension happens only at timed
/// waits and channel calls. Line subscriptions are broadcast receivers scoped
/// to one operation, so every exit path releases them on drop.
pub struct ConfigNegotiator {
    channel: Arc<dyn LineChannel>,
    phase: ProbePhase,
    availability: ConfigAvailability,
    log: ActivityLog,
    probe_window: Duration,
    settle_window: Duration,
}

impl ConfigNegotiator {
    /// Create a negotiator with the standard observation windows
    pub fn new(channel: Arc<dyn LineChannel>) -> Self {
        Self::with_windows(
            channel,
            Duration::from_millis(PROBE_WINDOW_MS),
            Duration::from_millis(SETTLE_WINDOW_MS),
        )
    }

    /// Create a negotiator with explicit windows
    pub fn with_windows(
        channel: Arc<dyn LineChannel>,
        probe_window: Duration,
        settle_window: Duration,
    ) -> Self {
        Self {
            channel,
            phase: ProbePhase::Idle,
            availability: ConfigAvailability::default(),
            log: ActivityLog::new(),
            probe_window,
            settle_window,
        }
    }

    /// Current probe phase
    pub fn phase(&self) -> ProbePhase {
        self.phase
    }

    /// Availability from the most recent completed probe
    pub fn availability(&self) -> ConfigAvailability {
        self.availability
    }

    /// Activity log entries
    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    /// Clear the activity log
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Whether the underlying channel reports an active connection
    pub fn connected(&self) -> bool {
        *self.channel.connection_watch().borrow()
    }

    /// React to a disconnect observed while no probe is in flight
    ///
    /// Resets the phase to `Idle` with availability cleared. A disconnect
    /// during a running probe is instead detected by [`probe`](Self::probe)
    /// itself after its window elapses.
    pub fn handle_disconnect(&mut self) {
        if self.phase != ProbePhase::Probing {
            self.phase = ProbePhase::Idle;
            self.availability = ConfigAvailability::default();
            info!("Device disconnected; configuration state reset");
        }
    }

    /// Probe which configuration keys the device exposes
    ///
    /// Sends the discovery command, collects every line for the probe window
    /// (control sequences stripped), then classifies availability by substring
    /// containment of each key name. A re-probe fully resets prior
    /// availability first. Calling while a probe is already running, or while
    /// disconnected, is a no-op.
    ///
    /// # Returns
    ///
    /// * `ConfigAvailability` - classification result; all-false when the
    ///   probe was aborted or nothing recognizable was heard
    pub async fn probe(&mut self) -> ConfigAvailability {
        if self.phase == ProbePhase::Probing {
            debug!("Probe already running; ignoring request");
            return self.availability;
        }
        if !self.connected() {
            debug!("Probe requested while disconnected; ignoring request");
            return self.availability;
        }

        self.phase = ProbePhase::Probing;
        self.availability = ConfigAvailability::default();
        info!("Probing device configuration support");

        let mut rx = self.channel.subscribe_lines();
        if let Err(e) = self.channel.send_line(PROBE_COMMAND).await {
            // Keep the window open regardless; the device may still be
            // printing output that identifies its settings.
            warn!("Probe send failed: {}", e);
            self.log.push(LogKind::Error, format!("Probe send failed: {}", e));
        }

        let lines = collect_window(&mut rx, self.probe_window).await;
        drop(rx);

        // The abort flag must be checked after the wait completes, not only
        // at wait start; the disconnect may have landed mid-window.
        if !self.connected() {
            self.phase = ProbePhase::Aborted;
            self.log.push(LogKind::Info, "Probe aborted: device disconnected");
            return self.availability;
        }

        let buffer = lines.join("\n");
        self.availability = ConfigAvailability {
            freq: buffer.contains(ConfigKey::Freq.as_str()),
            node_id: buffer.contains(ConfigKey::NodeId.as_str()),
            callsign: buffer.contains(ConfigKey::Callsign.as_str()),
        };
        self.phase = ProbePhase::Probed;

        if self.availability.any() {
            info!("Probe complete: {:?}", self.availability);
        } else {
            self.log
                .push(LogKind::Info, "Probe window elapsed with no recognized settings");
        }
        self.availability
    }

    /// Apply a batch of key/value updates, one field at a time
    ///
    /// Pairs whose key the probe did not mark available, or whose value is
    /// empty, are skipped. Each remaining pair is sent as
    /// `config <key> <value>` and its settle window fully elapses before the
    /// next pair starts. A failed send logs an `Error` entry and the batch
    /// continues; an in-flight disconnect likewise does not abort remaining
    /// pairs, each step completes and logs its outcome.
    ///
    /// An empty eligible set is a no-op, not an error.
    pub async fn send_values(&mut self, values: &[(ConfigKey, String)]) {
        let eligible: Vec<&(ConfigKey, String)> = values
            .iter()
            .filter(|(key, value)| {
                self.availability.is_available(*key) && !value.trim().is_empty()
            })
            .collect();

        if eligible.is_empty() {
            debug!("No eligible configuration fields to send");
            return;
        }

        for (key, value) in eligible {
            let command = format!("config {} {}", key.as_str(), value);
            self.log.push(LogKind::Sent, command.clone());

            let mut rx = self.channel.subscribe_lines();
            let send_result = self.channel.send_line(&command).await;

            // The settle window elapses even when the send failed, keeping
            // step pacing uniform across the batch.
            let lines = collect_window(&mut rx, self.settle_window).await;
            drop(rx);

            match send_result {
                Ok(()) => {
                    let reply = lines
                        .iter()
                        .rev()
                        .map(|line| line.trim())
                        .find(|line| !line.is_empty() && !line.starts_with('['))
                        .unwrap_or("OK")
                        .to_string();
                    self.log.push(LogKind::Received, reply);
                }
                Err(e) => {
                    warn!("Send failed for {}: {}", key.as_str(), e);
                    self.log.push(LogKind::Error, e.to_string());
                }
            }
        }
    }
}

/// Collect control-stripped lines from a subscription until the window elapses
async fn collect_window(
    rx: &mut broadcast::Receiver<String>,
    window: Duration,
) -> Vec<String> {
    let mut lines = Vec::new();
    let deadline = sleep(window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            received = rx.recv() => match received {
                Ok(line) => lines.push(strip_control(&line)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Line subscription lagged, {} lines dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    // Sender gone; nothing more will arrive, but the window
                    // still paces the caller.
                    deadline.as_mut().await;
                    break;
                }
            },
        }
    }

    lines
}

/// Strip terminal escape sequences and stray control characters from a line
pub fn strip_control(line: &str) -> String {
    let stripped = RE_ANSI.replace_all(line, "");
    stripped
        .chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::channel::mocks::MockChannel;
    use super::log::ConfigLogEntry;

    fn negotiator(mock: &MockChannel) -> ConfigNegotiator {
        ConfigNegotiator::with_windows(
            Arc::new(mock.clone()),
            Duration::from_millis(PROBE_WINDOW_MS),
            Duration::from_millis(SETTLE_WINDOW_MS),
        )
    }

    fn texts(entries: &[ConfigLogEntry]) -> Vec<(LogKind, &str)> {
        entries.iter().map(|e| (e.kind, e.text.as_str())).collect()
    }

    #[test]
    fn test_strip_control_removes_csi_sequences() {
        assert_eq!(strip_control("\x1b[32mfreq=903.0\x1b[0m"), "freq=903.0");
        assert_eq!(strip_control("plain text"), "plain text");
        assert_eq!(strip_control("tab\tkept\x07bell dropped"), "tab\tkeptbell dropped");
    }

    #[test]
    fn test_config_key_wire_names() {
        assert_eq!(ConfigKey::Freq.as_str(), "freq");
        assert_eq!(ConfigKey::NodeId.as_str(), "node_id");
        assert_eq!(ConfigKey::Callsign.as_str(), "callsign");
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_classifies_by_substring() {
        let mock = MockChannel::new();
        mock.set_replies(&["uart:~$ config", "freq=903.0 node_id=3"]);
        let mut negotiator = negotiator(&mock);

        let availability = negotiator.probe().await;

        assert_eq!(mock.sent(), vec!["config"]);
        assert!(availability.freq);
        assert!(availability.node_id);
        assert!(!availability.callsign);
        assert_eq!(negotiator.phase(), ProbePhase::Probed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_silence_yields_all_false_and_info() {
        let mock = MockChannel::new();
        let mut negotiator = negotiator(&mock);

        let availability = negotiator.probe().await;

        assert!(!availability.any());
        assert_eq!(negotiator.phase(), ProbePhase::Probed);
        let entries = negotiator.log().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LogKind::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_hears_unprompted_lines_mid_window() {
        let mock = MockChannel::new();
        let mut negotiator = negotiator(&mock);

        // The device prints its settings on its own, well after the
        // discovery command went out.
        let late_output = {
            let mock = mock.clone();
            async move {
                sleep(Duration::from_millis(1500)).await;
                mock.emit_line("\x1b[32mcallsign=N0CALL\x1b[0m");
            }
        };
        let (availability, _) = tokio::join!(negotiator.probe(), late_output);

        assert!(availability.callsign);
        assert!(!availability.freq);
        assert_eq!(negotiator.phase(), ProbePhase::Probed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_while_disconnected_is_noop() {
        let mock = MockChannel::new();
        mock.set_connected(false);
        let mut negotiator = negotiator(&mock);

        let availability = negotiator.probe().await;

        assert!(!availability.any());
        assert_eq!(negotiator.phase(), ProbePhase::Idle);
        assert!(mock.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_probe_aborts_classification() {
        let mock = MockChannel::new();
        mock.set_replies(&["freq=903.0 node_id=3 callsign=N0CALL"]);
        let mut negotiator = negotiator(&mock);

        let disconnect = {
            let mock = mock.clone();
            async move {
                sleep(Duration::from_millis(500)).await;
                mock.set_connected(false);
            }
        };
        let (availability, _) = tokio::join!(negotiator.probe(), disconnect);

        // Lines were heard before the disconnect, but no classification
        // happens on an aborted probe.
        assert!(!availability.any());
        assert_eq!(negotiator.phase(), ProbePhase::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reprobe_resets_previous_availability() {
        let mock = MockChannel::new();
        mock.set_replies(&["freq=903.0 callsign=N0CALL"]);
        let mut negotiator = negotiator(&mock);
        assert!(negotiator.probe().await.freq);

        // Device now reports nothing; stale availability must not survive.
        mock.set_replies(&[]);
        let availability = negotiator.probe().await;
        assert!(!availability.any());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_probed_resets_to_idle() {
        let mock = MockChannel::new();
        mock.set_replies(&["freq=903.0"]);
        let mut negotiator = negotiator(&mock);
        negotiator.probe().await;
        assert_eq!(negotiator.phase(), ProbePhase::Probed);

        mock.set_connected(false);
        negotiator.handle_disconnect();

        assert_eq!(negotiator.phase(), ProbePhase::Idle);
        assert!(!negotiator.availability().any());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_values_sequential_with_replies() {
        let mock = MockChannel::new();
        mock.set_replies(&["freq=903.0 node_id=2"]);
        let mut negotiator = negotiator(&mock);
        negotiator.probe().await;

        mock.set_replies(&["OK"]);
        negotiator
            .send_values(&[
                (ConfigKey::Freq, "903.5".to_string()),
                (ConfigKey::NodeId, "2".to_string()),
            ])
            .await;

        assert_eq!(
            texts(negotiator.log().entries()),
            vec![
                (LogKind::Sent, "config freq 903.5"),
                (LogKind::Received, "OK"),
                (LogKind::Sent, "config node_id 2"),
                (LogKind::Received, "OK"),
            ]
        );
        assert_eq!(
            mock.sent(),
            vec!["config", "config freq 903.5", "config node_id 2"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_values_skips_bracketed_log_lines() {
        let mock = MockChannel::new();
        mock.set_replies(&["freq=903.0"]);
        let mut negotiator = negotiator(&mock);
        negotiator.probe().await;

        mock.set_replies(&["[00:00:01] saving", "", "freq set to 903.5"]);
        negotiator
            .send_values(&[(ConfigKey::Freq, "903.5".to_string())])
            .await;

        let entries = negotiator.log().entries();
        assert_eq!(entries[1].kind, LogKind::Received);
        assert_eq!(entries[1].text, "freq set to 903.5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_values_placeholder_when_only_noise() {
        let mock = MockChannel::new();
        mock.set_replies(&["freq=903.0"]);
        let mut negotiator = negotiator(&mock);
        negotiator.probe().await;

        mock.set_replies(&["[shell] echo", "   "]);
        negotiator
            .send_values(&[(ConfigKey::Freq, "903.5".to_string())])
            .await;

        let entries = negotiator.log().entries();
        assert_eq!(entries[1].kind, LogKind::Received);
        assert_eq!(entries[1].text, "OK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_logs_error_and_continues() {
        let mock = MockChannel::new();
        mock.set_replies(&["freq=903.0 node_id=2"]);
        let mut negotiator = negotiator(&mock);
        negotiator.probe().await;

        mock.set_send_error("port unplugged");
        negotiator
            .send_values(&[
                (ConfigKey::Freq, "903.5".to_string()),
                (ConfigKey::NodeId, "2".to_string()),
            ])
            .await;

        let entries = negotiator.log().entries();
        let kinds: Vec<LogKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![LogKind::Sent, LogKind::Error, LogKind::Sent, LogKind::Error],
            "both fields attempted despite the first failure"
        );
        assert!(entries[1].text.contains("port unplugged"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_log_empties_entries_keeps_state() {
        let mock = MockChannel::new();
        mock.set_replies(&["freq=903.0"]);
        let mut negotiator = negotiator(&mock);
        negotiator.probe().await;

        mock.set_replies(&["OK"]);
        negotiator
            .send_values(&[(ConfigKey::Freq, "903.5".to_string())])
            .await;
        assert!(!negotiator.log().entries().is_empty());

        negotiator.clear_log();

        assert!(negotiator.log().entries().is_empty());
        // Probe state is untouched; only the log is cleared.
        assert_eq!(negotiator.phase(), ProbePhase::Probed);
        assert!(negotiator.availability().freq);

        // Entries after the clear keep counting from where they left off.
        negotiator
            .send_values(&[(ConfigKey::Freq, "904.0".to_string())])
            .await;
        let entries = negotiator.log().entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].sequence_id >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_values_filters_ineligible_pairs() {
        let mock = MockChannel::new();
        mock.set_replies(&["freq=903.0"]);
        let mut negotiator = negotiator(&mock);
        negotiator.probe().await;

        negotiator
            .send_values(&[
                // callsign was not probed as available
                (ConfigKey::Callsign, "N0CALL".to_string()),
                // empty value
                (ConfigKey::Freq, "   ".to_string()),
            ])
            .await;

        assert!(negotiator.log().entries().is_empty());
        assert_eq!(mock.sent(), vec!["config"], "only the probe was sent");
    }
}

//! # Configuration Activity Log
//!
//! Timestamped, append-only record of configuration traffic and outcomes.

use chrono::Local;

/// Classification of one activity log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// A command line sent to the device
    Sent,
    /// A reply line attributed to the previous command
    Received,
    /// A send or channel failure
    Error,
    /// Informational note (probe outcome, abort)
    Info,
}

/// One entry of the configuration activity log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLogEntry {
    /// Monotonic entry id within the session
    pub sequence_id: u64,
    /// Local wall-clock time as HH:MM:SS
    pub time: String,
    /// Entry text (command, reply, or note)
    pub text: String,
    /// Entry classification
    pub kind: LogKind,
}

/// Append-only activity log, clearable by the user
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: Vec<ConfigLogEntry>,
    next_sequence: u64,
}

impl ActivityLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry stamped with the current local time
    pub fn push(&mut self, kind: LogKind, text: impl Into<String>) {
        let entry = ConfigLogEntry {
            sequence_id: self.next_sequence,
            time: Local::now().format("%H:%M:%S").to_string(),
            text: text.into(),
            kind,
        };
        self.next_sequence += 1;
        self.entries.push(entry);
    }

    /// All entries in append order
    pub fn entries(&self) -> &[ConfigLogEntry] {
        &self.entries
    }

    /// Drop all entries
    ///
    /// Sequence ids keep counting so cleared and new entries never collide.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//! Human-readable progress reporting for a copy in flight.

use parking_lot::Mutex;
use tracing::info;

/// Prefix of every status message.
pub const STATUS_PREFIX: &str = "RemoteBootstrap: ";

/// Receives one message per phase transition of a copy.
pub trait StatusListener: Send + Sync {
    /// Called with a complete, prefixed message.
    fn status_message(&self, message: &str);
}

/// Forwards status messages to the log.
#[derive(Debug, Default)]
pub struct LoggingStatusListener;

impl StatusListener for LoggingStatusListener {
    fn status_message(&self, message: &str) {
        info!(status = message, "remote bootstrap status");
    }
}

/// Keeps every status message in memory.
#[derive(Debug, Default)]
pub struct RecordingStatusListener {
    messages: Mutex<Vec<String>>,
}

impl RecordingStatusListener {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Last message received.
    pub fn last(&self) -> Option<String> {
        self.messages.lock().last().cloned()
    }
}

impl StatusListener for RecordingStatusListener {
    fn status_message(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

/// Adds [`STATUS_PREFIX`] to `message`.
pub fn format_status(message: &str) -> String {
    format!("{}{}", STATUS_PREFIX, message)
}

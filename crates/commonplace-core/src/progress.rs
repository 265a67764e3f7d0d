//! Progress stream for long-running maintenance operations.
//!
//! Maintenance operations report human-readable, newline-terminated lines as
//! they go, so an operator sees how far execution got even when the
//! operation eventually fails. Every line is also logged through `tracing`.

use tokio::sync::mpsc;
use tracing::info;

/// Sender half of a progress stream.
///
/// Cloning is cheap. A `Progress` with no receiver only logs.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl Progress {
    /// Create a progress stream and its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A progress handle that only logs.
    pub fn log_only() -> Self {
        Self::default()
    }

    /// Report one progress line.
    pub fn emit(&self, message: impl Into<String>) {
        let mut message = message.into();
        info!(subsystem = "maintenance", op = "progress", "{}", message.trim_end());
        if !message.ends_with('\n') {
            message.push('\n');
        }
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is watching anymore.
            let _ = tx.send(message);
        }
    }
}

/// Drain every message currently buffered in a progress receiver.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

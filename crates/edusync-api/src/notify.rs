// User-visible notices, fanned out over a broadcast channel.
//
// This is the transport layer's hook into the UI's toast system: the HTTP
// client emits an error notice on any failure, the realtime channel emits
// notices for built-in push-message types and for terminal reconnect
// failure. The embedding app subscribes and renders; with zero subscribers
// every send is a silent no-op.

use tokio::sync::broadcast;

const NOTICE_CHANNEL_CAPACITY: usize = 256;

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-visible notice (the toast payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Cheaply cloneable fan-out handle for notices.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Info, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Error, message.into());
    }

    /// Get a new receiver for the notice stream. Slow consumers see
    /// [`broadcast::error::RecvError::Lagged`] rather than blocking senders.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    fn emit(&self, level: NoticeLevel, message: String) {
        // Send errors just mean nobody is listening right now.
        let _ = self.tx.send(Notice { level, message });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

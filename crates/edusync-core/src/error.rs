// ── Core error types ──
//
// User-facing errors from edusync-core. Consumers never see reqwest or
// tungstenite types directly -- the `From<edusync_api::Error>` impl
// translates transport-layer errors into these variants. `Clone` is
// required: a deduplicated fetch settles every attached waiter with the
// same error value.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    // ── Request errors ──────────────────────────────────────────────
    #[error("Request failed (HTTP {status}): {detail}")]
    RequestFailed { status: u16, detail: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Realtime errors ─────────────────────────────────────────────
    #[error("Realtime channel error: {message}")]
    Channel { message: String },

    // ── Data errors ─────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── Configuration errors ────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ─────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Returns `true` if this is a "not found" failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RequestFailed { status: 404, .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<edusync_api::Error> for SyncError {
    fn from(err: edusync_api::Error) -> Self {
        match err {
            edusync_api::Error::RequestFailed { status, detail, .. } => {
                SyncError::RequestFailed { status, detail }
            }
            edusync_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    SyncError::Timeout { timeout_secs: 0 }
                } else {
                    SyncError::Transport { message: e.to_string() }
                }
            }
            edusync_api::Error::Timeout { timeout_secs } => SyncError::Timeout { timeout_secs },
            edusync_api::Error::InvalidUrl(e) => SyncError::Config {
                message: format!("Invalid URL: {e}"),
            },
            edusync_api::Error::Tls(msg) => SyncError::Transport {
                message: format!("TLS error: {msg}"),
            },
            edusync_api::Error::Deserialization { message, body: _ } => {
                SyncError::Internal(format!("Deserialization error: {message}"))
            }
            edusync_api::Error::ChannelConnect(reason) => SyncError::Channel {
                message: format!("connection failed: {reason}"),
            },
            edusync_api::Error::ChannelClosed { code, reason } => SyncError::Channel {
                message: format!("closed (code {code}): {reason}"),
            },
            edusync_api::Error::Validation { message } => SyncError::Validation { message },
        }
    }
}

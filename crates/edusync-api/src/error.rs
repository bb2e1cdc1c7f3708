use thiserror::Error;

/// Top-level error type for the `edusync-api` crate.
///
/// Covers every failure mode across both transport surfaces: the HTTP
/// client and the realtime push channel. `edusync-core` maps these into
/// its own `SyncError` for consumers.
#[derive(Debug, Error)]
pub enum Error {
    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-2xx response, carrying the server's structured error body
    /// (`{ detail, type }`) when it could be parsed.
    #[error("Request failed (HTTP {status}): {detail}")]
    RequestFailed {
        status: u16,
        detail: String,
        /// The server's machine-readable error type, if present.
        kind: Option<String>,
    },

    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Realtime channel ────────────────────────────────────────────
    /// Channel connection failed (handshake, bad URL, refused).
    #[error("Channel connection failed: {0}")]
    ChannelConnect(String),

    /// Channel closed unexpectedly.
    #[error("Channel closed (code {code}): {reason}")]
    ChannelClosed { code: u16, reason: String },

    // ── Caller-supplied ─────────────────────────────────────────────
    /// Validation failure raised by callers, never by this crate itself.
    #[error("Validation failed: {message}")]
    Validation { message: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::ChannelConnect(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::RequestFailed { status: 404, .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }

    /// Returns `true` if the server rejected the request as unauthenticated.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::RequestFailed { status: 401, .. })
    }
}

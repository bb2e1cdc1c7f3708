//! Realtime push channel with automatic reconnection.
//!
//! Maintains one persistent WebSocket per authenticated session and fans
//! parsed [`PushMessage`]s out through a [`tokio::sync::broadcast`] channel.
//! Unexpected drops are retried on a fixed interval up to an attempt budget;
//! a deliberate [`disconnect`](RealtimeChannel::disconnect) never triggers
//! the retry path.
//!
//! # Example
//!
//! ```rust,ignore
//! use edusync_api::{ChannelConfig, Notifier, RealtimeChannel, SessionStore};
//! use url::Url;
//!
//! let config = ChannelConfig::new(Url::parse("wss://host/api/v1/ws")?);
//! let channel = RealtimeChannel::new(config, session, Notifier::new());
//! let mut rx = channel.subscribe();
//!
//! channel.connect();
//! while let Ok(message) = rx.recv().await {
//!     println!("{}", message.kind());
//! }
//! channel.disconnect();
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::notify::Notifier;
use crate::session::SessionStore;

// ── Channel capacities ───────────────────────────────────────────────

const PUSH_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Shown once when the reconnect budget is exhausted.
const RECONNECT_EXHAUSTED_NOTICE: &str =
    "Lost connection to the server. Realtime updates are paused until you reconnect.";

// ── PushMessage ──────────────────────────────────────────────────────

/// Payload of the built-in `notification` / `error` message types.
///
/// Uses `#[serde(flatten)]` to capture fields beyond `message`, so nothing
/// the server sends is silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticePayload {
    pub message: String,

    /// All remaining fields the server sends.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A typed push message.
///
/// Wire shape is `{ "type": string, "data": object }`. Recognized types map
/// to explicit variants checked at the deserialization boundary; everything
/// else lands in [`Other`](Self::Other) and triggers no built-in behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    /// `type: "notification"` — also surfaced as an info notice.
    Notification(NoticePayload),
    /// `type: "error"` — also surfaced as an error notice.
    Error(NoticePayload),
    /// Unknown type: delivered to subscribers, no built-in side effect.
    Other {
        kind: String,
        data: serde_json::Value,
    },
}

/// Raw envelope for both directions.
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl PushMessage {
    /// Parse a text frame. A recognized type whose payload does not match
    /// the expected shape is an error — the boundary is where bad data stops.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let wire: WireMessage = serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })?;

        match wire.kind.as_str() {
            "notification" => serde_json::from_value(wire.data)
                .map(Self::Notification)
                .map_err(|e| Error::Deserialization {
                    message: format!("bad notification payload: {e}"),
                    body: text.to_owned(),
                }),
            "error" => serde_json::from_value(wire.data)
                .map(Self::Error)
                .map_err(|e| Error::Deserialization {
                    message: format!("bad error payload: {e}"),
                    body: text.to_owned(),
                }),
            _ => Ok(Self::Other {
                kind: wire.kind,
                data: wire.data,
            }),
        }
    }

    /// The wire-level `type` tag.
    pub fn kind(&self) -> &str {
        match self {
            Self::Notification(_) => "notification",
            Self::Error(_) => "error",
            Self::Other { kind, .. } => kind,
        }
    }

    /// Wire form `{ "type": ..., "data": ... }` for outbound sends.
    pub fn to_wire(&self) -> serde_json::Value {
        let (kind, data) = match self {
            Self::Notification(p) => (
                "notification",
                serde_json::to_value(p).unwrap_or(serde_json::Value::Null),
            ),
            Self::Error(p) => (
                "error",
                serde_json::to_value(p).unwrap_or(serde_json::Value::Null),
            ),
            Self::Other { kind, data } => (kind.as_str(), data.clone()),
        };
        serde_json::json!({ "type": kind, "data": data })
    }
}

// ── ChannelConfig ────────────────────────────────────────────────────

/// Reconnection tuning for the realtime channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Full channel URL (`ws://` or `wss://`).
    pub url: Url,

    /// Fixed delay between reconnection attempts. Default: 5s.
    pub reconnect_interval: Duration,

    /// Unexpected closes tolerated before giving up. Default: 5.
    pub max_reconnect_attempts: u32,
}

impl ChannelConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect_interval: Duration::from_millis(5000),
            max_reconnect_attempts: 5,
        }
    }
}

// ── ChannelState ─────────────────────────────────────────────────────

/// Observable connection state.
///
/// `Idle` covers both "never started" and "deliberately closed";
/// `Failed` means the retry budget is exhausted and only an explicit
/// [`reconnect`](RealtimeChannel::reconnect) will resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    Failed,
}

// ── RealtimeChannel ──────────────────────────────────────────────────

struct ChannelShared {
    config: ChannelConfig,
    session: Arc<SessionStore>,
    notifier: Notifier,
    state: watch::Sender<ChannelState>,
    message_tx: broadcast::Sender<Arc<PushMessage>>,
    outbound: Mutex<Option<mpsc::Sender<PushMessage>>>,
    run: Mutex<Option<CancellationToken>>,
}

/// Handle to the realtime channel. Cheaply cloneable.
#[derive(Clone)]
pub struct RealtimeChannel {
    shared: Arc<ChannelShared>,
}

impl RealtimeChannel {
    pub fn new(config: ChannelConfig, session: Arc<SessionStore>, notifier: Notifier) -> Self {
        let (state, _) = watch::channel(ChannelState::Idle);
        let (message_tx, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(ChannelShared {
                config,
                session,
                notifier,
                state,
                message_tx,
                outbound: Mutex::new(None),
                run: Mutex::new(None),
            }),
        }
    }

    /// Start the channel. No-op when there is no active session, or when a
    /// channel task is already running. Must be called within a Tokio runtime.
    pub fn connect(&self) {
        if !matches!(
            *self.shared.state.borrow(),
            ChannelState::Idle | ChannelState::Failed
        ) {
            tracing::debug!("realtime channel already running");
            return;
        }

        if !self.shared.session.is_authenticated() {
            tracing::debug!("no active session, skipping realtime connect");
            return;
        }

        let cancel = CancellationToken::new();
        *lock(&self.shared.run) = Some(cancel.clone());

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        *lock(&self.shared.outbound) = Some(outbound_tx);

        let _ = self.shared.state.send(ChannelState::Connecting);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            channel_loop(shared, outbound_rx, cancel).await;
        });
    }

    /// Deliberately close the channel: cancels any pending reconnect timer
    /// and shuts the socket down. Never triggers the retry path.
    pub fn disconnect(&self) {
        if let Some(cancel) = lock(&self.shared.run).take() {
            cancel.cancel();
        }
    }

    /// Manual re-entry after the retry budget was exhausted (or after a
    /// deliberate close). Resets the attempt counter. No-op while running.
    pub fn reconnect(&self) {
        self.connect();
    }

    /// Send a message. Only delivered while the channel is `Open`;
    /// otherwise the message is dropped with a local warning — there is no
    /// queueing of undelivered messages.
    pub fn send(&self, message: PushMessage) {
        if *self.shared.state.borrow() != ChannelState::Open {
            tracing::warn!(kind = message.kind(), "realtime channel is not open, dropping message");
            return;
        }
        if let Some(tx) = lock(&self.shared.outbound).as_ref() {
            if tx.try_send(message).is_err() {
                tracing::warn!("realtime outbound queue full, dropping message");
            }
        }
    }

    /// Get a new broadcast receiver for inbound push messages.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PushMessage>> {
        self.shared.message_tx.subscribe()
    }

    /// Subscribe to connection state changes.
    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    pub fn is_open(&self) -> bool {
        *self.shared.state.borrow() == ChannelState::Open
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Background reconnection loop ─────────────────────────────────────

enum RunOutcome {
    /// Deliberate shutdown via the cancellation token.
    Cancelled,
    /// Connection failed or dropped unexpectedly.
    Dropped(String),
}

/// Main loop: connect → read/write → on unexpected drop, wait → reconnect,
/// until the attempt budget is exhausted or the channel is cancelled.
async fn channel_loop(
    shared: Arc<ChannelShared>,
    mut outbound_rx: mpsc::Receiver<PushMessage>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = run_connection(&shared, &mut outbound_rx, &cancel, &mut attempt) => {
                match outcome {
                    RunOutcome::Cancelled => break,
                    RunOutcome::Dropped(reason) => {
                        tracing::warn!(reason = %reason, attempt, "realtime channel dropped");

                        if attempt >= shared.config.max_reconnect_attempts {
                            tracing::error!(
                                max_attempts = shared.config.max_reconnect_attempts,
                                "realtime reconnection budget exhausted, giving up"
                            );
                            shared.notifier.error(RECONNECT_EXHAUSTED_NOTICE);
                            let _ = shared.state.send(ChannelState::Failed);
                            return;
                        }

                        let _ = shared.state.send(ChannelState::Reconnecting { attempt: attempt + 1 });
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(shared.config.reconnect_interval) => {}
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }

    let _ = shared.state.send(ChannelState::Idle);
    tracing::debug!("realtime channel loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one WebSocket connection and pump messages until it drops.
///
/// The bearer token goes into an `Authorization` header on the upgrade
/// request — never into the URL, where it would leak into logs and proxies.
async fn run_connection(
    shared: &ChannelShared,
    outbound_rx: &mut mpsc::Receiver<PushMessage>,
    cancel: &CancellationToken,
    attempt: &mut u32,
) -> RunOutcome {
    let _ = shared.state.send(ChannelState::Connecting);

    // The session may have been signed out between retries.
    let Some(token) = shared.session.token() else {
        return RunOutcome::Dropped("no active session".into());
    };

    let uri: tungstenite::http::Uri = match shared.config.url.as_str().parse() {
        Ok(uri) => uri,
        Err(e) => return RunOutcome::Dropped(format!("invalid channel URL: {e}")),
    };

    let request = ClientRequestBuilder::new(uri)
        .with_header("Authorization", format!("Bearer {}", token.expose_secret()));

    tracing::info!(url = %shared.config.url, "connecting realtime channel");

    let ws_stream = match tokio_tungstenite::connect_async(request).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => return RunOutcome::Dropped(e.to_string()),
    };

    tracing::info!("realtime channel connected");
    *attempt = 0;
    let _ = shared.state.send(ChannelState::Open);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return RunOutcome::Cancelled;
            }
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else {
                    // Sender slot was replaced; treat as a deliberate stop.
                    return RunOutcome::Cancelled;
                };
                let text = message.to_wire().to_string();
                if let Err(e) = write.send(tungstenite::Message::text(text)).await {
                    return RunOutcome::Dropped(e.to_string());
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_frame(shared, text.as_str());
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite answers pongs automatically
                        tracing::trace!("realtime ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "close frame received");
                        }
                        return RunOutcome::Dropped("server closed the connection".into());
                    }
                    Some(Err(e)) => {
                        return RunOutcome::Dropped(e.to_string());
                    }
                    None => {
                        return RunOutcome::Dropped("stream ended".into());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Frame handling ───────────────────────────────────────────────────

/// Parse one text frame, apply built-in side effects, and broadcast.
/// Malformed payloads are logged and dropped — never fatal to the channel.
fn handle_frame(shared: &ChannelShared, text: &str) {
    let message = match PushMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse push message");
            return;
        }
    };

    match &message {
        PushMessage::Notification(payload) => shared.notifier.info(payload.message.clone()),
        PushMessage::Error(payload) => shared.notifier.error(payload.message.clone()),
        PushMessage::Other { kind, .. } => {
            tracing::trace!(kind = %kind, "push message with no built-in handler");
        }
    }

    // Ignore send errors -- just means no active subscribers right now
    let _ = shared.message_tx.send(Arc::new(message));
}

// ── Tests ────────────────────────────────────────────────────────────

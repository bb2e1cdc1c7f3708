#![allow(clippy::unwrap_used)]
// Lifecycle tests for `RealtimeChannel` against a real local WebSocket server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use edusync_api::{
    ChannelConfig, ChannelState, CurrentUser, NoticeLevel, Notifier, PushMessage,
    RealtimeChannel, SessionStore, UserRole,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn signed_in_session() -> Arc<SessionStore> {
    let session = Arc::new(SessionStore::new());
    session.sign_in(
        SecretString::from("ws-token".to_string()),
        CurrentUser {
            id: "u-1".into(),
            email: "teacher@school.test".into(),
            role: UserRole::Teacher,
        },
    );
    session
}

fn config_for(addr: std::net::SocketAddr) -> ChannelConfig {
    let mut config = ChannelConfig::new(Url::parse(&format!("ws://{addr}/ws")).unwrap());
    config.reconnect_interval = Duration::from_millis(20);
    config
}

async fn wait_for_state(
    rx: &mut watch::Receiver<ChannelState>,
    pred: impl Fn(&ChannelState) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if pred(&rx.borrow()) {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("timed out waiting for channel state");
}

// ── Open / message / send / deliberate close ────────────────────────

#[tokio::test]
async fn test_open_receive_send_and_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Server: greet with a notification, then ack the first client frame.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        ws.send(Message::text(
            r#"{"type":"notification","data":{"message":"Term started"}}"#,
        ))
        .await
        .unwrap();

        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                assert!(text.as_str().contains("client.hello"));
                ws.send(Message::text(r#"{"type":"ack","data":{"ok":true}}"#))
                    .await
                    .unwrap();
            }
        }
    });

    let notifier = Notifier::new();
    let mut notices = notifier.subscribe();
    let channel = RealtimeChannel::new(config_for(addr), signed_in_session(), notifier);
    let mut messages = channel.subscribe();
    let mut state = channel.state();

    channel.connect();
    wait_for_state(&mut state, |s| *s == ChannelState::Open).await;
    assert!(channel.is_open());

    // Inbound notification: broadcast + built-in info notice.
    let message = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.kind(), "notification");

    let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.level, NoticeLevel::Info);
    assert_eq!(notice.message, "Term started");

    // Outbound send while open, acked by the server as an unknown type.
    channel.send(PushMessage::Other {
        kind: "client.hello".into(),
        data: serde_json::json!({}),
    });

    let ack = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ack.kind(), "ack");

    // Deliberate close lands in Idle, not in the retry path.
    channel.disconnect();
    wait_for_state(&mut state, |s| *s == ChannelState::Idle).await;
    assert!(!channel.is_open());
}

// ── Session gating ──────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_without_session_is_a_no_op() {
    let config = ChannelConfig::new(Url::parse("ws://127.0.0.1:9/ws").unwrap());
    let channel = RealtimeChannel::new(config, Arc::new(SessionStore::new()), Notifier::new());

    channel.connect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*channel.state().borrow(), ChannelState::Idle);
}

#[tokio::test]
async fn test_send_while_closed_is_dropped() {
    let config = ChannelConfig::new(Url::parse("ws://127.0.0.1:9/ws").unwrap());
    let channel = RealtimeChannel::new(config, signed_in_session(), Notifier::new());

    // Not connected: silently dropped, no panic, no queueing.
    channel.send(PushMessage::Other {
        kind: "client.hello".into(),
        data: serde_json::json!({}),
    });
}

// ── Automatic reconnection ──────────────────────────────────────────

#[tokio::test]
async fn test_reconnects_after_unexpected_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));

    // Server: accept, complete the handshake, drop immediately.
    let server_accepts = Arc::clone(&accepts);
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            server_accepts.fetch_add(1, Ordering::SeqCst);
            let _ = tokio_tungstenite::accept_async(stream).await;
            // ws stream dropped here -- connection closes
        }
    });

    let channel = RealtimeChannel::new(config_for(addr), signed_in_session(), Notifier::new());
    channel.connect();

    tokio::time::timeout(Duration::from_secs(5), async {
        while accepts.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("channel never reconnected");

    channel.disconnect();
}

// ── Retry budget exhaustion ─────────────────────────────────────────

#[tokio::test]
async fn test_exhausted_budget_is_terminal_with_one_notice() {
    // Reserve a port, then stop listening on it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = config_for(addr);
    config.max_reconnect_attempts = 3;

    let notifier = Notifier::new();
    let mut notices = notifier.subscribe();
    let channel = RealtimeChannel::new(config, signed_in_session(), notifier);
    let mut state = channel.state();

    channel.connect();
    wait_for_state(&mut state, |s| *s == ChannelState::Failed).await;

    // No further automatic attempts once Failed.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*state.borrow(), ChannelState::Failed);

    // Exactly one terminal error notice.
    let mut error_notices = 0;
    while let Ok(notice) = notices.try_recv() {
        if notice.level == NoticeLevel::Error {
            error_notices += 1;
        }
    }
    assert_eq!(error_notices, 1);

    // Manual reconnect re-enters the state machine.
    channel.reconnect();
    wait_for_state(&mut state, |s| {
        matches!(s, ChannelState::Connecting | ChannelState::Reconnecting { .. } | ChannelState::Failed)
    })
    .await;
    channel.disconnect();
}

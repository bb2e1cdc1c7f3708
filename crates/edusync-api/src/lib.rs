// edusync-api: Async transport layer for the edusync school-management API
// (authenticated HTTP + realtime push channel).

pub mod channel;
pub mod client;
pub mod error;
pub mod notify;
pub mod session;
pub mod transport;

pub use channel::{ChannelConfig, ChannelState, NoticePayload, PushMessage, RealtimeChannel};
pub use client::ApiClient;
pub use error::Error;
pub use notify::{Notice, NoticeLevel, Notifier};
pub use session::{CurrentUser, Session, SessionStore, UserRole};
pub use transport::{TlsMode, TransportConfig};

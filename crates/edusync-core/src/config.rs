// ── Runtime sync configuration ──
//
// These types describe *how* to reach the backend. They carry connection
// tuning but never touch disk -- the embedding app (or edusync-config)
// constructs a `SyncConfig` and hands it to `SyncClient`.

use std::time::Duration;

use url::Url;

use crate::error::SyncError;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict). Default.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs on self-hosted servers).
    DangerAcceptInvalid,
}

/// Configuration for one backend connection.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// API base URL, including any path prefix (e.g. `https://host/api/v1`).
    pub base_url: Url,
    /// Realtime channel path, joined onto the base URL path.
    pub realtime_path: String,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How often the entity store refreshes itself (seconds). 0 = never.
    pub refresh_interval_secs: u64,
    /// Fixed delay between realtime reconnection attempts.
    pub reconnect_interval: Duration,
    /// Unexpected channel closes tolerated before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:8000/api/v1")
                .unwrap_or_else(|_| unreachable!("default base URL is valid")),
            realtime_path: "/ws".into(),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            refresh_interval_secs: 300,
            reconnect_interval: Duration::from_millis(5000),
            max_reconnect_attempts: 5,
        }
    }
}

impl SyncConfig {
    /// Derive the realtime channel URL from the base URL: same host and
    /// path prefix, `http(s)` scheme swapped for `ws(s)`.
    pub fn realtime_url(&self) -> Result<Url, SyncError> {
        let mut url = self.base_url.clone();

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(SyncError::Config {
                    message: format!("unsupported base URL scheme: {other}"),
                });
            }
        };
        url.set_scheme(scheme).map_err(|()| SyncError::Config {
            message: "could not derive realtime scheme".into(),
        })?;

        let prefix = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{prefix}{}", self.realtime_path));
        url.set_query(None);

        Ok(url)
    }
}

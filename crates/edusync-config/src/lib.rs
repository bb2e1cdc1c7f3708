//! On-disk configuration for edusync consumers.
//!
//! A TOML file merged with `EDUSYNC_*` environment variables via figment,
//! validated and translated into [`edusync_core::SyncConfig`]. The core
//! crates never read disk or environment themselves -- the embedding app
//! loads a [`Config`] here and hands the translation in.
//!
//! Credentials are deliberately absent: tokens are session-scoped, handed
//! to the ambient session store by the authentication collaborator, never
//! persisted.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use edusync_core::{SyncConfig, TlsVerification};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config ──────────────────────────────────────────────────────────

/// On-disk configuration shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Backend base URL, including the API prefix
    /// (e.g. `https://school.example/api/v1`). Required.
    pub server: Option<String>,

    /// Realtime channel path joined onto the base URL path.
    #[serde(default = "default_realtime_path")]
    pub realtime_path: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Entity store refresh cadence (seconds). 0 disables the background
    /// refresh.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Fixed delay between realtime reconnection attempts (milliseconds).
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Unexpected channel closes tolerated before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Skip TLS verification (self-signed certs on self-hosted servers).
    #[serde(default)]
    pub insecure: bool,

    /// Custom CA certificate (PEM). Takes precedence over `insecure`.
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: None,
            realtime_path: default_realtime_path(),
            timeout_secs: default_timeout(),
            refresh_interval_secs: default_refresh_interval(),
            reconnect_interval_ms: default_reconnect_interval(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            insecure: false,
            ca_cert: None,
        }
    }
}

fn default_realtime_path() -> String {
    "/ws".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_refresh_interval() -> u64 {
    300
}
fn default_reconnect_interval() -> u64 {
    5000
}
fn default_max_reconnect_attempts() -> u32 {
    5
}

/// Default config file location (`<config dir>/edusync/config.toml`).
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "edusync", "edusync").map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    /// Load from the default path (if it exists) overlaid with `EDUSYNC_*`
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(config_path())
    }

    /// Load from an explicit file path overlaid with `EDUSYNC_*`
    /// environment variables. A missing file just means defaults.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment.merge(Env::prefixed("EDUSYNC_")).extract()?;
        Ok(config)
    }

    /// Write this config as TOML, creating parent directories as needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    /// Validate and translate into the core runtime configuration.
    pub fn to_sync_config(&self) -> Result<SyncConfig, ConfigError> {
        let server = self.server.as_deref().ok_or_else(|| ConfigError::Validation {
            field: "server".into(),
            reason: "no server URL configured".into(),
        })?;

        let base_url = url::Url::parse(server).map_err(|e| ConfigError::Validation {
            field: "server".into(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation {
                field: "server".into(),
                reason: format!("unsupported scheme '{}'", base_url.scheme()),
            });
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "timeout_secs".into(),
                reason: "timeout must be positive".into(),
            });
        }

        let tls = if let Some(ca) = &self.ca_cert {
            TlsVerification::CustomCa(ca.clone())
        } else if self.insecure {
            TlsVerification::DangerAcceptInvalid
        } else {
            TlsVerification::SystemDefaults
        };

        Ok(SyncConfig {
            base_url,
            realtime_path: self.realtime_path.clone(),
            tls,
            timeout: Duration::from_secs(self.timeout_secs),
            refresh_interval_secs: self.refresh_interval_secs,
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

//! Layered settings: compiled defaults, then an optional JSON file, then
//! `ROOMSYNC_` environment variables (`__` separates nested keys).

use std::fmt;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::debug;

use roomsync_telemetry::TelemetryConfig;

const ENV_PREFIX: &str = "ROOMSYNC_";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to load settings: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Root of `~/.roomsync`. Falls back to `/tmp` when `HOME` is unset.
pub fn roomsync_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".roomsync")
}

pub fn settings_path() -> PathBuf {
    roomsync_home().join("settings.json")
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Capacity of each connection's outbound queue.
    pub max_send_queue: usize,
    pub heartbeat_interval_secs: u64,
    /// Connections silent for longer than this are disconnected.
    pub client_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5293,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            cleanup_interval_secs: 60,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Reject upgrades that carry no credential.
    pub required: bool,
    /// HS256 signing secret shared with the token issuer.
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            required: true,
            secret: String::new(),
            issuer: "roomsync".to_string(),
            audience: "roomsync-clients".to_string(),
            leeway_secs: 30,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("required", &self.required)
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub in_memory: bool,
    /// Insert `demo-room` on startup when it does not exist yet.
    pub seed_demo_room: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: roomsync_home().join("database").join("rooms.db"),
            in_memory: false,
            seed_demo_room: true,
        }
    }
}

impl Settings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.auth.secret.is_empty() {
            return Err(SettingsError::Invalid(
                "auth.secret must be set (ROOMSYNC_AUTH__SECRET)".into(),
            ));
        }
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::Invalid("server.max_send_queue must be > 0".into()));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::Invalid(
                "server.heartbeat_interval_secs must be > 0".into(),
            ));
        }
        if self.server.client_timeout_secs <= self.server.heartbeat_interval_secs {
            return Err(SettingsError::Invalid(
                "server.client_timeout_secs must exceed heartbeat_interval_secs".into(),
            ));
        }
        if self.server.cleanup_interval_secs == 0 {
            return Err(SettingsError::Invalid(
                "server.cleanup_interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Load settings from `path`, or from `~/.roomsync/settings.json` when none
/// is given.
///
/// An explicit path must exist; the default path is optional.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, SettingsError> {
    let file = match path {
        Some(p) if !p.exists() => return Err(SettingsError::NotFound(p.to_path_buf())),
        Some(p) => p.to_path_buf(),
        None => settings_path(),
    };
    debug!(path = %file.display(), exists = file.exists(), "loading settings");

    Figment::from(Serialized::defaults(Settings::default()))
        .merge(Json::file(&file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| SettingsError::Load(Box::new(e)))
}

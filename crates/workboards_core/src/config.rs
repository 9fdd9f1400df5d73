//! Configuration for WorkBoards clients.
//!
//! [`Config`] holds the server location, the identity sent with every
//! request and the synchronization timings. It is persisted as TOML
//! (typically at `~/.config/workboards/config.toml` on Unix systems).
//!
//! # Example
//!
//! ```ignore
//! use workboards_core::config::Config;
//!
//! let mut config = Config::load()?;
//! config.workspace_id = Some("ws-1".to_string());
//! config.save()?;
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BoardError, Result};
use crate::transport::TransportTiming;

/// Server used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8001";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Board server base URL (e.g., "https://boards.example.com")
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Workspace sent as `X-Workspace-Id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,

    /// Member sent as `X-User-Id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Synchronization timings
    #[serde(default)]
    pub sync: SyncSettings,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

/// Timings and limits of the synchronization layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between liveness probes on the push channel
    pub heartbeat_interval_secs: u64,
    /// Seconds a probe may take before the connection counts as half-open
    pub heartbeat_timeout_secs: u64,
    /// Seconds between full refetches while the push channel is down
    pub poll_interval_secs: u64,
    /// Seconds a soft delete can be undone
    pub undo_window_secs: u64,
    /// Consecutive reconnect attempts before the push channel gives up
    pub max_reconnect_attempts: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 15,
            heartbeat_timeout_secs: 10,
            poll_interval_secs: 5,
            undo_window_secs: 5,
            max_reconnect_attempts: 10,
        }
    }
}

impl SyncSettings {
    /// Transport timing derived from these settings.
    pub fn timing(&self) -> TransportTiming {
        TransportTiming {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs.max(1)),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
        }
    }

    /// How long a soft delete stays undoable.
    pub fn undo_window(&self) -> Duration {
        Duration::from_secs(self.undo_window_secs)
    }

    /// Reconnect policy for the push channel.
    #[cfg(feature = "native-sync")]
    pub fn reconnect_policy(&self) -> crate::transport::push_channel::ReconnectPolicy {
        crate::transport::push_channel::ReconnectPolicy {
            max_attempts: self.max_reconnect_attempts,
            ..Default::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}

impl Config {
    /// Create a config for `server_url` with no identity and default timings.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            workspace_id: None,
            user_id: None,
            sync: SyncSettings::default(),
        }
    }

    /// Workspace and user id, or an error naming the missing one.
    pub fn identity(&self) -> Result<(&str, &str)> {
        let workspace = self
            .workspace_id
            .as_deref()
            .ok_or(BoardError::MissingIdentity("workspace_id"))?;
        let user = self
            .user_id
            .as_deref()
            .ok_or(BoardError::MissingIdentity("user_id"))?;
        Ok((workspace, user))
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BoardError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Config {
    /// Get the config file path (~/.config/workboards/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("workboards").join("config.toml"))
    }

    /// Load config from default location, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }
        Ok(Config::default())
    }

    /// Save config to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(BoardError::NoConfigDir)?;
        self.save_to(&path)
    }
}

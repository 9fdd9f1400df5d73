use std::path::PathBuf;

use thiserror::Error;

use crate::model::{ItemId, LaneKey};

/// Unified error type for workboards operations
#[derive(Debug, Error)]
pub enum BoardError {
    // Local state errors
    #[error("Item '{0}' is not in the local cache")]
    ItemNotFound(ItemId),

    #[error("Neighbor '{neighbor}' is not in lane {lane}")]
    NeighborNotInLane { neighbor: ItemId, lane: LaneKey },

    #[error("Item '{0}' already has a delete in flight")]
    DeleteInFlight(ItemId),

    #[error("Patch for item '{0}' is empty")]
    EmptyPatch(ItemId),

    // Remote errors
    #[cfg(feature = "native-sync")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "native-sync")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[cfg(feature = "native-sync")]
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Heartbeat not acknowledged within {0:?}")]
    HeartbeatTimeout(std::time::Duration),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Missing {0} in configuration. Run 'workboards config set {0} <value>' first.")]
    MissingIdentity(&'static str),

    // Session errors
    #[error("Board session has shut down")]
    SessionClosed,
}

/// Result type alias for workboards operations
pub type Result<T> = std::result::Result<T, BoardError>;

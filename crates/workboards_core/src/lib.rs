#![doc = include_str!("../README.md")]

/// Configuration options
pub mod config;

/// Error (common error types)
pub mod error;

/// Board, item and patch wire types
pub mod model;

/// Order key allocation
pub mod order;

/// Lane compaction trigger
pub mod compaction;

/// Local item cache (the working set)
pub mod cache;

/// Optimistic mutation pipeline
pub mod pipeline;

/// Realtime event reducer
pub mod reducer;

/// Soft delete and undo
pub mod undo;

/// Board state composition (sans-IO)
pub mod board;

/// Connection state and push channel
pub mod transport;

/// Board server API
pub mod api;

/// Async board session
#[cfg(feature = "native-sync")]
pub mod session;

#[cfg(test)]
pub mod test_utils;

pub use board::{BoardState, Effect, MoveTarget, MutationOutcome, Notice};
pub use config::Config;
pub use error::{BoardError, Result};
pub use model::{Item, ItemPatch, LaneKey, Status};

#[cfg(feature = "native-sync")]
pub use session::{BoardHandle, BoardSession, SessionConfig, SessionEvent};

//! Realtime event reducer.
//!
//! Folds push-channel events into the item cache. Events describe persisted
//! server state, so they are applied unconditionally; they are not checked
//! against pending local mutations. A stale event may briefly overwrite an
//! optimistic edit until the mutation's own response lands.

use serde::{Deserialize, Serialize};

use crate::cache::ItemCache;
use crate::error::Result;
use crate::model::Item;

/// Kind of change broadcast by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "item.created")]
    Created,
    #[serde(rename = "item.updated")]
    Updated,
    #[serde(rename = "item.deleted")]
    Deleted,
    #[serde(rename = "item.restored")]
    Restored,
}

/// One push-channel message: `{"type": "item.updated", "item": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Full snapshot of the item after the change.
    pub item: Item,
}

impl RealtimeEvent {
    /// Decode a text frame. Unknown kinds and malformed items are errors.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Apply `event` to `cache` for the board `board_id`.
///
/// Returns true if the working set changed. Events for other boards are
/// ignored.
pub fn apply(cache: &mut ItemCache, board_id: &str, event: RealtimeEvent, include_deleted: bool) -> bool {
    if event.item.board_id != board_id {
        log::debug!(
            "[Reducer] ignoring {:?} for board {}",
            event.kind,
            event.item.board_id
        );
        return false;
    }

    match event.kind {
        // The create confirmation and the broadcast can both arrive.
        EventKind::Created => {
            if cache.contains(&event.item.id) {
                return false;
            }
            cache.store(event.item, include_deleted)
        }
        EventKind::Updated | EventKind::Deleted => cache.store(event.item, include_deleted),
        EventKind::Restored => cache.store(event.item.revived(), include_deleted),
    }
}

//! Local item cache.
//!
//! The cache is the single mutable view of a board's items. Storage order is
//! irrelevant; a lane's rendered order is computed on read by sorting on
//! `order`, with the item id as tie-breaker so display order is deterministic.
//!
//! There is no internal locking. One board session owns the cache and all
//! writes happen on its task.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::{Item, ItemId, LaneKey, Status};

/// In-memory mapping from item id to the latest known snapshot.
#[derive(Debug, Clone, Default)]
pub struct ItemCache {
    items: HashMap<ItemId, Item>,
}

impl ItemCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an item.
    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Mutable access for in-place patching.
    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    /// Whether the item is in the working set.
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Insert or replace an item, returning the previous snapshot.
    pub fn upsert(&mut self, item: Item) -> Option<Item> {
        self.items.insert(item.id.clone(), item)
    }

    /// Drop an item from the working set.
    ///
    /// Used to exclude items from a filtered view; the server still owns them.
    pub fn remove(&mut self, id: &str) -> Option<Item> {
        self.items.remove(id)
    }

    /// Store a server snapshot, honoring tombstone visibility.
    ///
    /// Tombstoned items are dropped when `include_deleted` is false and
    /// upserted otherwise. Returns true if the working set changed.
    pub fn store(&mut self, item: Item, include_deleted: bool) -> bool {
        if item.deleted && !include_deleted {
            return self.remove(&item.id).is_some();
        }
        match self.items.get(&item.id) {
            Some(existing) if *existing == item => false,
            _ => {
                self.upsert(item);
                true
            }
        }
    }

    /// Replace the whole working set with a fresh listing.
    pub fn replace_all(&mut self, items: impl IntoIterator<Item = Item>, include_deleted: bool) {
        self.items = items
            .into_iter()
            .filter(|item| include_deleted || !item.deleted)
            .map(|item| (item.id.clone(), item))
            .collect();
    }

    /// Drop every tombstoned item.
    pub fn purge_tombstones(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|_, item| !item.deleted);
        before - self.items.len()
    }

    /// Items of one lane in rendered order.
    pub fn lane_view(&self, group_id: &str, status: Status, include_deleted: bool) -> Vec<Item> {
        let mut lane: Vec<Item> = self
            .items
            .values()
            .filter(|item| item.group_id == group_id && item.status == status)
            .filter(|item| include_deleted || !item.deleted)
            .cloned()
            .collect();
        lane.sort_by(compare_rendered);
        lane
    }

    /// [`ItemCache::lane_view`] by lane key.
    pub fn lane(&self, lane: &LaneKey, include_deleted: bool) -> Vec<Item> {
        self.lane_view(&lane.group_id, lane.status, include_deleted)
    }

    /// All items, unordered.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Number of items in the working set.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the working set is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Rendered order within a lane: ascending `order`, ties broken by id.
pub fn compare_rendered(a: &Item, b: &Item) -> Ordering {
    a.order.total_cmp(&b.order).then_with(|| a.id.cmp(&b.id))
}

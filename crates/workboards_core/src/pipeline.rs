//! Optimistic mutation pipeline.
//!
//! A mutation is applied to the cache immediately and recorded in a pending
//! table under a fresh sequence number. When the server answers, the
//! settlement is decided from that table alone:
//!
//! - success and no newer mutation for the item: the server snapshot wins
//! - success but a newer mutation was issued since: the response is stale and
//!   is dropped
//! - failure and no newer mutation: restore the pre-mutation snapshot
//! - failure but a newer mutation was issued since: nothing to restore, the
//!   newer mutation settles the item
//!
//! There is no lock per item. Ordering between mutations of the same item
//! comes only from sequence numbers.

use std::collections::HashMap;

use crate::cache::ItemCache;
use crate::error::{BoardError, Result};
use crate::model::{Item, ItemId, ItemPatch};

/// Why a mutation was issued. Deletes and their compensating updates settle
/// through the soft-delete controller instead of plain rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Field edit.
    Edit,
    /// Lane/order change.
    Move,
    /// Soft delete.
    Delete,
    /// Compensating update that clears a tombstone.
    Revive,
}

/// An in-flight optimistic change.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    /// Local sequence number, strictly increasing per pipeline.
    pub seq: u64,
    /// Target item.
    pub item_id: ItemId,
    /// Patch applied locally and sent to the server.
    pub patch: ItemPatch,
    /// Snapshot taken before the patch was applied.
    pub snapshot: Item,
    /// What issued the mutation.
    pub kind: MutationKind,
}

/// How a server answer was folded into the cache.
#[derive(Debug)]
pub enum Settlement {
    /// The server snapshot is now authoritative.
    Confirmed {
        mutation: PendingMutation,
        item: Item,
    },
    /// A newer mutation for the item exists; the answer was discarded.
    Superseded {
        mutation: PendingMutation,
        succeeded: bool,
    },
    /// The request failed and the pre-mutation snapshot must be restored.
    Failed {
        mutation: PendingMutation,
        error: BoardError,
    },
    /// No pending mutation with this sequence number.
    Unknown,
}

/// Table of pending mutations keyed by sequence number.
#[derive(Debug, Default)]
pub struct MutationPipeline {
    next_seq: u64,
    latest: HashMap<ItemId, u64>,
    pending: HashMap<u64, PendingMutation>,
}

impl MutationPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `patch` to the cached item and record it as pending.
    ///
    /// Returns the sequence number the caller must send with the remote
    /// request and report back to [`MutationPipeline::settle`].
    pub fn begin(
        &mut self,
        cache: &mut ItemCache,
        item_id: &str,
        patch: ItemPatch,
        kind: MutationKind,
    ) -> Result<u64> {
        if patch.is_empty() {
            return Err(BoardError::EmptyPatch(item_id.to_string()));
        }
        let item = cache
            .get_mut(item_id)
            .ok_or_else(|| BoardError::ItemNotFound(item_id.to_string()))?;

        let snapshot = item.clone();
        patch.apply_to(item);

        self.next_seq += 1;
        let seq = self.next_seq;
        self.latest.insert(item_id.to_string(), seq);
        self.pending.insert(
            seq,
            PendingMutation {
                seq,
                item_id: item_id.to_string(),
                patch,
                snapshot,
                kind,
            },
        );

        log::debug!("[Pipeline] begin #{} {:?} for {}", seq, kind, item_id);
        Ok(seq)
    }

    /// Decide how a server answer for mutation `seq` affects the cache.
    ///
    /// The pipeline does not write the cache here; the caller stores the
    /// resulting snapshot so visibility rules apply in one place.
    pub fn settle(&mut self, seq: u64, result: Result<Item>) -> Settlement {
        let Some(mutation) = self.pending.remove(&seq) else {
            log::debug!("[Pipeline] settle for unknown #{}", seq);
            return Settlement::Unknown;
        };

        let superseded = self.is_superseded(&mutation.item_id, seq);
        self.release(&mutation.item_id);

        match (result, superseded) {
            (Ok(item), false) => Settlement::Confirmed { mutation, item },
            (Ok(_), true) => {
                log::debug!("[Pipeline] #{} superseded, dropping response", seq);
                Settlement::Superseded {
                    mutation,
                    succeeded: true,
                }
            }
            (Err(error), false) => {
                log::warn!(
                    "[Pipeline] #{} for {} failed: {}",
                    seq,
                    mutation.item_id,
                    error
                );
                Settlement::Failed { mutation, error }
            }
            (Err(error), true) => {
                log::warn!(
                    "[Pipeline] #{} for {} failed after being superseded: {}",
                    seq,
                    mutation.item_id,
                    error
                );
                Settlement::Superseded {
                    mutation,
                    succeeded: false,
                }
            }
        }
    }

    /// Whether a mutation newer than `seq` has been issued for `item_id`.
    pub fn is_superseded(&self, item_id: &str, seq: u64) -> bool {
        self.latest.get(item_id).is_some_and(|&latest| latest > seq)
    }

    /// Whether any mutation for `item_id` is still awaiting the server.
    pub fn has_pending(&self, item_id: &str) -> bool {
        self.pending.values().any(|m| m.item_id == item_id)
    }

    /// Look up a pending mutation.
    pub fn pending(&self, seq: u64) -> Option<&PendingMutation> {
        self.pending.get(&seq)
    }

    /// Number of mutations awaiting the server.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pending mutations, oldest first.
    pub fn pending_in_order(&self) -> Vec<&PendingMutation> {
        let mut pending: Vec<_> = self.pending.values().collect();
        pending.sort_by_key(|m| m.seq);
        pending
    }

    // The latest-seq entry must outlive every pending mutation of the item,
    // otherwise a late older answer would no longer look stale.
    fn release(&mut self, item_id: &str) {
        if !self.has_pending(item_id) {
            self.latest.remove(item_id);
        }
    }
}

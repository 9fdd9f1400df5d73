//! Soft-delete and undo window.
//!
//! Each delete action runs a small state machine:
//!
//! ```text
//! Active ──delete──▶ PendingDelete ──window elapsed + delete confirmed──▶ Deleted
//!                         │
//!                         └──undo, or delete failed──▶ UndoRequested ──revive settled──▶ Active
//! ```
//!
//! The controller only tracks phases. The board state applies the cache
//! changes and issues the requests the transitions call for.

use std::collections::{HashMap, HashSet};

use crate::model::{Item, ItemId};

/// Observable phase of an item's delete action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePhase {
    /// No delete in progress.
    Active,
    /// Tombstoned locally, undo window may still be open.
    PendingDelete,
    /// Compensating update in flight.
    UndoRequested,
    /// Window closed and the server confirmed the delete.
    Deleted,
}

#[derive(Debug, Clone)]
struct DeleteAction {
    phase: DeletePhase,
    snapshot: Item,
    token: u64,
    confirmed: bool,
    window_open: bool,
}

/// What the board must do after a delete request settled.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteResolution {
    /// Nothing further.
    None,
    /// The action reached its terminal state.
    Finalized,
    /// Restore this snapshot and issue the compensating update.
    AutoUndo(Item),
}

/// Tracks delete actions per item.
#[derive(Debug, Default)]
pub struct SoftDeleteController {
    actions: HashMap<ItemId, DeleteAction>,
    finalized: HashSet<ItemId>,
    next_token: u64,
}

impl SoftDeleteController {
    /// Create a controller with no tracked deletes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase for `id`.
    pub fn phase(&self, id: &str) -> DeletePhase {
        match self.actions.get(id) {
            Some(action) => action.phase,
            None if self.finalized.contains(id) => DeletePhase::Deleted,
            None => DeletePhase::Active,
        }
    }

    /// Whether a delete or undo is in flight for `id`.
    pub fn is_tracking(&self, id: &str) -> bool {
        self.actions.contains_key(id)
    }

    /// Start a delete: `Active → PendingDelete`.
    ///
    /// Returns the window token to arm the undo timer with, or `None` if a
    /// delete action for the item is already running.
    pub fn begin(&mut self, snapshot: Item) -> Option<u64> {
        if self.actions.contains_key(&snapshot.id) {
            return None;
        }
        self.next_token += 1;
        let token = self.next_token;
        self.finalized.remove(&snapshot.id);
        self.actions.insert(
            snapshot.id.clone(),
            DeleteAction {
                phase: DeletePhase::PendingDelete,
                snapshot,
                token,
                confirmed: false,
                window_open: true,
            },
        );
        Some(token)
    }

    /// User asked to undo: `PendingDelete → UndoRequested`.
    ///
    /// Returns the pre-delete snapshot to restore. Repeated calls, calls after
    /// the window closed and calls for untracked items return `None`.
    pub fn request_undo(&mut self, id: &str) -> Option<Item> {
        let action = self.actions.get_mut(id)?;
        if action.phase != DeletePhase::PendingDelete || !action.window_open {
            return None;
        }
        action.phase = DeletePhase::UndoRequested;
        Some(action.snapshot.clone())
    }

    /// The delete request answered.
    pub fn delete_settled(&mut self, id: &str, succeeded: bool) -> DeleteResolution {
        let Some(action) = self.actions.get_mut(id) else {
            return DeleteResolution::None;
        };
        if action.phase != DeletePhase::PendingDelete {
            return DeleteResolution::None;
        }

        if !succeeded {
            action.phase = DeletePhase::UndoRequested;
            return DeleteResolution::AutoUndo(action.snapshot.clone());
        }

        action.confirmed = true;
        if action.window_open {
            DeleteResolution::None
        } else {
            self.finalize(id);
            DeleteResolution::Finalized
        }
    }

    /// The undo window for `token` elapsed.
    ///
    /// Tokens from earlier delete actions of the same item are ignored.
    pub fn window_elapsed(&mut self, id: &str, token: u64) -> DeleteResolution {
        let Some(action) = self.actions.get_mut(id) else {
            return DeleteResolution::None;
        };
        if action.token != token {
            return DeleteResolution::None;
        }
        action.window_open = false;
        if action.phase == DeletePhase::PendingDelete && action.confirmed {
            self.finalize(id);
            DeleteResolution::Finalized
        } else {
            DeleteResolution::None
        }
    }

    /// The compensating update answered: `UndoRequested → Active`.
    pub fn revive_settled(&mut self, id: &str) -> bool {
        match self.actions.get(id) {
            Some(action) if action.phase == DeletePhase::UndoRequested => {
                self.actions.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Forget any record of `id`, e.g. after another client restored it.
    pub fn forget(&mut self, id: &str) {
        self.actions.remove(id);
        self.finalized.remove(id);
    }

    /// Keep finalized records only for ids `keep` accepts.
    ///
    /// Called with a fresh listing so records of items the server no longer
    /// holds as tombstones do not pile up.
    pub fn retain_finalized(&mut self, keep: impl Fn(&str) -> bool) {
        self.finalized.retain(|id| keep(id));
    }

    fn finalize(&mut self, id: &str) {
        self.actions.remove(id);
        self.finalized.insert(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use crate::test_utils::item;

    #[test]
    fn test_confirmed_then_window_elapses() {
        let mut ctl = SoftDeleteController::new();
        let token = ctl.begin(item("a", "g1", Status::Todo, 1.0)).unwrap();
        assert_eq!(ctl.phase("a"), DeletePhase::PendingDelete);

        assert_eq!(ctl.delete_settled("a", true), DeleteResolution::None);
        assert_eq!(ctl.window_elapsed("a", token), DeleteResolution::Finalized);
        assert_eq!(ctl.phase("a"), DeletePhase::Deleted);
    }

    #[test]
    fn test_window_elapses_before_confirmation() {
        let mut ctl = SoftDeleteController::new();
        let token = ctl.begin(item("a", "g1", Status::Todo, 1.0)).unwrap();
        assert_eq!(ctl.window_elapsed("a", token), DeleteResolution::None);
        assert_eq!(ctl.delete_settled("a", true), DeleteResolution::Finalized);
    }

    #[test]
    fn test_failed_delete_auto_undoes_even_after_window() {
        let mut ctl = SoftDeleteController::new();
        let snapshot = item("a", "g1", Status::Todo, 1.0);
        let token = ctl.begin(snapshot.clone()).unwrap();
        ctl.window_elapsed("a", token);

        assert_eq!(
            ctl.delete_settled("a", false),
            DeleteResolution::AutoUndo(snapshot)
        );
        assert_eq!(ctl.phase("a"), DeletePhase::UndoRequested);
        assert!(ctl.revive_settled("a"));
        assert_eq!(ctl.phase("a"), DeletePhase::Active);
    }

    #[test]
    fn test_undo_is_not_reentrant() {
        let mut ctl = SoftDeleteController::new();
        ctl.begin(item("a", "g1", Status::Todo, 1.0)).unwrap();
        assert!(ctl.request_undo("a").is_some());
        assert!(ctl.request_undo("a").is_none());
        assert_eq!(ctl.phase("a"), DeletePhase::UndoRequested);
    }

    #[test]
    fn test_undo_after_window_is_refused() {
        let mut ctl = SoftDeleteController::new();
        let token = ctl.begin(item("a", "g1", Status::Todo, 1.0)).unwrap();
        ctl.window_elapsed("a", token);
        assert!(ctl.request_undo("a").is_none());
    }

    #[test]
    fn test_second_delete_while_pending_refused() {
        let mut ctl = SoftDeleteController::new();
        assert!(ctl.begin(item("a", "g1", Status::Todo, 1.0)).is_some());
        assert!(ctl.begin(item("a", "g1", Status::Todo, 1.0)).is_none());
    }

    #[test]
    fn test_stale_window_token_ignored() {
        let mut ctl = SoftDeleteController::new();
        let first = ctl.begin(item("a", "g1", Status::Todo, 1.0)).unwrap();
        ctl.request_undo("a");
        ctl.revive_settled("a");

        let second = ctl.begin(item("a", "g1", Status::Todo, 1.0)).unwrap();
        ctl.delete_settled("a", true);
        assert_eq!(ctl.window_elapsed("a", first), DeleteResolution::None);
        assert_eq!(ctl.window_elapsed("a", second), DeleteResolution::Finalized);
    }

    #[test]
    fn test_finalized_records_pruned_on_request() {
        let mut ctl = SoftDeleteController::new();
        for id in ["a", "b"] {
            let token = ctl.begin(item(id, "g1", Status::Todo, 1.0)).unwrap();
            ctl.delete_settled(id, true);
            ctl.window_elapsed(id, token);
        }

        ctl.retain_finalized(|id| id == "b");

        assert_eq!(ctl.phase("a"), DeletePhase::Active);
        assert_eq!(ctl.phase("b"), DeletePhase::Deleted);
    }
}

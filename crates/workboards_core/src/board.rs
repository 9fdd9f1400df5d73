//! Board state: the synchronization core for one open board.
//!
//! [`BoardState`] composes the item cache, the mutation pipeline, the
//! compaction trigger and the soft-delete controller. It performs no I/O.
//! Every operation updates local state synchronously and returns the
//! [`Effect`]s the driver must carry out; the driver reports results back
//! through the `*_settled` methods. This keeps ordering and suppression rules
//! deterministic and testable without a runtime.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::ItemCache;
use crate::compaction::CompactionTrigger;
use crate::error::{BoardError, Result};
use crate::model::{BoardId, Item, ItemId, ItemPatch, LaneKey, NewItem};
use crate::order::allocate_at;
use crate::pipeline::{MutationKind, MutationPipeline, PendingMutation, Settlement};
use crate::reducer::{self, EventKind, RealtimeEvent};
use crate::undo::{DeletePhase, DeleteResolution, SoftDeleteController};

/// I/O requested by a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send `patch` for `item_id`; report the answer with `seq`.
    PatchItem {
        seq: u64,
        item_id: ItemId,
        patch: ItemPatch,
    },
    /// Create an item; report the answer with `request_id`.
    CreateItem { request_id: u64, draft: NewItem },
    /// Ask the server to renumber a lane. Failures are ignored.
    RequestCompaction(LaneKey),
    /// Arm the undo window; report expiry with `token`.
    StartUndoWindow { item_id: ItemId, token: u64 },
    /// Refetch the whole board.
    Refetch,
    /// Tell observers something happened.
    Notify(Notice),
}

/// How a mutation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationOutcome {
    /// The server snapshot replaced the optimistic state.
    Confirmed,
    /// A newer mutation of the same item made this answer stale.
    Superseded,
    /// The request failed and the pre-mutation state was restored.
    RolledBack { reason: String },
}

/// Non-blocking notification for observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// A mutation settled.
    Settled {
        item_id: ItemId,
        seq: u64,
        outcome: MutationOutcome,
    },
    /// An item created from this client was confirmed.
    Created { item: Item },
    /// A create request failed.
    CreateFailed { name: String, reason: String },
    /// A soft delete became final.
    DeleteFinalized { item_id: ItemId },
    /// A delete failed and the item was restored.
    DeleteReverted { item_id: ItemId, reason: String },
    /// Anything else worth surfacing.
    Warning { message: String },
}

/// Where a moved item should land: a lane plus the neighbors it goes
/// between. Missing neighbors mean the lane edge.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveTarget {
    pub lane: LaneKey,
    pub after: Option<ItemId>,
    pub before: Option<ItemId>,
}

impl MoveTarget {
    /// Target between `after` and `before` in `lane`.
    pub fn between(lane: LaneKey, after: Option<ItemId>, before: Option<ItemId>) -> Self {
        Self {
            lane,
            after,
            before,
        }
    }
}

/// Synchronization state of one board.
#[derive(Debug)]
pub struct BoardState {
    board_id: BoardId,
    show_deleted: bool,
    cache: ItemCache,
    pipeline: MutationPipeline,
    compaction: CompactionTrigger,
    deletes: SoftDeleteController,
    pending_creates: HashMap<u64, NewItem>,
    next_request_id: u64,
    // Server-sourced writes, counted so a listing can tell what it predates.
    writes: u64,
    written: HashMap<ItemId, u64>,
}

impl BoardState {
    /// Empty state for `board_id`, tombstones hidden.
    pub fn new(board_id: impl Into<BoardId>) -> Self {
        Self {
            board_id: board_id.into(),
            show_deleted: false,
            cache: ItemCache::new(),
            pipeline: MutationPipeline::new(),
            compaction: CompactionTrigger::default(),
            deletes: SoftDeleteController::new(),
            pending_creates: HashMap::new(),
            next_request_id: 0,
            writes: 0,
            written: HashMap::new(),
        }
    }

    /// Set initial tombstone visibility (builder pattern).
    pub fn with_show_deleted(mut self, show_deleted: bool) -> Self {
        self.show_deleted = show_deleted;
        self
    }

    /// Use a custom compaction trigger (builder pattern).
    pub fn with_compaction(mut self, compaction: CompactionTrigger) -> Self {
        self.compaction = compaction;
        self
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn show_deleted(&self) -> bool {
        self.show_deleted
    }

    /// The working set.
    pub fn cache(&self) -> &ItemCache {
        &self.cache
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.cache.get(id)
    }

    /// A lane in rendered order, honoring tombstone visibility.
    pub fn lane_view(&self, lane: &LaneKey) -> Vec<Item> {
        self.cache.lane(lane, self.show_deleted)
    }

    /// Phase of the item's delete action.
    pub fn delete_phase(&self, id: &str) -> DeletePhase {
        self.deletes.phase(id)
    }

    /// Number of mutations awaiting the server.
    pub fn pending_mutations(&self) -> usize {
        self.pipeline.pending_count()
    }

    /// Whether no mutation or create is waiting on the server.
    pub fn is_settled(&self) -> bool {
        self.pipeline.pending_count() == 0 && self.pending_creates.is_empty()
    }

    /// Change tombstone visibility.
    ///
    /// Hidden tombstones were dropped from the working set, so showing them
    /// again needs a refetch.
    pub fn set_show_deleted(&mut self, show: bool) -> Vec<Effect> {
        if show == self.show_deleted {
            return Vec::new();
        }
        self.show_deleted = show;
        if show {
            vec![Effect::Refetch]
        } else {
            self.cache.purge_tombstones();
            Vec::new()
        }
    }

    /// Position in the stream of server-sourced writes (confirmations,
    /// push events, created items). Capture it when a listing is requested
    /// and hand it to [`BoardState::replace_listing`].
    pub fn write_mark(&self) -> u64 {
        self.writes
    }

    /// Replace the working set with a listing that reflects every write so far.
    pub fn replace_all(&mut self, items: Vec<Item>) {
        self.replace_listing(items, self.writes);
    }

    /// Replace the working set with a full listing requested at `mark`.
    ///
    /// Items written after `mark` keep their cached state, since the listing
    /// may predate those writes. Patches still awaiting the server are
    /// re-applied on top so a refetch does not undo optimistic edits in the
    /// meantime.
    pub fn replace_listing(&mut self, items: Vec<Item>, mark: u64) {
        let newer: Vec<(ItemId, Option<Item>)> = self
            .written
            .iter()
            .filter(|(_, at)| **at > mark)
            .map(|(id, _)| (id.clone(), self.cache.get(id).cloned()))
            .collect();

        let board_id = self.board_id.clone();
        let listed: Vec<Item> = items.into_iter().filter(|i| i.board_id == board_id).collect();
        let listed_tombstones: Vec<ItemId> = listed.iter().filter(|i| i.deleted).map(|i| i.id.clone()).collect();
        self.cache.replace_all(listed, true);
        for (id, cached) in newer {
            match cached {
                Some(item) => {
                    self.cache.upsert(item);
                }
                None => {
                    self.cache.remove(&id);
                }
            }
        }
        self.written.retain(|_, at| *at > mark);
        self.deletes.retain_finalized(|id| listed_tombstones.iter().any(|t| t == id));

        for mutation in self.pipeline.pending_in_order() {
            if let Some(item) = self.cache.get_mut(&mutation.item_id) {
                mutation.patch.apply_to(item);
            }
        }
        if !self.show_deleted {
            self.cache.purge_tombstones();
        }
    }

    /// Optimistically apply a field edit.
    pub fn mutate(&mut self, item_id: &str, patch: ItemPatch) -> Result<Vec<Effect>> {
        Ok(vec![self.issue(item_id, patch, MutationKind::Edit)?])
    }

    /// Optimistically move an item between two neighbors of a lane.
    pub fn move_item(
        &mut self,
        item_id: &str,
        target: &MoveTarget,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>> {
        if !self.cache.contains(item_id) {
            return Err(BoardError::ItemNotFound(item_id.to_string()));
        }
        let prev = self.neighbor_order(target.after.as_deref(), &target.lane, item_id)?;
        let next = self.neighbor_order(target.before.as_deref(), &target.lane, item_id)?;
        let order = allocate_at(prev, next, now);

        let mut effects = vec![self.issue(
            item_id,
            ItemPatch::placement(&target.lane, order),
            MutationKind::Move,
        )?];
        if self.compaction.should_compact(&target.lane, prev, next) {
            effects.push(Effect::RequestCompaction(target.lane.clone()));
        }
        Ok(effects)
    }

    /// Request a new item appended to the end of `lane`.
    pub fn create_item(&mut self, lane: &LaneKey, name: impl Into<String>, now: DateTime<Utc>) -> Vec<Effect> {
        let last = self.lane_view(lane).last().map(|item| item.order);
        let order = allocate_at(last, None, now);

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let draft = NewItem {
            group_id: lane.group_id.clone(),
            status: lane.status,
            name: name.into(),
            order,
        };
        self.pending_creates.insert(request_id, draft.clone());

        let mut effects = vec![Effect::CreateItem { request_id, draft }];
        if self.compaction.should_compact(lane, last, None) {
            effects.push(Effect::RequestCompaction(lane.clone()));
        }
        effects
    }

    /// Fold the answer to a create request.
    ///
    /// Takes the result by reference so the caller can still hand it to
    /// whoever is waiting on the create.
    pub fn create_settled(&mut self, request_id: u64, result: &Result<Item>) -> Vec<Effect> {
        let draft = self.pending_creates.remove(&request_id);
        match result {
            Ok(item) => {
                // The broadcast may have delivered it already.
                if item.board_id == self.board_id && !self.cache.contains(&item.id) {
                    self.touch(&item.id);
                    self.cache.store(item.clone(), self.show_deleted);
                }
                vec![Effect::Notify(Notice::Created { item: item.clone() })]
            }
            Err(e) => {
                log::warn!("[Board] create #{} failed: {}", request_id, e);
                vec![Effect::Notify(Notice::CreateFailed {
                    name: draft.map(|d| d.name).unwrap_or_default(),
                    reason: e.to_string(),
                })]
            }
        }
    }

    /// Soft-delete an item and open its undo window.
    pub fn soft_delete(&mut self, item_id: &str, now: DateTime<Utc>) -> Result<Vec<Effect>> {
        if self.deletes.is_tracking(item_id) {
            return Err(BoardError::DeleteInFlight(item_id.to_string()));
        }
        let snapshot = self
            .cache
            .get(item_id)
            .cloned()
            .ok_or_else(|| BoardError::ItemNotFound(item_id.to_string()))?;
        let Some(token) = self.deletes.begin(snapshot) else {
            return Err(BoardError::DeleteInFlight(item_id.to_string()));
        };

        let patch = match self.issue(item_id, ItemPatch::tombstone(now), MutationKind::Delete) {
            Ok(effect) => effect,
            Err(e) => {
                self.deletes.forget(item_id);
                return Err(e);
            }
        };

        Ok(vec![
            patch,
            Effect::StartUndoWindow {
                item_id: item_id.to_string(),
                token,
            },
        ])
    }

    /// Undo a pending delete. No-op outside an open undo window or while an
    /// undo is already in flight.
    pub fn undo_delete(&mut self, item_id: &str) -> Vec<Effect> {
        match self.deletes.request_undo(item_id) {
            Some(snapshot) => self.revive(snapshot, true),
            None => Vec::new(),
        }
    }

    /// The undo window armed with `token` elapsed.
    pub fn undo_window_elapsed(&mut self, item_id: &str, token: u64) -> Vec<Effect> {
        match self.deletes.window_elapsed(item_id, token) {
            DeleteResolution::Finalized => vec![Effect::Notify(Notice::DeleteFinalized {
                item_id: item_id.to_string(),
            })],
            _ => Vec::new(),
        }
    }

    /// Fold the answer to the patch issued with `seq`.
    pub fn mutation_settled(&mut self, seq: u64, result: Result<Item>) -> Vec<Effect> {
        match self.pipeline.settle(seq, result) {
            Settlement::Unknown => Vec::new(),
            Settlement::Confirmed { mutation, item } => {
                self.touch(&item.id);
                self.cache.store(item, self.show_deleted);
                let mut effects = vec![settled(&mutation, MutationOutcome::Confirmed)];
                effects.extend(self.after_settle(&mutation, true));
                effects
            }
            Settlement::Superseded {
                mutation,
                succeeded,
            } => {
                let mut effects = vec![settled(&mutation, MutationOutcome::Superseded)];
                effects.extend(self.after_settle(&mutation, succeeded));
                effects
            }
            Settlement::Failed { mutation, error } => self.recover(mutation, error),
        }
    }

    /// Fold a push-channel event.
    pub fn apply_event(&mut self, event: RealtimeEvent) -> bool {
        if event.kind == EventKind::Restored
            && self.deletes.phase(&event.item.id) == DeletePhase::Deleted
        {
            self.deletes.forget(&event.item.id);
        }
        if event.item.board_id == self.board_id {
            self.touch(&event.item.id);
        }
        reducer::apply(&mut self.cache, &self.board_id, event, self.show_deleted)
    }

    fn touch(&mut self, item_id: &str) {
        self.writes += 1;
        self.written.insert(item_id.to_string(), self.writes);
    }

    fn issue(&mut self, item_id: &str, patch: ItemPatch, kind: MutationKind) -> Result<Effect> {
        let seq = self
            .pipeline
            .begin(&mut self.cache, item_id, patch.clone(), kind)?;
        if !self.show_deleted && self.cache.get(item_id).is_some_and(|i| i.deleted) {
            self.cache.remove(item_id);
        }
        Ok(Effect::PatchItem {
            seq,
            item_id: item_id.to_string(),
            patch,
        })
    }

    fn neighbor_order(&self, neighbor: Option<&str>, lane: &LaneKey, moving: &str) -> Result<Option<f64>> {
        let Some(neighbor) = neighbor else {
            return Ok(None);
        };
        self.cache
            .get(neighbor)
            .filter(|item| item.id != moving && item.in_lane(lane))
            .filter(|item| self.show_deleted || !item.deleted)
            .map(|item| Some(item.order))
            .ok_or_else(|| BoardError::NeighborNotInLane {
                neighbor: neighbor.to_string(),
                lane: lane.clone(),
            })
    }

    // Restore the pre-delete snapshot and send the compensating update.
    // While the delete stands on the server, the revive rolls back to the
    // tombstone; a rejected delete rolls back to the live item.
    fn revive(&mut self, snapshot: Item, delete_stands: bool) -> Vec<Effect> {
        let item_id = snapshot.id.clone();
        let base = if delete_stands {
            let deleted_at = self.cache.get(&item_id).and_then(|i| i.deleted_at);
            Item {
                deleted: true,
                deleted_at,
                ..snapshot
            }
        } else {
            snapshot.revived()
        };
        self.cache.upsert(base);
        match self.issue(&item_id, ItemPatch::revive(), MutationKind::Revive) {
            Ok(effect) => vec![effect],
            Err(e) => {
                self.deletes.revive_settled(&item_id);
                if !self.show_deleted && self.cache.get(&item_id).is_some_and(|i| i.deleted) {
                    self.cache.remove(&item_id);
                }
                vec![Effect::Notify(Notice::Warning {
                    message: format!("could not restore {}: {}", item_id, e),
                })]
            }
        }
    }

    fn after_settle(&mut self, mutation: &PendingMutation, succeeded: bool) -> Vec<Effect> {
        match mutation.kind {
            MutationKind::Delete => match self.deletes.delete_settled(&mutation.item_id, succeeded) {
                DeleteResolution::Finalized => vec![Effect::Notify(Notice::DeleteFinalized {
                    item_id: mutation.item_id.clone(),
                })],
                DeleteResolution::AutoUndo(snapshot) => {
                    let mut effects = self.revive(snapshot, false);
                    effects.push(Effect::Notify(Notice::DeleteReverted {
                        item_id: mutation.item_id.clone(),
                        reason: "delete was not accepted by the server".to_string(),
                    }));
                    effects
                }
                DeleteResolution::None => Vec::new(),
            },
            MutationKind::Revive => {
                self.deletes.revive_settled(&mutation.item_id);
                Vec::new()
            }
            MutationKind::Edit | MutationKind::Move => Vec::new(),
        }
    }

    fn recover(&mut self, mutation: PendingMutation, error: BoardError) -> Vec<Effect> {
        let reason = error.to_string();
        match mutation.kind {
            // A failed delete always goes through undo, never plain rollback.
            MutationKind::Delete => {
                let mut effects = self.after_settle(&mutation, false);
                effects.insert(
                    0,
                    settled(
                        &mutation,
                        MutationOutcome::RolledBack {
                            reason: reason.clone(),
                        },
                    ),
                );
                effects
            }
            MutationKind::Revive => {
                self.restore(mutation.snapshot.clone());
                self.deletes.revive_settled(&mutation.item_id);
                vec![
                    settled(&mutation, MutationOutcome::RolledBack { reason: reason.clone() }),
                    Effect::Refetch,
                    Effect::Notify(Notice::Warning {
                        message: format!("undo of {} failed: {}", mutation.item_id, reason),
                    }),
                ]
            }
            MutationKind::Edit | MutationKind::Move => {
                self.restore(mutation.snapshot.clone());
                vec![settled(&mutation, MutationOutcome::RolledBack { reason })]
            }
        }
    }

    // Rollback only touches items still in the working set; an item removed
    // meanwhile (e.g. deleted remotely) stays removed.
    fn restore(&mut self, snapshot: Item) {
        if self.cache.contains(&snapshot.id) {
            self.cache.store(snapshot, self.show_deleted);
        }
    }
}

fn settled(mutation: &PendingMutation, outcome: MutationOutcome) -> Effect {
    Effect::Notify(Notice::Settled {
        item_id: mutation.item_id.clone(),
        seq: mutation.seq,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use crate::test_utils::{TEST_BOARD, item};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn todo() -> LaneKey {
        LaneKey::new("g1", Status::Todo)
    }

    fn board(items: Vec<Item>) -> BoardState {
        let mut state = BoardState::new(TEST_BOARD);
        state.replace_all(items);
        state
    }

    fn patch_seq(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::PatchItem { seq, .. } => Some(*seq),
                _ => None,
            })
            .expect("no patch effect")
    }

    fn window_token(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::StartUndoWindow { token, .. } => Some(*token),
                _ => None,
            })
            .expect("no undo window effect")
    }

    fn ids(items: Vec<Item>) -> Vec<String> {
        items.into_iter().map(|i| i.id).collect()
    }

    fn unavailable() -> BoardError {
        BoardError::Status {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn test_mutation_visible_before_response() {
        let mut state = board(vec![item("a", "g1", Status::Todo, 1.0)]);
        let effects = state.mutate("a", ItemPatch::rename("Draft")).unwrap();

        assert_eq!(state.item("a").unwrap().name, "Draft");
        assert!(matches!(&effects[0], Effect::PatchItem { item_id, .. } if item_id == "a"));
        assert_eq!(state.pending_mutations(), 1);
    }

    #[test]
    fn test_confirmation_replaces_with_server_snapshot() {
        let mut state = board(vec![item("a", "g1", Status::Todo, 1.0)]);
        let seq = patch_seq(&state.mutate("a", ItemPatch::rename("Draft")).unwrap());

        let mut canonical = item("a", "g1", Status::Todo, 42.0);
        canonical.name = "Draft".to_string();
        state.mutation_settled(seq, Ok(canonical.clone()));

        assert_eq!(state.item("a"), Some(&canonical));
        assert_eq!(state.pending_mutations(), 0);
    }

    #[test]
    fn test_stale_response_does_not_clobber_newer_state() {
        let mut state = board(vec![item("a", "g1", Status::Todo, 1.0)]);
        let first = patch_seq(&state.mutate("a", ItemPatch::rename("one")).unwrap());
        let second = patch_seq(&state.mutate("a", ItemPatch::rename("two")).unwrap());

        let mut two = item("a", "g1", Status::Todo, 1.0);
        two.name = "two".to_string();
        state.mutation_settled(second, Ok(two));

        let mut one = item("a", "g1", Status::Todo, 1.0);
        one.name = "one".to_string();
        let effects = state.mutation_settled(first, Ok(one));

        assert_eq!(state.item("a").unwrap().name, "two");
        assert!(effects.contains(&Effect::Notify(Notice::Settled {
            item_id: "a".to_string(),
            seq: first,
            outcome: MutationOutcome::Superseded,
        })));
    }

    #[test]
    fn test_failed_edit_rolls_back() {
        let mut state = board(vec![item("a", "g1", Status::Todo, 1.0)]);
        let seq = patch_seq(&state.mutate("a", ItemPatch::rename("bad")).unwrap());
        state.mutation_settled(seq, Err(unavailable()));
        assert_eq!(state.item("a").unwrap().name, "Task a");
    }

    #[test]
    fn test_move_between_neighbors_uses_midpoint() {
        let mut state = board(vec![
            item("a", "g1", Status::Todo, 1.0),
            item("b", "g1", Status::Todo, 2.0),
            item("m", "g1", Status::Done, 9.0),
        ]);
        let target = MoveTarget::between(todo(), Some("a".into()), Some("b".into()));
        state.move_item("m", &target, now()).unwrap();

        let moved = state.item("m").unwrap();
        assert_eq!(moved.order, 1.5);
        assert_eq!(moved.status, Status::Todo);
        assert_eq!(ids(state.lane_view(&todo())), vec!["a", "m", "b"]);
    }

    #[test]
    fn test_move_rejects_neighbor_from_other_lane() {
        let mut state = board(vec![
            item("a", "g1", Status::Done, 1.0),
            item("m", "g1", Status::Todo, 2.0),
        ]);
        let target = MoveTarget::between(todo(), Some("a".into()), None);
        let err = state.move_item("m", &target, now()).unwrap_err();
        assert!(matches!(err, BoardError::NeighborNotInLane { .. }));
        assert_eq!(state.pending_mutations(), 0);
        assert_eq!(state.item("m").unwrap().order, 2.0);
    }

    #[test]
    fn test_tenth_move_into_lane_requests_compaction() {
        let mut items = vec![
            item("lo", "g1", Status::Todo, 1.0),
            item("hi", "g1", Status::Todo, 2.0),
        ];
        for n in 0..10 {
            items.push(item(&format!("m{}", n), "g2", Status::Todo, n as f64));
        }
        let mut state = board(items);

        let mut before = "hi".to_string();
        for n in 0..10 {
            let id = format!("m{}", n);
            let target = MoveTarget::between(todo(), Some("lo".into()), Some(before.clone()));
            let effects = state.move_item(&id, &target, now()).unwrap();
            let compacts = effects.contains(&Effect::RequestCompaction(todo()));
            if n == 0 {
                assert_eq!(state.item(&id).unwrap().order, 1.5);
            }
            assert_eq!(compacts, n == 9, "insertion {} compaction={}", n + 1, compacts);
            before = id;
        }
    }

    #[test]
    fn test_create_appends_after_last_item() {
        let mut state = board(vec![item("a", "g1", Status::Todo, 3.0)]);
        let effects = state.create_item(&todo(), "New", now());
        let Effect::CreateItem { request_id, draft } = &effects[0] else {
            panic!("expected create effect");
        };
        assert_eq!(draft.order, 4.0);
        assert!(!state.is_settled());

        let mut created = item("n1", "g1", Status::Todo, 4.0);
        created.name = "New".to_string();
        state.create_settled(*request_id, &Ok(created));
        assert_eq!(ids(state.lane_view(&todo())), vec!["a", "n1"]);
        assert!(state.is_settled());
    }

    #[test]
    fn test_create_in_empty_lane_uses_clock() {
        let mut state = board(vec![]);
        let effects = state.create_item(&todo(), "First", now());
        let Effect::CreateItem { draft, .. } = &effects[0] else {
            panic!("expected create effect");
        };
        assert_eq!(draft.order, now().timestamp_millis() as f64);
    }

    #[test]
    fn test_create_confirmation_after_broadcast_keeps_single_copy() {
        let mut state = board(vec![]);
        let effects = state.create_item(&todo(), "New", now());
        let Effect::CreateItem { request_id, .. } = &effects[0] else {
            panic!("expected create effect");
        };
        let created = item("n1", "g1", Status::Todo, 4.0);
        state.apply_event(RealtimeEvent {
            kind: EventKind::Created,
            item: created.clone(),
        });
        state.create_settled(*request_id, &Ok(created));
        assert_eq!(state.cache().len(), 1);
    }

    #[test]
    fn test_failed_delete_restores_item_immediately() {
        let mut state = board(vec![
            item("x", "g1", Status::Todo, 1.0),
            item("y", "g1", Status::Todo, 2.0),
            item("z", "g1", Status::Todo, 3.0),
        ]);
        let effects = state.soft_delete("y", now()).unwrap();
        assert_eq!(ids(state.lane_view(&todo())), vec!["x", "z"]);

        let after = state.mutation_settled(patch_seq(&effects), Err(unavailable()));
        assert_eq!(ids(state.lane_view(&todo())), vec!["x", "y", "z"]);
        assert_eq!(state.item("y").unwrap(), &item("y", "g1", Status::Todo, 2.0));
        assert_eq!(state.delete_phase("y"), DeletePhase::UndoRequested);

        // The compensating update goes through the pipeline.
        let revive_seq = patch_seq(&after);
        assert!(after.iter().any(|e| matches!(
            e,
            Effect::PatchItem { patch, .. } if *patch == ItemPatch::revive()
        )));
        state.mutation_settled(revive_seq, Ok(item("y", "g1", Status::Todo, 2.0)));
        assert_eq!(state.delete_phase("y"), DeletePhase::Active);
    }

    #[test]
    fn test_undo_restores_all_fields() {
        let mut original = item("y", "g1", Status::Doing, 2.0);
        original.assignee = Some("m1".to_string());
        let mut state = board(vec![original.clone()]);

        let effects = state.soft_delete("y", now()).unwrap();
        let delete_seq = patch_seq(&effects);
        assert!(state.item("y").is_none());

        let undo = state.undo_delete("y");
        let revive_seq = patch_seq(&undo);
        assert!(state.undo_delete("y").is_empty());

        // Late delete confirmation is stale against the revive.
        let mut tombstoned = original.clone();
        tombstoned.deleted = true;
        tombstoned.deleted_at = Some(now());
        state.mutation_settled(delete_seq, Ok(tombstoned));

        let mut server = original.clone();
        server.order = 7.0;
        state.mutation_settled(revive_seq, Ok(server));

        let restored = state.item("y").unwrap().clone();
        assert_eq!(Item { order: original.order, ..restored }, original);
        assert_eq!(state.delete_phase("y"), DeletePhase::Active);
    }

    #[test]
    fn test_delete_finalizes_after_window_and_confirmation() {
        let mut state = board(vec![item("y", "g1", Status::Todo, 2.0)]);
        let effects = state.soft_delete("y", now()).unwrap();
        let token = window_token(&effects);

        let mut tombstoned = item("y", "g1", Status::Todo, 2.0);
        tombstoned.deleted = true;
        state.mutation_settled(patch_seq(&effects), Ok(tombstoned));
        assert_eq!(state.delete_phase("y"), DeletePhase::PendingDelete);

        let done = state.undo_window_elapsed("y", token);
        assert_eq!(
            done,
            vec![Effect::Notify(Notice::DeleteFinalized {
                item_id: "y".to_string()
            })]
        );
        assert_eq!(state.delete_phase("y"), DeletePhase::Deleted);
        assert!(state.undo_delete("y").is_empty());
    }

    #[test]
    fn test_double_delete_rejected() {
        let mut state = board(vec![item("y", "g1", Status::Todo, 2.0)]);
        state.soft_delete("y", now()).unwrap();
        assert!(state.soft_delete("y", now()).is_err());
    }

    #[test]
    fn test_delete_with_visible_tombstones_keeps_item() {
        let mut state = board(vec![item("y", "g1", Status::Todo, 2.0)]).with_show_deleted(true);
        state.soft_delete("y", now()).unwrap();
        let y = state.item("y").unwrap();
        assert!(y.deleted);
        assert_eq!(y.deleted_at, Some(now()));
    }

    #[test]
    fn test_refetch_keeps_pending_optimistic_edits() {
        let mut state = board(vec![item("a", "g1", Status::Todo, 1.0)]);
        state.mutate("a", ItemPatch::rename("Local")).unwrap();
        state.replace_all(vec![item("a", "g1", Status::Todo, 1.0), item("b", "g1", Status::Todo, 2.0)]);
        assert_eq!(state.item("a").unwrap().name, "Local");
        assert!(state.item("b").is_some());
    }

    #[test]
    fn test_showing_tombstones_requests_refetch() {
        let mut state = board(vec![]);
        assert_eq!(state.set_show_deleted(true), vec![Effect::Refetch]);
        assert!(state.set_show_deleted(true).is_empty());

        let mut gone = item("a", "g1", Status::Todo, 1.0);
        gone.deleted = true;
        state.replace_all(vec![gone]);
        assert_eq!(state.cache().len(), 1);
        assert!(state.set_show_deleted(false).is_empty());
        assert!(state.cache().is_empty());
    }

    #[test]
    fn test_event_overrides_optimistic_edit_until_response() {
        let mut state = board(vec![item("a", "g1", Status::Todo, 1.0)]);
        let seq = patch_seq(&state.mutate("a", ItemPatch::rename("Mine")).unwrap());

        state.apply_event(RealtimeEvent {
            kind: EventKind::Updated,
            item: item("a", "g1", Status::Todo, 1.0),
        });
        assert_eq!(state.item("a").unwrap().name, "Task a");

        let mut mine = item("a", "g1", Status::Todo, 1.0);
        mine.name = "Mine".to_string();
        state.mutation_settled(seq, Ok(mine));
        assert_eq!(state.item("a").unwrap().name, "Mine");
    }

    #[test]
    fn test_failed_undo_after_confirmed_delete_keeps_tombstone() {
        let mut state = board(vec![item("y", "g1", Status::Todo, 2.0)]);
        let delete_seq = patch_seq(&state.soft_delete("y", now()).unwrap());
        let mut tombstoned = item("y", "g1", Status::Todo, 2.0);
        tombstoned.deleted = true;
        tombstoned.deleted_at = Some(now());
        state.mutation_settled(delete_seq, Ok(tombstoned));

        let revive_seq = patch_seq(&state.undo_delete("y"));
        assert_eq!(ids(state.lane_view(&todo())), vec!["y"]);

        let effects = state.mutation_settled(revive_seq, Err(unavailable()));
        assert!(state.lane_view(&todo()).is_empty());
        assert!(state.item("y").is_none());
        assert!(effects.contains(&Effect::Refetch));
        assert_eq!(state.delete_phase("y"), DeletePhase::Active);
    }

    #[test]
    fn test_failed_undo_with_visible_tombstones_shows_tombstone() {
        let mut state = board(vec![item("y", "g1", Status::Todo, 2.0)]).with_show_deleted(true);
        let delete_seq = patch_seq(&state.soft_delete("y", now()).unwrap());
        let mut tombstoned = item("y", "g1", Status::Todo, 2.0);
        tombstoned.deleted = true;
        tombstoned.deleted_at = Some(now());
        state.mutation_settled(delete_seq, Ok(tombstoned));

        let revive_seq = patch_seq(&state.undo_delete("y"));
        assert!(!state.item("y").unwrap().deleted);

        state.mutation_settled(revive_seq, Err(unavailable()));
        let y = state.item("y").unwrap();
        assert!(y.deleted);
        assert_eq!(y.deleted_at, Some(now()));
    }

    #[test]
    fn test_failed_delete_then_failed_revive_leaves_item_live() {
        let mut state = board(vec![item("y", "g1", Status::Todo, 2.0)]);
        let delete_seq = patch_seq(&state.soft_delete("y", now()).unwrap());

        let effects = state.mutation_settled(delete_seq, Err(unavailable()));
        let revive_seq = patch_seq(&effects);
        state.mutation_settled(revive_seq, Err(unavailable()));

        assert_eq!(ids(state.lane_view(&todo())), vec!["y"]);
    }

    #[test]
    fn test_listing_older_than_confirmation_keeps_confirmed_item() {
        let mut state = board(vec![item("a", "g1", Status::Todo, 1.0)]);
        let mark = state.write_mark();

        let seq = patch_seq(&state.mutate("a", ItemPatch::rename("New")).unwrap());
        let mut confirmed = item("a", "g1", Status::Todo, 1.0);
        confirmed.name = "New".to_string();
        state.mutation_settled(seq, Ok(confirmed));

        // Listing taken before the patch reached the server.
        state.replace_listing(
            vec![item("a", "g1", Status::Todo, 1.0), item("b", "g1", Status::Todo, 2.0)],
            mark,
        );
        assert_eq!(state.item("a").unwrap().name, "New");
        assert!(state.item("b").is_some());

        let mark = state.write_mark();
        let mut newer = item("a", "g1", Status::Todo, 1.0);
        newer.name = "Newer".to_string();
        state.replace_listing(vec![newer], mark);
        assert_eq!(state.item("a").unwrap().name, "Newer");
        assert!(state.item("b").is_none());
    }

    #[test]
    fn test_listing_older_than_event_keeps_event_state() {
        let mut state = board(vec![item("a", "g1", Status::Todo, 1.0)]);
        let mark = state.write_mark();

        let mut deleted = item("a", "g1", Status::Todo, 1.0);
        deleted.deleted = true;
        state.apply_event(RealtimeEvent {
            kind: EventKind::Deleted,
            item: deleted,
        });
        state.apply_event(RealtimeEvent {
            kind: EventKind::Created,
            item: item("c", "g1", Status::Todo, 3.0),
        });

        state.replace_listing(vec![item("a", "g1", Status::Todo, 1.0)], mark);
        assert_eq!(ids(state.lane_view(&todo())), vec!["c"]);
    }

    #[test]
    fn test_listing_prunes_finalized_deletes() {
        let mut state = board(vec![item("y", "g1", Status::Todo, 2.0), item("z", "g1", Status::Todo, 3.0)]);
        for id in ["y", "z"] {
            let effects = state.soft_delete(id, now()).unwrap();
            let mut tombstoned = item(id, "g1", Status::Todo, 2.0);
            tombstoned.deleted = true;
            state.mutation_settled(patch_seq(&effects), Ok(tombstoned));
            state.undo_window_elapsed(id, window_token(&effects));
        }
        assert_eq!(state.delete_phase("y"), DeletePhase::Deleted);

        let mut z = item("z", "g1", Status::Todo, 3.0);
        z.deleted = true;
        state.replace_all(vec![z]);

        assert_eq!(state.delete_phase("y"), DeletePhase::Active);
        assert_eq!(state.delete_phase("z"), DeletePhase::Deleted);
    }
}

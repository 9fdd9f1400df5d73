//! Test utilities for workboards_core
//!
//! Item builders shared by the unit tests, and (with `native-sync`) an
//! in-memory [`MockBoardApi`] that records every call.

use crate::model::{Item, Status};

/// Board id used by test items.
pub const TEST_BOARD: &str = "board-1";

/// Build a live item on [`TEST_BOARD`].
pub fn item(id: &str, group_id: &str, status: Status, order: f64) -> Item {
    Item {
        id: id.to_string(),
        board_id: TEST_BOARD.to_string(),
        group_id: group_id.to_string(),
        name: format!("Task {}", id),
        order,
        status,
        assignee: None,
        due_date: None,
        deleted: false,
        deleted_at: None,
        created_by: None,
        created_at: None,
    }
}

#[cfg(feature = "native-sync")]
pub use mock_api::{ApiCall, MockBoardApi};

#[cfg(feature = "native-sync")]
mod mock_api {
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::api::{BoardApi, BoxFuture};
    use crate::error::{BoardError, Result};
    use crate::model::{
        Board, BoardId, BoardSummary, Bootstrap, Group, ImportReport, Item, ItemId, ItemPatch, LaneKey,
        NewBoard, NewGroup, NewItem,
    };

    /// A recorded API call.
    #[derive(Debug, Clone, PartialEq)]
    pub enum ApiCall {
        ListBoards,
        CreateBoard(NewBoard),
        ListGroups(BoardId),
        CreateGroup(BoardId, NewGroup),
        ListItems(BoardId),
        Patch(ItemId, ItemPatch),
        Create(NewItem),
        Compact(LaneKey),
        Import(String),
    }

    #[derive(Default)]
    struct Inner {
        items: HashMap<ItemId, Item>,
        boards: Vec<Board>,
        groups: Vec<Group>,
        calls: Vec<ApiCall>,
        list_delays: VecDeque<Duration>,
        failing_patches: HashSet<ItemId>,
        fail_compaction: bool,
    }

    /// In-memory board server.
    ///
    /// Patches are applied to the stored items and return the canonical
    /// snapshot, like the real server. Cloning shares the same state.
    #[derive(Clone, Default)]
    pub struct MockBoardApi {
        inner: Arc<Mutex<Inner>>,
        next_id: Arc<AtomicUsize>,
    }

    impl MockBoardApi {
        /// Create an empty mock server.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed the server with an item (builder pattern).
        pub fn with_item(self, item: Item) -> Self {
            self.inner
                .lock()
                .unwrap()
                .items
                .insert(item.id.clone(), item);
            self
        }

        /// Make every patch of `id` fail until cleared.
        pub fn fail_patches_for(&self, id: &str) {
            self.inner
                .lock()
                .unwrap()
                .failing_patches
                .insert(id.to_string());
        }

        /// Let patches of `id` succeed again.
        pub fn clear_failures(&self) {
            self.inner.lock().unwrap().failing_patches.clear();
        }

        /// Hold the next listing for `delay`. The listing reflects the
        /// server state at the time of the request.
        pub fn delay_next_list(&self, delay: Duration) {
            self.inner.lock().unwrap().list_delays.push_back(delay);
        }

        /// Make compaction requests fail.
        pub fn fail_compaction(&self) {
            self.inner.lock().unwrap().fail_compaction = true;
        }

        /// Server-side copy of an item.
        pub fn server_item(&self, id: &str) -> Option<Item> {
            self.inner.lock().unwrap().items.get(id).cloned()
        }

        /// All recorded calls.
        pub fn calls(&self) -> Vec<ApiCall> {
            self.inner.lock().unwrap().calls.clone()
        }

        /// Number of full refetches issued.
        pub fn list_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, ApiCall::ListItems(_)))
                .count()
        }

        /// Number of compaction requests issued.
        pub fn compaction_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, ApiCall::Compact(_)))
                .count()
        }

        fn record(&self, call: ApiCall) {
            self.inner.lock().unwrap().calls.push(call);
        }
    }

    impl BoardApi for MockBoardApi {
        fn bootstrap(&self) -> BoxFuture<'_, Result<Bootstrap>> {
            Box::pin(async move {
                Ok(Bootstrap {
                    workspace_id: "ws-1".to_string(),
                    boards: vec![BoardSummary {
                        id: super::TEST_BOARD.to_string(),
                        name: "Projects".to_string(),
                        description: None,
                        groups: vec![],
                    }],
                })
            })
        }

        fn list_boards(&self) -> BoxFuture<'_, Result<Vec<Board>>> {
            Box::pin(async move {
                self.record(ApiCall::ListBoards);
                Ok(self.inner.lock().unwrap().boards.clone())
            })
        }

        fn create_board(&self, draft: &NewBoard) -> BoxFuture<'_, Result<Board>> {
            let draft = draft.clone();
            Box::pin(async move {
                self.record(ApiCall::CreateBoard(draft.clone()));
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                let board = Board {
                    id: format!("board-new-{}", n),
                    workspace_id: "ws-1".to_string(),
                    name: draft.name,
                    description: draft.description,
                    created_at: None,
                };
                self.inner.lock().unwrap().boards.push(board.clone());
                Ok(board)
            })
        }

        fn list_groups(&self, board_id: &str) -> BoxFuture<'_, Result<Vec<Group>>> {
            let board_id = board_id.to_string();
            Box::pin(async move {
                self.record(ApiCall::ListGroups(board_id.clone()));
                let mut groups: Vec<Group> = self
                    .inner
                    .lock()
                    .unwrap()
                    .groups
                    .iter()
                    .filter(|g| g.board_id == board_id)
                    .cloned()
                    .collect();
                groups.sort_by(|a, b| a.order.total_cmp(&b.order));
                Ok(groups)
            })
        }

        fn create_group(&self, board_id: &str, draft: &NewGroup) -> BoxFuture<'_, Result<Group>> {
            let board_id = board_id.to_string();
            let draft = draft.clone();
            Box::pin(async move {
                self.record(ApiCall::CreateGroup(board_id.clone(), draft.clone()));
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                let group = Group {
                    id: format!("group-new-{}", n),
                    board_id,
                    name: draft.name,
                    order: draft.order,
                };
                self.inner.lock().unwrap().groups.push(group.clone());
                Ok(group)
            })
        }

        fn list_items(&self, board_id: &str) -> BoxFuture<'_, Result<Vec<Item>>> {
            let board_id = board_id.to_string();
            Box::pin(async move {
                self.record(ApiCall::ListItems(board_id.clone()));
                let (items, delay) = {
                    let mut inner = self.inner.lock().unwrap();
                    let items: Vec<Item> = inner
                        .items
                        .values()
                        .filter(|i| i.board_id == board_id)
                        .cloned()
                        .collect();
                    (items, inner.list_delays.pop_front())
                };
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(items)
            })
        }

        fn patch_item(&self, id: &str, patch: &ItemPatch) -> BoxFuture<'_, Result<Item>> {
            let id = id.to_string();
            let patch = patch.clone();
            Box::pin(async move {
                self.record(ApiCall::Patch(id.clone(), patch.clone()));
                let mut inner = self.inner.lock().unwrap();
                if inner.failing_patches.contains(&id) {
                    return Err(BoardError::Status {
                        status: 503,
                        message: "unavailable".to_string(),
                    });
                }
                let item = inner
                    .items
                    .get_mut(&id)
                    .ok_or_else(|| BoardError::ItemNotFound(id.clone()))?;
                patch.apply_to(item);
                Ok(item.clone())
            })
        }

        fn create_item(&self, board_id: &str, draft: &NewItem) -> BoxFuture<'_, Result<Item>> {
            let board_id = board_id.to_string();
            let draft = draft.clone();
            Box::pin(async move {
                self.record(ApiCall::Create(draft.clone()));
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                let item = Item {
                    id: format!("new-{}", n),
                    board_id,
                    group_id: draft.group_id,
                    name: draft.name,
                    order: draft.order,
                    status: draft.status,
                    assignee: None,
                    due_date: None,
                    deleted: false,
                    deleted_at: None,
                    created_by: Some("tester".to_string()),
                    created_at: None,
                };
                self.inner
                    .lock()
                    .unwrap()
                    .items
                    .insert(item.id.clone(), item.clone());
                Ok(item)
            })
        }

        fn request_compaction(&self, _board_id: &str, lane: &LaneKey) -> BoxFuture<'_, Result<()>> {
            let lane = lane.clone();
            Box::pin(async move {
                self.record(ApiCall::Compact(lane));
                if self.inner.lock().unwrap().fail_compaction {
                    return Err(BoardError::Status {
                        status: 500,
                        message: "compaction failed".to_string(),
                    });
                }
                Ok(())
            })
        }

        fn import_items(
            &self,
            _board_id: &str,
            file_name: &str,
            _contents: Vec<u8>,
        ) -> BoxFuture<'_, Result<ImportReport>> {
            let file_name = file_name.to_string();
            Box::pin(async move {
                self.record(ApiCall::Import(file_name));
                Ok(ImportReport {
                    created_count: 2,
                    error_rows: vec![],
                })
            })
        }
    }
}

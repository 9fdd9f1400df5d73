//! Board server API.
//!
//! [`BoardApi`] is the seam between the synchronization core and the server.
//! Methods return boxed futures so the trait stays object-safe and the
//! session can hold any implementation behind an `Arc`.

#[cfg(feature = "native-sync")]
pub mod http;

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::model::{
    Board, Bootstrap, Group, ImportReport, Item, ItemPatch, LaneKey, NewBoard, NewGroup, NewItem,
};

#[cfg(feature = "native-sync")]
pub use http::HttpBoardApi;

/// A boxed future for object-safe async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote operations on boards and items.
pub trait BoardApi: Send + Sync {
    /// Workspace and board metadata for the configured identity.
    fn bootstrap(&self) -> BoxFuture<'_, Result<Bootstrap>>;

    /// Boards of the workspace.
    fn list_boards(&self) -> BoxFuture<'_, Result<Vec<Board>>>;

    /// Create a board in the workspace.
    fn create_board(&self, draft: &NewBoard) -> BoxFuture<'_, Result<Board>>;

    /// Groups of a board in display order.
    fn list_groups(&self, board_id: &str) -> BoxFuture<'_, Result<Vec<Group>>>;

    /// Add a group to a board.
    fn create_group(&self, board_id: &str, draft: &NewGroup) -> BoxFuture<'_, Result<Group>>;

    /// Every item of a board, tombstones included.
    fn list_items(&self, board_id: &str) -> BoxFuture<'_, Result<Vec<Item>>>;

    /// Apply a partial update and return the canonical item.
    fn patch_item(&self, id: &str, patch: &ItemPatch) -> BoxFuture<'_, Result<Item>>;

    /// Create an item and return it with its server-assigned id.
    fn create_item(&self, board_id: &str, draft: &NewItem) -> BoxFuture<'_, Result<Item>>;

    /// Ask the server to renumber a lane with evenly spaced keys.
    fn request_compaction(&self, board_id: &str, lane: &LaneKey) -> BoxFuture<'_, Result<()>>;

    /// Upload a spreadsheet for bulk import.
    fn import_items(
        &self,
        board_id: &str,
        file_name: &str,
        contents: Vec<u8>,
    ) -> BoxFuture<'_, Result<ImportReport>>;
}

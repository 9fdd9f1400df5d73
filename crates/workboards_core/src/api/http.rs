//! HTTP implementation of [`BoardApi`] on top of `reqwest`.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::{BoardApi, BoxFuture};
use crate::error::{BoardError, Result};
use crate::model::{
    Board, Bootstrap, Group, ImportReport, Item, ItemPatch, LaneKey, NewBoard, NewGroup, NewItem,
};

const WORKSPACE_HEADER: &str = "X-Workspace-Id";
const USER_HEADER: &str = "X-User-Id";

/// Board server client.
///
/// Every request carries the workspace and user identity headers the server
/// uses for tenancy.
#[derive(Debug, Clone)]
pub struct HttpBoardApi {
    client: Client,
    base_url: String,
    workspace_id: String,
    user_id: String,
}

impl HttpBoardApi {
    /// Create a client for `base_url` (e.g. `https://boards.example.com`).
    pub fn new(
        base_url: impl Into<String>,
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self::with_client(Client::new(), base_url, workspace_id, user_id)
    }

    /// Create a client reusing an existing `reqwest` client.
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            workspace_id: workspace_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Server base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn identify(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(WORKSPACE_HEADER, &self.workspace_id)
            .header(USER_HEADER, &self.user_id)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.identify(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        log::warn!("[HttpApi] request failed with {}: {}", status, message);
        Err(BoardError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }
}

impl BoardApi for HttpBoardApi {
    fn bootstrap(&self) -> BoxFuture<'_, Result<Bootstrap>> {
        Box::pin(async move { self.fetch(self.client.get(self.url("/bootstrap"))).await })
    }

    fn list_boards(&self) -> BoxFuture<'_, Result<Vec<Board>>> {
        Box::pin(async move { self.fetch(self.client.get(self.url("/boards"))).await })
    }

    fn create_board(&self, draft: &NewBoard) -> BoxFuture<'_, Result<Board>> {
        let request = self.client.post(self.url("/boards")).json(draft);
        Box::pin(async move { self.fetch(request).await })
    }

    fn list_groups(&self, board_id: &str) -> BoxFuture<'_, Result<Vec<Group>>> {
        let url = self.url(&format!("/boards/{}/groups", board_id));
        Box::pin(async move { self.fetch(self.client.get(url)).await })
    }

    fn create_group(&self, board_id: &str, draft: &NewGroup) -> BoxFuture<'_, Result<Group>> {
        let request = self
            .client
            .post(self.url(&format!("/boards/{}/groups", board_id)))
            .json(draft);
        Box::pin(async move { self.fetch(request).await })
    }

    fn list_items(&self, board_id: &str) -> BoxFuture<'_, Result<Vec<Item>>> {
        let url = self.url(&format!("/boards/{}/items", board_id));
        Box::pin(async move {
            let items: Vec<Item> = self.fetch(self.client.get(url)).await?;
            log::debug!("[HttpApi] listed {} items", items.len());
            Ok(items)
        })
    }

    fn patch_item(&self, id: &str, patch: &ItemPatch) -> BoxFuture<'_, Result<Item>> {
        let request = self
            .client
            .patch(self.url(&format!("/items/{}", id)))
            .json(patch);
        Box::pin(async move { self.fetch(request).await })
    }

    fn create_item(&self, board_id: &str, draft: &NewItem) -> BoxFuture<'_, Result<Item>> {
        let request = self
            .client
            .post(self.url(&format!("/boards/{}/items", board_id)))
            .json(draft);
        Box::pin(async move { self.fetch(request).await })
    }

    fn request_compaction(&self, board_id: &str, lane: &LaneKey) -> BoxFuture<'_, Result<()>> {
        let request = self
            .client
            .post(self.url(&format!("/boards/{}/compact", board_id)))
            .json(lane);
        Box::pin(async move {
            self.send(request).await?;
            Ok(())
        })
    }

    fn import_items(
        &self,
        board_id: &str,
        file_name: &str,
        contents: Vec<u8>,
    ) -> BoxFuture<'_, Result<ImportReport>> {
        let url = self.url(&format!("/boards/{}/import", board_id));
        let file_name = file_name.to_string();
        Box::pin(async move {
            let part = reqwest::multipart::Part::bytes(contents).file_name(file_name);
            let form = reqwest::multipart::Form::new().part("file", part);
            self.fetch(self.client.post(url).multipart(form)).await
        })
    }
}

//! Async driver for one open board.
//!
//! [`BoardSession`] owns a [`BoardState`] and runs a single select loop that
//! consumes intents from [`BoardHandle`]s, completions of the I/O it spawned,
//! push-channel events and the fallback poll timer. State is touched only by
//! the loop, so no locking is needed.
//!
//! ```ignore
//! let api = Arc::new(HttpBoardApi::new(url, workspace, user));
//! let (handle, task) = BoardSession::spawn(api, SessionConfig::from_config(&config, "board-1")?);
//! let mut events = handle.subscribe();
//! handle.mutate("item-1", ItemPatch::rename("Ship it")).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::api::BoardApi;
use crate::board::{BoardState, Effect, MoveTarget, Notice};
use crate::cache::compare_rendered;
use crate::config::Config;
use crate::error::{BoardError, Result};
use crate::model::{BoardId, ImportReport, Item, ItemId, ItemPatch, LaneKey};
use crate::reducer::RealtimeEvent;
use crate::transport::push_channel::{self, PushChannelConfig, PushChannelHandle, TransportEvent};
use crate::transport::{ConnectionState, PollingChange, TransportSupervisor, TransportTiming};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Settings for one board session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub board_id: BoardId,
    /// Whether tombstoned items are shown.
    pub show_deleted: bool,
    pub timing: TransportTiming,
    /// How long a soft delete can be undone.
    pub undo_window: Duration,
    /// Push channel to open. Without one the session only polls.
    pub push: Option<PushChannelConfig>,
}

impl SessionConfig {
    /// Polling-only session with default timings.
    pub fn new(board_id: impl Into<BoardId>) -> Self {
        Self {
            board_id: board_id.into(),
            show_deleted: false,
            timing: TransportTiming::default(),
            undo_window: Duration::from_secs(5),
            push: None,
        }
    }

    /// Session for `board_id` with timings and push endpoint from `config`.
    pub fn from_config(config: &Config, board_id: impl Into<BoardId>) -> Result<Self> {
        let board_id = board_id.into();
        let timing = config.sync.timing();
        let push = PushChannelConfig {
            url: push_channel::push_url(&config.server_url, &board_id)?,
            timing,
            reconnect: config.sync.reconnect_policy(),
        };
        Ok(Self {
            board_id,
            show_deleted: false,
            timing,
            undo_window: config.sync.undo_window(),
            push: Some(push),
        })
    }

    /// Set tombstone visibility (builder pattern).
    pub fn with_show_deleted(mut self, show_deleted: bool) -> Self {
        self.show_deleted = show_deleted;
        self
    }
}

/// Something observers may want to re-render for.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The working set changed.
    ItemsChanged,
    /// The push connection changed state.
    Connection(ConnectionState),
    /// A non-blocking notice.
    Notice(Notice),
}

enum Command {
    Mutate {
        item_id: ItemId,
        patch: ItemPatch,
        reply: oneshot::Sender<Result<()>>,
    },
    Move {
        item_id: ItemId,
        target: MoveTarget,
        reply: oneshot::Sender<Result<()>>,
    },
    Create {
        lane: LaneKey,
        name: String,
        reply: oneshot::Sender<Result<Item>>,
    },
    Delete {
        item_id: ItemId,
        reply: oneshot::Sender<Result<()>>,
    },
    Undo {
        item_id: ItemId,
        reply: oneshot::Sender<bool>,
    },
    Lane {
        lane: LaneKey,
        reply: oneshot::Sender<Vec<Item>>,
    },
    Items {
        reply: oneshot::Sender<Vec<Item>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<()>>,
    },
    Import {
        file_name: String,
        contents: Vec<u8>,
        reply: oneshot::Sender<Result<ImportReport>>,
    },
    ShowDeleted {
        show: bool,
        reply: oneshot::Sender<()>,
    },
    Connection {
        reply: oneshot::Sender<ConnectionState>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

enum Completion {
    Patched {
        seq: u64,
        result: Result<Item>,
    },
    Created {
        request_id: u64,
        result: Result<Item>,
    },
    Fetched {
        fetch: u64,
        mark: u64,
        result: Result<Vec<Item>>,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    Imported {
        result: Result<ImportReport>,
        reply: oneshot::Sender<Result<ImportReport>>,
    },
    Compacted {
        lane: LaneKey,
        result: Result<()>,
    },
    UndoWindowElapsed {
        item_id: ItemId,
        token: u64,
    },
}

/// Cloneable handle for talking to a running [`BoardSession`].
///
/// The session stops once every handle is dropped.
#[derive(Clone)]
pub struct BoardHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
}

impl BoardHandle {
    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Optimistically edit an item.
    pub async fn mutate(&self, item_id: impl Into<ItemId>, patch: ItemPatch) -> Result<()> {
        let item_id = item_id.into();
        self.request(|reply| Command::Mutate {
            item_id,
            patch,
            reply,
        })
        .await?
    }

    /// Optimistically move an item.
    pub async fn move_item(&self, item_id: impl Into<ItemId>, target: MoveTarget) -> Result<()> {
        let item_id = item_id.into();
        self.request(|reply| Command::Move {
            item_id,
            target,
            reply,
        })
        .await?
    }

    /// Create an item at the end of `lane` and wait for the server copy.
    pub async fn create_item(&self, lane: LaneKey, name: impl Into<String>) -> Result<Item> {
        let name = name.into();
        self.request(|reply| Command::Create { lane, name, reply })
            .await?
    }

    /// Soft-delete an item and open its undo window.
    pub async fn soft_delete(&self, item_id: impl Into<ItemId>) -> Result<()> {
        let item_id = item_id.into();
        self.request(|reply| Command::Delete { item_id, reply })
            .await?
    }

    /// Undo a pending delete. Returns false if nothing could be undone.
    pub async fn undo_delete(&self, item_id: impl Into<ItemId>) -> Result<bool> {
        let item_id = item_id.into();
        self.request(|reply| Command::Undo { item_id, reply }).await
    }

    /// A lane in rendered order.
    pub async fn lane_view(&self, lane: LaneKey) -> Result<Vec<Item>> {
        self.request(|reply| Command::Lane { lane, reply }).await
    }

    /// Every visible item, grouped by lane in rendered order.
    pub async fn items(&self) -> Result<Vec<Item>> {
        self.request(|reply| Command::Items { reply }).await
    }

    /// Refetch the board and wait for the result.
    pub async fn refresh(&self) -> Result<()> {
        self.request(|reply| Command::Refresh { reply }).await?
    }

    /// Upload a spreadsheet; the board is refetched once it is processed.
    pub async fn import(&self, file_name: impl Into<String>, contents: Vec<u8>) -> Result<ImportReport> {
        let file_name = file_name.into();
        self.request(|reply| Command::Import {
            file_name,
            contents,
            reply,
        })
        .await?
    }

    /// Show or hide tombstoned items.
    pub async fn set_show_deleted(&self, show: bool) -> Result<()> {
        self.request(|reply| Command::ShowDeleted { show, reply })
            .await
    }

    /// Current push connection state.
    pub async fn connection_state(&self) -> Result<ConnectionState> {
        self.request(|reply| Command::Connection { reply }).await
    }

    /// Wait until every mutation and create issued so far has settled.
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| Command::Flush { reply }).await
    }

    /// Stop the session, abandoning all in-flight work.
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| BoardError::SessionClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| BoardError::SessionClosed)?;
        response.await.map_err(|_| BoardError::SessionClosed)
    }
}

/// The event loop of one open board.
pub struct BoardSession<A: BoardApi + 'static> {
    api: Arc<A>,
    state: BoardState,
    supervisor: TransportSupervisor,
    undo_window: Duration,
    push_config: Option<PushChannelConfig>,
    push: Option<PushChannelHandle>,
    commands: mpsc::Receiver<Command>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    tasks: JoinSet<Completion>,
    events: broadcast::Sender<SessionEvent>,
    create_replies: HashMap<u64, oneshot::Sender<Result<Item>>>,
    flush_waiters: Vec<oneshot::Sender<()>>,
    fetch_seq: u64,
    applied_fetch: u64,
}

impl<A: BoardApi + 'static> BoardSession<A> {
    /// Create a session and the first handle to it. Nothing runs until
    /// [`BoardSession::run`] is awaited.
    pub fn new(api: Arc<A>, config: SessionConfig) -> (Self, BoardHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let session = Self {
            api,
            state: BoardState::new(config.board_id).with_show_deleted(config.show_deleted),
            supervisor: TransportSupervisor::new(config.timing),
            undo_window: config.undo_window,
            push_config: config.push,
            push: None,
            commands,
            transport_tx,
            transport_rx,
            tasks: JoinSet::new(),
            events: events.clone(),
            create_replies: HashMap::new(),
            flush_waiters: Vec::new(),
            fetch_seq: 0,
            applied_fetch: 0,
        };
        let handle = BoardHandle {
            commands: command_tx,
            events,
        };
        (session, handle)
    }

    /// Create a session and run it on the current runtime.
    pub fn spawn(api: Arc<A>, config: SessionConfig) -> (BoardHandle, JoinHandle<()>) {
        let (session, handle) = Self::new(api, config);
        (handle, tokio::spawn(session.run()))
    }

    /// Sender for feeding transport events from outside, e.g. a custom
    /// transport in place of the built-in push channel.
    pub fn transport_sender(&self) -> mpsc::UnboundedSender<TransportEvent> {
        self.transport_tx.clone()
    }

    /// Run until every handle is dropped or shutdown is requested.
    pub async fn run(mut self) {
        log::info!("[Session] Opening board {}", self.state.board_id());

        if let Some(config) = self.push_config.clone() {
            self.push = Some(push_channel::spawn(config, self.transport_tx.clone()));
        }
        self.spawn_refetch(None);

        let period = self.supervisor.timing().poll_interval;
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match joined {
                        Ok(completion) => self.handle_completion(completion),
                        Err(e) => log::warn!("[Session] Task ended abnormally: {}", e),
                    }
                    self.release_flush_waiters();
                }
                Some(event) = self.transport_rx.recv() => self.handle_transport(event, &mut poll),
                _ = poll.tick(), if self.supervisor.polling_active() => {
                    log::debug!("[Session] Polling board {}", self.state.board_id());
                    self.spawn_refetch(None);
                }
            }
        }

        self.close();
    }

    fn close(&mut self) {
        log::info!(
            "[Session] Closing board {} ({} tasks abandoned)",
            self.state.board_id(),
            self.tasks.len()
        );
        self.tasks.abort_all();
        if let Some(push) = self.push.take() {
            push.close();
        }
        self.create_replies.clear();
        self.flush_waiters.clear();
    }

    fn release_flush_waiters(&mut self) {
        if self.state.is_settled() {
            for waiter in self.flush_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Mutate {
                item_id,
                patch,
                reply,
            } => {
                let effects = self.state.mutate(&item_id, patch);
                let _ = reply.send(self.run_effects(effects));
            }
            Command::Move {
                item_id,
                target,
                reply,
            } => {
                let effects = self.state.move_item(&item_id, &target, Utc::now());
                let _ = reply.send(self.run_effects(effects));
            }
            Command::Create { lane, name, reply } => {
                let effects = self.state.create_item(&lane, name, Utc::now());
                let request_id = effects.iter().find_map(|effect| match effect {
                    Effect::CreateItem { request_id, .. } => Some(*request_id),
                    _ => None,
                });
                if let Some(request_id) = request_id {
                    self.create_replies.insert(request_id, reply);
                }
                self.execute(effects);
            }
            Command::Delete { item_id, reply } => {
                let effects = self.state.soft_delete(&item_id, Utc::now());
                let _ = reply.send(self.run_effects(effects));
            }
            Command::Undo { item_id, reply } => {
                let effects = self.state.undo_delete(&item_id);
                let undone = !effects.is_empty();
                if undone {
                    self.execute(effects);
                    self.emit(SessionEvent::ItemsChanged);
                }
                let _ = reply.send(undone);
            }
            Command::Lane { lane, reply } => {
                let _ = reply.send(self.state.lane_view(&lane));
            }
            Command::Items { reply } => {
                let _ = reply.send(self.visible_items());
            }
            Command::Refresh { reply } => self.spawn_refetch(Some(reply)),
            Command::Import {
                file_name,
                contents,
                reply,
            } => {
                let api = Arc::clone(&self.api);
                let board_id = self.state.board_id().to_string();
                log::info!("[Session] Importing {} ({} bytes)", file_name, contents.len());
                self.tasks.spawn(async move {
                    let result = api.import_items(&board_id, &file_name, contents).await;
                    Completion::Imported { result, reply }
                });
            }
            Command::ShowDeleted { show, reply } => {
                let effects = self.state.set_show_deleted(show);
                self.execute(effects);
                self.emit(SessionEvent::ItemsChanged);
                let _ = reply.send(());
            }
            Command::Connection { reply } => {
                let _ = reply.send(self.supervisor.state());
            }
            Command::Flush { reply } => {
                self.flush_waiters.push(reply);
                self.release_flush_waiters();
            }
            Command::Shutdown => {}
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Patched { seq, result } => {
                let effects = self.state.mutation_settled(seq, result);
                self.execute(effects);
                self.emit(SessionEvent::ItemsChanged);
            }
            Completion::Created { request_id, result } => {
                let effects = self.state.create_settled(request_id, &result);
                self.execute(effects);
                self.emit(SessionEvent::ItemsChanged);
                if let Some(reply) = self.create_replies.remove(&request_id) {
                    let _ = reply.send(result);
                }
            }
            Completion::Fetched {
                fetch,
                mark,
                result,
                reply,
            } => {
                let outcome = match result {
                    // An older listing must not replace a newer one.
                    Ok(items) if fetch > self.applied_fetch => {
                        self.applied_fetch = fetch;
                        log::debug!("[Session] Refetched {} items", items.len());
                        self.state.replace_listing(items, mark);
                        self.emit(SessionEvent::ItemsChanged);
                        Ok(())
                    }
                    Ok(_) => Ok(()),
                    Err(e) => {
                        log::warn!("[Session] Refetch failed: {}", e);
                        Err(e)
                    }
                };
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            Completion::Imported { result, reply } => {
                match &result {
                    Ok(report) => {
                        log::info!(
                            "[Session] Import created {} items ({} rows rejected)",
                            report.created_count,
                            report.error_rows.len()
                        );
                        self.spawn_refetch(None);
                    }
                    Err(e) => log::warn!("[Session] Import failed: {}", e),
                }
                let _ = reply.send(result);
            }
            Completion::Compacted { lane, result } => match result {
                Ok(()) => log::debug!("[Session] Compacted lane {}", lane),
                Err(e) => log::debug!("[Session] Compaction of {} failed: {}", lane, e),
            },
            Completion::UndoWindowElapsed { item_id, token } => {
                let effects = self.state.undo_window_elapsed(&item_id, token);
                self.execute(effects);
            }
        }
    }

    fn handle_transport(&mut self, event: TransportEvent, poll: &mut Interval) {
        match event {
            TransportEvent::StateChanged(next) => {
                let previous = self.supervisor.state();
                let change = self.supervisor.transition(next);
                if previous != next {
                    self.emit(SessionEvent::Connection(next));
                }
                match change {
                    // Catch up on anything broadcast before the socket was live.
                    Some(PollingChange::Suspend) => self.spawn_refetch(None),
                    Some(PollingChange::Resume) => poll.reset(),
                    None => {}
                }
            }
            TransportEvent::Message(text) => match RealtimeEvent::parse(&text) {
                Ok(event) => {
                    log::debug!("[Session] {:?} for {}", event.kind, event.item.id);
                    if self.state.apply_event(event) {
                        self.emit(SessionEvent::ItemsChanged);
                    }
                }
                Err(e) => log::warn!("[Session] Discarding malformed push message: {}", e),
            },
        }
    }

    fn run_effects(&mut self, effects: Result<Vec<Effect>>) -> Result<()> {
        let effects = effects?;
        self.execute(effects);
        self.emit(SessionEvent::ItemsChanged);
        Ok(())
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PatchItem {
                    seq,
                    item_id,
                    patch,
                } => {
                    let api = Arc::clone(&self.api);
                    self.tasks.spawn(async move {
                        let result = api.patch_item(&item_id, &patch).await;
                        Completion::Patched { seq, result }
                    });
                }
                Effect::CreateItem { request_id, draft } => {
                    let api = Arc::clone(&self.api);
                    let board_id = self.state.board_id().to_string();
                    self.tasks.spawn(async move {
                        let result = api.create_item(&board_id, &draft).await;
                        Completion::Created { request_id, result }
                    });
                }
                Effect::RequestCompaction(lane) => {
                    let api = Arc::clone(&self.api);
                    let board_id = self.state.board_id().to_string();
                    self.tasks.spawn(async move {
                        let result = api.request_compaction(&board_id, &lane).await;
                        Completion::Compacted { lane, result }
                    });
                }
                Effect::StartUndoWindow { item_id, token } => {
                    let window = self.undo_window;
                    self.tasks.spawn(async move {
                        tokio::time::sleep(window).await;
                        Completion::UndoWindowElapsed { item_id, token }
                    });
                }
                Effect::Refetch => self.spawn_refetch(None),
                Effect::Notify(notice) => self.emit(SessionEvent::Notice(notice)),
            }
        }
    }

    fn spawn_refetch(&mut self, reply: Option<oneshot::Sender<Result<()>>>) {
        self.fetch_seq += 1;
        let fetch = self.fetch_seq;
        let mark = self.state.write_mark();
        let api = Arc::clone(&self.api);
        let board_id = self.state.board_id().to_string();
        self.tasks.spawn(async move {
            let result = api.list_items(&board_id).await;
            Completion::Fetched {
                fetch,
                mark,
                result,
                reply,
            }
        });
    }

    fn visible_items(&self) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .state
            .cache()
            .items()
            .filter(|item| self.state.show_deleted() || !item.deleted)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.group_id
                .cmp(&b.group_id)
                .then(a.status.cmp(&b.status))
                .then_with(|| compare_rendered(a, b))
        });
        items
    }

    // No subscribers is fine.
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

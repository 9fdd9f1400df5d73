//! Shared utilities for CLI commands

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use workboards_core::api::{BoardApi, HttpBoardApi};
use workboards_core::{
    BoardError, BoardHandle, BoardSession, Config, Item, MutationOutcome, Notice, SessionConfig,
    SessionEvent,
};

use crate::cli::prefs::Preferences;

/// Errors surfaced by board commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Board(#[from] BoardError),

    #[error("No board selected. Pass --board <id> or run 'workboards prefs board <id>'.")]
    NoBoard,

    #[error("The server rejected the change: {0}")]
    Rejected(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

pub type CliResult<T> = std::result::Result<T, CliError>;

/// Everything a board command needs: config, preferences and an API client.
pub struct Context {
    pub config: Config,
    pub prefs: Preferences,
    pub api: Arc<HttpBoardApi>,
}

impl Context {
    /// Load config and preferences and build the API client.
    pub fn load() -> CliResult<Self> {
        let config = Config::load()?;
        let prefs = Preferences::load()?;
        let (workspace, user) = config.identity()?;
        let api = Arc::new(HttpBoardApi::new(&config.server_url, workspace, user));
        Ok(Self { config, prefs, api })
    }

    /// The board to work on: `--board`, then the saved preference, then the
    /// first board of the workspace.
    pub async fn board_id(&self, board_override: Option<String>) -> CliResult<String> {
        if let Some(id) = board_override.or_else(|| self.prefs.last_board.clone()) {
            return Ok(id);
        }
        let bootstrap = self.api.bootstrap().await?;
        bootstrap
            .boards
            .into_iter()
            .next()
            .map(|board| board.id)
            .ok_or(CliError::NoBoard)
    }

    /// Session settings for `board_id` honoring the saved preferences.
    pub fn session_config(&self, board_id: &str) -> CliResult<SessionConfig> {
        Ok(SessionConfig::from_config(&self.config, board_id)?
            .with_show_deleted(self.prefs.show_deleted))
    }

    /// Polling-only session with the board already loaded, for one-shot
    /// commands.
    pub async fn open_board(&self, board_id: &str) -> CliResult<BoardHandle> {
        let mut config = self.session_config(board_id)?;
        config.push = None;
        let (handle, _task) = BoardSession::spawn(Arc::clone(&self.api), config);
        handle.refresh().await?;
        Ok(handle)
    }
}

/// Notices already delivered on `events`.
pub fn drain_notices(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<Notice> {
    let mut notices = Vec::new();
    loop {
        match events.try_recv() {
            Ok(SessionEvent::Notice(notice)) => notices.push(notice),
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return notices,
        }
    }
}

/// Turn the notices about `item_id` into an error if any change was undone.
pub fn check_settled(notices: &[Notice], item_id: &str) -> CliResult<()> {
    for notice in notices {
        match notice {
            Notice::Settled {
                item_id: id,
                outcome: MutationOutcome::RolledBack { reason },
                ..
            }
            | Notice::DeleteReverted { item_id: id, reason } if id == item_id => {
                return Err(CliError::Rejected(reason.clone()));
            }
            Notice::Warning { message } => log::warn!("{}", message),
            _ => {}
        }
    }
    Ok(())
}

/// Print items grouped by lane. Items must already be sorted by lane.
pub fn print_lanes(items: &[Item]) {
    if items.is_empty() {
        println!("(no items)");
        return;
    }
    let mut current = None;
    for item in items {
        let lane = item.lane();
        if current.as_ref() != Some(&lane) {
            if current.is_some() {
                println!();
            }
            println!("{} / {}", lane.group_id, lane.status);
            current = Some(lane);
        }
        println!("  {}", describe(item));
    }
}

/// One-line rendering of an item.
pub fn describe(item: &Item) -> String {
    let mut line = format!("[{}] {}", item.id, item.name);
    if let Some(assignee) = &item.assignee {
        line.push_str(&format!(" @{}", assignee));
    }
    if let Some(due) = item.due_date {
        line.push_str(&format!(" (due {})", due));
    }
    if item.deleted {
        line.push_str(" (deleted)");
    }
    line
}

//! `boards`, `board`, `group` and `watch` commands

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use workboards_core::api::BoardApi;
use workboards_core::model::{NewBoard, NewGroup};
use workboards_core::{BoardError, BoardHandle, BoardSession, Notice, SessionEvent};

use crate::cli::args::{BoardCommands, GroupCommands};
use crate::cli::util::{CliResult, Context, describe, print_lanes};

/// List the workspace's boards and their groups.
pub async fn handle_boards(ctx: &Context) -> CliResult<()> {
    let bootstrap = ctx.api.bootstrap().await?;
    println!("Workspace: {}", bootstrap.workspace_id);
    if bootstrap.boards.is_empty() {
        println!("(no boards)");
        return Ok(());
    }

    for board in &bootstrap.boards {
        let marker = if ctx.prefs.last_board.as_deref() == Some(board.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!();
        println!("{} {} [{}]", marker, board.name, board.id);
        if let Some(description) = &board.description {
            println!("    {}", description);
        }
        let mut groups = board.groups.clone();
        groups.sort_by(|a, b| a.order.total_cmp(&b.order));
        for group in groups {
            println!("    - {} [{}]", group.name, group.id);
        }
    }
    Ok(())
}

/// Handle `board` subcommands.
pub async fn handle_board_command(ctx: &Context, command: BoardCommands) -> CliResult<()> {
    match command {
        BoardCommands::List => {
            let boards = ctx.api.list_boards().await?;
            if boards.is_empty() {
                println!("(no boards)");
            }
            for board in boards {
                match &board.description {
                    Some(description) => println!("{} [{}] - {}", board.name, board.id, description),
                    None => println!("{} [{}]", board.name, board.id),
                }
            }
        }
        BoardCommands::Create { name, description } => {
            let board = ctx.api.create_board(&NewBoard { name, description }).await?;
            println!("✓ Created board '{}' [{}]", board.name, board.id);
            println!("  Run 'workboards prefs board {}' to make it the default", board.id);
        }
    }
    Ok(())
}

/// Handle `group` subcommands for `board_id`.
pub async fn handle_group_command(ctx: &Context, board_id: &str, command: GroupCommands) -> CliResult<()> {
    match command {
        GroupCommands::List => {
            let groups = ctx.api.list_groups(board_id).await?;
            if groups.is_empty() {
                println!("(no groups)");
            }
            for group in groups {
                println!("{} [{}]", group.name, group.id);
            }
        }
        GroupCommands::Create { name, order } => {
            let group = ctx.api.create_group(board_id, &NewGroup { name, order }).await?;
            println!("✓ Created group '{}' [{}] on board {}", group.name, group.id, board_id);
        }
    }
    Ok(())
}

/// Follow a board over the push channel and reprint it on every change.
pub async fn handle_watch(ctx: &Context, board_override: Option<String>) -> CliResult<()> {
    let board_id = ctx.board_id(board_override).await?;
    let config = ctx.session_config(&board_id)?;
    let (handle, mut task) = BoardSession::spawn(Arc::clone(&ctx.api), config);
    let mut events = handle.subscribe();

    println!("Watching board {} (Ctrl+C to stop)", board_id);
    handle.refresh().await?;
    render(&handle).await?;

    let shutdown = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                println!("\nShutting down...");
                let _ = shutdown.shutdown().await;
            }
            Err(e) => eprintln!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    loop {
        let rendered = tokio::select! {
            _ = &mut task => break,
            event = events.recv() => match event {
                Ok(SessionEvent::ItemsChanged) => render(&handle).await,
                Ok(SessionEvent::Connection(state)) => {
                    println!("-- {}", state);
                    Ok(())
                }
                Ok(SessionEvent::Notice(notice)) => {
                    report(&notice);
                    Ok(())
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("Skipped {} session events", skipped);
                    render(&handle).await
                }
                Err(RecvError::Closed) => break,
            },
        };
        match rendered {
            Ok(()) => {}
            // Ctrl+C raced the redraw.
            Err(BoardError::SessionClosed) => break,
            Err(e) => return Err(e.into()),
        }
    }

    println!("Stopped watching.");
    Ok(())
}

async fn render(handle: &BoardHandle) -> workboards_core::Result<()> {
    let items = handle.items().await?;
    println!();
    print_lanes(&items);
    Ok(())
}

fn report(notice: &Notice) {
    match notice {
        Notice::Created { item } => println!("+ {}", describe(item)),
        Notice::CreateFailed { name, reason } => eprintln!("✗ Could not create '{}': {}", name, reason),
        Notice::DeleteFinalized { item_id } => println!("- {} deleted", item_id),
        Notice::DeleteReverted { item_id, reason } => {
            eprintln!("✗ Delete of {} reverted: {}", item_id, reason)
        }
        Notice::Warning { message } => eprintln!("! {}", message),
        Notice::Settled { .. } => {}
    }
}

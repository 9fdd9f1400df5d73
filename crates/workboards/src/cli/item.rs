//! Item commands: add, move, edit, delete and import

use std::path::Path;
use std::time::Duration;

use workboards_core::model::ImportReport;
use workboards_core::{BoardError, ItemPatch, LaneKey, MoveTarget, Notice, SessionEvent, Status};

use crate::cli::util::{CliError, CliResult, Context, check_settled, describe, drain_notices};

/// Extra time allowed past the undo window for the delete to settle.
const DELETE_GRACE: Duration = Duration::from_secs(30);

/// Create an item at the end of a lane.
pub async fn handle_add(
    ctx: &Context,
    board_id: &str,
    name: String,
    group: String,
    status: Status,
) -> CliResult<()> {
    let board = ctx.open_board(board_id).await?;
    let item = board.create_item(LaneKey::new(group, status), name).await?;
    println!("✓ Created {}", describe(&item));
    Ok(())
}

/// Apply one patch and wait for the server to accept it.
pub async fn handle_patch(
    ctx: &Context,
    board_id: &str,
    item_id: String,
    patch: ItemPatch,
) -> CliResult<()> {
    let board = ctx.open_board(board_id).await?;
    let mut events = board.subscribe();

    board.mutate(item_id.clone(), patch).await?;
    board.flush().await?;
    check_settled(&drain_notices(&mut events), &item_id)?;

    let items = board.items().await?;
    match items.iter().find(|item| item.id == item_id) {
        Some(item) => println!("✓ Updated {}", describe(item)),
        None => println!("✓ Updated {}", item_id),
    }
    Ok(())
}

/// Move an item into a lane, optionally between two neighbors.
pub async fn handle_move(
    ctx: &Context,
    board_id: &str,
    item_id: String,
    target: MoveTarget,
) -> CliResult<()> {
    let board = ctx.open_board(board_id).await?;
    let mut events = board.subscribe();
    let lane = target.lane.clone();

    board.move_item(item_id.clone(), target).await?;
    board.flush().await?;
    check_settled(&drain_notices(&mut events), &item_id)?;

    println!("✓ Moved {} to {}", item_id, lane);
    Ok(())
}

/// Soft-delete an item. With `undo`, revert it right away; otherwise wait
/// out the undo window so the delete is final when the command returns.
pub async fn handle_delete(
    ctx: &Context,
    board_id: &str,
    item_id: String,
    undo: bool,
) -> CliResult<()> {
    let board = ctx.open_board(board_id).await?;
    let mut events = board.subscribe();

    board.soft_delete(item_id.clone()).await?;

    if undo {
        if !board.undo_delete(item_id.clone()).await? {
            return Err(CliError::Rejected("the undo window has closed".to_string()));
        }
        board.flush().await?;
        check_settled(&drain_notices(&mut events), &item_id)?;
        println!("✓ Delete of {} undone", item_id);
        return Ok(());
    }

    let window = ctx.config.sync.undo_window();
    println!("Deleting {} (final in {}s)...", item_id, window.as_secs());
    let wait = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Notice(Notice::DeleteFinalized { item_id: id })) if id == item_id => {
                    return Ok(());
                }
                Ok(SessionEvent::Notice(Notice::DeleteReverted { item_id: id, reason }))
                    if id == item_id =>
                {
                    return Err(CliError::Rejected(reason));
                }
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return Err(BoardError::SessionClosed.into());
                }
            }
        }
    };
    tokio::time::timeout(window + DELETE_GRACE, wait)
        .await
        .map_err(|_| CliError::Timeout("the delete to settle"))??;

    println!("✓ Deleted {}", item_id);
    Ok(())
}

/// Upload a spreadsheet and print the import report.
pub async fn handle_import(ctx: &Context, board_id: &str, file: &Path) -> CliResult<()> {
    let contents = std::fs::read(file).map_err(|e| BoardError::FileRead {
        path: file.to_path_buf(),
        source: e,
    })?;
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "import.xlsx".to_string());

    let board = ctx.open_board(board_id).await?;
    let report = board.import(file_name, contents).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &ImportReport) {
    println!("✓ Imported {} items", report.created_count);
    if !report.error_rows.is_empty() {
        println!("{} rows skipped:", report.error_rows.len());
        for row in &report.error_rows {
            println!("  row {}: {}", row.row_number, row.reason);
        }
    }
}

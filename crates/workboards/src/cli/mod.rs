/// Clap argument definitions
mod args;

/// `boards`, `board`, `group` and `watch` commands
mod board;

/// Config command handlers
mod config;

/// Item commands
mod item;

/// Local preferences
mod prefs;

/// Shared CLI utilities
mod util;

use clap::Parser;
use std::future::Future;

use workboards_core::{ItemPatch, LaneKey, MoveTarget};

pub use args::Cli;
use args::Commands;
use util::{CliResult, Context};

/// Main entry point for the CLI
pub fn run_cli() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let board_override = cli.board;

    let success = match cli.command {
        Commands::Config { command } => config::handle_config_command(command),

        Commands::Prefs { command } => prefs::handle_prefs_command(command),

        Commands::Boards => run(|ctx| async move { board::handle_boards(&ctx).await }),

        Commands::Board { command } => {
            run(|ctx| async move { board::handle_board_command(&ctx, command).await })
        }

        Commands::Group { command } => run(|ctx| async move {
            let board_id = ctx.board_id(board_override).await?;
            board::handle_group_command(&ctx, &board_id, command).await
        }),

        Commands::Watch => run(|ctx| async move { board::handle_watch(&ctx, board_override).await }),

        Commands::Add {
            name,
            group,
            status,
        } => run(|ctx| async move {
            let board_id = ctx.board_id(board_override).await?;
            item::handle_add(&ctx, &board_id, name, group, status).await
        }),

        Commands::Move {
            item,
            group,
            status,
            after,
            before,
        } => run(|ctx| async move {
            let board_id = ctx.board_id(board_override).await?;
            let target = MoveTarget::between(LaneKey::new(group, status), after, before);
            item::handle_move(&ctx, &board_id, item, target).await
        }),

        Commands::Rename { item, name } => patch(board_override, item, ItemPatch::rename(name)),

        Commands::Status { item, status } => patch(board_override, item, ItemPatch::status(status)),

        Commands::Assign { item, member } => patch(board_override, item, ItemPatch::assign(member)),

        Commands::Due { item, date } => patch(board_override, item, ItemPatch::due(date)),

        Commands::Delete { item, undo } => run(|ctx| async move {
            let board_id = ctx.board_id(board_override).await?;
            item::handle_delete(&ctx, &board_id, item, undo).await
        }),

        Commands::Import { file } => run(|ctx| async move {
            let board_id = ctx.board_id(board_override).await?;
            item::handle_import(&ctx, &board_id, &file).await
        }),
    };

    if !success {
        std::process::exit(1);
    }
}

fn patch(board_override: Option<String>, item_id: String, patch: ItemPatch) -> bool {
    run(|ctx| async move {
        let board_id = ctx.board_id(board_override).await?;
        item::handle_patch(&ctx, &board_id, item_id, patch).await
    })
}

/// Load the command context and drive `command` on a fresh runtime.
/// Returns true on success.
fn run<F, Fut>(command: F) -> bool
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = CliResult<()>>,
{
    let ctx = match Context::load() {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("✗ {}", e);
            return false;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("✗ Failed to create Tokio runtime: {}", e);
            return false;
        }
    };

    match runtime.block_on(command(ctx)) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

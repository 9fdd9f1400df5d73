//! Command-line argument structures and enums

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use workboards_core::Status;

#[derive(Parser)]
#[command(name = "workboards")]
#[command(version)]
#[command(about = "Edit shared task boards from the terminal", long_about = None)]
pub struct Cli {
    /// Board to operate on (defaults to the last used board)
    #[arg(short, long, global = true)]
    pub board: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List boards and their groups
    Boards,

    /// Create or list boards
    Board {
        #[command(subcommand)]
        command: BoardCommands,
    },

    /// Create or list groups of a board
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },

    /// Follow a board live until Ctrl+C
    Watch,

    /// Add an item at the end of a lane
    Add {
        /// Item name
        name: String,

        /// Group (row) to add the item to
        #[arg(short, long)]
        group: String,

        /// Status column
        #[arg(short, long, default_value_t = Status::Todo)]
        status: Status,
    },

    /// Move an item to a lane, optionally between two neighbors
    #[command(alias = "mv")]
    Move {
        /// Item id
        item: String,

        /// Destination group
        #[arg(short, long)]
        group: String,

        /// Destination status column
        #[arg(short, long)]
        status: Status,

        /// Place directly after this item
        #[arg(long)]
        after: Option<String>,

        /// Place directly before this item
        #[arg(long)]
        before: Option<String>,
    },

    /// Rename an item
    Rename {
        /// Item id
        item: String,

        /// New name
        name: String,
    },

    /// Change an item's status
    Status {
        /// Item id
        item: String,

        /// New status (Todo, Doing, Done)
        status: Status,
    },

    /// Assign an item to a member, or clear the assignee
    Assign {
        /// Item id
        item: String,

        /// Member id (omit to unassign)
        member: Option<String>,
    },

    /// Set or clear an item's due date
    Due {
        /// Item id
        item: String,

        /// Due date as YYYY-MM-DD (omit to clear)
        date: Option<NaiveDate>,
    },

    /// Delete an item
    #[command(alias = "rm")]
    Delete {
        /// Item id
        item: String,

        /// Undo the delete right away (while the undo window is open)
        #[arg(long)]
        undo: bool,
    },

    /// Bulk import items from a spreadsheet
    Import {
        /// Spreadsheet to upload
        file: PathBuf,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show or change local preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },
}

#[derive(Subcommand)]
pub enum BoardCommands {
    /// List boards in the workspace
    List,

    /// Create a board
    Create {
        /// Board name
        name: String,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum GroupCommands {
    /// List groups of the board in display order
    List,

    /// Add a group to the board
    Create {
        /// Group name
        name: String,

        /// Position among the board's groups
        #[arg(short, long, default_value_t = 0.0)]
        order: f64,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Key (server_url, workspace_id, user_id, or a sync.* timing)
        key: String,

        /// New value
        value: String,
    },
}

#[derive(Subcommand)]
pub enum PrefsCommands {
    /// Show current preferences
    Show,

    /// Show or hide deleted items
    ShowDeleted {
        /// true or false
        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        value: bool,
    },

    /// Set the default board
    Board {
        /// Board id
        id: String,
    },
}

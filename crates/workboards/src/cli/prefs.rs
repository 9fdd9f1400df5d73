//! Local UI preferences, kept apart from the shared config

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use workboards_core::{BoardError, Config, Result};

use crate::cli::args::PrefsCommands;

/// Per-machine preferences that never leave this client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Board used when `--board` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_board: Option<String>,

    /// Whether deleted items are listed.
    #[serde(default)]
    pub show_deleted: bool,
}

impl Preferences {
    /// `preferences.toml` next to the config file.
    pub fn path() -> Option<PathBuf> {
        Config::config_path().and_then(|p| p.parent().map(|dir| dir.join("preferences.toml")))
    }

    /// Load preferences, falling back to defaults when none are saved.
    pub fn load() -> Result<Self> {
        match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BoardError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or(BoardError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Handle `prefs` subcommands. Returns true on success.
pub fn handle_prefs_command(command: PrefsCommands) -> bool {
    let mut prefs = match Preferences::load() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("✗ Error loading preferences: {}", e);
            return false;
        }
    };

    match command {
        PrefsCommands::Show => {
            show_prefs(&prefs);
            return true;
        }
        PrefsCommands::ShowDeleted { value } => prefs.show_deleted = value,
        PrefsCommands::Board { id } => prefs.last_board = Some(id),
    }

    match prefs.save() {
        Ok(()) => {
            println!("✓ Preferences saved");
            show_prefs(&prefs);
            true
        }
        Err(e) => {
            eprintln!("✗ Error saving preferences: {}", e);
            false
        }
    }
}

fn show_prefs(prefs: &Preferences) {
    println!(
        "Board: {}",
        prefs.last_board.as_deref().unwrap_or("(not set)")
    );
    println!("Show deleted: {}", prefs.show_deleted);
}

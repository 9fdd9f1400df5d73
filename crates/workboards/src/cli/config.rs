//! Config command handlers

use workboards_core::Config;

use crate::cli::args::ConfigCommands;

/// Handle `config` subcommands. Returns true on success.
pub fn handle_config_command(command: ConfigCommands) -> bool {
    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ Error loading config: {}", e);
            return false;
        }
    };

    match command {
        ConfigCommands::Show => {
            show_config(&config);
            true
        }
        ConfigCommands::Set { key, value } => {
            if let Err(e) = set_config_value(&mut config, &key, &value) {
                eprintln!("✗ {}", e);
                return false;
            }
            match config.save() {
                Ok(()) => {
                    println!("✓ Set {} = {}", key, value);
                    true
                }
                Err(e) => {
                    eprintln!("✗ Error saving config: {}", e);
                    false
                }
            }
        }
    }
}

fn show_config(config: &Config) {
    println!("WorkBoards Configuration");
    println!("========================");
    println!("Server: {}", config.server_url);
    println!(
        "Workspace ID: {}",
        config.workspace_id.as_deref().unwrap_or("(not configured)")
    );
    println!(
        "User ID: {}",
        config.user_id.as_deref().unwrap_or("(not configured)")
    );
    println!();
    println!("Sync");
    println!("  Heartbeat interval: {}s", config.sync.heartbeat_interval_secs);
    println!("  Heartbeat timeout: {}s", config.sync.heartbeat_timeout_secs);
    println!("  Poll interval: {}s", config.sync.poll_interval_secs);
    println!("  Undo window: {}s", config.sync.undo_window_secs);
    println!("  Max reconnect attempts: {}", config.sync.max_reconnect_attempts);
    if let Some(path) = Config::config_path() {
        println!();
        println!("Config file: {}", path.display());
    }
}

/// Apply `key = value` to `config`.
pub fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<(), String> {
    match key {
        "server_url" => config.server_url = value.trim_end_matches('/').to_string(),
        "workspace_id" => config.workspace_id = non_empty(value),
        "user_id" => config.user_id = non_empty(value),
        "sync.heartbeat_interval_secs" => config.sync.heartbeat_interval_secs = seconds(key, value)?,
        "sync.heartbeat_timeout_secs" => config.sync.heartbeat_timeout_secs = seconds(key, value)?,
        "sync.poll_interval_secs" => config.sync.poll_interval_secs = seconds(key, value)?,
        "sync.undo_window_secs" => config.sync.undo_window_secs = seconds(key, value)?,
        "sync.max_reconnect_attempts" => {
            config.sync.max_reconnect_attempts = value
                .parse()
                .map_err(|_| format!("{} expects a whole number, got '{}'", key, value))?
        }
        _ => {
            return Err(format!(
                "Unknown config key '{}'. Valid keys: server_url, workspace_id, user_id, \
                 sync.heartbeat_interval_secs, sync.heartbeat_timeout_secs, \
                 sync.poll_interval_secs, sync.undo_window_secs, sync.max_reconnect_attempts",
                key
            ));
        }
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn seconds(key: &str, value: &str) -> Result<u64, String> {
    match value.parse::<u64>() {
        Ok(0) | Err(_) => Err(format!("{} expects a positive number of seconds, got '{}'", key, value)),
        Ok(secs) => Ok(secs),
    }
}

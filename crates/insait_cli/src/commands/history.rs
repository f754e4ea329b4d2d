//! Watch history commands.

use anyhow::{bail, Result};
use console::style;
use insait_store::{SessionManager, StoreStatus};
use std::path::Path;

fn open_writable(data_dir: Option<&Path>) -> Result<SessionManager> {
    let manager = super::open_manager(data_dir)?;
    if manager.is_locked() {
        bail!("Session store is in use by another process; close the player and retry");
    }
    if manager.status() == StoreStatus::Disabled {
        bail!("Session store is disabled; nothing can be written");
    }
    Ok(manager)
}

/// List history entries.
pub fn list(
    data_dir: Option<&Path>,
    search: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut manager = super::open_manager(data_dir)?;
    let mut items = match search {
        Some(query) => manager.search_history(query),
        None => manager.get_history(),
    };
    if let Some(limit) = limit {
        items.truncate(limit);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("{}", style("No history entries.").dim());
        return Ok(());
    }

    for item in &items {
        println!(
            "{:>5}  {}  {:>9}  {:>4.0}%  {}",
            style(item.id).cyan(),
            super::format_millis(item.watched_at),
            super::format_duration(item.last_time),
            item.last_position * 100.0,
            item.file_path
        );
    }
    println!();
    println!("{} entries", items.len());
    Ok(())
}

/// Record a watched file.
pub fn add(data_dir: Option<&Path>, path: &str, position: f32, time: i64) -> Result<()> {
    if path.is_empty() {
        bail!("Path must not be empty");
    }
    let mut manager = open_writable(data_dir)?;
    manager.add_to_history(path, position.clamp(0.0, 1.0), time);
    println!("{} Recorded {}", style("✓").green(), path);
    Ok(())
}

/// Delete one entry.
pub fn delete(data_dir: Option<&Path>, id: u64) -> Result<()> {
    let mut manager = open_writable(data_dir)?;
    if !manager.delete_history_item(id) {
        bail!("No history entry with id {}", id);
    }
    println!("{} Deleted entry {}", style("✓").green(), id);
    Ok(())
}

/// Delete every entry.
pub fn clear(data_dir: Option<&Path>) -> Result<()> {
    let mut manager = open_writable(data_dir)?;
    let count = manager.history_len();
    manager.clear_history();
    println!("{} Cleared {} history entries", style("✓").green(), count);
    Ok(())
}

//! Status command.

use anyhow::Result;
use console::style;
use insait_store::StoreStatus;
use std::path::Path;

/// Show store status.
pub fn run(data_dir: Option<&Path>) -> Result<()> {
    let mut manager = super::open_manager(data_dir)?;
    let config = manager.config().clone();

    println!("{}", style("Insait Store Status").bold());
    println!();
    let status = manager.status();
    println!(
        "  Store:       {}",
        match status {
            StoreStatus::Open => style(status.to_string()).green(),
            StoreStatus::Disabled => style(status.to_string()).red(),
        }
    );
    println!(
        "  Key source:  {}",
        manager
            .key_source()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!(
        "  Key id:      {}",
        manager.key_fingerprint().unwrap_or_else(|| "-".to_string())
    );
    println!();
    println!("  Data dir:    {}", config.data_dir.display());
    println!("  Store file:  {}", config.database_path().display());
    println!("  Key file:    {}", config.key_path().display());
    println!();

    let session = manager.load_session();
    println!(
        "  History:     {} / {} entries",
        style(manager.history_len()).cyan(),
        config.history.max_items
    );
    match session {
        Some(session) => println!(
            "  Session:     {} tab(s), saved {}",
            style(session.tabs.len()).cyan(),
            super::format_millis(session.last_saved)
        ),
        None => println!("  Session:     {}", style("none").dim()),
    }

    if manager.is_locked() {
        println!();
        println!(
            "{} Store is in use by another process. Close the player to inspect it.",
            style("⚠").yellow().bold()
        );
    } else if status == StoreStatus::Disabled {
        println!();
        println!(
            "{} Persistence is disabled. Run with RUST_LOG=debug for details.",
            style("⚠").yellow().bold()
        );
    }

    Ok(())
}

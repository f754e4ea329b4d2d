//! Reset command.

use anyhow::Result;
use console::style;
use insait_store::StoreStatus;
use std::io::{self, Write};
use std::path::Path;

/// Delete the store and key, then start over.
pub fn run(data_dir: Option<&Path>, yes: bool) -> Result<()> {
    let mut manager = super::open_manager(data_dir)?;

    if !yes {
        println!();
        println!(
            "{} {}",
            style("⚠").yellow().bold(),
            style("WARNING:").yellow().bold()
        );
        println!("  Reset permanently deletes the saved session, the watch history");
        println!("  and the encryption key in {}.", manager.config().data_dir.display());
        println!();

        print!("Continue with reset? [y/N]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{} Reset cancelled.", style("✓").green());
            return Ok(());
        }
    }

    manager.reset();
    if manager.is_locked() {
        anyhow::bail!("Session store is in use by another process; nothing was deleted");
    }
    match manager.status() {
        StoreStatus::Open => println!(
            "{} Store recreated (key {})",
            style("✓").green(),
            manager.key_fingerprint().unwrap_or_default()
        ),
        StoreStatus::Disabled => anyhow::bail!("Store could not be recreated; persistence is disabled"),
    }
    Ok(())
}

//! Saved session commands.

use anyhow::Result;
use console::style;
use std::path::Path;

/// Show the saved session.
pub fn show(data_dir: Option<&Path>, json: bool) -> Result<()> {
    let mut manager = super::open_manager(data_dir)?;
    let session = manager.load_session();

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    let Some(session) = session else {
        println!("{}", style("No saved session.").dim());
        return Ok(());
    };

    println!("Session:  {}", session.session_id);
    println!("Snapshot: {}", session.snapshot_id);
    println!("Saved:    {}", super::format_millis(session.last_saved));
    println!("Volume:   {}", session.volume);
    if let Some(device) = &session.selected_audio_device_id {
        println!("Device:   {}", device);
    }
    if let Some(language) = &session.selected_language_code {
        println!("Language: {}", language);
    }
    println!();

    for tab in &session.tabs {
        let marker = if tab.tab_order == session.active_tab_order {
            style("*").green().bold()
        } else {
            style(" ")
        };
        println!(
            "{} {:>3}  {}  {}",
            marker,
            tab.tab_order,
            style(&tab.title).bold(),
            tab.file_path
                .as_deref()
                .map(|p| style(p.to_string()))
                .unwrap_or_else(|| style("(no file)".to_string()).dim())
        );
    }
    Ok(())
}

/// Delete the saved session.
pub fn clear(data_dir: Option<&Path>) -> Result<()> {
    let mut manager = super::open_manager(data_dir)?;
    manager.clear_session();
    println!("{} Session cleared", style("✓").green());
    Ok(())
}

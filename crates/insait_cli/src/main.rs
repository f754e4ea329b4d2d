//! Insait Store CLI - maintenance tool for the player's session and history store.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "insait-store")]
#[command(about = "Inspect and maintain the Insait player's encrypted store", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory (defaults to the per-user local data directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store status, key source and entry counts
    Status,
    /// Watch history commands
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Saved session commands
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Delete the store and key and start over
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List history entries, newest first
    List {
        /// Only entries whose file name or path contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Record a watched file
    Add {
        /// File path
        path: String,
        /// Playback position (0.0 - 1.0)
        #[arg(long, default_value = "0")]
        position: f32,
        /// Playback time in milliseconds
        #[arg(long, default_value = "0")]
        time: i64,
    },
    /// Delete one entry by id
    Delete {
        /// Entry id as shown by `history list`
        id: u64,
    },
    /// Delete every entry
    Clear,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Show the saved session
    Show {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Delete the saved session
    Clear,
}

fn main() -> Result<()> {
    // Initialize tracing subscriber
    // Respects RUST_LOG environment variable (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.as_deref();

    match cli.command {
        Commands::Status => commands::status::run(data_dir),
        Commands::History { command } => match command {
            HistoryCommands::List {
                search,
                limit,
                json,
            } => commands::history::list(data_dir, search.as_deref(), limit, json),
            HistoryCommands::Add {
                path,
                position,
                time,
            } => commands::history::add(data_dir, &path, position, time),
            HistoryCommands::Delete { id } => commands::history::delete(data_dir, id),
            HistoryCommands::Clear => commands::history::clear(data_dir),
        },
        Commands::Session { command } => match command {
            SessionCommands::Show { json } => commands::session::show(data_dir, json),
            SessionCommands::Clear => commands::session::clear(data_dir),
        },
        Commands::Reset { yes } => commands::reset::run(data_dir, yes),
    }
}

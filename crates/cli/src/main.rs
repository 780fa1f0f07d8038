//! Mnemos CLI: the main entry point.
//!
//! Commands:
//! - `chat`    Interactive session (default)
//! - `ask`     One turn, answer on stdout
//! - `memory`  Inspect the long-term store offline

use clap::{Parser, Subcommand};
use mnemos_config::AppConfig;
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser)]
#[command(
    name = "mnemos",
    about = "Mnemos: a tool-calling assistant with long-term memory",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose console logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.mnemos/config.toml)
    #[arg(short, long, global = true, env = "MNEMOS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat,

    /// Ask a single question
    Ask {
        /// The message to send
        #[arg(short, long)]
        message: String,
    },

    /// Inspect long-term memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Store location and record counts
    Info,

    /// Search stored records
    Search {
        query: String,

        /// Maximum number of hits
        #[arg(short, default_value_t = 5)]
        k: usize,
    },

    /// Record counts, the newest records and persona-like entries
    Inspect {
        /// How many of the newest records to preview
        #[arg(long, default_value_t = 20)]
        last: usize,
    },

    /// Saved personas
    Personas,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())
        .map_err(|e| format!("Failed to load config: {e}"))?;
    logging::init(&config.logging, cli.verbose)?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => commands::chat::run(&config).await?,
        Commands::Ask { message } => commands::ask::run(&config, &message).await?,
        Commands::Memory { action } => match action {
            MemoryAction::Info => commands::memory::info(&config).await?,
            MemoryAction::Search { query, k } => commands::memory::search(&config, &query, k).await?,
            MemoryAction::Inspect { last } => commands::memory::inspect(&config, last).await?,
            MemoryAction::Personas => commands::memory::personas(&config).await?,
        },
    }

    Ok(())
}

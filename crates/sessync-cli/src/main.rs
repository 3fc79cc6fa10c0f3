use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sessync_infrastructure::ConfigService;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sessync")]
#[command(about = "sessync - inspect stored transcripts and replay session event streams", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.config/sessync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or edit stored transcript history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Replay a JSONL file of transport events and print the resulting transcripts
    Replay {
        /// One transport event per line
        #[arg(long)]
        file: PathBuf,

        /// Record the replayed transcripts into the history store
        #[arg(long)]
        persist: bool,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print a page of a session's history, newest page first
    Show {
        session: String,
        /// Page size (defaults to the configured page size)
        #[arg(long)]
        limit: Option<usize>,
        /// Number of newest records to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Print raw records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the number of stored records
    Count { session: String },
    /// Delete a session's history
    Clear { session: String },
    /// Replace a session's history with a JSON array of messages
    Import {
        session: String,
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_service = match &cli.config {
        Some(path) => ConfigService::with_path(path),
        None => ConfigService::new().context("Failed to locate the config directory")?,
    };
    let mut config = config_service.load().with_context(|| {
        format!(
            "Failed to load config from {}",
            config_service.config_path().display()
        )
    })?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = Some(data_dir);
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_filter))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let data_dir =
        ConfigService::resolve_data_dir(&config).context("Failed to resolve data directory")?;
    tracing::debug!("[sessync] Data directory: {}", data_dir.display());

    match cli.command {
        Commands::History { action } => {
            let store = commands::history::open_store(&data_dir).await?;
            match action {
                HistoryAction::Show {
                    session,
                    limit,
                    offset,
                    json,
                } => {
                    let limit = limit.unwrap_or(config.default_page_size);
                    commands::history::show(&store, &session, limit, offset, json).await?
                }
                HistoryAction::Count { session } => {
                    commands::history::count(&store, &session).await?
                }
                HistoryAction::Clear { session } => {
                    commands::history::clear(&store, &session).await?
                }
                HistoryAction::Import { session, file } => {
                    commands::history::import(&store, &session, &file).await?
                }
            }
        }
        Commands::Replay { file, persist } => {
            commands::replay::run(&file, persist.then_some(data_dir.as_path()), &config).await?
        }
    }

    Ok(())
}

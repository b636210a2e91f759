mod cli;
mod config;
mod db;
mod embedding;
mod error;
mod memory;
mod nli;
mod vector;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "engram", version, about = "Persistent memory store for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run database diagnostics and print a health report
    Doctor,
    /// Show memory statistics
    Stats {
        /// Restrict counts to one project (plus the global scope)
        #[arg(long)]
        project: Option<String>,
    },
    /// Hybrid search across stored memories
    Search {
        query: String,
        #[arg(long, default_value = "global")]
        project: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,
    },
    /// Check content for contradictions without storing it
    Scan {
        content: String,
        #[arg(long, default_value = "global")]
        project: String,
    },
    /// Retention-based archive sweep (dry run unless --apply)
    Sweep {
        #[arg(long)]
        apply: bool,
    },
    /// Manage the local models
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model (and optionally the NLI cross-encoder)
    Download {
        #[arg(long)]
        nli: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::EngramConfig::load()?;

    // Log to stderr so stdout stays clean for piped output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Stats { project } => cli::stats::stats(&config, project.as_deref())?,
        Command::Search {
            query,
            project,
            limit,
            min_confidence,
        } => cli::search::search(&config, &query, &project, limit, min_confidence).await?,
        Command::Scan { content, project } => {
            cli::scan::scan(&config, &content, &project).await?
        }
        Command::Sweep { apply } => cli::sweep::sweep(&config, apply).await?,
        Command::Model { action } => match action {
            ModelAction::Download { nli } => cli::model_download(&config, nli).await?,
        },
    }

    Ok(())
}

//! # Chat Recall CLI (`recall`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite database and run schema migrations |
//! | `recall ingest <file>` | Embed and store messages from a JSONL file |
//! | `recall search "<query>"` | Hybrid-ranked messages for a question |
//! | `recall get <id>` | Show one stored message |
//! | `recall prune` | Delete messages past the retention horizon |
//! | `recall embed rebuild` | Re-embed every message with the current provider |
//! | `recall queries` | Show the query log |
//! | `recall serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! recall --config ./config/recall.toml init
//! recall --config ./config/recall.toml ingest ./export/messages.jsonl
//! recall --config ./config/recall.toml search "feeding schedule" --limit 5 --explain
//! recall --config ./config/recall.toml queries --no-results
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use chat_recall::search::SearchOptions;
use chat_recall::{
    config, embed_cmd, get, ingest, logging, migrate, query_log, retention, search, server,
};

/// Chat Recall: hybrid semantic + keyword retrieval over archived chat messages.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/recall.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "recall", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest messages from a JSONL file, one message object per line.
    ///
    /// Messages that cannot be embedded are skipped, never stored without
    /// a vector. Re-ingesting the same message is a no-op.
    Ingest {
        /// Path to the `.jsonl` file.
        file: PathBuf,
    },

    /// Search stored messages.
    Search {
        /// The question to retrieve context for.
        query: String,

        /// Maximum number of results (default: `[retrieval].default_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Override the cosine distance cutoff (inclusive).
        #[arg(long)]
        max_distance: Option<f64>,

        /// Show the per-signal score breakdown.
        #[arg(long)]
        explain: bool,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,

        /// Print only the joined context block.
        #[arg(long, conflicts_with = "json")]
        context: bool,
    },

    /// Show a stored message by id.
    Get {
        id: i64,
    },

    /// Delete messages older than `[retention].max_age_days`.
    Prune {
        /// Only count what would be deleted.
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Show recent searches from the query log.
    Queries {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Only searches that returned nothing.
        #[arg(long)]
        no_results: bool,

        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Re-embed every stored message with the configured provider.
    ///
    /// Useful when switching embedding models or dimensions.
    Rebuild,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(Some(&cfg.logging));

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file } => {
            ingest::run_ingest(&cfg, &file).await?;
        }
        Commands::Search {
            query,
            limit,
            max_distance,
            explain,
            json,
            context,
        } => {
            search::run_search(
                &cfg,
                &query,
                SearchOptions {
                    limit,
                    max_distance,
                    explain,
                    json,
                    context,
                },
            )
            .await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, id).await?;
        }
        Commands::Prune { dry_run } => {
            retention::run_prune(&cfg, dry_run).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Rebuild => {
                embed_cmd::run_embed_rebuild(&cfg).await?;
            }
        },
        Commands::Queries {
            limit,
            no_results,
            json,
        } => {
            query_log::run_queries(&cfg, limit, no_results, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

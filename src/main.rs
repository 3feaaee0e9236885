//! # kb-chat CLI (`kbchat`)
//!
//! The `kbchat` binary asks questions of a retrieval-augmented chat backend,
//! streams the reconciled answer with its citations, reloads session history
//! with sources reattached, and runs an SSE relay for browser views.
//!
//! ## Usage
//!
//! ```bash
//! kbchat --config ./config/kbchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbchat init` | Create the SQLite source store |
//! | `kbchat ask <chat> <session> "<question>"` | Stream an answer |
//! | `kbchat history <chat> <session>` | Print a session with citations |
//! | `kbchat serve` | Start the SSE relay server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kb_chat::client::BackendClient;
use kb_chat::config;
use kb_chat::render::RenderMode;
use kb_chat::sqlite_store::SqliteSourceStore;
use kb_chat::{ask, history, logging, migrate, server};

/// kb-chat CLI: a streaming client for retrieval-augmented chat backends.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kbchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kbchat",
    about = "kb-chat: a streaming client for retrieval-augmented chat backends",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the source store schema.
    ///
    /// Creates the SQLite database file and the `source_records` table.
    /// Running it more than once is safe.
    Init,

    /// Ask a question and stream the answer.
    ///
    /// Reasoning and citations are written to stderr; the answer to stdout.
    Ask {
        /// Chat (assistant) id.
        chat_id: String,
        /// Session id.
        session_id: String,
        /// The question to send.
        question: String,

        /// Emit one JSON render update per line instead of terminal text.
        #[arg(long, conflicts_with = "quiet")]
        json: bool,

        /// Print nothing; only the exit status reports success.
        #[arg(long)]
        quiet: bool,
    },

    /// Print a session's messages with persisted citations reattached.
    History {
        /// Chat (assistant) id.
        chat_id: String,
        /// Session id.
        session_id: String,
    },

    /// Start the SSE relay server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Source store initialized successfully.");
        }
        Commands::Ask {
            chat_id,
            session_id,
            question,
            json,
            quiet,
        } => {
            let mode = if quiet {
                RenderMode::Off
            } else if json {
                RenderMode::Json
            } else {
                RenderMode::default_for_tty()
            };
            ask::run_ask(&cfg, &chat_id, &session_id, &question, mode).await?;
        }
        Commands::History {
            chat_id,
            session_id,
        } => {
            let client = BackendClient::new(&cfg.backend)?;
            let store = SqliteSourceStore::open(&cfg).await?;
            history::run_history(&client, &store, &chat_id, &session_id).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

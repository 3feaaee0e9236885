//! `kbchat ask`: send one question and stream the answer to the terminal.

use anyhow::{bail, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use kb_chat_core::stream::Completion;

use crate::client::BackendClient;
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::render::RenderMode;
use crate::sqlite_store::SqliteSourceStore;

pub async fn run_ask(
    config: &Config,
    chat_id: &str,
    session_id: &str,
    question: &str,
    mode: RenderMode,
) -> Result<()> {
    let client = Arc::new(BackendClient::new(&config.backend)?);
    let store = Arc::new(SqliteSourceStore::open(config).await?);
    let orchestrator = Orchestrator::new(client, store, config.reconcile.policy());

    // Ctrl-C stops reading the stream instead of killing the process.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let sink = mode.sink();
    let outcome = orchestrator
        .ask(chat_id, session_id, question, sink.as_ref(), cancel)
        .await?;

    match outcome.completion {
        Completion::Completed => Ok(()),
        Completion::Cancelled => {
            eprintln!("Interrupted; answer not saved.");
            Ok(())
        }
        Completion::Failed => bail!(
            "backend error: {}",
            outcome.error.unwrap_or_else(|| "unknown".to_string())
        ),
    }
}

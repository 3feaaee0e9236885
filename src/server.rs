//! HTTP relay server.
//!
//! Puts the streaming pipeline behind a small JSON/SSE API so a browser view
//! receives ready-to-render updates instead of raw backend frames.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chats/{chat_id}/sessions/{session_id}/ask` | Ask a question; SSE stream of render updates |
//! | `GET`  | `/chats/{chat_id}/sessions/{session_id}/messages` | Session history with reattached sources |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "busy", "message": "a question is already streaming for session s1" } }
//! ```
//!
//! Error codes: `bad_request` (400), `busy` (409), `transport` (502),
//! `history` (502).
//!
//! Each SSE event carries one JSON `RenderUpdate`; the last has
//! `"done": true`. Updates are coalesced: a client that reads slower than
//! frames arrive skips to the latest update, so at most one is buffered.
//! Dropping the connection cancels the backend read loop.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use kb_chat_core::models::{Message, Segment};
use kb_chat_core::store::SourceStore;
use kb_chat_core::stream::RenderUpdate;

use crate::client::BackendClient;
use crate::config::Config;
use crate::error::ChatError;
use crate::history::load_session;
use crate::orchestrator::Orchestrator;
use crate::render::RenderSink;
use crate::sqlite_store::SqliteSourceStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    client: Arc<BackendClient>,
    orchestrator: Arc<Orchestrator>,
}

/// Starts the relay server on `[server].bind` with the SQLite source store.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(SqliteSourceStore::open(config).await?);
    let app = router(config, store)?;

    let bind_addr = config.server.bind.clone();
    println!("kbchat relay listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router over any [`SourceStore`].
pub fn router(config: &Config, store: Arc<dyn SourceStore>) -> anyhow::Result<Router> {
    let client = Arc::new(BackendClient::new(&config.backend)?);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&client),
        store,
        config.reconcile.policy(),
    ));
    let state = AppState {
        client,
        orchestrator,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/chats/{chat_id}/sessions/{session_id}/ask", post(handle_ask))
        .route(
            "/chats/{chat_id}/sessions/{session_id}/messages",
            get(handle_messages),
        )
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        let status = match &e {
            ChatError::Busy { .. } => StatusCode::CONFLICT,
            ChatError::Transport(_) => StatusCode::BAD_GATEWAY,
            ChatError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };
        AppError {
            status,
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chats/{chat_id}/sessions/{session_id}/ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

/// Publishes the latest render update to the SSE response. A closed
/// receiver means the client went away, so the read loop is cancelled.
struct ChannelRender {
    tx: watch::Sender<Option<RenderUpdate>>,
    cancel: CancellationToken,
}

impl RenderSink for ChannelRender {
    fn render(&self, update: &RenderUpdate) {
        if self.tx.send(Some(update.clone())).is_err() {
            self.cancel.cancel();
        }
    }
}

/// Next unseen update. Ends once the sender is gone and the last value
/// has been read.
async fn next_update(rx: &mut watch::Receiver<Option<RenderUpdate>>) -> Option<RenderUpdate> {
    loop {
        rx.changed().await.ok()?;
        if let Some(update) = rx.borrow_and_update().clone() {
            return Some(update);
        }
    }
}

/// Opens the backend stream before answering, so a busy session or a
/// transport failure is a plain JSON error rather than a broken event stream.
async fn handle_ask(
    State(state): State<AppState>,
    Path((chat_id, session_id)): Path<(String, String)>,
    Json(req): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let pending = state
        .orchestrator
        .open(&chat_id, &session_id, &req.question)
        .await?;

    let (tx, rx) = watch::channel(None);
    let cancel = CancellationToken::new();
    let sink = ChannelRender {
        tx,
        cancel: cancel.clone(),
    };
    let on_disconnect = cancel.clone().drop_guard();
    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, %chat_id, %session_id, "relay ask opened");

    tokio::spawn(async move {
        match pending.run(&sink, cancel).await {
            Ok(outcome) => {
                tracing::info!(%request_id, completion = ?outcome.completion, "relay ask closed");
            }
            Err(e) => {
                tracing::warn!(%request_id, error = %e, "answer stream failed");
                sink.render(&RenderUpdate {
                    segments: Vec::<Segment>::new(),
                    visible_text: String::new(),
                    citations: Vec::new(),
                    done: true,
                    error: Some(e.to_string()),
                });
            }
        }
    });

    let events = futures::stream::unfold((rx, on_disconnect), |(mut rx, guard)| async move {
        let update = next_update(&mut rx).await?;
        Some((Event::default().json_data(&update), (rx, guard)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ============ GET /chats/{chat_id}/sessions/{session_id}/messages ============

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<Message>,
}

async fn handle_messages(
    State(state): State<AppState>,
    Path((chat_id, session_id)): Path<(String, String)>,
) -> Result<Json<MessagesResponse>, AppError> {
    let store = state.orchestrator.store();
    let messages = load_session(&state.client, store.as_ref(), &chat_id, &session_id)
        .await
        .map_err(|e| AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "history".to_string(),
            message: e.to_string(),
        })?;
    Ok(Json(MessagesResponse { messages }))
}

//! # kb-chat
//!
//! **A streaming client for retrieval-augmented chat backends.**
//!
//! kb-chat turns the backend's incremental `data: <json>` answer stream into
//! one stable answer: fragments are reconciled whether they arrive as deltas,
//! cumulative snapshots or overlapping repeats; `<think>` reasoning is split
//! from the visible text; `[ID:n]` citation markers are resolved to the
//! sources the backend retrieved; and those sources are persisted so they
//! reappear when the session is reloaded.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Backend  │──▶│ Orchestrator │──▶│ AnswerStream │──▶│  Render  │
//! │ (reqwest)│   │  read loop   │   │   (core)     │   │ CLI/SSE  │
//! └──────────┘   └──────┬───────┘   └──────────────┘   └──────────┘
//!                       │ finalize
//!                       ▼
//!                ┌──────────────┐
//!                │ SQLite store │◀── history reload
//!                └──────────────┘
//! ```
//!
//! The text-processing pipeline lives in the runtime-free
//! [`kb_chat_core`] crate; this crate adds I/O.
//!
//! ## Quick Start
//!
//! ```bash
//! kbchat init                                  # create the source store
//! kbchat ask <chat> <session> "What is our leave policy?"
//! kbchat history <chat> <session>              # reload with citations
//! kbchat serve                                 # SSE relay for a browser view
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`client`] | Backend HTTP client: ask (streaming) and session history |
//! | [`orchestrator`] | Per-question read loop, busy guard, cancellation, finalization |
//! | [`history`] | Session reload with source reattachment |
//! | [`render`] | Render sinks: terminal, JSON lines, collector |
//! | [`ask`] | `kbchat ask` command |
//! | [`server`] | SSE relay server (Axum) with CORS |
//! | [`sqlite_store`] | SQLite-backed source store |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Schema migrations (idempotent) |
//! | [`error`] | Caller-facing send errors |
//! | [`logging`] | Tracing subscriber setup |

pub mod ask;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod logging;
pub mod migrate;
pub mod orchestrator;
pub mod render;
pub mod server;
pub mod sqlite_store;

pub use error::ChatError;
pub use kb_chat_core::{citation, frame, models, reconcile, segment, store, stream};
pub use orchestrator::{AskOutcome, Orchestrator};

//! # kb-chat Core
//!
//! Runtime-free logic for kb-chat: turning a backend's incremental answer
//! stream into one stable answer with reasoning split out and citations
//! resolved to their sources.
//!
//! This crate contains no tokio, sqlx, network or filesystem I/O. It
//! compiles to both native targets and `wasm32-unknown-unknown`.
//!
//! ## Pipeline
//!
//! ```text
//! bytes ─▶ frame ─▶ reconcile ─▶ segment ─▶ citation ─▶ RenderUpdate
//!                                                 │
//!                                   finalize ─▶ store (content-addressed)
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Wire events, normalized sources, segments, messages |
//! | [`frame`] | `data: <json>` line decoder |
//! | [`reconcile`] | Chunk reconciler (delta / cumulative / overlap) |
//! | [`segment`] | `<think>` reasoning vs visible segmentation |
//! | [`citation`] | `[ID:n]` extraction, resolution and anchor rewriting |
//! | [`store`] | Source persistence trait, key derivation, in-memory store |
//! | [`stream`] | Per-message `Accumulating → Finalized` state machine |

pub mod citation;
pub mod frame;
pub mod models;
pub mod reconcile;
pub mod segment;
pub mod store;
pub mod stream;

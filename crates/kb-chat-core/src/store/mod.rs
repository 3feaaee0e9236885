//! Source persistence for kb-chat.
//!
//! When a session is reloaded the backend replays only `{role, content}` for
//! past answers; the source list each answer was built from is gone. At
//! stream finalization the sources are written under a key derived from
//! `(chat_id, session_id, visible text)`, and on reload the same key is
//! recomputed from the stored message content to reattach them.
//!
//! The [`SourceStore`] trait is the durable key-value substrate, enabling
//! pluggable backends (SQLite, in-memory). Implementations must be
//! `Send + Sync` to work with async runtimes.
//!
//! Keys are content-addressed: two identical finalized answers in the same
//! session share one record. Reasoning text never feeds the key.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::models::Source;

const KEY_PREFIX: &str = "kbchat:sources:";

/// Abstract key-value backend for persisted source records.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](SourceStore::get) | Fetch the source list stored under a key |
/// | [`put`](SourceStore::put) | Store (or overwrite) the source list for a key |
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<Source>>>;

    async fn put(&self, key: &str, sources: &[Source]) -> Result<()>;
}

/// Derive the record key for a finalized answer.
///
/// Returns `None` when any component is empty, in which case nothing is
/// stored or looked up. The visible text is trimmed so trailing whitespace
/// the backend drops when it stores the message does not change the key.
pub fn source_key(chat_id: &str, session_id: &str, visible_text: &str) -> Option<String> {
    let visible_text = visible_text.trim();
    if chat_id.is_empty() || session_id.is_empty() || visible_text.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    for part in [chat_id, session_id, visible_text] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    Some(format!("{}{:x}", KEY_PREFIX, hasher.finalize()))
}

/// Write the source list for a finalized answer.
///
/// Skips empty lists and incomplete keys. A store failure is logged and
/// swallowed: the only consequence is that citations are unavailable after
/// the next reload. Returns whether a record was written.
pub async fn persist_sources(
    store: &dyn SourceStore,
    chat_id: &str,
    session_id: &str,
    visible_text: &str,
    sources: &[Source],
) -> bool {
    if sources.is_empty() {
        return false;
    }
    let Some(key) = source_key(chat_id, session_id, visible_text) else {
        return false;
    };
    match store.put(&key, sources).await {
        Ok(()) => {
            tracing::debug!(%key, count = sources.len(), "persisted answer sources");
            true
        }
        Err(e) => {
            tracing::warn!(%key, error = %e, "failed to persist answer sources");
            false
        }
    }
}

/// Read back the source list for a historical answer. Misses and store
/// failures both yield `None`.
pub async fn lookup_sources(
    store: &dyn SourceStore,
    chat_id: &str,
    session_id: &str,
    visible_text: &str,
) -> Option<Vec<Source>> {
    let key = source_key(chat_id, session_id, visible_text)?;
    match store.get(&key).await {
        Ok(found) => found.filter(|s| !s.is_empty()),
        Err(e) => {
            tracing::warn!(%key, error = %e, "failed to read persisted answer sources");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemorySourceStore;
    use super::*;

    struct BrokenStore;

    #[async_trait]
    impl SourceStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<Source>>> {
            anyhow::bail!("storage unavailable")
        }
        async fn put(&self, _key: &str, _sources: &[Source]) -> Result<()> {
            anyhow::bail!("quota exceeded")
        }
    }

    fn sources() -> Vec<Source> {
        vec![Source {
            doc_id: "d1".into(),
            dataset: "kb".into(),
            title: "Guide".into(),
            chunk: "text".into(),
        }]
    }

    #[test]
    fn key_is_deterministic_and_component_sensitive() {
        let a = source_key("c1", "s1", "answer").unwrap();
        assert_eq!(Some(a.clone()), source_key("c1", "s1", "answer"));
        assert!(a.starts_with(KEY_PREFIX));
        assert_ne!(Some(a.clone()), source_key("c1", "s2", "answer"));
        assert_ne!(Some(a), source_key("c1", "s1", "answer!"));
        assert_ne!(source_key("ab", "c", "x"), source_key("a", "bc", "x"));
    }

    #[test]
    fn key_requires_every_component() {
        assert_eq!(source_key("", "s1", "answer"), None);
        assert_eq!(source_key("c1", "", "answer"), None);
        assert_eq!(source_key("c1", "s1", "  \n"), None);
    }

    #[test]
    fn key_ignores_surrounding_whitespace() {
        assert_eq!(source_key("c", "s", "answer\n"), source_key("c", "s", "answer"));
    }

    #[tokio::test]
    async fn round_trip_through_memory_store() {
        let store = InMemorySourceStore::new();
        assert!(persist_sources(&store, "c1", "s1", "answer", &sources()).await);
        assert_eq!(lookup_sources(&store, "c1", "s1", "answer").await, Some(sources()));
        assert_eq!(lookup_sources(&store, "c1", "s1", "other").await, None);
    }

    #[tokio::test]
    async fn empty_source_lists_are_not_written() {
        let store = InMemorySourceStore::new();
        assert!(!persist_sources(&store, "c1", "s1", "answer", &[]).await);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        assert!(!persist_sources(&BrokenStore, "c1", "s1", "answer", &sources()).await);
        assert_eq!(lookup_sources(&BrokenStore, "c1", "s1", "answer").await, None);
    }
}

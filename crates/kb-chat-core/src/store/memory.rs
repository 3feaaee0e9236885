//! In-memory [`SourceStore`] implementation for testing and WASM targets.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety. Records
//! live as long as the store does.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Source;

use super::SourceStore;

/// In-memory store for testing and WASM environments.
pub struct InMemorySourceStore {
    records: RwLock<HashMap<String, Vec<Source>>>,
}

impl InMemorySourceStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceStore for InMemorySourceStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<Source>>> {
        let records = self.records.read().unwrap();
        Ok(records.get(key).cloned())
    }

    async fn put(&self, key: &str, sources: &[Source]) -> Result<()> {
        let mut records = self.records.write().unwrap();
        records.insert(key.to_string(), sources.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_overwrites_previous_record() {
        let store = InMemorySourceStore::new();
        let first = vec![Source {
            doc_id: "a".into(),
            dataset: String::new(),
            title: "A".into(),
            chunk: String::new(),
        }];
        store.put("k", &first).await.unwrap();
        store.put("k", &[]).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(Vec::new()));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }
}

//! SQLite-backed [`SourceStore`] implementation.
//!
//! One row per record in `source_records`, holding the source list as JSON.
//! A `put` is an upsert, so the last finalized write for a key wins.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use kb_chat_core::models::Source;
use kb_chat_core::store::SourceStore;

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`SourceStore`] trait.
pub struct SqliteSourceStore {
    pool: SqlitePool,
}

impl SqliteSourceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM source_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl SourceStore for SqliteSourceStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<Source>>> {
        let row = sqlx::query("SELECT sources_json FROM source_records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let json: String = row.get("sources_json");
        let sources: Vec<Source> = serde_json::from_str(&json)
            .with_context(|| format!("corrupt source record for key {}", key))?;
        Ok(Some(sources))
    }

    async fn put(&self, key: &str, sources: &[Source]) -> Result<()> {
        let json = serde_json::to_string(sources)?;
        sqlx::query(
            r#"
            INSERT INTO source_records (key, sources_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                sources_json = excluded.sources_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates the `documents` table and its indexes. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // entities_json: NULL = not analysed, 'null' = analysed with no hits
    // published_at: microseconds since the Unix epoch, UTC
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL DEFAULT '',
            disruption_type TEXT NOT NULL DEFAULT '',
            image_url TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            lat REAL,
            lng REAL,
            location TEXT NOT NULL DEFAULT '',
            published_at INTEGER NOT NULL,
            radius REAL,
            raw_text TEXT NOT NULL DEFAULT '',
            severity TEXT NOT NULL DEFAULT '',
            summary TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT '',
            sentiment REAL,
            entities_json TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_published_at ON documents(published_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

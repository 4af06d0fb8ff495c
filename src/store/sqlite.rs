//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Entity state is kept in `entities_json`: SQL `NULL` means not yet
//! analysed, the JSON text `null` means analysed with nothing found, and a
//! JSON object holds the label map.
//!
//! `published_at` is stored as microseconds since the Unix epoch.
//!
//! Substring conditions are evaluated in Rust after the SQL query: SQLite's
//! `lower()` only folds ASCII, so pushing them down would disagree with
//! [`Condition::matches`] on non-ASCII text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{Document, Entities, EntityMap, EnrichedField, FieldUpdate};

use super::{Condition, DocumentStore, Filter};

const SELECT_COLUMNS: &str = "id, url, disruption_type, image_url, is_deleted, lat, lng, \
     location, published_at, radius, raw_text, severity, summary, title, body, \
     sentiment, entities_json";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts a document unless its id already exists.
    ///
    /// Returns `true` when a row was written.
    pub async fn insert_document(&self, doc: &Document) -> Result<bool> {
        let entities_json = entities_to_json(&doc.entities)?;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO documents (id, url, disruption_type, image_url, is_deleted,
                                             lat, lng, location, published_at, radius, raw_text,
                                             severity, summary, title, body, sentiment,
                                             entities_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.url)
        .bind(&doc.disruption_type)
        .bind(&doc.image_url)
        .bind(doc.is_deleted)
        .bind(doc.lat)
        .bind(doc.lng)
        .bind(&doc.location)
        .bind(doc.published_at.timestamp_micros())
        .bind(doc.radius)
        .bind(&doc.raw_text)
        .bind(&doc.severity)
        .bind(&doc.summary)
        .bind(&doc.title)
        .bind(&doc.body)
        .bind(doc.sentiment)
        .bind(entities_json)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn field_column(field: EnrichedField) -> &'static str {
    match field {
        EnrichedField::Sentiment => "sentiment",
        EnrichedField::Entities => "entities_json",
    }
}

/// Conditions that must be checked on decoded documents.
fn post_conditions(filter: &Filter) -> Vec<&Condition> {
    filter
        .conditions
        .iter()
        .filter(|c| matches!(c, Condition::Contains { .. }))
        .collect()
}

/// Renders the SQL-evaluable part of a [`Filter`] as a `WHERE` clause plus
/// its bind values. Substring conditions are left to [`post_conditions`].
fn where_clause(filter: &Filter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    for cond in &filter.conditions {
        match cond {
            Condition::Exists(field) => {
                clauses.push(format!("{} IS NOT NULL", field_column(*field)));
            }
            Condition::Missing(field) => {
                clauses.push(format!("{} IS NULL", field_column(*field)));
            }
            Condition::Contains { .. } => {}
            Condition::IdEquals(id) => {
                clauses.push("id = ?".to_string());
                binds.push(id.clone());
            }
        }
    }

    if clauses.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), binds)
    }
}

fn entities_to_json(entities: &Entities) -> Result<Option<String>> {
    Ok(match entities {
        Entities::Unanalyzed => None,
        Entities::NoneFound => Some("null".to_string()),
        Entities::Found(map) => Some(serde_json::to_string(map)?),
    })
}

fn entities_from_json(raw: Option<String>) -> Result<Entities> {
    match raw {
        None => Ok(Entities::Unanalyzed),
        Some(text) => {
            let map: Option<EntityMap> =
                serde_json::from_str(&text).context("corrupt entities_json column")?;
            Ok(Entities::from(map))
        }
    }
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let published_us: i64 = row.get("published_at");
    let published_at = chrono::DateTime::from_timestamp_micros(published_us)
        .with_context(|| format!("published_at out of range: {}", published_us))?;

    Ok(Document {
        id: row.get("id"),
        url: row.get("url"),
        disruption_type: row.get("disruption_type"),
        image_url: row.get("image_url"),
        is_deleted: row.get("is_deleted"),
        lat: row.get("lat"),
        lng: row.get("lng"),
        location: row.get("location"),
        published_at,
        radius: row.get("radius"),
        raw_text: row.get("raw_text"),
        severity: row.get("severity"),
        summary: row.get("summary"),
        title: row.get("title"),
        body: row.get("body"),
        sentiment: row.get("sentiment"),
        entities: entities_from_json(row.get("entities_json"))?,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Document>> {
        let sql = format!("SELECT {} FROM documents WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        let (clause, binds) = where_clause(filter);
        let post = post_conditions(filter);
        let mut sql = format!("SELECT {} FROM documents{} ORDER BY rowid", SELECT_COLUMNS, clause);
        // The limit can only be pushed down when no rows are dropped afterwards.
        let sql_limit = filter.limit.filter(|_| post.is_empty());
        if sql_limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        for b in &binds {
            query = query.bind(b);
        }
        if let Some(limit) = sql_limit {
            query = query.bind(limit as i64);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut docs = Vec::with_capacity(rows.len());
        for row in &rows {
            if filter.limit.is_some_and(|limit| docs.len() >= limit) {
                break;
            }
            let doc = row_to_document(row)?;
            if post.iter().all(|c| c.matches(&doc)) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        if !post_conditions(filter).is_empty() {
            let unlimited = Filter {
                limit: None,
                ..filter.clone()
            };
            return Ok(self.find(&unlimited).await?.len() as u64);
        }

        let (clause, binds) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM documents{}", clause);
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for b in &binds {
            query = query.bind(b);
        }
        let n = query.fetch_one(&self.pool).await?;
        Ok(n as u64)
    }

    async fn update_fields(&self, id: &str, update: &FieldUpdate) -> Result<u64> {
        // `IS NOT` keeps identical writes from counting as modifications.
        let result = match update {
            FieldUpdate::Sentiment(score) => {
                sqlx::query(
                    "UPDATE documents SET sentiment = ? WHERE id = ? AND sentiment IS NOT ?",
                )
                .bind(*score)
                .bind(id)
                .bind(*score)
                .execute(&self.pool)
                .await?
            }
            FieldUpdate::Entities(map) => {
                let json = entities_to_json(&Entities::from(map.clone()))?;
                sqlx::query(
                    "UPDATE documents SET entities_json = ? WHERE id = ? AND entities_json IS NOT ?",
                )
                .bind(&json)
                .bind(id)
                .bind(&json)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected())
    }
}

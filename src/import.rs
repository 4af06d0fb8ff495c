//! Bulk document import.
//!
//! `dlens import <file>` reads either a JSON array or newline-delimited JSON
//! objects. Field names follow the news feed export, so both the snake_case
//! schema names and the feed's own (`_id`, `disruptionType`, `imageUrl`,
//! `isdeleted`, `publishedDate`, `text`, `actual_text`) are accepted. Mongo
//! extended JSON wrappers (`{"$oid": ..}`, `{"$date": ..}`) are unwrapped.
//!
//! Ids are immutable: a record whose id already exists is skipped, never
//! merged.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::Path;
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::models::{Document, Entities, EntityMap};
use crate::store::sqlite::SqliteStore;

/// One document as found in an import file.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentRecord {
    #[serde(default, alias = "_id")]
    pub id: Option<Value>,
    #[serde(default)]
    pub url: String,
    #[serde(default, alias = "disruptionType")]
    pub disruption_type: String,
    #[serde(default, alias = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(
        default,
        alias = "isdeleted",
        alias = "isDeleted",
        deserialize_with = "deserialize_flag"
    )]
    pub is_deleted: bool,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub location: String,
    #[serde(alias = "publishedDate")]
    pub published_at: Value,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default, alias = "text")]
    pub summary: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "actual_text")]
    pub body: String,
    #[serde(default)]
    pub sentiment: Option<f64>,
    /// `None` when the key is absent, `Some(None)` for an explicit `null`.
    #[serde(default, alias = "ner", deserialize_with = "deserialize_present")]
    pub entities: Option<Option<EntityMap>>,
}

impl DocumentRecord {
    pub fn into_document(self) -> Result<Document> {
        let id = match self.id.as_ref().and_then(|v| unwrap_extended(v, "$oid")) {
            Some(id) if !id.is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };
        let published = unwrap_extended(&self.published_at, "$date")
            .with_context(|| format!("document {}: publishedDate is not a string", id))?;
        let published_at = parse_timestamp(&published)
            .with_context(|| format!("document {}: bad publishedDate '{}'", id, published))?;

        let image_url = self
            .image_url
            .filter(|u| !u.is_empty() && u != "No Image");

        // An explicit null marks a document already analysed with nothing found.
        let entities = match self.entities {
            Some(found) => Entities::from(found.map(EntityMap::normalized)),
            None => Entities::Unanalyzed,
        };

        Ok(Document {
            id,
            url: self.url,
            disruption_type: self.disruption_type,
            image_url,
            is_deleted: self.is_deleted,
            lat: self.lat,
            lng: self.lng,
            location: self.location,
            published_at,
            radius: self.radius,
            raw_text: self.raw_text,
            severity: self.severity,
            summary: self.summary,
            title: self.title,
            body: self.body,
            sentiment: self.sentiment,
            entities,
        })
    }
}

/// Feed exports write booleans either as JSON booleans or as `"true"`/`"false"`.
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(t) => match t.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, got '{}'",
                other
            ))),
        },
    }
}

fn deserialize_present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A plain string, or the string inside `{"<key>": "..."}`.
fn unwrap_extended(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get(key).and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

/// Parses RFC 3339, naive date-times (taken as UTC), or bare dates.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    bail!("unrecognised timestamp format")
}

/// Parses a JSON array or newline-delimited JSON.
pub fn parse_records(content: &str) -> Result<Vec<DocumentRecord>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Failed to parse JSON array");
    }

    let mut records = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse line {}", i + 1))?;
        records.push(record);
    }
    Ok(records)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportSummary {
    pub read: usize,
    pub inserted: usize,
    pub skipped: usize,
}

/// Inserts records, skipping ids that already exist.
pub async fn import_records(
    store: &SqliteStore,
    records: Vec<DocumentRecord>,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary {
        read: records.len(),
        ..Default::default()
    };
    for record in records {
        let doc = record.into_document()?;
        if store.insert_document(&doc).await? {
            summary.inserted += 1;
        } else {
            tracing::debug!(id = %doc.id, "skipping existing document");
            summary.skipped += 1;
        }
    }
    Ok(summary)
}

/// Entry point for `dlens import`.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let records = parse_records(&content)?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let summary = import_records(&store, records).await?;
    pool.close().await;

    println!(
        "Imported {} of {} documents ({} already present)",
        summary.inserted, summary.read, summary.skipped
    );
    Ok(())
}

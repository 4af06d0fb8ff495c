//! Storage abstraction over the persisted document collection.
//!
//! The [`DocumentStore`] trait is the only way the engines touch documents:
//! point lookup, predicate find, count, and partial update by id. Two
//! backends ship with the crate:
//!
//! - [`memory::InMemoryStore`]: `RwLock`-guarded, used by unit tests.
//! - [`sqlite::SqliteStore`]: the persisted store behind the CLI and server.
//!
//! Both follow document-store update semantics: writing a value equal to the
//! stored one reports zero modified documents.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, DocumentColumn, EnrichedField, FieldUpdate};

/// One clause of a [`Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists(EnrichedField),
    Missing(EnrichedField),
    /// Case-insensitive substring match on a text column.
    Contains { column: DocumentColumn, needle: String },
    IdEquals(String),
}

impl Condition {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Condition::Exists(field) => field.is_present(doc),
            Condition::Missing(field) => !field.is_present(doc),
            Condition::Contains { column, needle } => column
                .value_of(doc)
                .map(|v| v.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            Condition::IdEquals(id) => &doc.id == id,
        }
    }
}

/// A conjunction of [`Condition`]s with an optional result cap.
///
/// An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn exists(mut self, field: EnrichedField) -> Self {
        self.conditions.push(Condition::Exists(field));
        self
    }

    pub fn missing(mut self, field: EnrichedField) -> Self {
        self.conditions.push(Condition::Missing(field));
        self
    }

    pub fn contains(mut self, column: DocumentColumn, needle: impl Into<String>) -> Self {
        self.conditions.push(Condition::Contains {
            column,
            needle: needle.into(),
        });
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.conditions.push(Condition::IdEquals(id.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

/// Abstract document collection.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_by_id`](DocumentStore::find_by_id) | Point lookup |
/// | [`find`](DocumentStore::find) | All documents matching a [`Filter`], in insertion order |
/// | [`count`](DocumentStore::count) | Number of documents matching a [`Filter`] (ignores `limit`) |
/// | [`update_fields`](DocumentStore::update_fields) | Partial update by id, returns modified count |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Document>>;

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>>;

    async fn count(&self, filter: &Filter) -> Result<u64>;

    /// Applies `update` to the document with `id`.
    ///
    /// Returns `0` when no such document exists or the stored value already
    /// equals the new one, `1` otherwise.
    async fn update_fields(&self, id: &str, update: &FieldUpdate) -> Result<u64>;
}

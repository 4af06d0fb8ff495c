//! In-memory [`DocumentStore`] implementation for tests.
//!
//! Documents live in a `Vec` behind `std::sync::RwLock`, so `find` returns
//! them in insertion order.

use std::sync::{PoisonError, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Document, Entities, FieldUpdate};

use super::{DocumentStore, Filter};

pub struct InMemoryStore {
    docs: RwLock<Vec<Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
        }
    }

    pub fn with_documents(docs: Vec<Document>) -> Self {
        Self {
            docs: RwLock::new(docs),
        }
    }

    /// Adds a document. Fails if the id is already taken.
    pub fn insert(&self, doc: Document) -> Result<()> {
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        if docs.iter().any(|d| d.id == doc.id) {
            bail!("document {} already exists", doc.id);
        }
        docs.push(doc);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(docs.iter().find(|d| d.id == id).cloned())
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        let matched = docs.iter().filter(|d| filter.matches(d)).cloned();
        Ok(match filter.limit {
            Some(n) => matched.take(n).collect(),
            None => matched.collect(),
        })
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(docs.iter().filter(|d| filter.matches(d)).count() as u64)
    }

    async fn update_fields(&self, id: &str, update: &FieldUpdate) -> Result<u64> {
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        let doc = match docs.iter_mut().find(|d| d.id == id) {
            Some(d) => d,
            None => return Ok(0),
        };

        let changed = match update {
            FieldUpdate::Sentiment(score) => {
                if doc.sentiment == Some(*score) {
                    false
                } else {
                    doc.sentiment = Some(*score);
                    true
                }
            }
            FieldUpdate::Entities(map) => {
                let next = Entities::from(map.clone());
                if doc.entities == next {
                    false
                } else {
                    doc.entities = next;
                    true
                }
            }
        };

        Ok(changed as u64)
    }
}

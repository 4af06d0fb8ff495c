//! Read-only views over the collection.
//!
//! Used by `dlens list` / `dlens filter` and by `GET /data/all` / `GET /data`.

use crate::error::{EngineError, EngineResult};
use crate::models::{Document, DocumentColumn};
use crate::store::{DocumentStore, Filter};

/// All documents in insertion order, optionally capped at `limit`.
pub async fn list_documents(
    store: &dyn DocumentStore,
    limit: Option<usize>,
) -> EngineResult<Vec<Document>> {
    let filter = match limit {
        Some(0) => {
            return Err(EngineError::InvalidParameter(
                "limit must be at least 1".into(),
            ))
        }
        Some(n) => Filter::all().limit(n),
        None => Filter::all(),
    };
    Ok(store.find(&filter).await?)
}

/// Documents whose `column` matches `value`.
///
/// An empty value matches everything. `id` is compared exactly, every
/// other column by case-insensitive substring.
pub async fn filter_documents(
    store: &dyn DocumentStore,
    column: &str,
    value: &str,
) -> EngineResult<Vec<Document>> {
    let column: DocumentColumn = column.parse()?;
    let filter = if value.is_empty() {
        Filter::all()
    } else if column == DocumentColumn::Id {
        Filter::all().id(value)
    } else {
        Filter::all().contains(column, value)
    };
    Ok(store.find(&filter).await?)
}

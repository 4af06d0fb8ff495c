//! Enrichment engine: computes and persists `sentiment` and `entities`.
//!
//! Single-document updates surface `NotFound` and `NoChange` directly.
//! Batch updates run sequentially, one document at a time, and tolerate
//! per-document failures: they only fail with
//! [`EngineError::PartialBatchFailure`] when not a single write landed.
//! Everything else comes back as a [`BatchReport`] listing the documents
//! that were left unchanged.
//!
//! Reads and writes are not transactional. A document changed by someone
//! else between the read and the write is simply overwritten.

use serde::Serialize;
use std::sync::Arc;

use crate::analysis::AnalysisProvider;
use crate::error::{EngineError, EngineResult};
use crate::models::{Document, EnrichedField, EntityMap, FieldUpdate};
use crate::store::{DocumentStore, Filter};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentUpdate {
    pub id: String,
    pub sentiment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityUpdate {
    pub id: String,
    pub entities: Option<EntityMap>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnchangedItem {
    pub id: String,
    pub reason: String,
}

/// Per-item accounting for a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Documents matched by the "needs work" predicate.
    pub selected: u64,
    /// Documents actually processed.
    pub attempted: usize,
    pub modified: usize,
    pub unchanged: Vec<UnchangedItem>,
}

impl BatchReport {
    fn new(selected: u64) -> Self {
        Self {
            selected,
            attempted: 0,
            modified: 0,
            unchanged: Vec::new(),
        }
    }

    fn record(&mut self, id: &str, result: EngineResult<u64>) {
        self.attempted += 1;
        match result {
            Ok(n) if n > 0 => self.modified += 1,
            Ok(_) => self.unchanged.push(UnchangedItem {
                id: id.to_string(),
                reason: "no document modified".to_string(),
            }),
            Err(e) => {
                tracing::warn!(id, error = %e, "enrichment skipped document");
                self.unchanged.push(UnchangedItem {
                    id: id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.unchanged.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The selection predicate matched nothing; no document was touched.
    NotNeeded,
    /// At least one write landed.
    Updated(BatchReport),
}

/// Text scored for sentiment. No fallback.
pub fn sentiment_text(doc: &Document) -> &str {
    &doc.body
}

/// Text used for entity extraction.
///
/// `body` unless it is empty, then `summary` unless that is empty, then
/// `title` whatever it holds.
pub fn entity_text(doc: &Document) -> &str {
    if doc.body.is_empty() {
        if doc.summary.is_empty() {
            &doc.title
        } else {
            &doc.summary
        }
    } else {
        &doc.body
    }
}

pub struct EnrichmentEngine {
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn AnalysisProvider>,
}

impl EnrichmentEngine {
    pub fn new(store: Arc<dyn DocumentStore>, provider: Arc<dyn AnalysisProvider>) -> Self {
        Self { store, provider }
    }

    fn score(&self, doc: &Document) -> EngineResult<f64> {
        let score = self.provider.score_sentiment(sentiment_text(doc));
        if !score.is_finite() || !(-1.0..=1.0).contains(&score) {
            return Err(EngineError::AnalysisFailure(format!(
                "{} returned sentiment {} for {}",
                self.provider.name(),
                score,
                doc.id
            )));
        }
        Ok(score)
    }

    async fn write_sentiment(&self, doc: &Document) -> EngineResult<u64> {
        let score = self.score(doc)?;
        tracing::debug!(id = %doc.id, score, "scored document");
        Ok(self
            .store
            .update_fields(&doc.id, &FieldUpdate::Sentiment(score))
            .await?)
    }

    async fn write_entities(&self, doc: &Document) -> EngineResult<u64> {
        let found = self.provider.extract_entities(entity_text(doc));
        tracing::debug!(id = %doc.id, labels = found.as_ref().map_or(0, |m| m.len()), "extracted entities");
        Ok(self
            .store
            .update_fields(&doc.id, &FieldUpdate::Entities(found))
            .await?)
    }

    async fn fetch(&self, id: &str) -> EngineResult<Document> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("document {}", id)))
    }

    /// Scores one document and stores the result.
    pub async fn update_sentiment(&self, id: &str) -> EngineResult<SentimentUpdate> {
        let doc = self.fetch(id).await?;
        if self.write_sentiment(&doc).await? == 0 {
            return Err(EngineError::NoChange(format!("sentiment of {}", id)));
        }
        let refreshed = self.fetch(id).await?;
        Ok(SentimentUpdate {
            id: refreshed.id,
            sentiment: refreshed.sentiment,
        })
    }

    /// Scores every document that has no sentiment yet.
    pub async fn update_all_sentiment(&self) -> EngineResult<BatchOutcome> {
        let pending = Filter::all().missing(EnrichedField::Sentiment);
        let selected = self.store.count(&pending).await?;
        if selected == 0 {
            tracing::info!("every document already has a sentiment score");
            return Ok(BatchOutcome::NotNeeded);
        }

        let docs = self.store.find(&pending).await?;
        let mut report = BatchReport::new(selected);
        for doc in &docs {
            let result = self.write_sentiment(doc).await;
            report.record(&doc.id, result);
        }

        finish(report, EnrichedField::Sentiment)
    }

    /// Extracts entities for one document and stores the result.
    pub async fn update_entities(&self, id: &str) -> EngineResult<EntityUpdate> {
        let doc = self.fetch(id).await?;
        if self.write_entities(&doc).await? == 0 {
            return Err(EngineError::NoChange(format!("entities of {}", id)));
        }
        let refreshed = self.fetch(id).await?;
        Ok(EntityUpdate {
            id: refreshed.id,
            entities: refreshed.entities.map().cloned(),
        })
    }

    /// Re-extracts entities across the collection.
    ///
    /// Whether work is needed is decided by counting documents without
    /// entities, but once any such document exists every document in the
    /// collection is reprocessed, including those already analysed.
    pub async fn update_all_entities(&self) -> EngineResult<BatchOutcome> {
        let pending = Filter::all().missing(EnrichedField::Entities);
        let selected = self.store.count(&pending).await?;
        if selected == 0 {
            tracing::info!("every document already has entities");
            return Ok(BatchOutcome::NotNeeded);
        }

        let docs = self.store.find(&Filter::all()).await?;
        let mut report = BatchReport::new(selected);
        for doc in &docs {
            let result = self.write_entities(doc).await;
            report.record(&doc.id, result);
        }

        finish(report, EnrichedField::Entities)
    }
}

fn finish(report: BatchReport, field: EnrichedField) -> EngineResult<BatchOutcome> {
    tracing::info!(
        field = field.as_str(),
        selected = report.selected,
        attempted = report.attempted,
        modified = report.modified,
        "batch enrichment finished"
    );

    if report.modified == 0 {
        let total = report.selected as usize;
        return Err(EngineError::PartialBatchFailure {
            failed: total.saturating_sub(report.modified),
            total,
            field: field.as_str(),
        });
    }
    Ok(BatchOutcome::Updated(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{TopicModelFit, TopicParams};
    use crate::models::Entities;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sentiment is `len/100`, or NaN when the text mentions "broken-model".
    /// Entities echo the analysed text under the `text` label.
    struct EchoProvider;

    impl AnalysisProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        fn score_sentiment(&self, text: &str) -> f64 {
            if text.contains("broken-model") {
                f64::NAN
            } else {
                (text.len() as f64 / 100.0).min(1.0)
            }
        }

        fn extract_entities(&self, text: &str) -> Option<EntityMap> {
            if text.is_empty() || text == "nothing here" {
                None
            } else {
                Some([("text", text)].into_iter().collect())
            }
        }

        fn fit_topic_model(
            &self,
            _corpus: &[Vec<String>],
            _params: &TopicParams,
        ) -> EngineResult<TopicModelFit> {
            Err(EngineError::AnalysisFailure("not supported".into()))
        }
    }

    /// Counts writes reaching the wrapped store.
    struct CountingStore {
        inner: InMemoryStore,
        updates: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Document>> {
            self.inner.find_by_id(id).await
        }
        async fn find(&self, filter: &Filter) -> anyhow::Result<Vec<Document>> {
            self.inner.find(filter).await
        }
        async fn count(&self, filter: &Filter) -> anyhow::Result<u64> {
            self.inner.count(filter).await
        }
        async fn update_fields(&self, id: &str, update: &FieldUpdate) -> anyhow::Result<u64> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.inner.update_fields(id, update).await
        }
    }

    /// Accepts every write but never reports a modified document.
    struct FrozenStore(InMemoryStore);

    #[async_trait]
    impl DocumentStore for FrozenStore {
        async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Document>> {
            self.0.find_by_id(id).await
        }
        async fn find(&self, filter: &Filter) -> anyhow::Result<Vec<Document>> {
            self.0.find(filter).await
        }
        async fn count(&self, filter: &Filter) -> anyhow::Result<u64> {
            self.0.count(filter).await
        }
        async fn update_fields(&self, _id: &str, _update: &FieldUpdate) -> anyhow::Result<u64> {
            Ok(0)
        }
    }

    fn doc(id: &str, body: &str) -> Document {
        let mut d = Document::new(id, Utc.with_ymd_and_hms(2024, 12, 17, 9, 0, 0).unwrap());
        d.body = body.to_string();
        d
    }

    fn engine(docs: Vec<Document>) -> (EnrichmentEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::with_documents(docs));
        let engine = EnrichmentEngine::new(store.clone(), Arc::new(EchoProvider));
        (engine, store)
    }

    #[tokio::test]
    async fn test_update_sentiment_then_no_change() {
        let (engine, _store) = engine(vec![doc("a", "twenty characters!!!")]);

        let first = engine.update_sentiment("a").await.unwrap();
        assert_eq!(first.id, "a");
        assert_eq!(first.sentiment, Some(0.2));

        let second = engine.update_sentiment("a").await.unwrap_err();
        assert!(matches!(second, EngineError::NoChange(_)));
    }

    #[tokio::test]
    async fn test_update_sentiment_not_found() {
        let (engine, _store) = engine(vec![]);
        let err = engine.update_sentiment("ghost").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(err.to_string(), "document ghost not found");
    }

    #[tokio::test]
    async fn test_update_sentiment_rejects_non_finite_score() {
        let (engine, store) = engine(vec![doc("a", "broken-model output")]);
        let err = engine.update_sentiment("a").await.unwrap_err();
        assert!(matches!(err, EngineError::AnalysisFailure(_)));
        assert!(store.find_by_id("a").await.unwrap().unwrap().sentiment.is_none());
    }

    #[tokio::test]
    async fn test_batch_sentiment_not_needed_performs_no_writes() {
        let mut a = doc("a", "x");
        a.sentiment = Some(0.1);
        let mut b = doc("b", "y");
        b.sentiment = Some(-0.3);
        let store = Arc::new(CountingStore {
            inner: InMemoryStore::with_documents(vec![a, b]),
            updates: AtomicUsize::new(0),
        });
        let engine = EnrichmentEngine::new(store.clone(), Arc::new(EchoProvider));

        let outcome = engine.update_all_sentiment().await.unwrap();
        assert_eq!(outcome, BatchOutcome::NotNeeded);
        assert_eq!(store.updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_sentiment_only_touches_missing() {
        let mut scored = doc("a", "already");
        scored.sentiment = Some(-0.9);
        let (engine, store) = engine(vec![scored, doc("b", "0123456789")]);

        let BatchOutcome::Updated(report) = engine.update_all_sentiment().await.unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(report.selected, 1);
        assert_eq!(report.modified, 1);
        assert!(report.is_complete());

        let a = store.find_by_id("a").await.unwrap().unwrap();
        let b = store.find_by_id("b").await.unwrap().unwrap();
        assert_eq!(a.sentiment, Some(-0.9));
        assert_eq!(b.sentiment, Some(0.1));
    }

    #[tokio::test]
    async fn test_batch_sentiment_partial_failure_is_success_with_report() {
        let (engine, _store) = engine(vec![doc("a", "fine text"), doc("b", "broken-model")]);

        let BatchOutcome::Updated(report) = engine.update_all_sentiment().await.unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(report.attempted, 2);
        assert_eq!(report.modified, 1);
        assert_eq!(report.unchanged.len(), 1);
        assert_eq!(report.unchanged[0].id, "b");
    }

    #[tokio::test]
    async fn test_batch_sentiment_all_failed() {
        let (engine, _store) = engine(vec![doc("a", "broken-model"), doc("b", "broken-model")]);
        let err = engine.update_all_sentiment().await.unwrap_err();
        assert_eq!(err.to_string(), "2/2 sentiment unchanged");
    }

    #[test]
    fn test_entity_text_chain() {
        let mut d = doc("a", "");
        d.summary = "summary".into();
        d.title = "title".into();
        assert_eq!(entity_text(&d), "summary");

        d.summary.clear();
        assert_eq!(entity_text(&d), "title");

        d.body = "body".into();
        assert_eq!(entity_text(&d), "body");
        assert_eq!(sentiment_text(&d), "body");
    }

    #[tokio::test]
    async fn test_update_entities_uses_fallback_and_none_marker() {
        let mut with_summary = doc("a", "");
        with_summary.summary = "Floods in Lae".into();
        let empty = doc("b", "nothing here");
        let (engine, store) = engine(vec![with_summary, empty]);

        let a = engine.update_entities("a").await.unwrap();
        assert_eq!(a.entities.unwrap().get("text").unwrap(), ["Floods in Lae"]);

        let b = engine.update_entities("b").await.unwrap();
        assert!(b.entities.is_none());
        let stored = store.find_by_id("b").await.unwrap().unwrap();
        assert_eq!(stored.entities, Entities::NoneFound);

        let again = engine.update_entities("b").await.unwrap_err();
        assert!(matches!(again, EngineError::NoChange(_)));
    }

    #[tokio::test]
    async fn test_batch_entities_reprocesses_whole_collection() {
        let mut analysed = doc("a", "fresh body");
        analysed.entities = Entities::Found([("text", "stale")].into_iter().collect());
        let (engine, store) = engine(vec![analysed, doc("b", "other body")]);

        let BatchOutcome::Updated(report) = engine.update_all_entities().await.unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(report.selected, 1);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.modified, 2);

        let a = store.find_by_id("a").await.unwrap().unwrap();
        assert_eq!(a.entities.map().unwrap().get("text").unwrap(), ["fresh body"]);
    }

    #[tokio::test]
    async fn test_batch_entities_not_needed() {
        let mut a = doc("a", "x");
        a.entities = Entities::NoneFound;
        let (engine, _store) = engine(vec![a]);
        assert_eq!(
            engine.update_all_entities().await.unwrap(),
            BatchOutcome::NotNeeded
        );
    }

    #[tokio::test]
    async fn test_batch_entities_failure_counts_selected_not_attempted() {
        let mut a = doc("a", "one");
        a.entities = Entities::NoneFound;
        let mut b = doc("b", "two");
        b.entities = Entities::Found([("text", "two")].into_iter().collect());
        let store = Arc::new(FrozenStore(InMemoryStore::with_documents(vec![
            a,
            b,
            doc("c", "three"),
        ])));
        let engine = EnrichmentEngine::new(store, Arc::new(EchoProvider));

        let err = engine.update_all_entities().await.unwrap_err();
        match err {
            EngineError::PartialBatchFailure {
                failed,
                total,
                field,
            } => {
                assert_eq!(total, 1);
                assert_eq!(failed, 1);
                assert_eq!(field, "entities");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

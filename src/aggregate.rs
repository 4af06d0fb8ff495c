//! Time-series aggregation over enriched documents.
//!
//! Documents are grouped by a bucket key derived from `published_at`:
//! `2024-12-17` when bucketing by date, `2024-12-17 08:23:49` otherwise
//! (with microseconds appended when the timestamp carries any).
//!
//! # Filters
//!
//! Without a filter, sentiment aggregation scans documents that have a
//! sentiment. With a `(column, value)` filter both series scan documents
//! whose *entities* have been analysed and whose column contains the value,
//! case-insensitively. A filtered sentiment query therefore skips documents
//! that have a sentiment but were never run through entity extraction.

use chrono::{DateTime, Timelike, Utc};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::models::{DocumentColumn, EnrichedField, LabelMap};
use crate::store::{DocumentStore, Filter};

/// Bucket key → aggregated value.
pub type SentimentSeries = BTreeMap<String, f64>;

/// Bucket key → label → surface forms, labels and forms in scan order.
pub type EntitySeries = BTreeMap<String, LabelMap>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateMode {
    Sum,
    Average,
    PositiveCount,
    NegativeCount,
    TotalCount,
}

impl AggregateMode {
    pub const ALL: [AggregateMode; 5] = [
        AggregateMode::Sum,
        AggregateMode::Average,
        AggregateMode::PositiveCount,
        AggregateMode::NegativeCount,
        AggregateMode::TotalCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateMode::Sum => "sum",
            AggregateMode::Average => "average",
            AggregateMode::PositiveCount => "positive_count",
            AggregateMode::NegativeCount => "negative_count",
            AggregateMode::TotalCount => "total_count",
        }
    }
}

impl FromStr for AggregateMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AggregateMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = AggregateMode::ALL.iter().map(|m| m.as_str()).collect();
                EngineError::InvalidParameter(format!(
                    "unknown aggregation mode '{}', expected one of: {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}

/// Computes the bucket key for a timestamp.
pub fn bucket_key(ts: &DateTime<Utc>, date_only: bool) -> String {
    if date_only {
        ts.format("%Y-%m-%d").to_string()
    } else if ts.nanosecond() % 1_000_000_000 == 0 {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Validated `(column, value)` substring filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFilter {
    pub column: DocumentColumn,
    pub value: String,
}

impl ColumnFilter {
    /// Builds a filter from optional raw parameters.
    ///
    /// A column without a value is rejected; a value without a column is
    /// ignored.
    pub fn from_params(column: Option<&str>, value: Option<&str>) -> EngineResult<Option<Self>> {
        match (column, value) {
            (None, _) => Ok(None),
            (Some(_), None) => Err(EngineError::MissingParameter(
                "filter_value is required when filter_column is given".into(),
            )),
            (Some(column), Some(value)) => Ok(Some(ColumnFilter {
                column: column.parse()?,
                value: value.to_string(),
            })),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesQuery {
    pub date_only: bool,
    pub filter: Option<ColumnFilter>,
}

impl SeriesQuery {
    fn scan_filter(&self, unfiltered: EnrichedField) -> Filter {
        match &self.filter {
            None => Filter::all().exists(unfiltered),
            Some(f) => Filter::all()
                .exists(EnrichedField::Entities)
                .contains(f.column, f.value.clone()),
        }
    }
}

enum Accumulator {
    Scalar(f64),
    Running { sum: f64, count: u64 },
}

impl Accumulator {
    fn finish(self) -> f64 {
        match self {
            Accumulator::Scalar(v) => v,
            Accumulator::Running { sum, count } => sum / count as f64,
        }
    }
}

pub struct AggregationEngine {
    store: Arc<dyn DocumentStore>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Folds sentiment into time buckets.
    ///
    /// `mode` is validated before the store is queried.
    pub async fn sentiment_series(
        &self,
        mode: &str,
        query: &SeriesQuery,
    ) -> EngineResult<SentimentSeries> {
        let mode: AggregateMode = mode.parse()?;
        let docs = self
            .store
            .find(&query.scan_filter(EnrichedField::Sentiment))
            .await?;

        let mut buckets: BTreeMap<String, Accumulator> = BTreeMap::new();
        let mut skipped = 0usize;
        for doc in &docs {
            // Filtered scans select on entities, so sentiment may still be absent.
            let Some(score) = doc.sentiment else {
                skipped += 1;
                continue;
            };
            // Sign counts only open a bucket for a qualifying document.
            let qualifies = match mode {
                AggregateMode::PositiveCount => score > 0.0,
                AggregateMode::NegativeCount => score < 0.0,
                _ => true,
            };
            if !qualifies {
                continue;
            }
            let key = bucket_key(&doc.published_at, query.date_only);
            let acc = buckets.entry(key).or_insert_with(|| match mode {
                AggregateMode::Average => Accumulator::Running { sum: 0.0, count: 0 },
                _ => Accumulator::Scalar(0.0),
            });
            match (mode, acc) {
                (AggregateMode::Sum, Accumulator::Scalar(v)) => *v += score,
                (AggregateMode::Average, Accumulator::Running { sum, count }) => {
                    *sum += score;
                    *count += 1;
                }
                (
                    AggregateMode::PositiveCount
                    | AggregateMode::NegativeCount
                    | AggregateMode::TotalCount,
                    Accumulator::Scalar(v),
                ) => *v += 1.0,
                _ => {}
            }
        }

        tracing::debug!(
            mode = mode.as_str(),
            scanned = docs.len(),
            skipped,
            buckets = buckets.len(),
            "aggregated sentiment"
        );

        Ok(buckets
            .into_iter()
            .map(|(key, acc)| (key, acc.finish()))
            .collect())
    }

    /// Merges entity maps into time buckets without cross-document dedupe.
    pub async fn entity_series(&self, query: &SeriesQuery) -> EngineResult<EntitySeries> {
        let docs = self
            .store
            .find(&query.scan_filter(EnrichedField::Entities))
            .await?;

        let mut series = EntitySeries::new();
        for doc in &docs {
            let bucket = series
                .entry(bucket_key(&doc.published_at, query.date_only))
                .or_default();
            if let Some(map) = doc.entities.map() {
                for (label, forms) in map.iter() {
                    bucket.forms_mut(label).extend(forms.iter().cloned());
                }
            }
        }

        tracing::debug!(scanned = docs.len(), buckets = series.len(), "aggregated entities");
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Entities, FieldUpdate};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn scored(id: &str, ts: DateTime<Utc>, score: f64) -> Document {
        let mut doc = Document::new(id, ts);
        doc.sentiment = Some(score);
        doc
    }

    fn engine(docs: Vec<Document>) -> AggregationEngine {
        AggregationEngine::new(Arc::new(InMemoryStore::with_documents(docs)))
    }

    fn by_date() -> SeriesQuery {
        SeriesQuery {
            date_only: true,
            filter: None,
        }
    }

    #[test]
    fn test_bucket_keys() {
        let ts = Utc.with_ymd_and_hms(2024, 12, 17, 8, 23, 49).unwrap();
        assert_eq!(bucket_key(&ts, true), "2024-12-17");
        assert_eq!(bucket_key(&ts, false), "2024-12-17 08:23:49");
        let fractional = ts + chrono::Duration::microseconds(250);
        assert_eq!(bucket_key(&fractional, false), "2024-12-17 08:23:49.000250");
    }

    #[tokio::test]
    async fn test_total_count_per_day() {
        let engine = engine(vec![
            scored("a", at(2024, 12, 17, 8), 0.3),
            scored("b", at(2024, 12, 18, 9), -0.2),
        ]);
        let series = engine.sentiment_series("total_count", &by_date()).await.unwrap();
        let expected: SentimentSeries =
            [("2024-12-17".to_string(), 1.0), ("2024-12-18".to_string(), 1.0)].into();
        assert_eq!(series, expected);
    }

    #[tokio::test]
    async fn test_average_within_bucket() {
        let engine = engine(vec![
            scored("a", at(2024, 12, 17, 8), 0.5),
            scored("b", at(2024, 12, 17, 20), -0.1),
        ]);
        let series = engine.sentiment_series("average", &by_date()).await.unwrap();
        assert_eq!(series.len(), 1);
        assert!((series["2024-12-17"] - 0.2).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_sign_counts_and_sum() {
        let engine = engine(vec![
            scored("a", at(2024, 12, 17, 8), 0.5),
            scored("b", at(2024, 12, 17, 9), -0.4),
            scored("c", at(2024, 12, 17, 10), 0.0),
            scored("d", at(2024, 12, 17, 11), 0.25),
        ]);
        let q = by_date();
        assert_eq!(engine.sentiment_series("positive_count", &q).await.unwrap()["2024-12-17"], 2.0);
        assert_eq!(engine.sentiment_series("negative_count", &q).await.unwrap()["2024-12-17"], 1.0);
        assert!((engine.sentiment_series("sum", &q).await.unwrap()["2024-12-17"] - 0.35).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_sign_counts_skip_days_without_qualifying_documents() {
        let engine = engine(vec![
            scored("a", at(2024, 12, 17, 8), -0.5),
            scored("b", at(2024, 12, 18, 8), 0.4),
            scored("c", at(2024, 12, 19, 8), 0.0),
        ]);
        let q = by_date();
        let positive = engine.sentiment_series("positive_count", &q).await.unwrap();
        assert_eq!(positive, [("2024-12-18".to_string(), 1.0)].into());
        let negative = engine.sentiment_series("negative_count", &q).await.unwrap();
        assert_eq!(negative, [("2024-12-17".to_string(), 1.0)].into());
        // Neutral documents still count towards the total
        assert_eq!(engine.sentiment_series("total_count", &q).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_full_timestamp_buckets_are_distinct() {
        let engine = engine(vec![
            scored("a", at(2024, 12, 17, 8), 0.5),
            scored("b", at(2024, 12, 17, 9), 0.5),
        ]);
        let series = engine
            .sentiment_series("sum", &SeriesQuery::default())
            .await
            .unwrap();
        assert_eq!(series.len(), 2);
        assert!(series.contains_key("2024-12-17 08:00:00"));
    }

    #[tokio::test]
    async fn test_empty_collection_gives_empty_series() {
        let engine = engine(vec![Document::new("a", at(2024, 1, 1, 0))]);
        assert!(engine.sentiment_series("sum", &by_date()).await.unwrap().is_empty());
        assert!(engine.entity_series(&by_date()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filter_requires_entities() {
        let mut with_entities = scored("a", at(2024, 12, 17, 8), 0.5);
        with_entities.location = "Port Moresby".into();
        with_entities.entities = Entities::NoneFound;
        let mut without_entities = scored("b", at(2024, 12, 17, 9), 0.7);
        without_entities.location = "Port Moresby".into();

        let engine = engine(vec![with_entities, without_entities]);
        let query = SeriesQuery {
            date_only: true,
            filter: ColumnFilter::from_params(Some("location"), Some("moresby")).unwrap(),
        };
        let series = engine.sentiment_series("total_count", &query).await.unwrap();
        assert_eq!(series["2024-12-17"], 1.0);
    }

    #[test]
    fn test_filter_params() {
        assert_eq!(ColumnFilter::from_params(None, Some("x")).unwrap(), None);
        assert!(matches!(
            ColumnFilter::from_params(Some("location"), None),
            Err(EngineError::MissingParameter(_))
        ));
        assert!(matches!(
            ColumnFilter::from_params(Some("sentiment"), Some("x")),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_entity_series_keeps_cross_document_duplicates() {
        let mut a = Document::new("a", at(2024, 12, 17, 8));
        a.entities = Entities::Found([("city", "Lae"), ("city", "Lae"), ("country", "PNG")].into_iter().collect());
        let mut b = Document::new("b", at(2024, 12, 17, 12));
        b.entities = Entities::Found([("city", "Lae")].into_iter().collect());
        let mut c = Document::new("c", at(2024, 12, 18, 12));
        c.entities = Entities::NoneFound;

        let series = engine(vec![a, b, c]).entity_series(&by_date()).await.unwrap();
        assert_eq!(series["2024-12-17"].get("city").unwrap(), ["Lae", "Lae"]);
        assert_eq!(series["2024-12-17"].get("country").unwrap(), ["PNG"]);
        assert!(series["2024-12-18"].is_empty());
    }

    #[tokio::test]
    async fn test_filtered_entity_series_needs_entities_and_column_match() {
        let mut lae = Document::new("a", at(2024, 12, 17, 8));
        lae.location = "Lae".into();
        lae.entities = Entities::Found([("city", "Lae")].into_iter().collect());
        let mut lae_unanalyzed = Document::new("b", at(2024, 12, 17, 9));
        lae_unanalyzed.location = "Lae".into();
        let mut lae_none_found = Document::new("c", at(2024, 12, 18, 9));
        lae_none_found.location = "LAE wharf".into();
        lae_none_found.entities = Entities::NoneFound;
        let mut perth = Document::new("d", at(2024, 12, 17, 10));
        perth.location = "Perth".into();
        perth.entities = Entities::Found([("city", "Perth")].into_iter().collect());

        let query = SeriesQuery {
            date_only: true,
            filter: ColumnFilter::from_params(Some("location"), Some("lae")).unwrap(),
        };
        let series = engine(vec![lae, lae_unanalyzed, lae_none_found, perth])
            .entity_series(&query)
            .await
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series["2024-12-17"].get("city").unwrap(), ["Lae"]);
        assert!(series["2024-12-18"].is_empty());
    }

    #[tokio::test]
    async fn test_entity_series_labels_in_first_seen_order() {
        let mut a = Document::new("a", at(2024, 12, 17, 8));
        a.entities = Entities::Found([("person", "Anna"), ("city", "Lae")].into_iter().collect());
        let mut b = Document::new("b", at(2024, 12, 17, 9));
        b.entities = Entities::Found([("country", "Fiji"), ("city", "Suva")].into_iter().collect());

        let series = engine(vec![a, b]).entity_series(&by_date()).await.unwrap();
        let json = serde_json::to_string(&series).unwrap();
        assert_eq!(
            json,
            r#"{"2024-12-17":{"person":["Anna"],"city":["Lae","Suva"],"country":["Fiji"]}}"#
        );
    }

    struct CountingStore {
        inner: InMemoryStore,
        scans: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Document>> {
            self.inner.find_by_id(id).await
        }
        async fn find(&self, filter: &Filter) -> anyhow::Result<Vec<Document>> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.inner.find(filter).await
        }
        async fn count(&self, filter: &Filter) -> anyhow::Result<u64> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.inner.count(filter).await
        }
        async fn update_fields(&self, id: &str, update: &FieldUpdate) -> anyhow::Result<u64> {
            self.inner.update_fields(id, update).await
        }
    }

    #[tokio::test]
    async fn test_invalid_mode_rejected_before_scan() {
        let store = Arc::new(CountingStore {
            inner: InMemoryStore::with_documents(vec![scored("a", at(2024, 12, 17, 8), 0.1)]),
            scans: AtomicUsize::new(0),
        });
        let engine = AggregationEngine::new(store.clone());
        let err = engine.sentiment_series("median", &by_date()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
        assert_eq!(store.scans.load(Ordering::SeqCst), 0);
    }
}

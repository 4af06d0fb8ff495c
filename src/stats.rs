//! Collection statistics and enrichment coverage.
//!
//! Provides a quick summary of what's stored: document counts, how many
//! documents carry a sentiment score or have been run through entity
//! extraction, and which topic artifacts exist. Used by `dlens stats`.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::models::EnrichedField;
use crate::store::sqlite::SqliteStore;
use crate::store::{DocumentStore, Filter};
use crate::topics::{ArtifactStore, FsArtifactStore};

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStats {
    pub documents: u64,
    pub with_sentiment: u64,
    pub with_entities: u64,
    /// Topic counts with a stored artifact.
    pub topic_artifacts: Vec<usize>,
}

impl CollectionStats {
    pub async fn gather(store: &dyn DocumentStore, artifacts: &dyn ArtifactStore) -> Result<Self> {
        Ok(Self {
            documents: store.count(&Filter::all()).await?,
            with_sentiment: store
                .count(&Filter::all().exists(EnrichedField::Sentiment))
                .await?,
            with_entities: store
                .count(&Filter::all().exists(EnrichedField::Entities))
                .await?,
            topic_artifacts: artifacts.keys()?,
        })
    }
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let artifacts = FsArtifactStore::new(&config.topics.artifact_dir);
    let stats = CollectionStats::gather(&store, &artifacts).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Disruption Lens - Collection Stats");
    println!("==================================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.documents);
    println!(
        "  Sentiment:   {} / {} ({}%)",
        stats.with_sentiment,
        stats.documents,
        percent(stats.with_sentiment, stats.documents)
    );
    println!(
        "  Entities:    {} / {} ({}%)",
        stats.with_entities,
        stats.documents,
        percent(stats.with_entities, stats.documents)
    );
    println!();
    if stats.topic_artifacts.is_empty() {
        println!("  Topic models: none");
    } else {
        let ks: Vec<String> = stats.topic_artifacts.iter().map(|k| k.to_string()).collect();
        println!("  Topic models: k = {}", ks.join(", "));
    }
    println!();

    pool.close().await;
    Ok(())
}

fn percent(part: u64, total: u64) -> u64 {
    if total > 0 {
        (part * 100) / total
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Entities};
    use crate::store::memory::InMemoryStore;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_gather_counts_coverage() {
        let mut scored = Document::new("a", Utc::now());
        scored.sentiment = Some(0.4);
        let mut analysed = Document::new("b", Utc::now());
        analysed.entities = Entities::NoneFound;
        let store = InMemoryStore::with_documents(vec![scored, analysed, Document::new("c", Utc::now())]);
        let tmp = TempDir::new().unwrap();

        let stats = CollectionStats::gather(&store, &FsArtifactStore::new(tmp.path()))
            .await
            .unwrap();
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.with_sentiment, 1);
        assert_eq!(stats.with_entities, 1);
        assert!(stats.topic_artifacts.is_empty());
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(0, 0), 0);
    }
}

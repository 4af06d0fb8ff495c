//! # Disruption Lens CLI (`dlens`)
//!
//! The `dlens` binary drives the enrichment pipeline from the shell and
//! starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! dlens --config ./config/dlens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dlens init` | Create the SQLite database and run schema migrations |
//! | `dlens import <file>` | Load documents from JSON or NDJSON |
//! | `dlens stats` | Document counts and enrichment coverage |
//! | `dlens list` | Print documents, optionally capped with `--limit` |
//! | `dlens filter <column> [value]` | Print documents matching a column |
//! | `dlens enrich sentiment\|entities` | Compute derived fields (one id or all pending) |
//! | `dlens aggregate sentiment\|entities` | Time-bucketed series |
//! | `dlens topics fit` | Fit a topic model and store its artifact |
//! | `dlens topics visual` | Render a stored topic model to HTML |
//! | `dlens serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! dlens enrich sentiment --id 67628aa0422c93410a6a1314
//! dlens aggregate sentiment --mode positive_count --date-only \
//!     --filter-column location --filter-value moresby
//! dlens topics visual --num-topics 5 --output ./out/lda_vis.html
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use disruption_lens::aggregate::{AggregationEngine, ColumnFilter, SeriesQuery};
use disruption_lens::analysis::{AnalysisProvider, LexiconProvider};
use disruption_lens::config::{self, Config};
use disruption_lens::enrich::{BatchOutcome, EnrichmentEngine};
use disruption_lens::store::sqlite::SqliteStore;
use disruption_lens::store::DocumentStore;
use disruption_lens::topics::{FsArtifactStore, TopicModelEngine};
use disruption_lens::{browse, db, import, migrate, server, stats};

/// Disruption Lens CLI: sentiment, entity, and topic enrichment for
/// disruption news.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dlens.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dlens",
    about = "Disruption Lens - enrichment and time-series aggregation for disruption news",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dlens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import documents from a JSON array or newline-delimited JSON file.
    ///
    /// Documents whose id already exists are skipped.
    Import {
        /// Path to the file to import.
        file: PathBuf,
    },

    /// Show document counts and enrichment coverage.
    Stats,

    /// Print documents as JSON in insertion order.
    List {
        /// Maximum number of documents to print.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print documents whose column matches a value.
    ///
    /// `id` is matched exactly; other columns by case-insensitive substring.
    /// Omitting the value prints everything.
    Filter {
        column: String,
        value: Option<String>,
    },

    /// Compute and store derived fields.
    Enrich {
        #[command(subcommand)]
        target: EnrichTarget,
    },

    /// Aggregate derived fields into time buckets.
    Aggregate {
        #[command(subcommand)]
        series: AggregateSeries,
    },

    /// Fit and render topic models.
    Topics {
        #[command(subcommand)]
        action: TopicsAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum EnrichTarget {
    /// Score sentiment for one document, or for every document without one.
    Sentiment {
        #[arg(long)]
        id: Option<String>,
    },
    /// Extract entities for one document, or across the collection.
    Entities {
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Subcommand)]
enum AggregateSeries {
    /// Sentiment per bucket.
    Sentiment {
        /// One of: sum, average, positive_count, negative_count, total_count.
        #[arg(long)]
        mode: String,
        #[command(flatten)]
        bucket: BucketArgs,
    },
    /// Entity surface forms per bucket and label.
    Entities {
        #[command(flatten)]
        bucket: BucketArgs,
    },
}

#[derive(clap::Args)]
struct BucketArgs {
    /// Bucket by calendar date instead of full timestamp.
    #[arg(long)]
    date_only: bool,

    /// Column to filter on (requires --filter-value).
    #[arg(long)]
    filter_column: Option<String>,

    /// Case-insensitive substring the column must contain.
    #[arg(long)]
    filter_value: Option<String>,
}

impl BucketArgs {
    fn query(&self) -> Result<SeriesQuery> {
        Ok(SeriesQuery {
            date_only: self.date_only,
            filter: ColumnFilter::from_params(
                self.filter_column.as_deref(),
                self.filter_value.as_deref(),
            )?,
        })
    }
}

#[derive(Subcommand)]
enum TopicsAction {
    /// Fit a topic model over every document body.
    Fit {
        #[arg(long)]
        num_topics: usize,
        /// Terms listed per topic (defaults to `[topics].relevant_terms`).
        #[arg(long)]
        relevant_terms: Option<usize>,
    },
    /// Render the stored model for `--num-topics` to an HTML file.
    Visual {
        #[arg(long)]
        num_topics: usize,
        #[arg(long, default_value = "./lda_vis.html")]
        output: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("disruption_lens=info,dlens=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_batch(outcome: BatchOutcome, field: &str) -> Result<()> {
    match outcome {
        BatchOutcome::NotNeeded => {
            println!("No update needed: every document already has {}.", field);
            Ok(())
        }
        BatchOutcome::Updated(report) => print_json(&report),
    }
}

async fn open_store(cfg: &Config) -> Result<(SqlitePool, Arc<dyn DocumentStore>)> {
    let pool = db::connect(cfg).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(pool.clone()));
    Ok((pool, store))
}

fn provider(cfg: &Config) -> Arc<dyn AnalysisProvider> {
    Arc::new(LexiconProvider::new(&cfg.analysis))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            import::run_import(&cfg, &file).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::List { limit } => {
            let (pool, store) = open_store(&cfg).await?;
            let docs = browse::list_documents(store.as_ref(), limit).await?;
            print_json(&docs)?;
            pool.close().await;
        }
        Commands::Filter { column, value } => {
            let (pool, store) = open_store(&cfg).await?;
            let docs =
                browse::filter_documents(store.as_ref(), &column, value.as_deref().unwrap_or(""))
                    .await?;
            print_json(&docs)?;
            pool.close().await;
        }
        Commands::Enrich { target } => {
            let (pool, store) = open_store(&cfg).await?;
            let engine = EnrichmentEngine::new(store, provider(&cfg));
            match target {
                EnrichTarget::Sentiment { id: Some(id) } => {
                    print_json(&engine.update_sentiment(&id).await?)?;
                }
                EnrichTarget::Sentiment { id: None } => {
                    print_batch(engine.update_all_sentiment().await?, "sentiment")?;
                }
                EnrichTarget::Entities { id: Some(id) } => {
                    print_json(&engine.update_entities(&id).await?)?;
                }
                EnrichTarget::Entities { id: None } => {
                    print_batch(engine.update_all_entities().await?, "entities")?;
                }
            }
            pool.close().await;
        }
        Commands::Aggregate { series } => {
            let (pool, store) = open_store(&cfg).await?;
            let engine = AggregationEngine::new(store);
            match series {
                AggregateSeries::Sentiment { mode, bucket } => {
                    let data = engine.sentiment_series(&mode, &bucket.query()?).await?;
                    print_json(&data)?;
                }
                AggregateSeries::Entities { bucket } => {
                    let data = engine.entity_series(&bucket.query()?).await?;
                    print_json(&data)?;
                }
            }
            pool.close().await;
        }
        Commands::Topics { action } => {
            let (pool, store) = open_store(&cfg).await?;
            let artifacts = Arc::new(FsArtifactStore::new(&cfg.topics.artifact_dir));
            let engine =
                TopicModelEngine::new(store, provider(&cfg), artifacts, cfg.topics.clone());
            match action {
                TopicsAction::Fit {
                    num_topics,
                    relevant_terms,
                } => {
                    let report = engine.fit(Some(num_topics), relevant_terms).await?;
                    print_json(&report)?;
                }
                TopicsAction::Visual { num_topics, output } => {
                    let html = engine.visualize(Some(num_topics)).await?;
                    if let Some(parent) = output.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&output, html)
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    println!("Wrote {}", output.display());
                }
            }
            pool.close().await;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

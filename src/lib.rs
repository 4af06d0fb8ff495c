//! # Disruption Lens
//!
//! Enrichment and time-series aggregation for a corpus of disruption news
//! documents (floods, fires, strikes, outages).
//!
//! Documents are stored in SQLite by an upstream ingestion step (or
//! `dlens import`). This crate adds two derived fields per document,
//! a sentiment score and a map of named entities, aggregates both into
//! time buckets, and fits topic models over the corpus.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ DocumentStore│◀─▶│ EnrichmentEngine │◀──│   Analysis   │
//! │ SQLite / mem │   └──────────────────┘   │   Provider   │
//! │              │   ┌──────────────────┐   │ lexicon/LDA  │
//! │              │──▶│ AggregationEngine│   │              │
//! │              │   └──────────────────┘   │              │
//! │              │   ┌──────────────────┐   │              │
//! │              │──▶│ TopicModelEngine │◀──│              │
//! └──────────────┘   └────────┬─────────┘   └──────────────┘
//!                             ▼
//!                      ArtifactStore (k → JSON)
//!
//!          CLI (dlens)  ──┬──  HTTP (axum)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dlens init
//! dlens import news.ndjson
//! dlens enrich sentiment
//! dlens enrich entities
//! dlens aggregate sentiment --mode average --date-only
//! dlens topics fit --num-topics 5
//! dlens serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Document, entity map, and column types |
//! | [`error`] | Engine error taxonomy |
//! | [`store`] | Document store trait, in-memory and SQLite backends |
//! | [`analysis`] | Analysis provider trait and the built-in lexicon/LDA provider |
//! | [`preprocess`] | Tokenisation for topic modelling |
//! | [`enrich`] | Sentiment and entity enrichment, single and batch |
//! | [`aggregate`] | Time-bucketed sentiment and entity series |
//! | [`topics`] | Topic-model fitting, artifacts, and HTML rendering |
//! | [`browse`] | Listing and column filtering |
//! | [`import`] | JSON / NDJSON document import |
//! | [`stats`] | Collection statistics |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod aggregate;
pub mod analysis;
pub mod browse;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod import;
pub mod migrate;
pub mod models;
pub mod preprocess;
pub mod server;
pub mod stats;
pub mod store;
pub mod topics;

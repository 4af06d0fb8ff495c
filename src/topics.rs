//! Topic modelling over the document corpus and its persisted artifacts.
//!
//! A fit reads every document's `body`, tokenises it with
//! [`Preprocessor`], and hands the corpus to the analysis provider. The
//! result is returned to the caller and also persisted as a
//! [`PreparedVisualization`] keyed by topic count, overwriting any earlier
//! artifact for the same `k`. The retrieval path loads that artifact and
//! renders it as a static HTML page.
//!
//! Sampling and artifact I/O run on the blocking thread pool.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analysis::{AnalysisProvider, TopicMetrics, TopicParams, TopicTerms};
use crate::config::TopicsConfig;
use crate::error::{EngineError, EngineResult};
use crate::preprocess::Preprocessor;
use crate::store::{DocumentStore, Filter};

/// File name used for rendered visualizations.
pub const VISUAL_FILE_NAME: &str = "lda_vis.html";

/// Serializable snapshot of a fitted model, enough to render it later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedVisualization {
    pub num_topics: usize,
    pub metrics: TopicMetrics,
    pub topics: Vec<TopicTerms>,
    pub vocabulary_size: usize,
    pub document_count: usize,
    pub token_count: usize,
}

/// Fit result returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicModelReport {
    pub score: TopicMetrics,
    /// `"Topic N"` → `0.045*"flood" + ...`
    pub data: BTreeMap<String, String>,
}

/// Key-value blob store for prepared visualizations, keyed by topic count.
///
/// Last writer wins.
pub trait ArtifactStore: Send + Sync {
    fn save(&self, num_topics: usize, artifact: &PreparedVisualization) -> Result<()>;

    fn load(&self, num_topics: usize) -> Result<Option<PreparedVisualization>>;

    /// Topic counts that currently have an artifact, ascending.
    fn keys(&self) -> Result<Vec<usize>>;
}

/// One JSON file per `k` under a directory.
pub struct FsArtifactStore {
    dir: PathBuf,
}

const ARTIFACT_PREFIX: &str = "ldavis_prepared_";

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, num_topics: usize) -> PathBuf {
        self.dir
            .join(format!("{}{}.json", ARTIFACT_PREFIX, num_topics))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(&self, num_topics: usize, artifact: &PreparedVisualization) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.path_for(num_topics);
        let json = serde_json::to_string_pretty(artifact)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn load(&self, num_topics: usize) -> Result<Option<PreparedVisualization>> {
        let path = self.path_for(num_topics);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let artifact = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt topic artifact: {}", path.display()))?;
        Ok(Some(artifact))
    }

    fn keys(&self) -> Result<Vec<usize>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let k = name
                .to_str()
                .and_then(|n| n.strip_prefix(ARTIFACT_PREFIX))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(k) = k {
                keys.push(k);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}

pub struct TopicModelEngine {
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn AnalysisProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    settings: TopicsConfig,
    preprocessor: Preprocessor,
}

impl TopicModelEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn AnalysisProvider>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: TopicsConfig,
    ) -> Self {
        Self {
            store,
            provider,
            artifacts,
            settings,
            preprocessor: Preprocessor::new(),
        }
    }

    /// Fits a model with `num_topics` topics over every document body.
    ///
    /// `relevant_terms` defaults to the configured value.
    pub async fn fit(
        &self,
        num_topics: Option<usize>,
        relevant_terms: Option<usize>,
    ) -> EngineResult<TopicModelReport> {
        let k = require_topic_count(num_topics)?;
        let relevant_terms = relevant_terms.unwrap_or(self.settings.relevant_terms);
        if relevant_terms == 0 {
            return Err(EngineError::InvalidParameter(
                "relevant_terms must be at least 1".into(),
            ));
        }

        let docs = self.store.find(&Filter::all()).await?;
        let texts: Vec<&str> = docs.iter().map(|d| d.body.as_str()).collect();
        let corpus = self.preprocessor.tokenize_corpus(&texts);

        let params = TopicParams {
            num_topics: k,
            relevant_terms,
            iterations: self.settings.iterations,
            alpha: self.settings.alpha,
            beta: self.settings.beta,
            seed: self.settings.seed,
        };
        tracing::info!(k, documents = corpus.len(), iterations = params.iterations, "fitting topic model");

        let provider = self.provider.clone();
        let fit = blocking("topic sampler", move || provider.fit_topic_model(&corpus, &params)).await?;

        let artifact = PreparedVisualization {
            num_topics: k,
            metrics: fit.metrics,
            topics: fit.topics,
            vocabulary_size: fit.vocabulary_size,
            document_count: fit.document_count,
            token_count: fit.token_count,
        };
        let artifacts = self.artifacts.clone();
        let saved = artifact.clone();
        blocking("artifact save", move || Ok(artifacts.save(k, &saved)?)).await?;
        tracing::info!(
            k,
            perplexity = artifact.metrics.perplexity,
            coherence = artifact.metrics.coherence,
            "saved topic artifact"
        );

        Ok(TopicModelReport {
            score: artifact.metrics,
            data: artifact
                .topics
                .iter()
                .map(|t| (format!("Topic {}", t.index), t.display()))
                .collect(),
        })
    }

    /// Renders the stored artifact for `num_topics` as an HTML page.
    pub async fn visualize(&self, num_topics: Option<usize>) -> EngineResult<String> {
        let k = require_topic_count(num_topics)?;
        let artifacts = self.artifacts.clone();
        let artifact = blocking("artifact load", move || Ok(artifacts.load(k)?))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("topic model with {} topics", k)))?;
        Ok(render_html(&artifact))
    }
}

/// Runs `f` on the blocking pool, mapping a panic to `AnalysisFailure`.
async fn blocking<T, F>(what: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EngineError::AnalysisFailure(format!("{} panicked: {}", what, e)))?
}

fn require_topic_count(num_topics: Option<usize>) -> EngineResult<usize> {
    match num_topics {
        None => Err(EngineError::MissingParameter(
            "number of topics not specified".into(),
        )),
        Some(0) => Err(EngineError::InvalidParameter(
            "num_topics must be at least 1".into(),
        )),
        Some(k) => Ok(k),
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Self-contained page: summary metrics plus one bar chart per topic.
pub fn render_html(artifact: &PreparedVisualization) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!(
        "<title>Topic model ({} topics)</title>\n",
        artifact.num_topics
    ));
    html.push_str(
        "<style>\n\
         body { font-family: sans-serif; margin: 2rem; }\n\
         .topic { margin-bottom: 1.5rem; }\n\
         .row { display: flex; align-items: center; gap: 0.5rem; }\n\
         .term { width: 10rem; text-align: right; }\n\
         .bar { background: #4878a8; height: 0.9rem; }\n\
         </style>\n</head>\n<body>\n",
    );
    html.push_str(&format!(
        "<h1>{} topics</h1>\n<p>Perplexity {:.4} &middot; Coherence {:.4} &middot; {} documents &middot; {} terms</p>\n",
        artifact.num_topics,
        artifact.metrics.perplexity,
        artifact.metrics.coherence,
        artifact.document_count,
        artifact.vocabulary_size
    ));

    for topic in &artifact.topics {
        let max = topic
            .terms
            .iter()
            .map(|t| t.weight)
            .fold(f64::MIN_POSITIVE, f64::max);
        html.push_str(&format!(
            "<div class=\"topic\">\n<h2>Topic {} <small>({:.1}% of tokens)</small></h2>\n",
            topic.index,
            topic.prevalence * 100.0
        ));
        for term in &topic.terms {
            html.push_str(&format!(
                "<div class=\"row\"><span class=\"term\">{}</span><span class=\"bar\" style=\"width: {:.1}%\"></span><span>{:.3}</span></div>\n",
                escape(&term.term),
                term.weight / max * 60.0,
                term.weight
            ));
        }
        html.push_str("</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

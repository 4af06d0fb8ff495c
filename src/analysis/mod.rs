//! Analysis provider abstraction and the built-in implementation.
//!
//! The engines never call a model directly. They hold an
//! `Arc<dyn AnalysisProvider>` that is constructed once at process start
//! (see `main.rs` and [`crate::server`]) and dropped at shutdown.
//!
//! [`LexiconProvider`] is the built-in provider:
//! - sentiment via [`sentiment::SentimentLexicon`]
//! - entities via [`entities::EntityExtractor`]
//! - topics via [`lda::GibbsLda`]

pub mod entities;
pub mod lda;
pub mod sentiment;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::EntityMap;

/// Black-box analysis functions used by the engines.
///
/// Implementations must be side-effect free apart from their own model state
/// and safe to share across request handlers.
pub trait AnalysisProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Sentiment of `text` in [-1, 1].
    fn score_sentiment(&self, text: &str) -> f64;

    /// Label → surface forms found in `text`, or `None` when nothing was found.
    fn extract_entities(&self, text: &str) -> Option<EntityMap>;

    /// Fits a topic model over pre-tokenised documents.
    fn fit_topic_model(
        &self,
        corpus: &[Vec<String>],
        params: &TopicParams,
    ) -> EngineResult<TopicModelFit>;
}

/// Settings for one topic-model fit.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicParams {
    pub num_topics: usize,
    pub relevant_terms: usize,
    pub iterations: usize,
    /// `None` means `1/k`.
    pub alpha: Option<f64>,
    pub beta: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopicMetrics {
    pub perplexity: f64,
    pub coherence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: f64,
}

/// One topic with its top-ranked terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTerms {
    pub index: usize,
    /// Share of corpus tokens assigned to this topic.
    pub prevalence: f64,
    pub terms: Vec<WeightedTerm>,
}

impl TopicTerms {
    /// `0.045*"flood" + 0.031*"rain" + ...`
    pub fn display(&self) -> String {
        self.terms
            .iter()
            .map(|t| format!("{:.3}*\"{}\"", t.weight, t.term))
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicModelFit {
    pub metrics: TopicMetrics,
    pub topics: Vec<TopicTerms>,
    pub vocabulary_size: usize,
    pub document_count: usize,
    pub token_count: usize,
}

/// Built-in provider: lexicon sentiment, gazetteer entities, Gibbs LDA.
pub struct LexiconProvider {
    lexicon: sentiment::SentimentLexicon,
    extractor: entities::EntityExtractor,
}

impl LexiconProvider {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            lexicon: sentiment::SentimentLexicon::new(),
            extractor: entities::EntityExtractor::new(&config.entity_labels),
        }
    }
}

impl AnalysisProvider for LexiconProvider {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn score_sentiment(&self, text: &str) -> f64 {
        self.lexicon.score(text)
    }

    fn extract_entities(&self, text: &str) -> Option<EntityMap> {
        self.extractor.extract(text)
    }

    fn fit_topic_model(
        &self,
        corpus: &[Vec<String>],
        params: &TopicParams,
    ) -> EngineResult<TopicModelFit> {
        lda::GibbsLda::new(params.clone())
            .fit(corpus)
            .ok_or_else(|| EngineError::AnalysisFailure("corpus has no usable tokens".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_display_format() {
        let topic = TopicTerms {
            index: 0,
            prevalence: 0.5,
            terms: vec![
                WeightedTerm {
                    term: "flood".into(),
                    weight: 0.0451,
                },
                WeightedTerm {
                    term: "rain".into(),
                    weight: 0.031,
                },
            ],
        };
        assert_eq!(topic.display(), "0.045*\"flood\" + 0.031*\"rain\"");
    }

    #[test]
    fn test_provider_reports_empty_corpus_as_analysis_failure() {
        let provider = LexiconProvider::new(&AnalysisConfig::default());
        let params = TopicParams {
            num_topics: 2,
            relevant_terms: 10,
            iterations: 10,
            alpha: None,
            beta: 0.01,
            seed: None,
        };
        let err = provider.fit_topic_model(&[vec![]], &params).unwrap_err();
        assert!(matches!(err, EngineError::AnalysisFailure(_)));
    }
}

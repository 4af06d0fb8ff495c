//! Latent Dirichlet Allocation by collapsed Gibbs sampling.
//!
//! Counts are kept in `ndarray` matrices. After sampling, the fitted model
//! reports:
//!
//! - **perplexity**: `exp(-loglik / tokens)` of the training corpus under the
//!   point estimates of θ (document-topic) and φ (topic-word);
//! - **coherence**: UMass co-occurrence coherence of each topic's top terms,
//!   averaged over topics (closer to zero is better).
//!
//! Sampling is stochastic; two fits of the same corpus only agree when a seed
//! is supplied.

use ndarray::{Array1, Array2};
use rand::prelude::*;
use std::collections::{HashMap, HashSet};

use super::{TopicMetrics, TopicModelFit, TopicParams, TopicTerms, WeightedTerm};

/// Vocabulary and integer-encoded corpus.
struct EncodedCorpus {
    terms: Vec<String>,
    docs: Vec<Vec<usize>>,
}

impl EncodedCorpus {
    fn build(corpus: &[Vec<String>]) -> Self {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut terms = Vec::new();
        let mut docs = Vec::with_capacity(corpus.len());

        for tokens in corpus {
            let mut doc = Vec::with_capacity(tokens.len());
            for token in tokens {
                let id = *index.entry(token.as_str()).or_insert_with(|| {
                    terms.push(token.clone());
                    terms.len() - 1
                });
                doc.push(id);
            }
            docs.push(doc);
        }

        Self { terms, docs }
    }

    fn token_count(&self) -> usize {
        self.docs.iter().map(|d| d.len()).sum()
    }
}

pub struct GibbsLda {
    params: TopicParams,
}

impl GibbsLda {
    pub fn new(params: TopicParams) -> Self {
        Self { params }
    }

    /// Fits the model. Returns `None` when the corpus has no tokens.
    pub fn fit(&self, corpus: &[Vec<String>]) -> Option<TopicModelFit> {
        let encoded = EncodedCorpus::build(corpus);
        let n_tokens = encoded.token_count();
        if n_tokens == 0 || self.params.num_topics == 0 {
            return None;
        }

        let k = self.params.num_topics;
        let v = encoded.terms.len();
        let n_docs = encoded.docs.len();
        let alpha = self.params.alpha.unwrap_or(1.0 / k as f64);
        let beta = self.params.beta;
        let beta_sum = beta * v as f64;

        let mut rng = match self.params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut topic_word: Array2<f64> = Array2::zeros((k, v));
        let mut doc_topic: Array2<f64> = Array2::zeros((n_docs, k));
        let mut topic_totals: Array1<f64> = Array1::zeros(k);
        let mut assignments: Vec<Vec<usize>> = Vec::with_capacity(n_docs);

        for (d, doc) in encoded.docs.iter().enumerate() {
            let mut z = Vec::with_capacity(doc.len());
            for &w in doc {
                let t = rng.gen_range(0..k);
                topic_word[[t, w]] += 1.0;
                doc_topic[[d, t]] += 1.0;
                topic_totals[t] += 1.0;
                z.push(t);
            }
            assignments.push(z);
        }

        let mut weights = vec![0.0; k];
        for _ in 0..self.params.iterations {
            for (d, doc) in encoded.docs.iter().enumerate() {
                for (pos, &w) in doc.iter().enumerate() {
                    let old = assignments[d][pos];
                    topic_word[[old, w]] -= 1.0;
                    doc_topic[[d, old]] -= 1.0;
                    topic_totals[old] -= 1.0;

                    let mut total = 0.0;
                    for (t, weight) in weights.iter_mut().enumerate() {
                        *weight = (doc_topic[[d, t]] + alpha) * (topic_word[[t, w]] + beta)
                            / (topic_totals[t] + beta_sum);
                        total += *weight;
                    }

                    let threshold = rng.gen::<f64>() * total;
                    let mut cumulative = 0.0;
                    let mut new = k - 1;
                    for (t, weight) in weights.iter().enumerate() {
                        cumulative += weight;
                        if cumulative >= threshold {
                            new = t;
                            break;
                        }
                    }

                    topic_word[[new, w]] += 1.0;
                    doc_topic[[d, new]] += 1.0;
                    topic_totals[new] += 1.0;
                    assignments[d][pos] = new;
                }
            }
        }

        // Point estimates
        let mut phi: Array2<f64> = Array2::zeros((k, v));
        for t in 0..k {
            for w in 0..v {
                phi[[t, w]] = (topic_word[[t, w]] + beta) / (topic_totals[t] + beta_sum);
            }
        }
        let mut theta: Array2<f64> = Array2::zeros((n_docs, k));
        for (d, doc) in encoded.docs.iter().enumerate() {
            let denom = doc.len() as f64 + k as f64 * alpha;
            for t in 0..k {
                theta[[d, t]] = (doc_topic[[d, t]] + alpha) / denom;
            }
        }

        let mut log_likelihood = 0.0;
        for (d, doc) in encoded.docs.iter().enumerate() {
            for &w in doc {
                let p: f64 = (0..k).map(|t| theta[[d, t]] * phi[[t, w]]).sum();
                log_likelihood += p.ln();
            }
        }
        let perplexity = (-log_likelihood / n_tokens as f64).exp();

        let top_n = self.params.relevant_terms.max(1);
        let mut topics = Vec::with_capacity(k);
        let mut top_ids: Vec<Vec<usize>> = Vec::with_capacity(k);
        for t in 0..k {
            let mut ranked: Vec<(usize, f64)> = phi.row(t).iter().copied().enumerate().collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            ranked.truncate(top_n);

            top_ids.push(ranked.iter().map(|(w, _)| *w).collect());
            topics.push(TopicTerms {
                index: t,
                prevalence: topic_totals[t] / n_tokens as f64,
                terms: ranked
                    .iter()
                    .map(|(w, p)| WeightedTerm {
                        term: encoded.terms[*w].clone(),
                        weight: *p,
                    })
                    .collect(),
            });
        }

        let coherence = umass_coherence(&encoded.docs, &top_ids);

        Some(TopicModelFit {
            metrics: TopicMetrics {
                perplexity,
                coherence,
            },
            topics,
            vocabulary_size: v,
            document_count: n_docs,
            token_count: n_tokens,
        })
    }
}

/// Mean UMass coherence over topics.
///
/// For a topic with ranked terms `w1..wn`:
/// `sum_{m>l} ln((D(wm, wl) + 1) / D(wl))`, averaged over the pairs.
fn umass_coherence(docs: &[Vec<usize>], top_ids: &[Vec<usize>]) -> f64 {
    let doc_sets: Vec<HashSet<usize>> = docs.iter().map(|d| d.iter().copied().collect()).collect();
    let df = |w: usize| doc_sets.iter().filter(|s| s.contains(&w)).count() as f64;
    let co_df = |a: usize, b: usize| {
        doc_sets
            .iter()
            .filter(|s| s.contains(&a) && s.contains(&b))
            .count() as f64
    };

    let mut per_topic = Vec::with_capacity(top_ids.len());
    for ids in top_ids {
        let mut sum = 0.0;
        let mut pairs = 0usize;
        for m in 1..ids.len() {
            for l in 0..m {
                let d_l = df(ids[l]);
                if d_l > 0.0 {
                    sum += ((co_df(ids[m], ids[l]) + 1.0) / d_l).ln();
                    pairs += 1;
                }
            }
        }
        per_topic.push(if pairs > 0 { sum / pairs as f64 } else { 0.0 });
    }

    if per_topic.is_empty() {
        0.0
    } else {
        per_topic.iter().sum::<f64>() / per_topic.len() as f64
    }
}

//! TOML configuration parsing.
//!
//! A single file (default `./config/dlens.toml`) carries the database path,
//! the server bind address, the entity labels the analyser should emit, and
//! the topic-model settings.
//!
//! ```toml
//! [db]
//! path = "./data/dlens.sqlite"
//! busy_timeout_ms = 5000
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [analysis]
//! entity_labels = ["person", "country", "city"]
//!
//! [topics]
//! artifact_dir = "./data/topics"
//! iterations = 200
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_entity_labels")]
    pub entity_labels: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            entity_labels: default_entity_labels(),
        }
    }
}

fn default_entity_labels() -> Vec<String> {
    [
        "person",
        "nationality",
        "religious group",
        "political group",
        "facility",
        "organisation",
        "country",
        "city",
        "state",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TopicsConfig {
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Document-topic prior. Falls back to `1/k` when unset.
    #[serde(default)]
    pub alpha: Option<f64>,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_relevant_terms")]
    pub relevant_terms: usize,
    /// Fixed sampler seed. Leave unset for entropy seeding.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            iterations: default_iterations(),
            alpha: None,
            beta: default_beta(),
            relevant_terms: default_relevant_terms(),
            seed: None,
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}
fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./data/topics")
}
fn default_iterations() -> usize {
    200
}
fn default_beta() -> f64 {
    0.01
}
fn default_relevant_terms() -> usize {
    10
}

impl Config {
    /// In-code defaults, used where no config file is present (tests, scratch runs).
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/dlens.sqlite"),
                busy_timeout_ms: default_busy_timeout_ms(),
            },
            server: ServerConfig {
                bind: "127.0.0.1:8000".to_string(),
            },
            analysis: AnalysisConfig::default(),
            topics: TopicsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.analysis.entity_labels.is_empty() {
        anyhow::bail!("analysis.entity_labels must not be empty");
    }

    if config.topics.iterations == 0 {
        anyhow::bail!("topics.iterations must be > 0");
    }
    if config.topics.beta <= 0.0 {
        anyhow::bail!("topics.beta must be > 0");
    }
    if let Some(alpha) = config.topics.alpha {
        if alpha <= 0.0 {
            anyhow::bail!("topics.alpha must be > 0 when set");
        }
    }
    if config.topics.relevant_terms == 0 {
        anyhow::bail!("topics.relevant_terms must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let cfg: Config = toml::from_str(
            r#"
            [db]
            path = "/tmp/x.sqlite"

            [server]
            bind = "127.0.0.1:9000"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.analysis.entity_labels.len(), 9);
        assert_eq!(cfg.topics.relevant_terms, 10);
        assert_eq!(cfg.db.busy_timeout_ms, 5_000);
        assert!(cfg.topics.seed.is_none());
        validate(&cfg).unwrap();
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let mut cfg = Config::minimal();
        cfg.topics.iterations = 0;
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("iterations"));
    }

    #[test]
    fn test_rejects_non_positive_alpha() {
        let mut cfg = Config::minimal();
        cfg.topics.alpha = Some(0.0);
        assert!(validate(&cfg).is_err());
    }
}

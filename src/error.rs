//! Error taxonomy shared by the enrichment, aggregation, and topic engines.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The referenced document or artifact does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The operation was valid but the store reported no modified document.
    #[error("{0} unchanged")]
    NoChange(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    /// A batch run where not a single write landed.
    #[error("{failed}/{total} {field} unchanged")]
    PartialBatchFailure {
        failed: usize,
        total: usize,
        field: &'static str,
    },

    #[error("analysis failed: {0}")]
    AnalysisFailure(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

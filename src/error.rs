//! Error taxonomy that crosses the pipeline/presentation boundary.
//!
//! Individual source failures never show up here: they are absorbed by the
//! fan-out and only counted. Malformed upstream data is absorbed by the
//! normalizer. What remains is either a bad query or every source failing.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Query rejected before any fetch was attempted.
    #[error("invalid query: {0}")]
    Configuration(String),

    /// Every configured source failed or timed out. Retryable by the user.
    #[error("could not load {tile_type} data: all {attempted} source(s) failed ({last_error})")]
    TotalFetchFailure {
        tile_type: String,
        attempted: usize,
        last_error: String,
    },
}

impl PipelineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Stable machine-readable tag for API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::TotalFetchFailure { .. } => "total_fetch_failure",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TotalFetchFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

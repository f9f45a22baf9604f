use std::path::PathBuf;

use crate::models::{Language, ToolKind};

/// Failures raised while running tools and building the dataset.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// The tool is missing, could not be spawned, exited with an unexpected
    /// status, or timed out.
    #[error("{tool} failed on sample '{sample}': {reason}")]
    ToolExecution {
        tool: ToolKind,
        sample: String,
        reason: String,
    },

    /// The tool was asked to analyze sources it does not understand.
    #[error("{tool} cannot analyze {language} sources (sample '{sample}')")]
    UnsupportedLanguage {
        tool: ToolKind,
        language: Language,
        sample: String,
    },

    /// The tool's output did not have the expected shape.
    #[error("could not parse {tool} output for sample '{sample}': {reason}")]
    Parse {
        tool: ToolKind,
        sample: String,
        reason: String,
    },

    /// The tool ran but produced nothing to analyze.
    #[error("{tool} produced no analyzable output for sample '{sample}'")]
    EmptyResult { tool: ToolKind, sample: String },

    /// A metric was ingested twice for the same sample.
    #[error("metric '{column}' already recorded for sample '{sample}'")]
    MetricCollision { sample: String, column: String },

    /// The dataset could not be written.
    #[error("failed to write dataset to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid metric record: {0}")]
    InvalidRecord(String),
}

impl HarvestError {
    /// Per-sample, per-tool failures that leave a null block in the dataset
    /// instead of aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HarvestError::ToolExecution { .. }
                | HarvestError::Parse { .. }
                | HarvestError::EmptyResult { .. }
        )
    }

    pub(crate) fn parse(tool: ToolKind, sample: &str, reason: impl Into<String>) -> Self {
        HarvestError::Parse {
            tool,
            sample: sample.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn empty(tool: ToolKind, sample: &str) -> Self {
        HarvestError::EmptyResult {
            tool,
            sample: sample.to_string(),
        }
    }
}

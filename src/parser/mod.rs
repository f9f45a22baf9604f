//! Normalization of raw tool output into [`MetricRecord`]s.
//!
//! Each tool has its own output shape, so each has its own parser; all of
//! them produce tool-namespaced records and declare up front every column
//! they can emit.

use crate::config::PmdFormat;
use crate::error::HarvestError;
use crate::models::{MetricKey, MetricRecord, ToolKind, ToolResult};

pub mod multimetric;
pub mod pmd;
pub mod pycodestyle;
pub mod radon;

pub trait ResultParser: Send + Sync {
    fn tool(&self) -> ToolKind;

    /// Every metric this parser can produce, whether or not a given run
    /// reports it.
    fn metric_names(&self) -> Vec<String>;

    fn parse(&self, result: &ToolResult) -> Result<MetricRecord, HarvestError>;

    fn columns(&self) -> Vec<MetricKey> {
        self.metric_names()
            .into_iter()
            .map(|name| MetricKey::new(self.tool(), name))
            .collect()
    }
}

/// Parser for the output of `kind`.
pub fn parser_for(kind: ToolKind, pmd_format: PmdFormat) -> Box<dyn ResultParser> {
    match kind {
        ToolKind::Radon => Box::new(radon::RadonParser),
        ToolKind::Pycodestyle => Box::new(pycodestyle::PycodestyleParser),
        ToolKind::Multimetric => Box::new(multimetric::MultimetricParser),
        ToolKind::Pmd => Box::new(pmd::PmdParser::new(pmd_format)),
    }
}

/// Stdout of the invocation labelled `label`, or a parse error naming it.
pub(crate) fn stdout<'a>(result: &'a ToolResult, label: &str) -> Result<&'a str, HarvestError> {
    result
        .output(label)
        .map(|o| o.stdout.as_str())
        .ok_or_else(|| {
            HarvestError::parse(result.tool, &result.sample_id, format!("missing `{label}` output"))
        })
}

/// Round to two decimals, as the downstream study expects.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean, minimum and maximum of a set of reported values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Summary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let sum: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            mean: sum / values.len() as f64,
            min,
            max,
        })
    }

    /// Merge per-file summaries: mean of the means, lowest minimum, highest
    /// maximum.
    pub fn combine(parts: &[Summary]) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        Some(Self {
            mean: parts.iter().map(|s| s.mean).sum::<f64>() / parts.len() as f64,
            min: parts.iter().map(|s| s.min).fold(f64::INFINITY, f64::min),
            max: parts.iter().map(|s| s.max).fold(f64::NEG_INFINITY, f64::max),
        })
    }

    /// Store as `<prefix>_mean`, `<prefix>_min` and `<prefix>_max`.
    pub fn record(&self, record: &mut MetricRecord, prefix: &str) {
        record.set_float(&format!("{prefix}_mean"), round2(self.mean));
        record.set_float(&format!("{prefix}_min"), round2(self.min));
        record.set_float(&format!("{prefix}_max"), round2(self.max));
    }
}

/// Column names produced by [`Summary::record`].
pub(crate) fn summary_names(prefix: &str) -> [String; 3] {
    [
        format!("{prefix}_mean"),
        format!("{prefix}_min"),
        format!("{prefix}_max"),
    ]
}

#[cfg(test)]
pub(crate) fn tool_result(tool: ToolKind, sample: &str, outputs: &[(&str, &str)]) -> ToolResult {
    use crate::models::CapturedOutput;

    ToolResult {
        tool,
        sample_id: sample.to_string(),
        file_count: 1,
        outputs: outputs
            .iter()
            .map(|(label, stdout)| CapturedOutput {
                label: label.to_string(),
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: Some(0),
            })
            .collect(),
    }
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// Source language of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
}

impl Language {
    /// File extension (without the dot) of sources in this language.
    pub fn extension(self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::Java => "java",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::Java => write!(f, "java"),
        }
    }
}

/// One of the supported external analysis tools.
///
/// Declaration order is the column-group order of the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Radon,
    Pycodestyle,
    Multimetric,
    Pmd,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::Radon,
        ToolKind::Pycodestyle,
        ToolKind::Multimetric,
        ToolKind::Pmd,
    ];

    /// The language this tool analyzes.
    pub fn language(self) -> Language {
        match self {
            ToolKind::Radon | ToolKind::Pycodestyle => Language::Python,
            ToolKind::Multimetric | ToolKind::Pmd => Language::Java,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Radon => "radon",
            ToolKind::Pycodestyle => "pycodestyle",
            ToolKind::Multimetric => "multimetric",
            ToolKind::Pmd => "pmd",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A unit of analysis: one source file, or the files of one language in a
/// project directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Path relative to the input root, `/`-separated.
    pub id: String,
    pub language: Language,
    /// The file or directory the sample was discovered at.
    pub path: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Captured output of one external process.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedOutput {
    /// Which invocation produced this output (`raw`, `cc`, ... for radon,
    /// the tool name otherwise).
    pub label: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Raw output of one tool run against one sample.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool: ToolKind,
    pub sample_id: String,
    /// Number of source files the tool was pointed at.
    pub file_count: usize,
    pub outputs: Vec<CapturedOutput>,
}

impl ToolResult {
    /// Look up the output of a labelled invocation.
    pub fn output(&self, label: &str) -> Option<&CapturedOutput> {
        self.outputs.iter().find(|o| o.label == label)
    }
}

/// A single metric value as reported by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    /// Parse a free-form cell: numbers become floats, everything else text.
    pub fn from_cell(cell: &str) -> Self {
        let trimmed = cell.trim();
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => MetricValue::Float(v),
            _ => MetricValue::Text(trimmed.to_string()),
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v}"),
            MetricValue::Text(v) => f.write_str(v),
        }
    }
}

/// Tool-namespaced metric name; renders as `tool.metric`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricKey {
    pub tool: ToolKind,
    pub metric: String,
}

impl MetricKey {
    pub fn new(tool: ToolKind, metric: impl Into<String>) -> Self {
        Self {
            tool,
            metric: metric.into(),
        }
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.tool, self.metric)
    }
}

/// Normalized metrics of one tool for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    sample_id: String,
    tool: ToolKind,
    metrics: BTreeMap<MetricKey, MetricValue>,
}

impl MetricRecord {
    pub fn new(sample_id: impl Into<String>, tool: ToolKind) -> Result<Self, HarvestError> {
        let sample_id = sample_id.into();
        if sample_id.trim().is_empty() {
            return Err(HarvestError::InvalidRecord(format!(
                "{tool} record has an empty sample identifier"
            )));
        }
        Ok(Self {
            sample_id,
            tool,
            metrics: BTreeMap::new(),
        })
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    pub fn metrics(&self) -> &BTreeMap<MetricKey, MetricValue> {
        &self.metrics
    }

    /// Set a metric under this record's tool namespace.
    pub fn set(&mut self, metric: &str, value: MetricValue) {
        self.metrics.insert(MetricKey::new(self.tool, metric), value);
    }

    pub fn set_int(&mut self, metric: &str, value: i64) {
        self.set(metric, MetricValue::Int(value));
    }

    pub fn set_float(&mut self, metric: &str, value: f64) {
        self.set(metric, MetricValue::Float(value));
    }

    #[cfg(test)]
    pub fn get(&self, metric: &str) -> Option<&MetricValue> {
        self.metrics.get(&MetricKey::new(self.tool, metric))
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// One line of the final dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRow {
    pub sample_id: String,
    pub languages: Vec<Language>,
    /// One entry per dataset column, `None` where the metric is absent.
    pub values: Vec<Option<MetricValue>>,
    pub label: Option<MetricValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_rejects_blank_sample_id() {
        assert!(matches!(
            MetricRecord::new("  ", ToolKind::Radon),
            Err(HarvestError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_record_namespaces_metrics() {
        let mut record = MetricRecord::new("a.py", ToolKind::Pycodestyle).unwrap();
        record.set_int("violations", 3);
        let (key, value) = record.metrics().iter().next().unwrap();
        assert_eq!(key.to_string(), "pycodestyle.violations");
        assert_eq!(value, &MetricValue::Int(3));
    }

    #[test]
    fn test_tool_languages() {
        assert_eq!(ToolKind::Radon.language(), Language::Python);
        assert_eq!(ToolKind::Pmd.language(), Language::Java);
    }

    #[test]
    fn test_value_from_cell() {
        assert_eq!(MetricValue::from_cell(" 42.5 "), MetricValue::Float(42.5));
        assert_eq!(
            MetricValue::from_cell("high"),
            MetricValue::Text("high".to_string())
        );
    }
}

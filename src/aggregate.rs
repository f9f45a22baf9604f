//! Merging of per-tool records into one row per sample.
//!
//! Rows are buffered until every job has finished: the dataset's column set
//! is the union of all declared and observed metrics, which is only known
//! at the end of the run.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::DuplicatePolicy;
use crate::error::HarvestError;
use crate::labels::Labels;
use crate::models::{AggregatedRow, Language, MetricKey, MetricRecord, MetricValue, Sample, ToolKind};

/// Result of folding one record into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Merged,
    /// An identical record was already ingested; nothing changed.
    Duplicate,
}

/// A recovered per-sample, per-tool failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolFailure {
    pub sample_id: String,
    pub tool: ToolKind,
    pub reason: String,
}

#[derive(Debug, Default)]
struct RowState {
    languages: BTreeSet<Language>,
    metrics: BTreeMap<MetricKey, MetricValue>,
    tools: BTreeSet<ToolKind>,
}

/// Accumulates records until [`Aggregator::finalize`].
#[derive(Debug)]
pub struct Aggregator {
    policy: DuplicatePolicy,
    schema: BTreeSet<MetricKey>,
    rows: BTreeMap<String, RowState>,
    failures: Vec<ToolFailure>,
}

/// The finished table.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Metric columns, grouped by tool and sorted by name within a tool.
    pub columns: Vec<MetricKey>,
    /// Name of the joined label column, when labels were supplied.
    pub label_column: Option<String>,
    pub rows: Vec<AggregatedRow>,
    /// Samples every tool failed on.
    pub dropped: Vec<String>,
    pub failures: Vec<ToolFailure>,
    /// Label entries that matched no sample.
    pub unmatched_labels: usize,
}

impl Aggregator {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            schema: BTreeSet::new(),
            rows: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    /// Add columns to the schema ahead of any record, so a tool that never
    /// succeeds still gets (all-null) columns.
    pub fn declare(&mut self, columns: impl IntoIterator<Item = MetricKey>) {
        self.schema.extend(columns);
    }

    /// Track a discovered sample so it is accounted for even if every tool
    /// fails on it.
    pub fn register(&mut self, sample: &Sample) {
        self.rows
            .entry(sample.id.clone())
            .or_default()
            .languages
            .insert(sample.language);
    }

    /// Fold one record into the row of its sample.
    ///
    /// A metric that is already present is a [`HarvestError::MetricCollision`];
    /// under [`DuplicatePolicy::Ignore`] an exact repeat of an earlier record
    /// is accepted as a no-op instead.
    pub fn ingest(&mut self, record: MetricRecord) -> Result<IngestOutcome, HarvestError> {
        let row = self.rows.entry(record.sample_id().to_string()).or_default();

        if self.policy == DuplicatePolicy::Ignore
            && row.tools.contains(&record.tool())
            && record
                .metrics()
                .iter()
                .all(|(key, value)| row.metrics.get(key) == Some(value))
        {
            tracing::debug!(sample = record.sample_id(), tool = %record.tool(), "duplicate record ignored");
            return Ok(IngestOutcome::Duplicate);
        }

        if let Some(key) = record.metrics().keys().find(|k| row.metrics.contains_key(*k)) {
            return Err(HarvestError::MetricCollision {
                sample: record.sample_id().to_string(),
                column: key.to_string(),
            });
        }

        row.tools.insert(record.tool());
        for (key, value) in record.metrics() {
            self.schema.insert(key.clone());
            row.metrics.insert(key.clone(), value.clone());
        }
        Ok(IngestOutcome::Merged)
    }

    /// Remember a recovered failure; the sample's columns for `tool` stay null.
    pub fn record_failure(&mut self, sample_id: &str, tool: ToolKind, error: &HarvestError) {
        self.rows.entry(sample_id.to_string()).or_default();
        self.failures.push(ToolFailure {
            sample_id: sample_id.to_string(),
            tool,
            reason: error.to_string(),
        });
    }

    /// Produce the rectangular table, joining `labels` by sample id.
    ///
    /// Samples without a single successful tool are left out and listed in
    /// [`Dataset::dropped`].
    pub fn finalize(self, labels: Option<&Labels>) -> Dataset {
        let columns: Vec<MetricKey> = self.schema.into_iter().collect();
        let mut rows = Vec::new();
        let mut dropped = Vec::new();

        for (sample_id, state) in self.rows {
            if state.tools.is_empty() {
                dropped.push(sample_id);
                continue;
            }
            let values = columns
                .iter()
                .map(|key| state.metrics.get(key).cloned())
                .collect();
            let label = labels.and_then(|l| l.get(&sample_id).cloned());
            rows.push(AggregatedRow {
                sample_id,
                languages: state.languages.into_iter().collect(),
                values,
                label,
            });
        }

        let unmatched_labels = labels.map_or(0, |l| {
            l.ids()
                .filter(|id| !rows.iter().any(|r| r.sample_id == **id) && !dropped.contains(*id))
                .count()
        });
        if unmatched_labels > 0 {
            tracing::warn!(unmatched_labels, "label entries matched no sample");
        }

        let mut failures = self.failures;
        failures.sort_by(|a, b| a.sample_id.cmp(&b.sample_id).then(a.tool.cmp(&b.tool)));

        Dataset {
            columns,
            label_column: labels.map(|l| l.column().to_string()),
            rows,
            dropped,
            failures,
            unmatched_labels,
        }
    }
}

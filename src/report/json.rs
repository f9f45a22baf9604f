use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::aggregate::ToolFailure;
use crate::models::ToolKind;
use crate::pipeline::{RunOutcome, ToolTally};

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    output: String,
    samples: usize,
    rows: usize,
    columns: Vec<String>,
    warnings: usize,
    dropped: &'a [String],
    unmatched_labels: usize,
    tools: &'a BTreeMap<ToolKind, ToolTally>,
    failures: &'a [ToolFailure],
}

/// Print a machine-readable summary of the run to stdout.
pub fn render(outcome: &RunOutcome, output: &Path) -> Result<()> {
    let dataset = &outcome.dataset;
    let summary = RunSummary {
        output: output.display().to_string(),
        samples: outcome.samples,
        rows: dataset.rows.len(),
        columns: dataset.columns.iter().map(ToString::to_string).collect(),
        warnings: outcome.warning_count(),
        dropped: &dataset.dropped,
        unmatched_labels: dataset.unmatched_labels,
        tools: &outcome.tallies,
        failures: &dataset.failures,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

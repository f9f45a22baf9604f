use serde_json::{Map, Value};

use super::{stdout, summary_names, ResultParser, Summary};
use crate::error::HarvestError;
use crate::models::{MetricRecord, ToolKind, ToolResult};

/// Raw line counts reported by `radon raw`, summed over the sample's files.
const RAW_FIELDS: [&str; 7] = [
    "loc",
    "lloc",
    "sloc",
    "comments",
    "multi",
    "blank",
    "single_comments",
];

/// `(name, index in the legacy array form of the "total" entry)`.
const HALSTEAD_FIELDS: [(&str, usize); 4] =
    [("volume", 7), ("difficulty", 8), ("effort", 9), ("time", 10)];

const STRAIGHT_LINE: Summary = Summary {
    mean: 1.0,
    min: 1.0,
    max: 1.0,
};

/// Parser for the four `radon <cmd> -j` JSON reports (`raw`, `cc`, `mi`,
/// `hal`), each an object keyed by file path.
///
/// Files radon could not analyze (reported as `{"error": ...}`) are skipped
/// and counted in `skipped_files`. Cyclomatic complexity is summarized per
/// file first, then combined across the sample's files.
pub struct RadonParser;

impl ResultParser for RadonParser {
    fn tool(&self) -> ToolKind {
        ToolKind::Radon
    }

    fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = RAW_FIELDS.iter().map(|s| s.to_string()).collect();
        names.push("skipped_files".to_string());
        names.extend(summary_names("cc"));
        names.extend(summary_names("mi"));
        for (field, _) in HALSTEAD_FIELDS {
            names.extend(summary_names(&format!("halstead_{field}")));
        }
        names
    }

    fn parse(&self, result: &ToolResult) -> Result<MetricRecord, HarvestError> {
        let sample = result.sample_id.as_str();
        let fail = |reason: String| HarvestError::parse(ToolKind::Radon, sample, reason);
        let mut record = MetricRecord::new(sample, ToolKind::Radon)?;

        // raw
        let raw = report(stdout(result, "raw")?, "raw").map_err(fail)?;
        let mut totals = [0i64; RAW_FIELDS.len()];
        let mut analyzed = 0usize;
        for (path, entry) in analyzed_files(&raw, "raw") {
            for (total, field) in totals.iter_mut().zip(RAW_FIELDS) {
                *total += entry
                    .get(field)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| fail(format!("raw report for {path} lacks '{field}'")))?;
            }
            analyzed += 1;
        }
        if analyzed == 0 || totals[0] == 0 {
            return Err(HarvestError::empty(ToolKind::Radon, sample));
        }
        for (field, total) in RAW_FIELDS.iter().zip(totals) {
            record.set_int(field, total);
        }

        let skipped = raw.values().filter(|entry| is_error(entry)).count();
        record.set_int("skipped_files", skipped as i64);

        // cc: one entry per function, method or class, summarized per file
        let cc = report(stdout(result, "cc")?, "cc").map_err(fail)?;
        let mut per_file = Vec::new();
        for (path, blocks) in cc.iter().filter(|(_, v)| !is_error(v)) {
            let blocks = blocks
                .as_array()
                .ok_or_else(|| fail(format!("cc report for {path} is not a list")))?;
            let mut complexities = Vec::with_capacity(blocks.len());
            for block in blocks {
                let complexity = block
                    .get("complexity")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| fail(format!("cc block in {path} lacks 'complexity'")))?;
                complexities.push(complexity);
            }
            // a file without any block is straight-line code
            per_file.push(Summary::of(&complexities).unwrap_or(STRAIGHT_LINE));
        }
        Summary::combine(&per_file)
            .unwrap_or(STRAIGHT_LINE)
            .record(&mut record, "cc");

        // mi
        let mi = report(stdout(result, "mi")?, "mi").map_err(fail)?;
        let mut indices = Vec::new();
        for (path, entry) in analyzed_files(&mi, "mi") {
            let index = entry
                .get("mi")
                .and_then(Value::as_f64)
                .ok_or_else(|| fail(format!("mi report for {path} lacks 'mi'")))?;
            indices.push(index);
        }
        if let Some(summary) = Summary::of(&indices) {
            summary.record(&mut record, "mi");
        }

        // hal
        let hal = report(stdout(result, "hal")?, "hal").map_err(fail)?;
        let mut halstead: [Vec<f64>; HALSTEAD_FIELDS.len()] = Default::default();
        for (path, entry) in analyzed_files(&hal, "hal") {
            let total = entry
                .get("total")
                .ok_or_else(|| fail(format!("hal report for {path} lacks 'total'")))?;
            for (values, (field, index)) in halstead.iter_mut().zip(HALSTEAD_FIELDS) {
                let value = match total {
                    Value::Object(map) => map.get(field),
                    Value::Array(items) => items.get(index),
                    _ => None,
                }
                .and_then(Value::as_f64)
                .ok_or_else(|| fail(format!("hal total for {path} lacks '{field}'")))?;
                values.push(value);
            }
        }
        for (values, (field, _)) in halstead.iter().zip(HALSTEAD_FIELDS) {
            if let Some(summary) = Summary::of(values) {
                summary.record(&mut record, &format!("halstead_{field}"));
            }
        }

        tracing::trace!(sample, metrics = record.metrics().len(), "parsed radon output");
        Ok(record)
    }
}

fn report(text: &str, section: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(format!("{section} report is not a JSON object")),
        Err(e) => Err(format!("{section} report is not valid JSON: {e}")),
    }
}

fn is_error(entry: &Value) -> bool {
    entry.get("error").is_some()
}

/// Object entries of a per-file report, skipping files radon failed on.
fn analyzed_files<'a>(
    report: &'a Map<String, Value>,
    section: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Map<String, Value>)> + 'a {
    report.iter().filter_map(move |(path, entry)| {
        if is_error(entry) {
            tracing::debug!(path = %path, section, error = %entry["error"], "radon skipped file");
            return None;
        }
        entry.as_object().map(|obj| (path, obj))
    })
}

use serde_json::Value;

use super::{round2, stdout, summary_names, ResultParser};
use crate::error::HarvestError;
use crate::models::{MetricRecord, ToolKind, ToolResult};

/// Per-file metrics summarized by multimetric's `stats` section.
const STAT_FIELDS: [&str; 6] = [
    "cyclomatic_complexity",
    "halstead_volume",
    "halstead_difficulty",
    "halstead_timerequired",
    "halstead_effort",
    "maintainability_index",
];

const STATS: [&str; 3] = ["mean", "min", "max"];

/// Parser for multimetric's JSON report (`files`, `overall`, `stats`).
///
/// Sample-level size comes from `overall`; complexity figures are the
/// report's own mean/min/max over files.
pub struct MultimetricParser;

impl ResultParser for MultimetricParser {
    fn tool(&self) -> ToolKind {
        ToolKind::Multimetric
    }

    fn metric_names(&self) -> Vec<String> {
        let mut names = vec!["loc".to_string(), "comment_ratio".to_string()];
        for field in STAT_FIELDS {
            names.extend(summary_names(field));
        }
        names
    }

    fn parse(&self, result: &ToolResult) -> Result<MetricRecord, HarvestError> {
        let sample = result.sample_id.as_str();
        let fail = |reason: String| HarvestError::parse(ToolKind::Multimetric, sample, reason);

        let report: Value = serde_json::from_str(stdout(result, ToolKind::Multimetric.name())?)
            .map_err(|e| fail(format!("report is not valid JSON: {e}")))?;

        let files = report
            .get("files")
            .and_then(Value::as_object)
            .ok_or_else(|| fail("report lacks a 'files' object".to_string()))?;
        let analyzed = files
            .values()
            .filter(|entry| entry.as_object().is_some_and(|obj| !obj.is_empty()))
            .count();
        if analyzed == 0 {
            return Err(HarvestError::empty(ToolKind::Multimetric, sample));
        }

        let overall = report
            .get("overall")
            .ok_or_else(|| fail("report lacks 'overall'".to_string()))?;

        let mut record = MetricRecord::new(sample, ToolKind::Multimetric)?;
        match overall.get("loc") {
            Some(v) if v.is_i64() => record.set_int("loc", v.as_i64().unwrap_or_default()),
            Some(v) if v.is_f64() => record.set_float("loc", round2(v.as_f64().unwrap_or_default())),
            _ => return Err(fail("overall lacks 'loc'".to_string())),
        }
        let comment_ratio = overall
            .get("comment_ratio")
            .and_then(Value::as_f64)
            .ok_or_else(|| fail("overall lacks 'comment_ratio'".to_string()))?;
        record.set_float("comment_ratio", round2(comment_ratio));

        let stats = report.get("stats");
        for field in STAT_FIELDS {
            for calc in STATS {
                // older multimetric releases omit some of these
                if let Some(value) = stats
                    .and_then(|s| s.get(calc))
                    .and_then(|s| s.get(field))
                    .and_then(Value::as_f64)
                {
                    record.set_float(&format!("{field}_{calc}"), round2(value));
                }
            }
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricValue;
    use crate::parser::tool_result;

    fn parse(stdout: &str) -> Result<MetricRecord, HarvestError> {
        MultimetricParser.parse(&tool_result(ToolKind::Multimetric, "B.java", &[("multimetric", stdout)]))
    }

    const REPORT: &str = r#"{
        "files": {
            "B.java": {"loc": 42, "comment_ratio": 11.9, "cyclomatic_complexity": 5,
                       "halstead_volume": 812.4, "maintainability_index": 61.3}
        },
        "overall": {"loc": 42, "comment_ratio": 11.904, "cyclomatic_complexity": 5},
        "stats": {
            "mean": {"cyclomatic_complexity": 5, "halstead_volume": 812.4, "halstead_difficulty": 14.5,
                     "halstead_timerequired": 654.321, "halstead_effort": 11777.8, "maintainability_index": 61.3},
            "min": {"cyclomatic_complexity": 5, "halstead_volume": 812.4, "halstead_difficulty": 14.5,
                    "halstead_timerequired": 654.321, "halstead_effort": 11777.8, "maintainability_index": 61.3},
            "max": {"cyclomatic_complexity": 5, "halstead_volume": 812.4, "halstead_difficulty": 14.5,
                    "halstead_timerequired": 654.321, "halstead_effort": 11777.8, "maintainability_index": 61.3}
        }
    }"#;

    #[test]
    fn test_full_report() {
        let record = parse(REPORT).unwrap();
        assert_eq!(record.get("loc"), Some(&MetricValue::Int(42)));
        assert_eq!(record.get("comment_ratio"), Some(&MetricValue::Float(11.9)));
        assert_eq!(
            record.get("cyclomatic_complexity_mean"),
            Some(&MetricValue::Float(5.0))
        );
        assert_eq!(
            record.get("halstead_timerequired_max"),
            Some(&MetricValue::Float(654.32))
        );
        assert_eq!(record.metrics().len(), MultimetricParser.metric_names().len());
    }

    #[test]
    fn test_missing_stats_leave_gaps() {
        let record = parse(
            r#"{"files": {"B.java": {"loc": 3}}, "overall": {"loc": 3, "comment_ratio": 0.0}}"#,
        )
        .unwrap();
        assert_eq!(record.metrics().len(), 2);
    }

    #[test]
    fn test_empty_files_are_empty_result() {
        let out = r#"{"files": {"B.java": {}}, "overall": {}, "stats": {}}"#;
        assert!(matches!(parse(out), Err(HarvestError::EmptyResult { .. })));
    }

    #[test]
    fn test_missing_overall_loc_is_parse_error() {
        let out = r#"{"files": {"B.java": {"loc": 3}}, "overall": {"comment_ratio": 1.0}}"#;
        assert!(matches!(parse(out), Err(HarvestError::Parse { .. })));
    }
}

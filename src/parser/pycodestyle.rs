use std::sync::LazyLock;

use regex::Regex;

use super::{stdout, ResultParser};
use crate::error::HarvestError;
use crate::models::{MetricRecord, ToolKind, ToolResult};

/// `path:row:col: CODE message`
static VIOLATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>.+?):(?P<row>\d+):(?P<col>\d+): (?P<code>[A-Z]+\d+) ").expect("valid regex")
});

/// Parser for pycodestyle's default line report. No output means no
/// violations.
pub struct PycodestyleParser;

impl ResultParser for PycodestyleParser {
    fn tool(&self) -> ToolKind {
        ToolKind::Pycodestyle
    }

    fn metric_names(&self) -> Vec<String> {
        vec![
            "violations".to_string(),
            "errors".to_string(),
            "warnings".to_string(),
        ]
    }

    fn parse(&self, result: &ToolResult) -> Result<MetricRecord, HarvestError> {
        let sample = result.sample_id.as_str();
        let text = stdout(result, ToolKind::Pycodestyle.name())?;

        let mut violations = 0i64;
        let mut errors = 0i64;
        let mut warnings = 0i64;
        let mut unrecognized = 0usize;

        for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
            let Some(caps) = VIOLATION.captures(line) else {
                unrecognized += 1;
                tracing::debug!(sample, line, "unrecognized pycodestyle line");
                continue;
            };
            violations += 1;
            match caps["code"].chars().next() {
                Some('E') => errors += 1,
                Some('W') => warnings += 1,
                _ => {}
            }
        }

        if violations == 0 && unrecognized > 0 {
            return Err(HarvestError::parse(
                ToolKind::Pycodestyle,
                sample,
                format!("{unrecognized} line(s) of output, none in `path:row:col: CODE` form"),
            ));
        }

        let mut record = MetricRecord::new(sample, ToolKind::Pycodestyle)?;
        record.set_int("violations", violations);
        record.set_int("errors", errors);
        record.set_int("warnings", warnings);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricValue;
    use crate::parser::tool_result;

    fn parse(stdout: &str) -> Result<MetricRecord, HarvestError> {
        PycodestyleParser.parse(&tool_result(ToolKind::Pycodestyle, "a.py", &[("pycodestyle", stdout)]))
    }

    #[test]
    fn test_counts_by_category() {
        let out = "\
a.py:1:1: E265 block comment should start with '# '
a.py:3:80: E501 line too long (88 > 79 characters)
a.py:10:1: W391 blank line at end of file
a.py:4:5: C901 'f' is too complex (12)
";
        let record = parse(out).unwrap();
        assert_eq!(record.get("violations"), Some(&MetricValue::Int(4)));
        assert_eq!(record.get("errors"), Some(&MetricValue::Int(2)));
        assert_eq!(record.get("warnings"), Some(&MetricValue::Int(1)));
    }

    #[test]
    fn test_clean_file() {
        let record = parse("").unwrap();
        assert_eq!(record.get("violations"), Some(&MetricValue::Int(0)));
    }

    #[test]
    fn test_windows_paths() {
        let record = parse(r"C:\work\a.py:2:1: E302 expected 2 blank lines, found 1").unwrap();
        assert_eq!(record.get("errors"), Some(&MetricValue::Int(1)));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            parse("Traceback (most recent call last):\n  boom\n"),
            Err(HarvestError::Parse { .. })
        ));
    }
}

use std::sync::LazyLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::Deserialize;

use super::{stdout, summary_names, ResultParser, Summary};
use crate::config::PmdFormat;
use crate::error::HarvestError;
use crate::models::{MetricRecord, ToolKind, ToolResult};

/// Rule whose reports carry a method's cognitive complexity rather than a
/// style violation.
const COGNITIVE_RULE: &str = "CognitiveComplexity";

/// "The method 'run()' has a cognitive complexity of 17, current threshold is 15"
static COGNITIVE_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"of (\d+)").expect("valid regex"));

/// Parser for PMD reports in either the `json` or the `xml` renderer.
pub struct PmdParser {
    format: PmdFormat,
}

impl PmdParser {
    pub fn new(format: PmdFormat) -> Self {
        Self { format }
    }
}

/// Renderer-independent view of a PMD report.
#[derive(Debug, Default, PartialEq)]
struct PmdReport {
    files: usize,
    violations: Vec<PmdViolation>,
    processing_errors: usize,
}

#[derive(Debug, Default, PartialEq)]
struct PmdViolation {
    rule: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct JsonReport {
    #[serde(default)]
    files: Vec<JsonFile>,
    #[serde(default, rename = "processingErrors")]
    processing_errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JsonFile {
    #[serde(default)]
    violations: Vec<JsonViolation>,
}

#[derive(Debug, Deserialize)]
struct JsonViolation {
    rule: String,
    #[serde(default)]
    description: String,
}

impl ResultParser for PmdParser {
    fn tool(&self) -> ToolKind {
        ToolKind::Pmd
    }

    fn metric_names(&self) -> Vec<String> {
        let mut names = vec!["violations".to_string(), "processing_errors".to_string()];
        names.extend(summary_names("cognitive"));
        names
    }

    fn parse(&self, result: &ToolResult) -> Result<MetricRecord, HarvestError> {
        let sample = result.sample_id.as_str();
        let text = stdout(result, ToolKind::Pmd.name())?;
        if text.trim().is_empty() {
            return Err(HarvestError::empty(ToolKind::Pmd, sample));
        }

        let report = match self.format {
            PmdFormat::Json => parse_json(text),
            PmdFormat::Xml => parse_xml(text),
        }
        .map_err(|reason| HarvestError::parse(ToolKind::Pmd, sample, reason))?;

        if report.files == 0 && report.processing_errors > 0 {
            return Err(HarvestError::empty(ToolKind::Pmd, sample));
        }

        let mut violations = 0i64;
        let mut cognitive = Vec::new();
        for violation in &report.violations {
            if violation.rule != COGNITIVE_RULE {
                violations += 1;
                continue;
            }
            let score = COGNITIVE_SCORE
                .captures(&violation.description)
                .and_then(|caps| caps[1].parse::<f64>().ok())
                .ok_or_else(|| {
                    HarvestError::parse(
                        ToolKind::Pmd,
                        sample,
                        format!("no complexity in '{}'", violation.description.trim()),
                    )
                })?;
            cognitive.push(score);
        }

        let mut record = MetricRecord::new(sample, ToolKind::Pmd)?;
        record.set_int("violations", violations);
        record.set_int("processing_errors", report.processing_errors as i64);
        // only methods above the rule's threshold are reported
        if let Some(summary) = Summary::of(&cognitive) {
            summary.record(&mut record, "cognitive");
        }
        Ok(record)
    }
}

fn parse_json(text: &str) -> Result<PmdReport, String> {
    let report: JsonReport =
        serde_json::from_str(text).map_err(|e| format!("report is not valid JSON: {e}"))?;

    Ok(PmdReport {
        files: report.files.len(),
        violations: report
            .files
            .into_iter()
            .flat_map(|f| f.violations)
            .map(|v| PmdViolation {
                rule: v.rule,
                description: v.description,
            })
            .collect(),
        processing_errors: report.processing_errors.len(),
    })
}

/// Parse the XML renderer's `<pmd><file><violation rule="...">text</violation>`
/// layout with the quick-xml event API.
fn parse_xml(text: &str) -> Result<PmdReport, String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut report = PmdReport::default();
    let mut buf = Vec::new();
    let mut current: Option<PmdViolation> = None;
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().local_name().as_ref() {
                b"pmd" => saw_root = true,
                b"file" => report.files += 1,
                b"violation" => {
                    current = Some(PmdViolation {
                        rule: rule_attr(e)?,
                        description: String::new(),
                    });
                }
                // `<error filename=".." msg="..">` carries the stack trace as CDATA
                b"error" => report.processing_errors += 1,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().local_name().as_ref() {
                b"pmd" => saw_root = true,
                b"file" => report.files += 1,
                b"violation" => report.violations.push(PmdViolation {
                    rule: rule_attr(e)?,
                    description: String::new(),
                }),
                b"error" => report.processing_errors += 1,
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if let Some(violation) = current.as_mut() {
                    let text = e.unescape().map_err(|err| format!("bad violation text: {err}"))?;
                    violation.description.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().local_name().as_ref() == b"violation" {
                    if let Some(violation) = current.take() {
                        report.violations.push(violation);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "invalid XML at position {}: {e}",
                    reader.buffer_position()
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err("report has no <pmd> root element".to_string());
    }
    Ok(report)
}

fn rule_attr(element: &BytesStart<'_>) -> Result<String, String> {
    let attr = element
        .try_get_attribute("rule")
        .map_err(|e| format!("bad violation attributes: {e}"))?
        .ok_or_else(|| "violation without a rule attribute".to_string())?;
    attr.unescape_value()
        .map(|v| v.into_owned())
        .map_err(|e| format!("bad rule attribute: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricValue;
    use crate::parser::tool_result;

    fn parse(format: PmdFormat, stdout: &str) -> Result<MetricRecord, HarvestError> {
        PmdParser::new(format).parse(&tool_result(ToolKind::Pmd, "B.java", &[("pmd", stdout)]))
    }

    const JSON: &str = r#"{
      "formatVersion": 0,
      "pmdVersion": "7.2.0",
      "files": [{
        "filename": "/corpus/B.java",
        "violations": [
          {"beginline": 1, "description": "Missing package declaration", "rule": "NoPackage",
           "ruleset": "Code Style", "priority": 3},
          {"beginline": 4, "description": "The method 'run()' has a cognitive complexity of 17, current threshold is 15",
           "rule": "CognitiveComplexity", "ruleset": "Design", "priority": 3},
          {"beginline": 9, "description": "The method 'main(String[])' has a cognitive complexity of 21, current threshold is 15",
           "rule": "CognitiveComplexity", "ruleset": "Design", "priority": 3},
          {"beginline": 12, "description": "Avoid unused local variables such as 'x'.", "rule": "UnusedLocalVariable",
           "ruleset": "Best Practices", "priority": 3}
        ]
      }],
      "suppressedViolations": [],
      "processingErrors": [],
      "configurationErrors": []
    }"#;

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pmd xmlns="http://pmd.sourceforge.net/report/2.0.0" version="7.2.0">
<file name="/corpus/B.java">
<violation beginline="1" endline="1" rule="NoPackage" ruleset="Code Style" priority="3">
Missing package declaration
</violation>
<violation beginline="4" endline="8" rule="CognitiveComplexity" ruleset="Design" priority="3">
The method &apos;run()&apos; has a cognitive complexity of 17, current threshold is 15
</violation>
</file>
<error filename="/corpus/C.java" msg="ParseException: Encountered unexpected token">
<![CDATA[net.sourceforge.pmd.lang.ast.ParseException: Encountered unexpected token
    at net.sourceforge.pmd.lang.java.ast.JavaParser.parse]]>
</error>
</pmd>"#;

    #[test]
    fn test_json_report() {
        let record = parse(PmdFormat::Json, JSON).unwrap();
        assert_eq!(record.get("violations"), Some(&MetricValue::Int(2)));
        assert_eq!(record.get("processing_errors"), Some(&MetricValue::Int(0)));
        assert_eq!(record.get("cognitive_mean"), Some(&MetricValue::Float(19.0)));
        assert_eq!(record.get("cognitive_min"), Some(&MetricValue::Float(17.0)));
        assert_eq!(record.get("cognitive_max"), Some(&MetricValue::Float(21.0)));
    }

    #[test]
    fn test_xml_report() {
        let record = parse(PmdFormat::Xml, XML).unwrap();
        assert_eq!(record.get("violations"), Some(&MetricValue::Int(1)));
        assert_eq!(record.get("processing_errors"), Some(&MetricValue::Int(1)));
        assert_eq!(record.get("cognitive_max"), Some(&MetricValue::Float(17.0)));
    }

    #[test]
    fn test_clean_report_has_no_cognitive_columns() {
        let record = parse(PmdFormat::Json, r#"{"files": [], "processingErrors": []}"#).unwrap();
        assert_eq!(record.get("violations"), Some(&MetricValue::Int(0)));
        assert_eq!(record.get("cognitive_mean"), None);
    }

    #[test]
    fn test_blank_output_is_empty() {
        assert!(matches!(
            parse(PmdFormat::Json, "  \n"),
            Err(HarvestError::EmptyResult { .. })
        ));
    }

    #[test]
    fn test_only_processing_errors_is_empty() {
        let out = r#"{"files": [], "processingErrors": [{"filename": "B.java", "message": "ParseException"}]}"#;
        assert!(matches!(
            parse(PmdFormat::Json, out),
            Err(HarvestError::EmptyResult { .. })
        ));
    }

    #[test]
    fn test_xml_only_processing_errors_is_empty() {
        let out = r#"<?xml version="1.0" encoding="UTF-8"?>
<pmd xmlns="http://pmd.sourceforge.net/report/2.0.0" version="7.2.0">
<error filename="/corpus/B.java" msg="ParseException">
<![CDATA[net.sourceforge.pmd.lang.ast.ParseException: Encountered "}"]]>
</error>
</pmd>"#;
        assert!(matches!(
            parse(PmdFormat::Xml, out),
            Err(HarvestError::EmptyResult { .. })
        ));
    }

    #[test]
    fn test_wrong_renderer_is_parse_error() {
        assert!(matches!(parse(PmdFormat::Json, XML), Err(HarvestError::Parse { .. })));
        assert!(matches!(parse(PmdFormat::Xml, JSON), Err(HarvestError::Parse { .. })));
    }
}

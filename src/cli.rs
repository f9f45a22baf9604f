use std::path::PathBuf;

use clap::Parser;

use crate::discovery::SampleUnit;
use crate::models::{Language, ToolKind};

#[derive(Parser, Debug)]
#[command(
    name = "metric-harvest",
    about = "Run static-analysis tools over a code corpus and collect their metrics into one dataset",
    version
)]
pub struct Cli {
    /// Corpus directory (or single source file) to analyze
    pub input: PathBuf,

    /// Languages to analyze
    #[arg(long = "lang", default_value = "all", value_name = "LANG")]
    pub lang: LangArg,

    /// Dataset output path
    #[arg(short, long, default_value = "metrics.csv", value_name = "FILE")]
    pub output: PathBuf,

    /// What counts as one sample: each source file, or each top-level directory
    #[arg(long, default_value = "file", value_name = "UNIT")]
    pub unit: UnitArg,

    /// Delimited file of per-sample labels to join into the dataset
    #[arg(long, value_name = "FILE")]
    pub labels: Option<PathBuf>,

    /// Column of the labels file to join [default: second column]
    #[arg(long, value_name = "NAME", requires = "labels")]
    pub label_column: Option<String>,

    /// Run config file [default: <INPUT>/.metric-harvest/config.toml, fallback ~/.config/metric-harvest/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of tool processes running at once
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Per-process timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Do not run a tool (repeatable)
    #[arg(long = "skip-tool", value_name = "TOOL")]
    pub skip_tool: Vec<ToolArg>,

    /// Accept exact repeats of an already merged record instead of failing
    #[arg(long)]
    pub dedupe: bool,

    /// Summary format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Log progress and list every recovered tool failure
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print summary line
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum LangArg {
    Python,
    Java,
    All,
}

impl LangArg {
    pub fn languages(&self) -> Vec<Language> {
        match self {
            LangArg::Python => vec![Language::Python],
            LangArg::Java => vec![Language::Java],
            LangArg::All => vec![Language::Python, Language::Java],
        }
    }
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum UnitArg {
    File,
    Directory,
}

impl From<&UnitArg> for SampleUnit {
    fn from(arg: &UnitArg) -> Self {
        match arg {
            UnitArg::File => SampleUnit::File,
            UnitArg::Directory => SampleUnit::Directory,
        }
    }
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum ToolArg {
    Radon,
    Pycodestyle,
    Multimetric,
    Pmd,
}

impl From<&ToolArg> for ToolKind {
    fn from(arg: &ToolArg) -> Self {
        match arg {
            ToolArg::Radon => ToolKind::Radon,
            ToolArg::Pycodestyle => ToolKind::Pycodestyle,
            ToolArg::Multimetric => ToolKind::Multimetric,
            ToolArg::Pmd => ToolKind::Pmd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["metric-harvest", "corpus"]).unwrap();
        assert_eq!(cli.input, PathBuf::from("corpus"));
        assert_eq!(cli.output, PathBuf::from("metrics.csv"));
        assert_eq!(cli.lang.languages(), vec![Language::Python, Language::Java]);
        assert!(cli.workers.is_none());
        assert!(!cli.dedupe);
    }

    #[test]
    fn test_repeatable_skip_tool() {
        let cli = Cli::try_parse_from([
            "metric-harvest",
            "corpus",
            "--skip-tool",
            "pmd",
            "--skip-tool",
            "radon",
        ])
        .unwrap();
        let skipped: Vec<ToolKind> = cli.skip_tool.iter().map(Into::into).collect();
        assert_eq!(skipped, vec![ToolKind::Pmd, ToolKind::Radon]);
    }

    #[test]
    fn test_label_column_needs_labels() {
        assert!(Cli::try_parse_from(["metric-harvest", "corpus", "--label-column", "y"]).is_err());
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["metric-harvest", "corpus", "-v", "-q"]).is_err());
    }
}

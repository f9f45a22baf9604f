use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::ToolKind;

/// Root configuration structure, deserialized from `.metric-harvest/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub discovery: DiscoveryConfig,
    pub tools: ToolsConfig,
}

/// Scheduling and output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum number of tool processes running at once.
    pub workers: usize,
    /// Per-process timeout in seconds; the tool is killed when it expires.
    pub timeout_secs: u64,
    /// What to do when a record is ingested twice for the same sample.
    pub duplicates: DuplicatePolicy,
    /// Field delimiter of the dataset file.
    pub delimiter: char,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout_secs: 120,
            duplicates: DuplicatePolicy::Reject,
            delimiter: ',',
        }
    }
}

/// Re-ingestion behavior of the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Any metric seen twice for a sample is a collision.
    Reject,
    /// An identical record for an already ingested (sample, tool) is a no-op.
    Ignore,
}

/// Python files with `authority` in their name are generated scaffolding,
/// not authored code.
pub const DEFAULT_EXCLUDE: &str = r"authority[^/]*\.py$";

/// Source discovery filters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Regexes matched against the sample-relative path; matches are skipped.
    pub exclude: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            exclude: vec![DEFAULT_EXCLUDE.to_string()],
        }
    }
}

/// Per-tool settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub radon: ToolConfig,
    pub pycodestyle: ToolConfig,
    pub multimetric: ToolConfig,
    pub pmd: PmdConfig,
}

/// Settings shared by every tool. Unset fields fall back to the tool's
/// built-in defaults (see [`ToolsConfig::spec`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub enabled: bool,
    /// Executable name or path.
    pub command: Option<String>,
    /// Arguments placed before the file list.
    pub args: Option<Vec<String>>,
    /// Exit codes that count as a successful run.
    pub ok_exit_codes: Option<Vec<i32>>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            args: None,
            ok_exit_codes: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PmdConfig {
    #[serde(flatten)]
    pub tool: ToolConfig,
    pub ruleset: String,
    pub format: PmdFormat,
}

impl Default for PmdConfig {
    fn default() -> Self {
        Self {
            tool: ToolConfig::default(),
            ruleset: "rulesets/java/quickstart.xml".to_string(),
            format: PmdFormat::Json,
        }
    }
}

/// Report renderer requested from PMD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PmdFormat {
    Json,
    Xml,
}

impl PmdFormat {
    pub fn as_arg(self) -> &'static str {
        match self {
            PmdFormat::Json => "json",
            PmdFormat::Xml => "xml",
        }
    }
}

/// Effective settings for one tool after defaults are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
    pub ok_exit_codes: Vec<i32>,
}

impl ToolsConfig {
    fn tool(&self, kind: ToolKind) -> &ToolConfig {
        match kind {
            ToolKind::Radon => &self.radon,
            ToolKind::Pycodestyle => &self.pycodestyle,
            ToolKind::Multimetric => &self.multimetric,
            ToolKind::Pmd => &self.pmd.tool,
        }
    }

    fn tool_mut(&mut self, kind: ToolKind) -> &mut ToolConfig {
        match kind {
            ToolKind::Radon => &mut self.radon,
            ToolKind::Pycodestyle => &mut self.pycodestyle,
            ToolKind::Multimetric => &mut self.multimetric,
            ToolKind::Pmd => &mut self.pmd.tool,
        }
    }

    /// Turn a tool off regardless of the config file.
    pub fn disable(&mut self, kind: ToolKind) {
        self.tool_mut(kind).enabled = false;
    }

    /// Resolve the effective command line settings of `kind`.
    pub fn spec(&self, kind: ToolKind) -> ToolSpec {
        let tool = self.tool(kind);
        let (default_args, default_codes): (&[&str], &[i32]) = match kind {
            ToolKind::Radon => (&[], &[0]),
            // pycodestyle exits 1 when it reports violations
            ToolKind::Pycodestyle => (&[], &[0, 1]),
            ToolKind::Multimetric => (&[], &[0]),
            // PMD exits 4 when it reports violations
            ToolKind::Pmd => (&["check", "--no-progress", "--no-cache"], &[0, 4]),
        };

        ToolSpec {
            kind,
            enabled: tool.enabled,
            command: tool
                .command
                .clone()
                .unwrap_or_else(|| kind.name().to_string()),
            args: tool
                .args
                .clone()
                .unwrap_or_else(|| default_args.iter().map(|s| s.to_string()).collect()),
            ok_exit_codes: tool
                .ok_exit_codes
                .clone()
                .unwrap_or_else(|| default_codes.to_vec()),
        }
    }
}

/// Load the run configuration, searching in order:
///
/// 1. `config_override` — path passed via `--config`
/// 2. `<input_path>/.metric-harvest/config.toml`
/// 3. `~/.config/metric-harvest/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(input_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let project_config = input_path.join(".metric-harvest").join("config.toml");
    if project_config.exists() {
        return read_config(&project_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home
            .join(".config")
            .join("metric-harvest")
            .join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    Ok(Config::default())
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_specs() {
        let tools = ToolsConfig::default();

        let pycodestyle = tools.spec(ToolKind::Pycodestyle);
        assert!(pycodestyle.enabled);
        assert_eq!(pycodestyle.command, "pycodestyle");
        assert_eq!(pycodestyle.ok_exit_codes, vec![0, 1]);

        let pmd = tools.spec(ToolKind::Pmd);
        assert_eq!(pmd.args, vec!["check", "--no-progress", "--no-cache"]);
        assert_eq!(pmd.ok_exit_codes, vec![0, 4]);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [run]
            workers = 8
            duplicates = "ignore"

            [discovery]
            exclude = ["authority"]

            [tools.radon]
            command = "/opt/radon/bin/radon"

            [tools.pmd]
            command = "run.sh"
            args = ["pmd"]
            format = "xml"

            [tools.multimetric]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.run.workers, 8);
        assert_eq!(config.run.timeout_secs, 120);
        assert_eq!(config.run.duplicates, DuplicatePolicy::Ignore);
        assert_eq!(config.discovery.exclude, vec!["authority"]);
        assert_eq!(config.tools.spec(ToolKind::Radon).command, "/opt/radon/bin/radon");
        assert!(!config.tools.spec(ToolKind::Multimetric).enabled);

        let pmd = config.tools.spec(ToolKind::Pmd);
        assert_eq!(pmd.command, "run.sh");
        assert_eq!(pmd.args, vec!["pmd"]);
        assert_eq!(config.tools.pmd.format, PmdFormat::Xml);
        assert_eq!(config.tools.pmd.ruleset, "rulesets/java/quickstart.xml");
    }

    #[test]
    fn test_default_excludes_authority_files() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.discovery.exclude, vec![DEFAULT_EXCLUDE]);

        let re = regex::Regex::new(DEFAULT_EXCLUDE).unwrap();
        assert!(re.is_match("alice/authority_check.py"));
        assert!(re.is_match("my_authority.py"));
        assert!(!re.is_match("authority/main.py"));
        assert!(!re.is_match("alice/Authority.java"));
    }

    #[test]
    fn test_disable_overrides_config() {
        let mut tools = ToolsConfig::default();
        tools.disable(ToolKind::Pmd);
        assert!(!tools.spec(ToolKind::Pmd).enabled);
        assert!(tools.spec(ToolKind::Radon).enabled);
    }

    #[test]
    fn test_load_project_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".metric-harvest")).unwrap();
        std::fs::write(
            dir.path().join(".metric-harvest").join("config.toml"),
            "[run]\ntimeout_secs = 5\n",
        )
        .unwrap();

        let config = load_config(dir.path(), None).unwrap();
        assert_eq!(config.run.timeout_secs, 5);
    }

    #[test]
    fn test_override_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(dir.path(), Some(&missing)).is_err());
    }
}

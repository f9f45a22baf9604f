//! Execution of the external analysis tools.
//!
//! [`ToolInventory`] resolves every enabled tool's executable once at
//! startup; [`ToolRunner`] turns a (sample, tool) pair into one or more
//! process invocations and captures their output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures::future::try_join_all;
use tokio::process::Command;

use crate::config::{ToolSpec, ToolsConfig};
use crate::error::HarvestError;
use crate::models::{CapturedOutput, Sample, ToolKind, ToolResult};

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!(pid, error = %e, "could not kill process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Radon subcommands run for every Python sample, in output order.
pub const RADON_SECTIONS: [&str; 4] = ["raw", "cc", "mi", "hal"];

const STDERR_EXCERPT: usize = 500;

/// Which tool executables are available on this machine.
#[derive(Debug, Default)]
pub struct ToolInventory {
    available: BTreeMap<ToolKind, PathBuf>,
    missing: BTreeMap<ToolKind, String>,
}

impl ToolInventory {
    /// Resolve the command of every enabled tool. A missing tool is not an
    /// error here: its runs fail individually later.
    pub fn detect(tools: &ToolsConfig) -> Self {
        let mut inventory = Self::default();

        for kind in ToolKind::ALL {
            let spec = tools.spec(kind);
            if !spec.enabled {
                tracing::debug!(tool = %kind, "tool disabled");
                continue;
            }
            match which::which(&spec.command) {
                Ok(path) => {
                    tracing::debug!(tool = %kind, path = %path.display(), "tool detected");
                    inventory.available.insert(kind, path);
                }
                Err(err) => {
                    tracing::warn!(tool = %kind, command = %spec.command, error = %err, "tool not found");
                    inventory.missing.insert(kind, spec.command);
                }
            }
        }

        inventory
    }

    pub fn resolve(&self, kind: ToolKind) -> Option<&Path> {
        self.available.get(&kind).map(PathBuf::as_path)
    }

    /// Enabled tools whose command could not be found, with that command.
    pub fn missing(&self) -> impl Iterator<Item = (ToolKind, &str)> {
        self.missing.iter().map(|(k, c)| (*k, c.as_str()))
    }
}

/// One process to start for a tool run.
#[derive(Debug, Clone, PartialEq)]
struct Invocation {
    label: String,
    args: Vec<String>,
}

/// Runs tools against samples. Holds no mutable state, so one runner is
/// shared by every worker.
#[derive(Debug)]
pub struct ToolRunner {
    tools: ToolsConfig,
    inventory: ToolInventory,
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(tools: ToolsConfig, inventory: ToolInventory, timeout: Duration) -> Self {
        Self {
            tools,
            inventory,
            timeout,
        }
    }

    /// Run `kind` against `sample` and capture its raw output.
    pub async fn run(&self, sample: &Sample, kind: ToolKind) -> Result<ToolResult, HarvestError> {
        if kind.language() != sample.language {
            return Err(HarvestError::UnsupportedLanguage {
                tool: kind,
                language: sample.language,
                sample: sample.id.clone(),
            });
        }

        let spec = self.tools.spec(kind);
        let Some(program) = self.inventory.resolve(kind) else {
            return Err(execution_error(
                kind,
                sample,
                format!("'{}' is not installed or not on PATH", spec.command),
            ));
        };

        let runs = self
            .invocations(&spec, sample)
            .into_iter()
            .map(|invocation| self.execute(program, invocation, &spec, sample));
        let outputs = try_join_all(runs).await?;

        Ok(ToolResult {
            tool: kind,
            sample_id: sample.id.clone(),
            file_count: sample.files.len(),
            outputs,
        })
    }

    fn invocations(&self, spec: &ToolSpec, sample: &Sample) -> Vec<Invocation> {
        let files: Vec<String> = sample
            .files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();

        match spec.kind {
            ToolKind::Radon => RADON_SECTIONS
                .iter()
                .map(|section| {
                    let mut args = vec![section.to_string(), "-j".to_string()];
                    args.extend(spec.args.iter().cloned());
                    args.extend(files.iter().cloned());
                    Invocation {
                        label: section.to_string(),
                        args,
                    }
                })
                .collect(),
            ToolKind::Pycodestyle | ToolKind::Multimetric => {
                let mut args = spec.args.clone();
                args.extend(files);
                vec![Invocation {
                    label: spec.kind.name().to_string(),
                    args,
                }]
            }
            ToolKind::Pmd => {
                let pmd = &self.tools.pmd;
                let mut args = spec.args.clone();
                args.extend([
                    "-f".to_string(),
                    pmd.format.as_arg().to_string(),
                    "-R".to_string(),
                    pmd.ruleset.clone(),
                    "-d".to_string(),
                    files.join(","),
                ]);
                vec![Invocation {
                    label: spec.kind.name().to_string(),
                    args,
                }]
            }
        }
    }

    async fn execute(
        &self,
        program: &Path,
        invocation: Invocation,
        spec: &ToolSpec,
        sample: &Sample,
    ) -> Result<CapturedOutput, HarvestError> {
        tracing::debug!(
            tool = %spec.kind,
            sample = %sample.id,
            path = %sample.path.display(),
            program = %program.display(),
            args = ?invocation.args,
            "starting tool"
        );

        let mut command = Command::new(program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // launcher scripts (pmd) fork a JVM; give each run its own group so a
        // timeout takes the whole tree down
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| {
            execution_error(spec.kind, sample, format!("failed to start {}: {e}", program.display()))
        })?;
        let pid = child.id();

        // Dropping the wait future on timeout kills the direct child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(execution_error(spec.kind, sample, format!("failed to wait for process: {e}")));
            }
            Err(_) => {
                kill_process_group(pid);
                return Err(execution_error(
                    spec.kind,
                    sample,
                    format!("timed out after {}s", self.timeout.as_secs()),
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();

        match exit_code {
            Some(code) if spec.ok_exit_codes.contains(&code) => {}
            Some(code) => {
                return Err(execution_error(
                    spec.kind,
                    sample,
                    format!("`{}` exited with status {code}: {}", invocation.label, excerpt(&stderr)),
                ));
            }
            None => {
                return Err(execution_error(
                    spec.kind,
                    sample,
                    format!("`{}` was terminated by a signal", invocation.label),
                ));
            }
        }

        Ok(CapturedOutput {
            label: invocation.label,
            stdout,
            stderr,
            exit_code,
        })
    }
}

fn execution_error(tool: ToolKind, sample: &Sample, reason: String) -> HarvestError {
    HarvestError::ToolExecution {
        tool,
        sample: sample.id.clone(),
        reason,
    }
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return "(no stderr)".to_string();
    }
    match trimmed.char_indices().nth(STDERR_EXCERPT) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Language;

    fn sample(id: &str, language: Language, files: &[&str]) -> Sample {
        Sample {
            id: id.to_string(),
            language,
            path: PathBuf::from(id),
            files: files.iter().map(PathBuf::from).collect(),
        }
    }

    fn runner(tools: ToolsConfig) -> ToolRunner {
        let inventory = ToolInventory::detect(&tools);
        ToolRunner::new(tools, inventory, Duration::from_secs(5))
    }

    #[test]
    fn test_invocations_per_tool() {
        let tools = ToolsConfig::default();
        let runner = ToolRunner::new(tools.clone(), ToolInventory::default(), Duration::from_secs(1));

        let py = sample("p", Language::Python, &["p/a.py", "p/b.py"]);
        let radon = runner.invocations(&tools.spec(ToolKind::Radon), &py);
        assert_eq!(radon.len(), 4);
        assert_eq!(radon[1].label, "cc");
        assert_eq!(radon[1].args, vec!["cc", "-j", "p/a.py", "p/b.py"]);

        let java = sample("j", Language::Java, &["j/A.java", "j/B.java"]);
        let pmd = runner.invocations(&tools.spec(ToolKind::Pmd), &java);
        assert_eq!(
            pmd[0].args,
            vec![
                "check",
                "--no-progress",
                "--no-cache",
                "-f",
                "json",
                "-R",
                "rulesets/java/quickstart.xml",
                "-d",
                "j/A.java,j/B.java",
            ]
        );
    }

    #[tokio::test]
    async fn test_language_mismatch_is_rejected() {
        let runner = runner(ToolsConfig::default());
        let err = runner
            .run(&sample("a.py", Language::Python, &["a.py"]), ToolKind::Pmd)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::UnsupportedLanguage { .. }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_missing_tool_is_recoverable() {
        let mut tools = ToolsConfig::default();
        tools.disable(ToolKind::Radon);
        tools.disable(ToolKind::Multimetric);
        tools.disable(ToolKind::Pmd);
        tools.pycodestyle.command = Some("definitely-not-a-real-linter-binary".to_string());
        let runner = runner(tools);

        assert_eq!(
            runner.inventory.missing().collect::<Vec<_>>(),
            vec![(ToolKind::Pycodestyle, "definitely-not-a-real-linter-binary")]
        );

        let err = runner
            .run(&sample("a.py", Language::Python, &["a.py"]), ToolKind::Pycodestyle)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::ToolExecution { .. }));
        assert!(err.is_recoverable());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::test_support::write_script;

        #[tokio::test]
        async fn test_accepted_exit_code_captures_output() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "pycodestyle", "echo \"$1:1:1: E501 line too long\"\nexit 1");
            let mut tools = ToolsConfig::default();
            tools.pycodestyle.command = Some(script.to_string_lossy().into_owned());

            let result = runner(tools)
                .run(&sample("a.py", Language::Python, &["a.py"]), ToolKind::Pycodestyle)
                .await
                .unwrap();

            assert_eq!(result.outputs.len(), 1);
            assert_eq!(result.outputs[0].exit_code, Some(1));
            assert_eq!(result.outputs[0].stdout.trim(), "a.py:1:1: E501 line too long");
        }

        #[tokio::test]
        async fn test_unexpected_exit_code_fails() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "multimetric", "echo boom >&2\nexit 2");
            let mut tools = ToolsConfig::default();
            tools.multimetric.command = Some(script.to_string_lossy().into_owned());

            let err = runner(tools)
                .run(&sample("B.java", Language::Java, &["B.java"]), ToolKind::Multimetric)
                .await
                .unwrap_err();

            let message = err.to_string();
            assert!(message.contains("exited with status 2"), "{message}");
            assert!(message.contains("boom"), "{message}");
        }

        #[tokio::test]
        async fn test_hung_tool_is_killed() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "multimetric", "sleep 30");
            let mut tools = ToolsConfig::default();
            tools.multimetric.command = Some(script.to_string_lossy().into_owned());
            let inventory = ToolInventory::detect(&tools);
            let runner = ToolRunner::new(tools, inventory, Duration::from_millis(200));

            let err = runner
                .run(&sample("B.java", Language::Java, &["B.java"]), ToolKind::Multimetric)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("timed out"));
        }

        #[tokio::test]
        async fn test_timeout_kills_forked_descendants() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("survived");
            let body = format!("(sleep 1; touch '{}') &\nwait", marker.display());
            let script = write_script(dir.path(), "pmd", &body);
            let mut tools = ToolsConfig::default();
            tools.pmd.tool.command = Some(script.to_string_lossy().into_owned());
            let inventory = ToolInventory::detect(&tools);
            let runner = ToolRunner::new(tools, inventory, Duration::from_millis(200));

            let err = runner
                .run(&sample("B.java", Language::Java, &["B.java"]), ToolKind::Pmd)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("timed out"));

            tokio::time::sleep(Duration::from_millis(1500)).await;
            assert!(!marker.exists(), "background process outlived the timeout");
        }

        #[tokio::test]
        async fn test_radon_runs_every_section() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "radon", "echo \"{\\\"section\\\": \\\"$1\\\"}\"");
            let mut tools = ToolsConfig::default();
            tools.radon.command = Some(script.to_string_lossy().into_owned());

            let result = runner(tools)
                .run(&sample("a.py", Language::Python, &["a.py"]), ToolKind::Radon)
                .await
                .unwrap();

            for section in RADON_SECTIONS {
                let output = result.output(section).unwrap();
                assert!(output.stdout.contains(section));
            }
        }
    }
}

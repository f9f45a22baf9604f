//! Scheduling of (sample, tool) jobs and collection of their results.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::aggregate::{Aggregator, Dataset};
use crate::config::{DuplicatePolicy, PmdFormat};
use crate::error::HarvestError;
use crate::labels::Labels;
use crate::models::{Sample, ToolKind, ToolResult};
use crate::parser::{parser_for, ResultParser};
use crate::runner::ToolRunner;

/// Per-tool job counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToolTally {
    pub succeeded: usize,
    pub failed: usize,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub dataset: Dataset,
    pub samples: usize,
    pub tallies: BTreeMap<ToolKind, ToolTally>,
}

impl RunOutcome {
    /// Recovered failures, one per failed (sample, tool) job.
    pub fn warning_count(&self) -> usize {
        self.dataset.failures.len()
    }
}

pub struct Pipeline {
    runner: Arc<ToolRunner>,
    tools: Vec<ToolKind>,
    parsers: Arc<BTreeMap<ToolKind, Box<dyn ResultParser>>>,
    workers: usize,
    policy: DuplicatePolicy,
    progress: bool,
}

enum JobOutcome {
    Done(ToolKind),
    Failed(ToolKind),
}

impl Pipeline {
    /// `tools` are the enabled tools; each sample only gets the ones for its
    /// language.
    pub fn new(
        runner: ToolRunner,
        tools: Vec<ToolKind>,
        pmd_format: PmdFormat,
        workers: usize,
        policy: DuplicatePolicy,
    ) -> Self {
        let parsers = tools
            .iter()
            .map(|&kind| (kind, parser_for(kind, pmd_format)))
            .collect();
        Self {
            runner: Arc::new(runner),
            tools,
            parsers: Arc::new(parsers),
            workers: workers.max(1),
            policy,
            progress: false,
        }
    }

    /// Show a progress bar on stderr while jobs run.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Run every applicable tool on every sample and build the dataset.
    ///
    /// Recoverable failures are logged and leave null columns; a fatal error
    /// aborts the remaining jobs and is returned.
    pub async fn run(&self, samples: Vec<Sample>, labels: Option<&Labels>) -> Result<RunOutcome> {
        let mut aggregator = Aggregator::new(self.policy);
        for parser in self.parsers.values() {
            aggregator.declare(parser.columns());
        }
        for sample in &samples {
            aggregator.register(sample);
        }
        let aggregator = Arc::new(Mutex::new(aggregator));

        let jobs: Vec<(Arc<Sample>, ToolKind)> = samples
            .iter()
            .cloned()
            .map(Arc::new)
            .flat_map(|sample| {
                let language = sample.language;
                self.tools
                    .iter()
                    .filter(move |kind| kind.language() == language)
                    .map(move |&kind| (Arc::clone(&sample), kind))
                    .collect::<Vec<_>>()
            })
            .collect();
        tracing::info!(samples = samples.len(), jobs = jobs.len(), workers = self.workers, "starting run");

        let progress = self.progress_bar(jobs.len());
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();

        for (sample, kind) in jobs {
            let permits = Arc::clone(&permits);
            let runner = Arc::clone(&self.runner);
            let parsers = Arc::clone(&self.parsers);
            let aggregator = Arc::clone(&aggregator);

            set.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| anyhow!("worker pool closed: {e}"))?;
                let parser = parsers
                    .get(&kind)
                    .ok_or_else(|| anyhow!("no parser registered for {kind}"))?;

                let record = match runner.run(&sample, kind).await {
                    Ok(result) => {
                        log_result(&result);
                        parser.parse(&result).and_then(|record| {
                            if record.is_empty() {
                                Err(HarvestError::empty(kind, &sample.id))
                            } else {
                                Ok(record)
                            }
                        })
                    }
                    Err(e) => Err(e),
                };

                let mut aggregator = aggregator
                    .lock()
                    .map_err(|_| anyhow!("aggregator lock poisoned"))?;
                match record.and_then(|r| aggregator.ingest(r)) {
                    Ok(_) => Ok(JobOutcome::Done(kind)),
                    Err(e) if e.is_recoverable() => {
                        tracing::warn!(sample = %sample.id, tool = %kind, error = %e, "tool run failed");
                        aggregator.record_failure(&sample.id, kind, &e);
                        Ok(JobOutcome::Failed(kind))
                    }
                    Err(e) => Err(anyhow::Error::new(e)),
                }
            });
        }

        let mut tallies: BTreeMap<ToolKind, ToolTally> = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            let outcome = match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    set.abort_all();
                    if let Some(pb) = &progress {
                        pb.abandon_with_message("aborted");
                    }
                    return Err(e);
                }
                Err(e) => {
                    set.abort_all();
                    return Err(anyhow!("worker task failed: {e}"));
                }
            };
            match outcome {
                JobOutcome::Done(kind) => tallies.entry(kind).or_default().succeeded += 1,
                JobOutcome::Failed(kind) => tallies.entry(kind).or_default().failed += 1,
            }
            if let Some(pb) = &progress {
                pb.inc(1);
            }
        }
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let aggregator = Arc::try_unwrap(aggregator)
            .map_err(|_| anyhow!("aggregator still shared after all jobs finished"))?
            .into_inner()
            .map_err(|_| anyhow!("aggregator lock poisoned"))?;
        let dataset = aggregator.finalize(labels);

        for sample in &dataset.dropped {
            tracing::warn!(sample = %sample, "every tool failed; sample dropped");
        }

        Ok(RunOutcome {
            dataset,
            samples: samples.len(),
            tallies,
        })
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.progress || len == 0 {
            return None;
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        Some(pb)
    }
}

fn log_result(result: &ToolResult) {
    for output in &result.outputs {
        tracing::debug!(
            sample = %result.sample_id,
            tool = %result.tool,
            invocation = %output.label,
            files = result.file_count,
            exit_code = ?output.exit_code,
            stderr = %output.stderr.trim(),
            "tool finished"
        );
    }
}

//! `metric-harvest` — run static-analysis tools over a corpus and collect one row of metrics per sample.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]).
//! 2. Load run config and apply CLI overrides ([`config::load_config`]).
//! 3. Discover samples under the input ([`discovery::discover_samples`]).
//! 4. Load optional labels ([`labels::Labels`]).
//! 5. Detect tool commands and run every (sample, tool) job ([`runner`], [`pipeline`]).
//! 6. Parse tool output into records and merge them per sample ([`parser`], [`aggregate`]).
//! 7. Write the dataset ([`dataset::write_dataset`]) and print a summary ([`report`]).
//! 8. Exit `0` when the dataset was written, even if some tool runs failed.

mod aggregate;
mod cli;
mod config;
mod dataset;
mod discovery;
mod error;
mod labels;
mod models;
mod parser;
mod pipeline;
mod report;
mod runner;
#[cfg(all(test, unix))]
mod test_support;

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, ReportFormat};
use config::{load_config, DuplicatePolicy};
use dataset::write_dataset;
use discovery::discover_samples;
use labels::Labels;
use models::{Language, ToolKind};
use pipeline::Pipeline;
use runner::{ToolInventory, ToolRunner};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let input = cli
        .input
        .canonicalize()
        .unwrap_or_else(|_| cli.input.clone());

    let mut config = load_config(&input, cli.config.as_deref())?;
    if let Some(workers) = cli.workers {
        config.run.workers = workers;
    }
    if let Some(timeout) = cli.timeout {
        config.run.timeout_secs = timeout;
    }
    if cli.dedupe {
        config.run.duplicates = DuplicatePolicy::Ignore;
    }
    for tool in &cli.skip_tool {
        config.tools.disable(tool.into());
    }

    if !config.run.delimiter.is_ascii() {
        bail!("delimiter '{}' is not a single-byte character", config.run.delimiter);
    }
    let delimiter = config.run.delimiter as u8;

    let languages: Vec<Language> = cli.lang.languages();
    let samples = discover_samples(
        &input,
        &languages,
        (&cli.unit).into(),
        &config.discovery.exclude,
    )?;

    if samples.is_empty() {
        eprintln!("No Python or Java sources found in {}", input.display());
        std::process::exit(1);
    }

    let labels = cli
        .labels
        .as_deref()
        .map(|path| Labels::load(path, cli.label_column.as_deref(), delimiter))
        .transpose()?;

    let tools: Vec<ToolKind> = ToolKind::ALL
        .into_iter()
        .filter(|kind| languages.contains(&kind.language()))
        .filter(|kind| config.tools.spec(*kind).enabled)
        .collect();

    if tools.is_empty() {
        bail!("every tool for the selected languages is disabled");
    }

    let inventory = ToolInventory::detect(&config.tools);
    for (tool, command) in inventory.missing() {
        if !cli.quiet {
            eprintln!(
                "  {} {} not found ({}); its columns will be empty",
                "⚠".yellow(),
                tool,
                command
            );
        }
    }

    if !cli.quiet {
        eprintln!(
            "  {} {} sample(s), {} tool(s), {} worker(s)",
            "→".cyan(),
            samples.len(),
            tools.len(),
            config.run.workers
        );
    }

    let runner = ToolRunner::new(
        config.tools.clone(),
        inventory,
        Duration::from_secs(config.run.timeout_secs),
    );
    let outcome = Pipeline::new(
        runner,
        tools,
        config.tools.pmd.format,
        config.run.workers,
        config.run.duplicates,
    )
    .with_progress(!cli.quiet)
    .run(samples, labels.as_ref())
    .await?;

    write_dataset(&outcome.dataset, &cli.output, delimiter)?;

    match cli.report {
        ReportFormat::Terminal => {
            report::terminal::render(&outcome, &input, &cli.output, cli.verbose, cli.quiet);
        }
        ReportFormat::Json => {
            report::json::render(&outcome, &cli.output)?;
        }
    }

    Ok(())
}

use std::path::Path;

use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::pipeline::RunOutcome;

/// Render a colored summary of the run.
pub fn render(outcome: &RunOutcome, input: &Path, output: &Path, verbose: bool, quiet: bool) {
    let dataset = &outcome.dataset;
    let warnings = outcome.warning_count();
    let dropped = dataset.dropped.len();

    if quiet {
        println!(
            "Samples: {}  Rows: {}  Warnings: {}  Dropped: {}",
            outcome.samples,
            dataset.rows.len().to_string().green(),
            warnings.to_string().yellow(),
            dropped.to_string().red(),
        );
        return;
    }

    println!(
        "\n {} v{}",
        "metric-harvest".bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!(" Corpus: {}\n", input.display());

    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", "SUMMARY".bold());
    println!(" │  {:<48} │", format!("Samples discovered : {}", outcome.samples));
    println!(
        " │  {:<48} │",
        format!(
            "{}  Rows written    : {:>4}  {} columns",
            "✓".green(),
            dataset.rows.len(),
            dataset.columns.len()
        )
    );
    println!(
        " │  {:<48} │",
        format!("{}  Warnings        : {:>4}", "⚠".yellow(), warnings)
    );
    println!(
        " │  {:<48} │",
        format!("{}  Dropped samples : {:>4}", "✗".red(), dropped)
    );
    println!(" └────────────────────────────────────────────────────┘\n");

    render_tools(outcome);
    println!();

    if dropped > 0 {
        println!(" {} Samples every tool failed on:\n", "[DROPPED]".red().bold());
        for sample in &dataset.dropped {
            println!("   {sample}");
        }
        println!();
    }

    if warnings > 0 {
        if verbose {
            println!(" {} Recovered tool failures:\n", "[WARN]".yellow().bold());
            render_failures(outcome);
            println!();
        } else {
            println!(
                " {} {} tool run(s) failed; rerun with --verbose for details\n",
                "[WARN]".yellow().bold(),
                warnings
            );
        }
    }

    if dataset.unmatched_labels > 0 {
        println!(
            " {} {} label(s) did not match any sample\n",
            "[WARN]".yellow().bold(),
            dataset.unmatched_labels
        );
    }

    println!(" Dataset written to {}", output.display().to_string().bold());
}

fn render_tools(outcome: &RunOutcome) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Tool").add_attribute(Attribute::Bold),
            Cell::new("Language").add_attribute(Attribute::Bold),
            Cell::new("Succeeded").add_attribute(Attribute::Bold),
            Cell::new("Failed").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
        ]);

    for (tool, tally) in &outcome.tallies {
        let (status, color) = match (tally.succeeded, tally.failed) {
            (_, 0) => ("✓ ok", Color::Green),
            (0, _) => ("✗ failed", Color::Red),
            _ => ("⚠ partial", Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(tool.to_string()),
            Cell::new(tool.language().to_string()),
            Cell::new(tally.succeeded).set_alignment(CellAlignment::Right),
            Cell::new(tally.failed).set_alignment(CellAlignment::Right),
            Cell::new(status).fg(color).set_alignment(CellAlignment::Center),
        ]);
    }

    println!("{}", table);
}

fn render_failures(outcome: &RunOutcome) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Sample").add_attribute(Attribute::Bold),
            Cell::new("Tool").add_attribute(Attribute::Bold),
            Cell::new("Reason").add_attribute(Attribute::Bold),
        ]);

    for failure in &outcome.dataset.failures {
        table.add_row(vec![
            Cell::new(&failure.sample_id),
            Cell::new(failure.tool.to_string()),
            Cell::new(&failure.reason).fg(Color::DarkGrey),
        ]);
    }

    println!("{}", table);
}

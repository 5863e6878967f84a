//! Run report assembly and rendering.
//!
//! The JSON artifact is the machine-checkable output of a run; the Markdown
//! and console renderings are views over the same [`RunReport`].

use crate::aggregator::{top_k, top_k_coverage};
use crate::models::{
    AggregatedState, ExecutionStats, Outcome, RunReport, Session, TaskResult,
};
use crate::splitter::SplitPolicy;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::time::Duration;

/// Everything about a run that is known before results come back.
#[derive(Debug, Clone)]
pub struct RunContext<'a> {
    pub session: &'a Session,
    pub split_policy: SplitPolicy,
    pub pool_size: usize,
    pub input_chars: usize,
    pub input_words: usize,
    /// Wall-clock time of the dispatch barrier.
    pub wall_time: Duration,
}

/// Combine dispatch results and the final state into one report.
pub fn assemble(
    ctx: &RunContext<'_>,
    results: Vec<TaskResult>,
    final_state: Option<AggregatedState>,
) -> RunReport {
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let failed = results.len() - succeeded;
    let total_elapsed = ctx.wall_time.as_secs_f64();

    let average_unit_seconds = if results.is_empty() {
        0.0
    } else {
        total_elapsed / results.len() as f64
    };

    // Sum of per-unit latencies over wall time, counting only answered units.
    let answered: Vec<f64> = results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.elapsed_seconds)
        .collect();
    let speedup = if answered.is_empty() || total_elapsed <= 0.0 {
        None
    } else {
        let mean = answered.iter().sum::<f64>() / answered.len() as f64;
        Some(results.len() as f64 * mean / total_elapsed)
    };

    RunReport {
        final_state,
        execution_stats: ExecutionStats {
            session_id: ctx.session.id.clone(),
            session_mode: ctx.session.mode,
            split_policy: ctx.split_policy,
            num_chunks: results.len(),
            parallel_workers: ctx.pool_size,
            succeeded,
            failed,
            input_chars: ctx.input_chars,
            input_words: ctx.input_words,
            total_elapsed_seconds: total_elapsed,
            average_unit_seconds,
            speedup,
            units: results,
        },
        generated_at: Utc::now(),
    }
}

/// Generate the JSON artifact.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Generate a Markdown rendering of the report.
pub fn generate_markdown_report(report: &RunReport, k: usize) -> String {
    let mut output = String::new();

    output.push_str("# Wordfan Run Report\n\n");
    output.push_str(&generate_execution_section(&report.execution_stats));
    output.push_str(&generate_state_section(report.final_state.as_ref(), k));
    output.push_str(&generate_units_section(&report.execution_stats.units));
    output.push_str(&format!(
        "---\n\n*Generated {}*\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output
}

fn generate_execution_section(stats: &ExecutionStats) -> String {
    let mut section = String::new();

    section.push_str("## Execution\n\n");
    section.push_str(&format!("- **Session:** `{}`\n", stats.session_id));
    section.push_str(&format!("- **Mode:** {}\n", stats.session_mode));
    section.push_str(&format!("- **Split:** {}\n", stats.split_policy));
    section.push_str(&format!("- **Units:** {}\n", stats.num_chunks));
    section.push_str(&format!("- **Parallel workers:** {}\n", stats.parallel_workers));
    section.push_str(&format!(
        "- **Succeeded / failed:** {} / {}\n",
        stats.succeeded, stats.failed
    ));
    section.push_str(&format!(
        "- **Total time:** {:.2}s ({:.2}s per unit)\n",
        stats.total_elapsed_seconds, stats.average_unit_seconds
    ));
    if let Some(speedup) = stats.speedup {
        section.push_str(&format!("- **Speedup vs sequential:** ~{:.1}x\n", speedup));
    }
    section.push('\n');

    section
}

fn generate_state_section(state: Option<&AggregatedState>, k: usize) -> String {
    let mut section = String::new();
    section.push_str("## Final State\n\n");

    let Some(state) = state else {
        section.push_str("The final state could not be retrieved from the state manager.\n\n");
        return section;
    };

    section.push_str("| Total words | Unique words | Updates received | Session age |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {:.0}s |\n\n",
        state.total_words, state.unique_words, state.updates_received, state.age_seconds
    ));

    let top = top_k(state, k);
    if !top.is_empty() {
        section.push_str(&format!(
            "### Top {} words ({:.0}% of all words)\n\n",
            top.len(),
            top_k_coverage(state, k) * 100.0
        ));
        section.push_str("| Word | Count |\n|:---|---:|\n");
        for (word, count) in top {
            section.push_str(&format!("| {} | {} |\n", word, count));
        }
        section.push('\n');
    }

    section
}

fn generate_units_section(units: &[TaskResult]) -> String {
    let mut section = String::new();

    section.push_str("## Units\n\n");
    section.push_str("| Unit | Worker | Time | Result |\n|:---:|:---|---:|:---|\n");
    for unit in units {
        let result = match &unit.outcome {
            Outcome::Success {
                reported_word_count,
                state_updated: true,
                ..
            } => format!("✓ {} words", reported_word_count),
            Outcome::Success {
                reported_word_count,
                ..
            } => format!("⚠ {} words, state not updated", reported_word_count),
            Outcome::Failure { error_kind, .. } => format!("✗ {}", error_kind),
        };
        section.push_str(&format!(
            "| {} | {} | {:.2}s | {} |\n",
            unit.unit_id, unit.worker_id, unit.elapsed_seconds, result
        ));
    }
    section.push('\n');

    section
}

/// Console summary printed at the end of a run.
pub fn render_summary(report: &RunReport, k: usize) -> String {
    let mut lines = Vec::new();
    let stats = &report.execution_stats;

    match &report.final_state {
        Some(state) => {
            lines.push(format!("Session: {}", state.session_id));
            lines.push(format!("Total words: {}", state.total_words));
            lines.push(format!("Unique words: {}", state.unique_words));
            lines.push(format!("Updates received: {}", state.updates_received));
            lines.push(format!("Session age: {:.0}s", state.age_seconds));

            let top = top_k(state, k);
            if !top.is_empty() {
                lines.push(String::new());
                lines.push(format!("Top {} words:", top.len()));
                lines.push(format!("{:<20} {:>10}", "Word", "Count"));
                lines.push("-".repeat(32));
                for (word, count) in top {
                    lines.push(format!("{:<20} {:>10}", word, count));
                }
            }
        }
        None => lines.push(format!(
            "Session: {} (final state unavailable)",
            stats.session_id
        )),
    }

    lines.push(String::new());
    lines.push(format!(
        "Units: {} succeeded, {} failed, {} workers, {:.2}s total",
        stats.succeeded, stats.failed, stats.parallel_workers, stats.total_elapsed_seconds
    ));

    lines.join("\n")
}

/// Write rendered report content to `path`.
pub fn save_report(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

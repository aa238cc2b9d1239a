//! End-of-run and history output
//!
//! The live status table goes through the logging layer; this module prints
//! the colored summaries shown after a run and for `--history`.
//! All output goes to stderr so stdout remains clean for piping.

use colored::Colorize;

use crate::log::jsonl::{OutcomeStatus, StackOutcome};
use crate::plan::executor::RunSummary;

/// Colored label for an outcome status
fn status_label(status: OutcomeStatus) -> String {
    match status {
        OutcomeStatus::Complete => "COMPLETE".green().bold().to_string(),
        OutcomeStatus::Failed => "FAILED".red().bold().to_string(),
        OutcomeStatus::Skipped => "SKIPPED".yellow().to_string(),
    }
}

/// Format one stack outcome as a summary line
#[must_use]
pub fn format_outcome_line(outcome: &StackOutcome, name_width: usize) -> String {
    let mut line = format!(
        "  {}  {}",
        format!("{:<name_width$}", outcome.stack).bold(),
        status_label(outcome.status)
    );
    if outcome.status != OutcomeStatus::Skipped {
        line.push_str(&format!(" {}", format!("{}s", outcome.duration_secs).dimmed()));
    }
    if let Some(detail) = &outcome.detail {
        line.push_str(&format!(" {}", detail.dimmed()));
    }
    line
}

fn name_width(outcomes: &[StackOutcome]) -> usize {
    outcomes.iter().map(|o| o.stack.len()).max().unwrap_or(0)
}

/// Print the summary of a finished run
pub fn render_run_summary(summary: &RunSummary) {
    eprintln!("\n{}", "─".repeat(50).dimmed());

    let width = name_width(&summary.outcomes);
    for outcome in &summary.outcomes {
        eprintln!("{}", format_outcome_line(outcome, width));
    }

    let headline = if summary.success() {
        "ALL STACKS COMPLETE".green().bold().to_string()
    } else {
        "RUN FAILED".red().bold().to_string()
    };
    eprintln!(
        "\n  {headline} {} complete | {} failed | {} skipped | {}s",
        summary.count(OutcomeStatus::Complete),
        summary.count(OutcomeStatus::Failed),
        summary.count(OutcomeStatus::Skipped),
        summary.duration_secs
    );
}

/// Print recorded history, oldest first
pub fn render_history(outcomes: &[StackOutcome]) {
    if outcomes.is_empty() {
        eprintln!("{}", "No recorded runs.".dimmed());
        return;
    }

    let width = name_width(outcomes);
    for outcome in outcomes {
        eprintln!(
            "{} {}",
            outcome
                .timestamp
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed(),
            format_outcome_line(outcome, width).trim_start()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn outcome(stack: &str, status: OutcomeStatus, detail: Option<&str>) -> StackOutcome {
        StackOutcome {
            stack: stack.to_string(),
            timestamp: Utc::now(),
            status,
            exit_code: None,
            duration_secs: 7,
            detail: detail.map(ToString::to_string),
        }
    }

    #[test]
    fn test_outcome_line_contains_fields() {
        let line = format_outcome_line(
            &outcome("vpc", OutcomeStatus::Failed, Some("no quota")),
            3,
        );
        assert!(line.contains("vpc"));
        assert!(line.contains("FAILED"));
        assert!(line.contains("7s"));
        assert!(line.contains("no quota"));
    }

    #[test]
    fn test_skipped_line_omits_duration() {
        let line = format_outcome_line(
            &outcome("app", OutcomeStatus::Skipped, Some("requires vpc")),
            3,
        );
        assert!(line.contains("SKIPPED"));
        assert!(!line.contains("7s"));
    }

    #[test]
    fn test_name_width() {
        let outcomes = vec![
            outcome("vpc", OutcomeStatus::Complete, None),
            outcome("database", OutcomeStatus::Complete, None),
        ];
        assert_eq!(name_width(&outcomes), 8);
        assert_eq!(name_width(&[]), 0);
    }

    #[test]
    fn test_render_does_not_panic() {
        let summary = RunSummary {
            outcomes: vec![
                outcome("vpc", OutcomeStatus::Complete, None),
                outcome("app", OutcomeStatus::Skipped, Some("requires db")),
            ],
            duration_secs: 12,
        };
        render_run_summary(&summary);
        render_history(&summary.outcomes);
        render_history(&[]);
    }
}

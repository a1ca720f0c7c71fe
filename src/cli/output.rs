//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::cloudformation::StackResource;
use crate::config::ValidationResult;
use crate::pull::{PullAction, PullReport};
use crate::reconciler::{PushReport, StackOutcome};
use crate::stack::{KeyValues, StackId, StackSpec};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Outputs and resources of one live stack.
#[derive(Debug, Clone, Serialize)]
pub struct StackPeek {
    /// Stack identity.
    pub stack: StackId,
    /// Stack outputs.
    pub outputs: KeyValues,
    /// Stack resources.
    pub resources: Vec<StackResource>,
}

/// Number of stacks defined for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct AccountCount {
    /// Account name.
    #[tabled(rename = "Account")]
    pub account: String,
    /// Number of stacks.
    #[tabled(rename = "StackCount")]
    pub stacks: usize,
}

/// Stack outcome row for table display.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Stack")]
    name: String,
    #[tabled(rename = "Result")]
    result: String,
}

/// Resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Logical ID")]
    logical_id: String,
    #[tabled(rename = "Physical ID")]
    physical_id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result of a push or delete.
    #[must_use]
    pub fn format_push(&self, report: &PushReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_push_text(report),
        }
    }

    fn format_push_text(report: &PushReport) -> String {
        if report.stacks.is_empty() {
            return String::from("No stacks selected.\n");
        }

        let rows: Vec<OutcomeRow> = report
            .stacks
            .iter()
            .map(|s| OutcomeRow {
                account: s.stack.account.clone(),
                region: s.stack.region.clone(),
                name: s.stack.name.clone(),
                result: Self::format_outcome(&s.outcome),
            })
            .collect();

        let mut output = Table::new(rows).to_string();
        output.push('\n');

        let unchanged = report.count(|o| matches!(o, StackOutcome::UpToDate));
        let declined = report.count(|o| matches!(o, StackOutcome::Declined));
        let _ = write!(
            output,
            "\n{} changed, {unchanged} up to date, {declined} declined, {} failed\n",
            report.changed().to_string().green(),
            report.failed().to_string().red()
        );

        output
    }

    fn format_outcome(outcome: &StackOutcome) -> String {
        match outcome {
            StackOutcome::UpToDate => "up to date".dimmed().to_string(),
            StackOutcome::Created => "created".green().to_string(),
            StackOutcome::Updated => "updated".cyan().to_string(),
            StackOutcome::Deleted => "deleted".red().to_string(),
            StackOutcome::Declined => "declined".yellow().to_string(),
            StackOutcome::Failed(message) => format!("{} {}", "failed:".red(), Self::truncate(message, 60)),
        }
    }

    /// Formats the result of a pull.
    #[must_use]
    pub fn format_pull(&self, report: &PullReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                for pulled in &report.stacks {
                    match &pulled.action {
                        PullAction::Saved => {
                            let _ = writeln!(output, "{} Saved {}", "✓".green(), pulled.stack);
                        }
                        PullAction::Skipped(reason) => {
                            let _ = writeln!(output, "- Skipped {}: {reason}", pulled.stack);
                        }
                    }
                    for key in &pulled.redacted {
                        let _ = writeln!(output, "  {} {key} is NoEcho, set its value by hand", "⚠".yellow());
                    }
                }
                let _ = writeln!(output, "\n{} stack(s) saved", report.saved());
                output
            }
        }
    }

    /// Formats the outputs and resources of live stacks.
    #[must_use]
    pub fn format_peek(&self, peeks: &[StackPeek]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(peeks).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                for peek in peeks {
                    let _ = writeln!(output, "\n{}", peek.stack.to_string().bold());
                    let _ = writeln!(output, "{}", "Outputs".bold());
                    if peek.outputs.is_empty() {
                        output.push_str("   None\n");
                    }
                    for (key, value) in peek.outputs.iter() {
                        let _ = writeln!(output, "   {key}: {value}");
                    }

                    let rows: Vec<ResourceRow> = peek
                        .resources
                        .iter()
                        .map(|r| ResourceRow {
                            logical_id: r.logical_id.clone(),
                            physical_id: r.physical_id.clone().unwrap_or_default(),
                            status: r.status.clone(),
                            reason: r.status_reason.clone().unwrap_or_default(),
                        })
                        .collect();
                    if !rows.is_empty() {
                        output.push_str(&Table::new(rows).to_string());
                        output.push('\n');
                    }
                }
                output
            }
        }
    }

    /// Formats per-account stack counts.
    #[must_use]
    pub fn format_summary(&self, counts: &[AccountCount]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(counts).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = Table::new(counts).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    let mut output = format!("{} Configuration has {} error(s):\n", "✗".red(), result.errors.len());
                    for error in &result.errors {
                        let _ = writeln!(output, "  - {error}");
                    }
                    output
                };
                if show_warnings && !result.warnings.is_empty() {
                    output.push_str("\nWarnings:\n");
                    for warning in &result.warnings {
                        let _ = writeln!(output, "  - {warning}");
                    }
                } else if !result.warnings.is_empty() {
                    let _ = writeln!(output, "{} warning(s), use --warnings to list them", result.warnings.len());
                }
                output
            }
        }
    }

    /// Truncates a string to a maximum length.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

/// Counts stacks per account, most stacks first.
#[must_use]
pub fn count_by_account(stacks: &[StackSpec]) -> Vec<AccountCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for stack in stacks {
        *counts.entry(stack.id.account.as_str()).or_default() += 1;
    }

    let mut counts: Vec<AccountCount> = counts
        .into_iter()
        .map(|(account, stacks)| AccountCount {
            account: account.to_string(),
            stacks,
        })
        .collect();
    counts.sort_by(|a, b| b.stacks.cmp(&a.stacks).then_with(|| a.account.cmp(&b.account)));
    counts
}

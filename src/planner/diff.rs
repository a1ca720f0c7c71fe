//! Diff rendering for operator review.
//!
//! Parameters, tags and templates are serialized canonically (sorted keys,
//! fixed indentation, the stack's declared encoding) and then compared line
//! by line, so two documents that only differ in formatting produce no
//! output at all.

use std::fmt::Write as _;

use colored::Colorize;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use similar::{Algorithm, ChangeTag, TextDiff};

use crate::cloudformation::LiveStack;
use crate::error::{PlanError, Result, StaxError};
use crate::stack::{KeyValues, StackSpec, Template, TemplateEncoding};

/// Lines of unchanged context kept around each change.
const CONTEXT_LINES: usize = 3;

/// JSON indentation used for canonical rendering.
const JSON_INDENT: &[u8] = b"    ";

/// One line of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLine<'a> {
    /// Unchanged line shown for context.
    Context(&'a str),
    /// Line only present in the desired version.
    Added(&'a str),
    /// Line only present in the live version.
    Removed(&'a str),
}

impl DiffLine<'_> {
    /// Returns true for added or removed lines.
    #[must_use]
    pub const fn is_change(&self) -> bool {
        !matches!(self, Self::Context(_))
    }
}

/// Line diff between two texts.
pub struct LineDiff<'a> {
    diff: TextDiff<'a, 'a, 'a, str>,
}

impl<'a> LineDiff<'a> {
    /// Computes the diff between `before` and `after`.
    #[must_use]
    pub fn new(before: &'a str, after: &'a str) -> Self {
        Self {
            diff: TextDiff::configure()
                .algorithm(Algorithm::Myers)
                .diff_lines(before, after),
        }
    }

    /// Iterates over the changed hunks, with context, in order.
    pub fn lines(&self) -> impl Iterator<Item = DiffLine<'_>> + '_ {
        self.diff
            .grouped_ops(CONTEXT_LINES)
            .into_iter()
            .flatten()
            .flat_map(move |op| {
                self.diff.iter_changes(&op).map(|change| {
                    let value = change.value();
                    let line = value.strip_suffix('\n').unwrap_or(value);
                    match change.tag() {
                        ChangeTag::Equal => DiffLine::Context(line),
                        ChangeTag::Insert => DiffLine::Added(line),
                        ChangeTag::Delete => DiffLine::Removed(line),
                    }
                })
            })
    }

    /// Number of added and removed lines.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.lines().filter(DiffLine::is_change).count()
    }
}

/// Rendered diff of a stack, ready to show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// Rendered text.
    pub text: String,
    /// Number of added and removed lines across all sections.
    pub changes: usize,
}

impl DiffReport {
    /// Returns true if no section differs.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.changes == 0
    }
}

/// Renders labelled diffs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffRenderer;

impl DiffRenderer {
    /// Creates a renderer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Appends a labelled section to `report` and returns its change count.
    ///
    /// Nothing is written when the texts are identical.
    pub fn render_section(&self, report: &mut DiffReport, label: &str, before: &str, after: &str) -> usize {
        let diff = LineDiff::new(before, after);
        let mut changes = 0;
        let mut body = String::new();

        for line in diff.lines() {
            let _ = match line {
                DiffLine::Context(text) => writeln!(body, " {text}"),
                DiffLine::Added(text) => {
                    changes += 1;
                    writeln!(body, "{}", format!("+{text}").green())
                }
                DiffLine::Removed(text) => {
                    changes += 1;
                    writeln!(body, "{}", format!("-{text}").red())
                }
            };
        }

        if changes > 0 {
            let _ = writeln!(report.text, "{}", format!("--- {label} before").bold());
            let _ = writeln!(report.text, "{}", format!("+++ {label} after").bold());
            report.text.push_str(&body);
            report.changes += changes;
        }

        changes
    }

    /// Renders the params, tags and template sections for a stack.
    ///
    /// `live` and `live_template` are `None` for a stack that does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if either template cannot be parsed.
    pub fn render_stack(
        &self,
        stack: &StackSpec,
        desired_tags: &KeyValues,
        live: Option<&LiveStack>,
        live_template: Option<&str>,
    ) -> Result<DiffReport> {
        let mut report = DiffReport::default();
        let empty = KeyValues::new();

        let live_params = live.map_or(&empty, |l| &l.parameters);
        self.render_section(
            &mut report,
            "params",
            &canonical_json(&live_params.to_document())?,
            &canonical_json(&stack.parameters.to_document())?,
        );

        let live_tags = live.map_or(&empty, |l| &l.tags);
        self.render_section(
            &mut report,
            "tags",
            &canonical_json(&live_tags.to_document())?,
            &canonical_json(&desired_tags.to_document())?,
        );

        let encoding = stack.template.encoding();
        let before = match live_template {
            Some(body) => canonical_template(&Template::from_remote(body), encoding, stack.name())?,
            None => String::new(),
        };
        let after = canonical_template(&stack.template, encoding, stack.name())?;
        self.render_section(&mut report, "template", &before, &after);

        Ok(report)
    }
}

/// Serializes a document as JSON with sorted keys and four space indentation.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn canonical_json(value: &serde_json::Value) -> Result<String> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(JSON_INDENT));
    value
        .serialize(&mut serializer)
        .map_err(|e| StaxError::internal(format!("Failed to serialize document: {e}")))?;

    let mut text = String::from_utf8(buf).map_err(|e| StaxError::internal(e.to_string()))?;
    text.push('\n');
    Ok(text)
}

/// Serializes a document in the given encoding with sorted keys.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn canonical_document(value: &serde_json::Value, encoding: TemplateEncoding) -> Result<String> {
    match encoding {
        TemplateEncoding::Json => canonical_json(value),
        TemplateEncoding::Yaml => serde_yaml::to_string(value)
            .map_err(|e| StaxError::internal(format!("Failed to serialize document: {e}"))),
    }
}

fn canonical_template(template: &Template, encoding: TemplateEncoding, stack: &str) -> Result<String> {
    if template.is_empty() {
        return Ok(String::new());
    }

    let document = template.document().map_err(|e| match e {
        StaxError::Plan(PlanError::InvalidTemplate { message, .. }) => {
            StaxError::Plan(PlanError::InvalidTemplate {
                stack: stack.to_string(),
                message,
            })
        }
        other => other,
    })?;
    canonical_document(&document, encoding)
}

//! Planning module for stack changes.
//!
//! This module stages changesets, renders what they will do for review
//! and guards their execution:
//! - Changeset creation, polling and classification
//! - Canonical line diffs of parameters, tags and templates
//! - Per-resource change summaries
//! - Stack status polling and the changeset age check

mod changeset;
mod diff;
mod poll;
mod staleness;
mod summary;

pub use changeset::{ChangePlanner, PlanMode, PlanOutcome, INLINE_TEMPLATE_LIMIT};
pub use diff::{canonical_document, canonical_json, DiffLine, DiffRenderer, DiffReport, LineDiff};
pub use poll::{wait_for_stack, StackAction};
pub use staleness::{ensure_fresh, is_stale};
pub use summary::{describe_change, render_changes};

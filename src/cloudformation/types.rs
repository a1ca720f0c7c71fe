//! Types describing live stacks and changesets.
//!
//! These are the read-only views the engine works with. They are built by
//! the gateway from service responses and never persisted.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::stack::KeyValues;

/// Status reason fragments the service uses for a changeset with nothing to do.
const NO_CHANGE_MARKERS: [&str; 2] = ["didn't contain changes", "No updates are to be performed"];

/// Snapshot of a deployed stack.
#[derive(Debug, Clone, Serialize)]
pub struct LiveStack {
    /// Stack name.
    pub name: String,
    /// Current status.
    pub status: StackStatus,
    /// Deployed parameter values.
    pub parameters: KeyValues,
    /// Tags on the stack.
    pub tags: KeyValues,
    /// Stack outputs.
    pub outputs: KeyValues,
    /// When the stack was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
}

impl LiveStack {
    /// Creates a snapshot with no parameters, tags or outputs.
    #[must_use]
    pub fn new(name: impl Into<String>, status: StackStatus) -> Self {
        Self {
            name: name.into(),
            status,
            parameters: KeyValues::new(),
            tags: KeyValues::new(),
            outputs: KeyValues::new(),
            creation_time: None,
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: KeyValues) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: KeyValues) -> Self {
        self.tags = tags;
        self
    }

    /// Returns the stored fingerprint marker, if any.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.tags.get(crate::config::FINGERPRINT_TAG)
    }
}

/// Provisioning status of a stack.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StackStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    RollbackInProgress,
    RollbackFailed,
    RollbackComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateFailed,
    UpdateRollbackInProgress,
    UpdateRollbackFailed,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
    ReviewInProgress,
    ImportInProgress,
    ImportComplete,
    ImportRollbackInProgress,
    ImportRollbackFailed,
    ImportRollbackComplete,
    /// A status this version does not know about.
    Unknown(String),
}

impl StackStatus {
    /// Parses a status string as reported by the service.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_FAILED" => Self::CreateFailed,
            "CREATE_COMPLETE" => Self::CreateComplete,
            "ROLLBACK_IN_PROGRESS" => Self::RollbackInProgress,
            "ROLLBACK_FAILED" => Self::RollbackFailed,
            "ROLLBACK_COMPLETE" => Self::RollbackComplete,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_FAILED" => Self::DeleteFailed,
            "DELETE_COMPLETE" => Self::DeleteComplete,
            "UPDATE_IN_PROGRESS" => Self::UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => Self::UpdateCompleteCleanupInProgress,
            "UPDATE_COMPLETE" => Self::UpdateComplete,
            "UPDATE_FAILED" => Self::UpdateFailed,
            "UPDATE_ROLLBACK_IN_PROGRESS" => Self::UpdateRollbackInProgress,
            "UPDATE_ROLLBACK_FAILED" => Self::UpdateRollbackFailed,
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => {
                Self::UpdateRollbackCompleteCleanupInProgress
            }
            "UPDATE_ROLLBACK_COMPLETE" => Self::UpdateRollbackComplete,
            "REVIEW_IN_PROGRESS" => Self::ReviewInProgress,
            "IMPORT_IN_PROGRESS" => Self::ImportInProgress,
            "IMPORT_COMPLETE" => Self::ImportComplete,
            "IMPORT_ROLLBACK_IN_PROGRESS" => Self::ImportRollbackInProgress,
            "IMPORT_ROLLBACK_FAILED" => Self::ImportRollbackFailed,
            "IMPORT_ROLLBACK_COMPLETE" => Self::ImportRollbackComplete,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the service's name for this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateFailed => "CREATE_FAILED",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            Self::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            Self::UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            Self::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            Self::ReviewInProgress => "REVIEW_IN_PROGRESS",
            Self::ImportInProgress => "IMPORT_IN_PROGRESS",
            Self::ImportComplete => "IMPORT_COMPLETE",
            Self::ImportRollbackInProgress => "IMPORT_ROLLBACK_IN_PROGRESS",
            Self::ImportRollbackFailed => "IMPORT_ROLLBACK_FAILED",
            Self::ImportRollbackComplete => "IMPORT_ROLLBACK_COMPLETE",
            Self::Unknown(raw) => raw,
        }
    }

    /// Returns true if the stack settled successfully.
    #[must_use]
    pub const fn is_terminal_success(&self) -> bool {
        matches!(
            self,
            Self::CreateComplete | Self::DeleteComplete | Self::ImportComplete | Self::UpdateComplete
        )
    }

    /// Returns true if the stack settled in a failure state.
    #[must_use]
    pub const fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            Self::CreateFailed
                | Self::DeleteFailed
                | Self::ImportRollbackComplete
                | Self::ImportRollbackFailed
                | Self::RollbackComplete
                | Self::RollbackFailed
                | Self::UpdateRollbackComplete
                | Self::UpdateRollbackFailed
        )
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StackStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A resource belonging to a live stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackResource {
    /// Logical id in the template.
    pub logical_id: String,
    /// Physical id assigned by the service.
    pub physical_id: Option<String>,
    /// Resource type, e.g. `AWS::SQS::Queue`.
    pub resource_type: String,
    /// Resource status.
    pub status: String,
    /// Reason for the status, if any.
    pub status_reason: Option<String>,
}

/// Classified changeset status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSetStatus {
    /// Still being computed.
    Staging,
    /// Computed and ready to execute.
    Ready,
    /// Computed and contains nothing to do.
    Empty,
    /// Computation failed.
    Failed,
}

impl ChangeSetStatus {
    /// Classifies a raw changeset status and its reason.
    ///
    /// The no-change marker in the reason wins over everything else.
    #[must_use]
    pub fn classify(raw_status: &str, reason: Option<&str>) -> Self {
        if reason.is_some_and(|r| NO_CHANGE_MARKERS.iter().any(|marker| r.contains(marker))) {
            return Self::Empty;
        }

        match raw_status {
            "CREATE_PENDING" | "CREATE_IN_PROGRESS" => Self::Staging,
            "CREATE_COMPLETE" => Self::Ready,
            _ => Self::Failed,
        }
    }
}

/// What a changeset will do to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeAction {
    /// The resource will be created.
    Add,
    /// The resource will be changed.
    Modify,
    /// The resource will be deleted.
    Remove,
}

/// A single resource-level change in a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceChange {
    /// Logical id of the resource.
    pub logical_id: String,
    /// Resource type.
    pub resource_type: String,
    /// Action to take.
    pub action: ChangeAction,
    /// True if a modification replaces the resource.
    pub replacement_required: bool,
    /// Parts of the resource that change, e.g. `Properties`, `Tags`.
    pub scopes: Vec<String>,
    /// Entities causing the change, per scope.
    pub causing_entities: BTreeMap<String, Vec<String>>,
}

impl ResourceChange {
    /// Creates a change with no scopes.
    #[must_use]
    pub fn new(logical_id: impl Into<String>, resource_type: impl Into<String>, action: ChangeAction) -> Self {
        Self {
            logical_id: logical_id.into(),
            resource_type: resource_type.into(),
            action,
            replacement_required: false,
            scopes: Vec::new(),
            causing_entities: BTreeMap::new(),
        }
    }
}

/// A staged changeset.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeSet {
    /// Opaque changeset id.
    pub id: String,
    /// Stack the changeset belongs to.
    pub stack_name: String,
    /// Classified status.
    pub status: ChangeSetStatus,
    /// Status reason reported by the service.
    pub status_reason: Option<String>,
    /// When the service created the changeset.
    pub created_at: DateTime<Utc>,
    /// Resource changes, in service order.
    pub changes: Vec<ResourceChange>,
}

/// Whether a changeset creates a new stack or updates an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSetKind {
    /// New stack.
    Create,
    /// Existing stack.
    Update,
}

impl ChangeSetKind {
    /// Returns the service's name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
        }
    }
}

/// Where the changeset's template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Template body sent inline.
    Inline(String),
    /// Template previously uploaded to object storage.
    Url(String),
    /// Keep the deployed template.
    UsePrevious,
}

/// A parameter value in a changeset request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    /// Submit this value.
    Set {
        /// Parameter key.
        key: String,
        /// Parameter value.
        value: String,
    },
    /// Keep the deployed value.
    KeepExisting {
        /// Parameter key.
        key: String,
    },
}

impl ParameterValue {
    /// Parameter key.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::KeepExisting { key } => key,
        }
    }
}

/// Everything needed to create a changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSetRequest {
    /// Changeset name, `stax-<uuid>`.
    pub name: String,
    /// Target stack.
    pub stack_name: String,
    /// Create or update.
    pub kind: ChangeSetKind,
    /// Template to use.
    pub template: TemplateSource,
    /// Parameters to submit.
    pub parameters: Vec<ParameterValue>,
    /// Tags to apply.
    pub tags: KeyValues,
}

impl ChangeSetRequest {
    /// Creates a request with a fresh changeset name.
    #[must_use]
    pub fn new(stack_name: impl Into<String>, kind: ChangeSetKind, template: TemplateSource) -> Self {
        Self {
            name: format!("stax-{}", uuid::Uuid::new_v4()),
            stack_name: stack_name.into(),
            kind,
            template,
            parameters: Vec::new(),
            tags: KeyValues::new(),
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<ParameterValue>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: KeyValues) -> Self {
        self.tags = tags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_change_reason_wins() {
        assert_eq!(
            ChangeSetStatus::classify(
                "FAILED",
                Some("The submitted information didn't contain changes. Submit different information to create a change set.")
            ),
            ChangeSetStatus::Empty
        );
        assert_eq!(
            ChangeSetStatus::classify("CREATE_IN_PROGRESS", Some("No updates are to be performed.")),
            ChangeSetStatus::Empty
        );
    }

    #[test]
    fn test_classify_statuses() {
        assert_eq!(ChangeSetStatus::classify("CREATE_PENDING", None), ChangeSetStatus::Staging);
        assert_eq!(ChangeSetStatus::classify("CREATE_IN_PROGRESS", None), ChangeSetStatus::Staging);
        assert_eq!(ChangeSetStatus::classify("CREATE_COMPLETE", None), ChangeSetStatus::Ready);
        assert_eq!(
            ChangeSetStatus::classify("FAILED", Some("Template format error")),
            ChangeSetStatus::Failed
        );
        assert_eq!(ChangeSetStatus::classify("DELETE_COMPLETE", None), ChangeSetStatus::Failed);
    }

    #[test]
    fn test_stack_status_round_trip() {
        for raw in ["CREATE_COMPLETE", "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS", "REVIEW_IN_PROGRESS"] {
            assert_eq!(StackStatus::parse(raw).as_str(), raw);
        }
        assert_eq!(StackStatus::parse("SOMETHING_NEW"), StackStatus::Unknown(String::from("SOMETHING_NEW")));
    }

    #[test]
    fn test_terminal_sets() {
        assert!(StackStatus::UpdateComplete.is_terminal_success());
        assert!(StackStatus::RollbackComplete.is_terminal_failure());
        assert!(StackStatus::UpdateRollbackComplete.is_terminal_failure());
        assert!(!StackStatus::UpdateInProgress.is_terminal_success());
        assert!(!StackStatus::UpdateInProgress.is_terminal_failure());
        assert!(!StackStatus::UpdateFailed.is_terminal_failure());
    }

    #[test]
    fn test_change_set_request_name() {
        let request = ChangeSetRequest::new("orders-api", ChangeSetKind::Create, TemplateSource::UsePrevious);
        assert!(request.name.starts_with("stax-"));
        assert_eq!(request.name.len(), "stax-".len() + 36);
    }

    #[test]
    fn test_live_stack_fingerprint() {
        let mut tags = KeyValues::new();
        tags.insert("STAX_HASH", "abc");
        let live = LiveStack::new("billing", StackStatus::UpdateComplete).with_tags(tags);
        assert_eq!(live.fingerprint(), Some("abc"));
    }
}

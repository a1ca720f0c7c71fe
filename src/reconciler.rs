//! Reconciler for bringing live stacks to their declared state.
//!
//! For every stack the reconciler decides whether a change is needed,
//! stages it as a changeset, shows the operator what it will do, asks
//! for confirmation and then executes it and waits for the stack to
//! settle. Stacks marked for purge are deleted instead.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use colored::Colorize;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::cloudformation::{ChangeSet, ChangeSetKind, ChangeSetStatus, LiveStack, StackGateway, StackStatus};
use crate::config::{AccountConfig, Fingerprinter, FINGERPRINT_TAG};
use crate::console::Console;
use crate::context::ReconcileContext;
use crate::error::{PlanError, RemoteError, Result, StaxError};
use crate::planner::{
    canonical_json, ensure_fresh, render_changes, wait_for_stack, ChangePlanner, DiffRenderer,
    DiffReport, PlanMode, PlanOutcome, StackAction,
};
use crate::stack::{StackId, StackSpec};

/// Options for a push.
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Always stage a changeset, never trust the fingerprint alone.
    pub force: bool,
    /// Reconcile against this pre-staged changeset.
    pub change_set: Option<String>,
    /// Only update tags, keeping the deployed template and parameters.
    pub tags_only: bool,
    /// Number of stacks in the whole push, across every account and region.
    pub batch_size: usize,
}

/// What happened to one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum StackOutcome {
    /// Nothing to do.
    UpToDate,
    /// The stack was created.
    Created,
    /// The stack was updated.
    Updated,
    /// The stack was deleted.
    Deleted,
    /// The operator declined the change.
    Declined,
    /// Reconciliation failed.
    Failed(String),
}

impl fmt::Display for StackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate => write!(f, "up to date"),
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
            Self::Declined => write!(f, "declined"),
            Self::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

/// Outcome of one stack in a push.
#[derive(Debug, Clone, Serialize)]
pub struct StackReport {
    /// Stack identity.
    pub stack: StackId,
    /// What happened.
    #[serde(flatten)]
    pub outcome: StackOutcome,
}

/// Result of a push.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PushReport {
    /// Per-stack outcomes in processing order.
    pub stacks: Vec<StackReport>,
}

impl PushReport {
    /// Records the outcome for a stack.
    pub fn record(&mut self, stack: StackId, outcome: StackOutcome) {
        self.stacks.push(StackReport { stack, outcome });
    }

    /// Appends another report.
    pub fn extend(&mut self, other: Self) {
        self.stacks.extend(other.stacks);
    }

    /// Number of stacks with the given outcome.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&StackOutcome) -> bool) -> usize {
        self.stacks.iter().filter(|s| predicate(&s.outcome)).count()
    }

    /// Number of failed stacks.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, StackOutcome::Failed(_)))
    }

    /// Number of stacks that were created, updated or deleted.
    #[must_use]
    pub fn changed(&self) -> usize {
        self.count(|o| matches!(o, StackOutcome::Created | StackOutcome::Updated | StackOutcome::Deleted))
    }

    /// Returns true if no stack failed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

/// Reconciles stacks in one account and region.
pub struct Reconciler<'a> {
    /// Live state gateway for the account and region.
    gateway: &'a dyn StackGateway,
    /// Operator interaction.
    console: &'a dyn Console,
    /// Runtime settings.
    context: &'a ReconcileContext,
    /// Fingerprinter.
    hasher: Fingerprinter,
    /// Diff renderer.
    renderer: DiffRenderer,
    /// Bulk description of live stacks, fetched at most once.
    live_stacks: OnceCell<BTreeMap<String, LiveStack>>,
}

impl<'a> Reconciler<'a> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(gateway: &'a dyn StackGateway, console: &'a dyn Console, context: &'a ReconcileContext) -> Self {
        Self {
            gateway,
            console,
            context,
            hasher: Fingerprinter::new(),
            renderer: DiffRenderer::new(),
            live_stacks: OnceCell::new(),
        }
    }

    /// Checks that the credentials belong to the configured account.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::AccountMismatch` if the ids differ.
    pub async fn verify_account(&self, name: &str, account: &AccountConfig) -> Result<()> {
        verify_account(self.gateway, name, account).await
    }

    /// Reconciles every stack, one at a time.
    ///
    /// A failing stack is recorded and the batch continues. An account
    /// mismatch fails every stack without touching any of them.
    pub async fn push(
        &self,
        account_name: &str,
        account: &AccountConfig,
        stacks: &[StackSpec],
        options: &PushOptions,
    ) -> PushReport {
        let mut report = PushReport::default();

        if let Err(e) = self.verify_account(account_name, account).await {
            error!("{e}");
            for stack in stacks {
                report.record(stack.id.clone(), StackOutcome::Failed(e.to_string()));
            }
            return report;
        }

        let fast_path = self.context.use_fast_path(options.batch_size, options.force);
        debug!("Reconciling {} stacks (fast path: {fast_path})", stacks.len());

        for stack in stacks {
            let outcome = match self.reconcile(stack, options, fast_path).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("{}: {e}", stack.id);
                    StackOutcome::Failed(e.to_string())
                }
            };
            info!("{}: {outcome}", stack.id);
            report.record(stack.id.clone(), outcome);
        }

        report
    }

    /// Reconciles a single stack.
    ///
    /// # Errors
    ///
    /// Returns the first error that stops this stack.
    pub async fn reconcile(&self, stack: &StackSpec, options: &PushOptions, fast_path: bool) -> Result<StackOutcome> {
        if stack.purge {
            return self.purge(stack).await;
        }

        if let Some(id) = &options.change_set {
            return self.apply_external(stack, id).await;
        }

        let fingerprint = stack.fingerprint(&self.hasher);
        let live = if fast_path {
            self.cached_live(stack.name()).await?
        } else {
            self.live(stack.name()).await?
        };

        if fast_path
            && let Some(live) = &live
            && !options.tags_only
            && !Fingerprinter::needs_update(live.fingerprint(), &fingerprint)
        {
            debug!("{}: fingerprint {} matches", stack.id, Fingerprinter::short_hash(&fingerprint));
            return Ok(StackOutcome::UpToDate);
        }

        if options.tags_only {
            let live = live.ok_or_else(|| StaxError::Remote(RemoteError::not_found(stack.name())))?;
            return self.retag(stack, &live).await;
        }

        let tags = stack.desired_tags(&fingerprint, self.context.build.as_ref());
        let planner = ChangePlanner::new(self.gateway, self.context.poll_interval);

        let (outcome, live) = match change_set_kind(live.as_ref()) {
            ChangeSetKind::Update => match planner.stage(stack, ChangeSetKind::Update, &PlanMode::Full, &tags).await {
                Err(e) if e.is_not_found() => {
                    debug!("{} no longer exists, creating it", stack.id);
                    (planner.stage(stack, ChangeSetKind::Create, &PlanMode::Full, &tags).await?, None)
                }
                result => (result?, live),
            },
            ChangeSetKind::Create => (planner.stage(stack, ChangeSetKind::Create, &PlanMode::Full, &tags).await?, live),
        };

        let PlanOutcome::Ready(change_set) = outcome else {
            return Ok(StackOutcome::UpToDate);
        };

        let live_template = match &live {
            Some(_) => Some(self.gateway.get_template(stack.name()).await?),
            None => None,
        };
        let diff = self
            .renderer
            .render_stack(stack, &tags, live.as_ref(), live_template.as_deref())?;
        self.review(&diff, &change_set);

        self.execute(stack, &change_set, live.as_ref(), true).await
    }

    /// Updates only the tags of a live stack.
    async fn retag(&self, stack: &StackSpec, live: &LiveStack) -> Result<StackOutcome> {
        let marker = live.fingerprint();
        let mut tags = stack.desired_tags(marker.unwrap_or_default(), self.context.build.as_ref());
        if marker.is_none() {
            tags.remove(FINGERPRINT_TAG);
        }

        let mode = PlanMode::Reuse {
            keep: live.parameters.keys().map(str::to_string).collect(),
        };
        let planner = ChangePlanner::new(self.gateway, self.context.poll_interval);

        let PlanOutcome::Ready(change_set) = planner.stage(stack, ChangeSetKind::Update, &mode, &tags).await? else {
            return Ok(StackOutcome::UpToDate);
        };

        let mut diff = DiffReport::default();
        self.renderer.render_section(
            &mut diff,
            "tags",
            &canonical_json(&live.tags.to_document())?,
            &canonical_json(&tags.to_document())?,
        );
        self.review(&diff, &change_set);

        self.execute(stack, &change_set, Some(live), true).await
    }

    /// Reconciles against a changeset staged elsewhere. The changeset is never discarded here.
    async fn apply_external(&self, stack: &StackSpec, id: &str) -> Result<StackOutcome> {
        let planner = ChangePlanner::new(self.gateway, self.context.poll_interval);
        let change_set = planner.wait_until_computed(id).await?;

        if change_set.stack_name != stack.name() {
            return Err(StaxError::Plan(PlanError::StackNameMismatch {
                expected: stack.name().to_string(),
                found: change_set.stack_name,
            }));
        }

        ensure_fresh(&change_set, self.context.changeset_timeout, Utc::now())?;

        match change_set.status {
            ChangeSetStatus::Empty => return Ok(StackOutcome::UpToDate),
            ChangeSetStatus::Failed | ChangeSetStatus::Staging => {
                return Err(StaxError::Plan(PlanError::ChangeSetFailed {
                    stack: stack.name().to_string(),
                    reason: change_set.status_reason.unwrap_or_default(),
                }));
            }
            ChangeSetStatus::Ready => {}
        }

        let live = self.live(stack.name()).await?;
        let live_template = match &live {
            Some(_) => Some(self.gateway.get_template(stack.name()).await?),
            None => None,
        };
        let tags = stack.desired_tags(&stack.fingerprint(&self.hasher), self.context.build.as_ref());
        let diff = self
            .renderer
            .render_stack(stack, &tags, live.as_ref(), live_template.as_deref())?;
        self.review(&diff, &change_set);

        self.execute(stack, &change_set, live.as_ref(), false).await
    }

    /// Deletes a purged stack if it still exists. Always asks first.
    async fn purge(&self, stack: &StackSpec) -> Result<StackOutcome> {
        debug!("Checking to see if {} still exists", stack.id);
        if self.live(stack.name()).await?.is_none() {
            return Ok(StackOutcome::UpToDate);
        }

        if !self.console.confirm(&question("delete", stack))? {
            return Ok(StackOutcome::Declined);
        }

        self.gateway.delete_stack(stack.name()).await?;
        wait_for_stack(self.gateway, stack.name(), StackAction::Delete, self.context.poll_interval).await?;
        Ok(StackOutcome::Deleted)
    }

    /// Shows the diff and the change summary.
    fn review(&self, diff: &DiffReport, change_set: &ChangeSet) {
        if !diff.is_empty() {
            self.console.show(&diff.text);
        }
        if !change_set.changes.is_empty() {
            self.console.show(&render_changes(&change_set.changes));
        }
    }

    /// Confirms and executes a ready changeset, then waits for the stack.
    async fn execute(
        &self,
        stack: &StackSpec,
        change_set: &ChangeSet,
        live: Option<&LiveStack>,
        owned: bool,
    ) -> Result<StackOutcome> {
        ensure_fresh(change_set, self.context.changeset_timeout, Utc::now())?;

        let (verb, action, outcome) = match change_set_kind(live) {
            ChangeSetKind::Update => ("update", StackAction::Update, StackOutcome::Updated),
            ChangeSetKind::Create => ("create", StackAction::Create, StackOutcome::Created),
        };

        if !self.context.assume_yes && !self.console.confirm(&question(verb, stack))? {
            if owned {
                self.gateway.delete_change_set(&change_set.id, stack.name()).await?;
                debug!("Deleted changeset {}", change_set.id);
            } else {
                warn!("Leaving changeset {} in place", change_set.id);
            }
            return Ok(StackOutcome::Declined);
        }

        // The prompt may have outlived the timeout.
        ensure_fresh(change_set, self.context.changeset_timeout, Utc::now())?;
        self.gateway.execute_change_set(&change_set.id, stack.name()).await?;
        wait_for_stack(self.gateway, stack.name(), action, self.context.poll_interval).await?;
        Ok(outcome)
    }

    /// Describes one stack, mapping a missing stack to `None`.
    async fn live(&self, name: &str) -> Result<Option<LiveStack>> {
        match self.gateway.describe_stack(name).await {
            Ok(live) => Ok(Some(live)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Looks a stack up in the bulk description, fetching it on first use.
    async fn cached_live(&self, name: &str) -> Result<Option<LiveStack>> {
        let stacks = self
            .live_stacks
            .get_or_try_init(|| async {
                info!("Fetching stack status");
                self.gateway.describe_stacks().await
            })
            .await?;
        Ok(stacks.get(name).cloned())
    }
}

/// Checks that the gateway's credentials belong to the configured account.
///
/// # Errors
///
/// Returns `RemoteError::AccountMismatch` if the ids differ, or the gateway error.
pub async fn verify_account(gateway: &dyn StackGateway, name: &str, account: &AccountConfig) -> Result<()> {
    let found = gateway.caller_account_id().await?;
    if found != account.id {
        return Err(StaxError::Remote(RemoteError::AccountMismatch {
            account: name.to_string(),
            expected: account.id.clone(),
            found,
        }));
    }
    debug!("Account {name} verified as {found}");
    Ok(())
}

/// A stack that was never executed still needs a create changeset.
fn change_set_kind(live: Option<&LiveStack>) -> ChangeSetKind {
    match live {
        Some(live) if live.status != StackStatus::ReviewInProgress => ChangeSetKind::Update,
        _ => ChangeSetKind::Create,
    }
}

fn question(verb: &str, stack: &StackSpec) -> String {
    let verb = match verb {
        "delete" => verb.red(),
        "update" => verb.cyan(),
        _ => verb.green(),
    };
    format!(
        "Are you sure you want to {verb} {}/{} in {}?",
        stack.id.account.bold(),
        stack.name(),
        stack.id.region
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudformation::{ChangeAction, MockStackGateway, ParameterValue, ResourceChange, TemplateSource};
    use crate::console::MockConsole;
    use crate::stack::{KeyValues, Template, TemplateEncoding};
    use chrono::Duration as ChronoDuration;
    use mockall::Sequence;
    use std::time::Duration;

    const TEMPLATE: &str = r#"{"Resources": {"Queue": {"Type": "AWS::SQS::Queue"}}}"#;

    fn account() -> AccountConfig {
        AccountConfig {
            id: String::from("111111111111"),
            profile: String::from("dev"),
        }
    }

    fn context() -> ReconcileContext {
        ReconcileContext::default()
            .with_poll_interval(Duration::ZERO)
            .with_changeset_timeout(Some(30))
    }

    fn spec(name: &str) -> StackSpec {
        let mut params = KeyValues::new();
        params.insert("QueueName", name);
        StackSpec::new(
            StackId::new("dev", "ap-southeast-2", name),
            Template::new(TEMPLATE, TemplateEncoding::Json),
        )
        .with_parameters(params)
    }

    fn ready(stack: &str, age_minutes: i64) -> ChangeSet {
        ChangeSet {
            id: String::from("cs-1"),
            stack_name: stack.to_string(),
            status: ChangeSetStatus::Ready,
            status_reason: None,
            created_at: Utc::now() - ChronoDuration::minutes(age_minutes),
            changes: vec![ResourceChange::new("Queue", "AWS::SQS::Queue", ChangeAction::Add)],
        }
    }

    fn verified(gateway: &mut MockStackGateway) {
        gateway
            .expect_caller_account_id()
            .returning(|| Ok(String::from("111111111111")));
    }

    fn quiet_console(confirm: bool) -> MockConsole {
        let mut console = MockConsole::new();
        console.expect_show().returning(|_| ());
        console.expect_confirm().returning(move |_| Ok(confirm));
        console
    }

    fn options(batch_size: usize) -> PushOptions {
        PushOptions {
            batch_size,
            ..PushOptions::default()
        }
    }

    #[tokio::test]
    async fn test_creates_missing_stack() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);

        let mut seq = Sequence::new();
        gateway
            .expect_describe_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Err(RemoteError::not_found(name).into()));
        gateway
            .expect_create_change_set()
            .withf(|r| r.kind == ChangeSetKind::Create && r.tags.get(FINGERPRINT_TAG).is_some())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(String::from("cs-1")));
        gateway
            .expect_describe_change_set()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ready("orders-api", 0)));
        gateway
            .expect_execute_change_set()
            .withf(|id, stack| id == "cs-1" && stack == "orders-api")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        gateway
            .expect_describe_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Ok(LiveStack::new(name, StackStatus::CreateInProgress)));
        gateway
            .expect_describe_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Ok(LiveStack::new(name, StackStatus::CreateComplete)));
        gateway.expect_get_template().times(0);
        gateway.expect_delete_change_set().times(0);

        let mut console = MockConsole::new();
        console
            .expect_show()
            .withf(|text| text.contains("AWS::SQS::Queue (Queue) will be added"))
            .times(1)
            .returning(|_| ());
        console.expect_show().returning(|_| ());
        console.expect_confirm().times(1).returning(|_| Ok(true));

        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let report = reconciler.push("dev", &account(), &[spec("orders-api")], &options(1)).await;

        assert_eq!(report.stacks[0].outcome, StackOutcome::Created);
        assert!(report.success());
    }

    #[tokio::test]
    async fn test_fast_path_skips_matching_stack() {
        let stack = spec("billing");
        let fingerprint = stack.fingerprint(&Fingerprinter::new());

        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway.expect_describe_stacks().times(1).returning(move || {
            let mut tags = KeyValues::new();
            tags.insert(FINGERPRINT_TAG, fingerprint.as_str());
            let mut stacks = BTreeMap::new();
            stacks.insert(
                String::from("billing"),
                LiveStack::new("billing", StackStatus::UpdateComplete).with_tags(tags),
            );
            Ok(stacks)
        });
        gateway.expect_describe_stack().times(0);
        gateway.expect_create_change_set().times(0);
        gateway.expect_describe_change_set().times(0);
        gateway.expect_execute_change_set().times(0);

        let console = MockConsole::new();
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let stacks = [stack];

        // Second push must reuse the bulk description and still change nothing.
        for _ in 0..2 {
            let report = reconciler.push("dev", &account(), &stacks, &options(21)).await;
            assert_eq!(report.stacks[0].outcome, StackOutcome::UpToDate);
            assert_eq!(report.changed(), 0);
        }
    }

    #[tokio::test]
    async fn test_force_disables_fast_path() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway.expect_describe_stacks().times(0);
        gateway
            .expect_describe_stack()
            .times(1)
            .returning(|name| Ok(LiveStack::new(name, StackStatus::UpdateComplete)));
        gateway.expect_create_change_set().times(1).returning(|_| Ok(String::from("cs-1")));
        gateway.expect_describe_change_set().returning(|_| {
            Ok(ChangeSet {
                status: ChangeSetStatus::Empty,
                status_reason: Some(String::from("No updates are to be performed.")),
                ..ready("billing", 0)
            })
        });
        gateway.expect_delete_change_set().times(1).returning(|_, _| Ok(()));

        let console = MockConsole::new();
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let opts = PushOptions {
            force: true,
            ..options(50)
        };
        let report = reconciler.push("dev", &account(), &[spec("billing")], &opts).await;
        assert_eq!(report.stacks[0].outcome, StackOutcome::UpToDate);
    }

    #[tokio::test]
    async fn test_stale_external_changeset_is_refused() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway
            .expect_describe_change_set()
            .returning(|_| Ok(ready("orders-api", 31)));
        gateway.expect_execute_change_set().times(0);
        gateway.expect_delete_change_set().times(0);
        gateway.expect_create_change_set().times(0);

        let console = MockConsole::new();
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let opts = PushOptions {
            change_set: Some(String::from("cs-1")),
            ..options(1)
        };
        let report = reconciler.push("dev", &account(), &[spec("orders-api")], &opts).await;

        let StackOutcome::Failed(message) = &report.stacks[0].outcome else {
            panic!("expected a failure");
        };
        assert!(message.contains("Refusing to execute changeset cs-1"));
    }

    #[tokio::test]
    async fn test_changeset_expiring_during_confirmation_is_refused() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway.expect_describe_change_set().returning(|_| {
            let mut change_set = ready("orders-api", 0);
            change_set.created_at = Utc::now() - ChronoDuration::minutes(30) + ChronoDuration::seconds(1);
            Ok(change_set)
        });
        gateway
            .expect_describe_stack()
            .returning(|name| Ok(LiveStack::new(name, StackStatus::UpdateComplete)));
        gateway
            .expect_get_template()
            .returning(|_| Ok(String::from(TEMPLATE)));
        gateway.expect_execute_change_set().times(0);
        gateway.expect_delete_change_set().times(0);

        let mut console = MockConsole::new();
        console.expect_show().returning(|_| ());
        console.expect_confirm().times(1).returning(|_| {
            std::thread::sleep(Duration::from_millis(1500));
            Ok(true)
        });
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let opts = PushOptions {
            change_set: Some(String::from("cs-1")),
            ..options(1)
        };
        let report = reconciler.push("dev", &account(), &[spec("orders-api")], &opts).await;

        let StackOutcome::Failed(message) = &report.stacks[0].outcome else {
            panic!("expected a failure");
        };
        assert!(message.contains("Refusing to execute changeset cs-1"));
    }

    #[tokio::test]
    async fn test_external_changeset_for_other_stack() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway
            .expect_describe_change_set()
            .returning(|_| Ok(ready("billing", 0)));
        gateway.expect_execute_change_set().times(0);

        let console = MockConsole::new();
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let opts = PushOptions {
            change_set: Some(String::from("cs-1")),
            ..options(1)
        };
        let report = reconciler.push("dev", &account(), &[spec("orders-api")], &opts).await;
        assert!(matches!(
            &report.stacks[0].outcome,
            StackOutcome::Failed(m) if m.contains("Changeset stack name billing does not match orders-api")
        ));
    }

    #[tokio::test]
    async fn test_declined_external_changeset_is_kept() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway
            .expect_describe_change_set()
            .returning(|_| Ok(ready("orders-api", 1)));
        gateway
            .expect_describe_stack()
            .returning(|name| Ok(LiveStack::new(name, StackStatus::UpdateComplete)));
        gateway
            .expect_get_template()
            .returning(|_| Ok(String::from(TEMPLATE)));
        gateway.expect_delete_change_set().times(0);
        gateway.expect_execute_change_set().times(0);

        let console = quiet_console(false);
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let opts = PushOptions {
            change_set: Some(String::from("cs-1")),
            ..options(1)
        };
        let report = reconciler.push("dev", &account(), &[spec("orders-api")], &opts).await;
        assert_eq!(report.stacks[0].outcome, StackOutcome::Declined);
    }

    #[tokio::test]
    async fn test_declined_own_changeset_is_discarded() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway
            .expect_describe_stack()
            .returning(|name| Ok(LiveStack::new(name, StackStatus::UpdateComplete)));
        gateway
            .expect_create_change_set()
            .withf(|r| r.kind == ChangeSetKind::Update)
            .returning(|_| Ok(String::from("cs-1")));
        gateway
            .expect_describe_change_set()
            .returning(|_| Ok(ready("orders-api", 0)));
        gateway
            .expect_get_template()
            .returning(|_| Ok(String::from("{}")));
        gateway
            .expect_delete_change_set()
            .withf(|id, stack| id == "cs-1" && stack == "orders-api")
            .times(1)
            .returning(|_, _| Ok(()));
        gateway.expect_execute_change_set().times(0);

        let console = quiet_console(false);
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let report = reconciler.push("dev", &account(), &[spec("orders-api")], &options(1)).await;
        assert_eq!(report.stacks[0].outcome, StackOutcome::Declined);
    }

    #[tokio::test]
    async fn test_update_falls_back_to_create() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);

        let mut seq = Sequence::new();
        gateway
            .expect_describe_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Ok(LiveStack::new(name, StackStatus::UpdateComplete)));
        gateway
            .expect_create_change_set()
            .withf(|r| r.kind == ChangeSetKind::Update)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|r| Err(RemoteError::not_found(r.stack_name.clone()).into()));
        gateway
            .expect_create_change_set()
            .withf(|r| r.kind == ChangeSetKind::Create)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(String::from("cs-1")));
        gateway
            .expect_describe_change_set()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ready("orders-api", 0)));
        gateway
            .expect_execute_change_set()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        gateway
            .expect_describe_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Ok(LiveStack::new(name, StackStatus::CreateComplete)));
        gateway.expect_get_template().times(0);

        let console = quiet_console(true);
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let report = reconciler.push("dev", &account(), &[spec("orders-api")], &options(1)).await;
        assert_eq!(report.stacks[0].outcome, StackOutcome::Created);
    }

    #[tokio::test]
    async fn test_assume_yes_skips_confirmation_for_update() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway
            .expect_describe_stack()
            .returning(|name| Ok(LiveStack::new(name, StackStatus::UpdateComplete)));
        gateway.expect_create_change_set().returning(|_| Ok(String::from("cs-1")));
        gateway
            .expect_describe_change_set()
            .returning(|_| Ok(ready("orders-api", 0)));
        gateway.expect_get_template().returning(|_| Ok(String::from(TEMPLATE)));
        gateway.expect_execute_change_set().times(1).returning(|_, _| Ok(()));

        let mut console = MockConsole::new();
        console.expect_show().returning(|_| ());
        console.expect_confirm().times(0);

        let ctx = context().with_assume_yes(true);
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let report = reconciler.push("dev", &account(), &[spec("orders-api")], &options(1)).await;
        assert_eq!(report.stacks[0].outcome, StackOutcome::Updated);
    }

    #[tokio::test]
    async fn test_purge_of_absent_stack_is_noop() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway
            .expect_describe_stack()
            .returning(|name| Err(RemoteError::not_found(name).into()));
        gateway.expect_delete_stack().times(0);

        let mut console = MockConsole::new();
        console.expect_confirm().times(0);

        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let report = reconciler
            .push("dev", &account(), &[spec("legacy").with_purge(true)], &options(1))
            .await;
        assert_eq!(report.stacks[0].outcome, StackOutcome::UpToDate);
    }

    #[tokio::test]
    async fn test_purge_always_confirms() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway
            .expect_describe_stack()
            .returning(|name| Ok(LiveStack::new(name, StackStatus::CreateComplete)));
        gateway.expect_delete_stack().times(0);

        let mut console = MockConsole::new();
        console
            .expect_confirm()
            .withf(|q| q.contains("legacy"))
            .times(1)
            .returning(|_| Ok(false));

        let ctx = context().with_assume_yes(true);
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let report = reconciler
            .push("dev", &account(), &[spec("legacy").with_purge(true)], &options(1))
            .await;
        assert_eq!(report.stacks[0].outcome, StackOutcome::Declined);
    }

    #[tokio::test]
    async fn test_purge_deletes_and_waits() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);

        let mut seq = Sequence::new();
        gateway
            .expect_describe_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Ok(LiveStack::new(name, StackStatus::CreateComplete)));
        gateway
            .expect_delete_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        gateway
            .expect_describe_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Err(RemoteError::not_found(name).into()));

        let console = quiet_console(true);
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let report = reconciler
            .push("dev", &account(), &[spec("legacy").with_purge(true)], &options(1))
            .await;
        assert_eq!(report.stacks[0].outcome, StackOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_account_mismatch_fails_every_stack() {
        let mut gateway = MockStackGateway::new();
        gateway
            .expect_caller_account_id()
            .returning(|| Ok(String::from("999999999999")));
        gateway.expect_describe_stack().times(0);
        gateway.expect_describe_stacks().times(0);

        let console = MockConsole::new();
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let report = reconciler
            .push("dev", &account(), &[spec("orders-api"), spec("billing")], &options(2))
            .await;

        assert_eq!(report.failed(), 2);
        assert!(matches!(
            &report.stacks[1].outcome,
            StackOutcome::Failed(m) if m.contains("Profile mismatch for account dev")
        ));
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway
            .expect_describe_stack()
            .returning(|name| Ok(LiveStack::new(name, StackStatus::UpdateComplete)));
        gateway
            .expect_create_change_set()
            .withf(|r| r.stack_name == "orders-api")
            .returning(|_| Err(RemoteError::service("CreateChangeSet", "Template format error").into()));
        gateway
            .expect_create_change_set()
            .withf(|r| r.stack_name == "billing")
            .returning(|_| Ok(String::from("cs-2")));
        gateway.expect_describe_change_set().returning(|_| {
            Ok(ChangeSet {
                status: ChangeSetStatus::Empty,
                status_reason: Some(String::from("didn't contain changes")),
                ..ready("billing", 0)
            })
        });
        gateway.expect_delete_change_set().returning(|_, _| Ok(()));

        let console = MockConsole::new();
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let report = reconciler
            .push("dev", &account(), &[spec("orders-api"), spec("billing")], &options(2))
            .await;

        assert!(matches!(&report.stacks[0].outcome, StackOutcome::Failed(m) if m.contains("Template format error")));
        assert_eq!(report.stacks[1].outcome, StackOutcome::UpToDate);
        assert!(!report.success());
    }

    #[tokio::test]
    async fn test_tags_only_keeps_template_parameters_and_marker() {
        let mut gateway = MockStackGateway::new();
        verified(&mut gateway);
        gateway.expect_describe_stack().returning(|name| {
            let mut params = KeyValues::new();
            params.insert("QueueName", "orders-live");
            let mut tags = KeyValues::new();
            tags.insert(FINGERPRINT_TAG, "deployed");
            Ok(LiveStack::new(name, StackStatus::UpdateComplete)
                .with_parameters(params)
                .with_tags(tags))
        });
        gateway
            .expect_create_change_set()
            .withf(|r| {
                r.template == TemplateSource::UsePrevious
                    && r.parameters
                        == vec![ParameterValue::KeepExisting {
                            key: String::from("QueueName"),
                        }]
                    && r.tags.get(FINGERPRINT_TAG) == Some("deployed")
                    && r.tags.get("team") == Some("orders")
            })
            .times(1)
            .returning(|_| Ok(String::from("cs-1")));
        gateway
            .expect_describe_change_set()
            .returning(|_| Ok(ready("orders-api", 0)));
        gateway.expect_execute_change_set().times(1).returning(|_, _| Ok(()));

        let mut tags = KeyValues::new();
        tags.insert("team", "orders");
        let stack = spec("orders-api").with_tags(tags);

        let console = quiet_console(true);
        let ctx = context();
        let reconciler = Reconciler::new(&gateway, &console, &ctx);
        let opts = PushOptions {
            tags_only: true,
            ..options(1)
        };
        let report = reconciler.push("dev", &account(), &[stack], &opts).await;
        assert_eq!(report.stacks[0].outcome, StackOutcome::Updated);
    }

    #[test]
    fn test_report_serializes_outcomes() {
        let mut report = PushReport::default();
        report.record(StackId::new("dev", "us-east-1", "a"), StackOutcome::Created);
        report.record(StackId::new("dev", "us-east-1", "b"), StackOutcome::Failed(String::from("boom")));

        let json = serde_json::to_value(&report).expect("serializes");
        assert_eq!(json["stacks"][0]["outcome"], "created");
        assert_eq!(json["stacks"][1]["error"], "boom");
        assert_eq!(report.changed(), 1);
        assert_eq!(report.failed(), 1);
    }
}

//! Changeset staging.
//!
//! A changeset is requested, polled while the service computes it and then
//! classified. An empty changeset means the stack already matches and is
//! discarded straight away.

use std::time::Duration;

use tracing::{debug, info};

use crate::cloudformation::{
    retry_throttled, ChangeSet, ChangeSetKind, ChangeSetRequest, ChangeSetStatus, ParameterValue,
    RetryPolicy, StackGateway, TemplateSource,
};
use crate::config::Fingerprinter;
use crate::error::{ConfigError, PlanError, RemoteError, Result, StaxError};
use crate::stack::{KeyValues, StackSpec};

/// Largest template, in bytes, that can be sent inline.
pub const INLINE_TEMPLATE_LIMIT: usize = 51_200;

/// Key prefix for uploaded templates.
const TEMPLATE_KEY_PREFIX: &str = "stax/stax_template_";

/// Status reason fragment for a changeset whose stack is gone.
const DOES_NOT_EXIST: &str = "does not exist";

/// How the changeset describes the desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanMode {
    /// Fresh template, parameters and tags.
    Full,
    /// Previous template, with these previous parameters kept as they are.
    Reuse {
        /// Keys of the deployed parameters.
        keep: Vec<String>,
    },
}

/// Result of staging a changeset.
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    /// The service found nothing to change.
    UpToDate,
    /// A changeset ready for review.
    Ready(ChangeSet),
}

/// Stages changesets against one account and region.
pub struct ChangePlanner<'a> {
    gateway: &'a dyn StackGateway,
    poll_interval: Duration,
    retry: RetryPolicy,
    hasher: Fingerprinter,
}

impl<'a> ChangePlanner<'a> {
    /// Creates a planner.
    #[must_use]
    pub fn new(gateway: &'a dyn StackGateway, poll_interval: Duration) -> Self {
        Self {
            gateway,
            poll_interval,
            retry: RetryPolicy::default(),
            hasher: Fingerprinter::new(),
        }
    }

    /// Sets the backoff for throttled changeset polls.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Creates a changeset for `stack` and waits for the service to compute it.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::StackNotFound` if the stack is gone,
    /// `PlanError::ChangeSetFailed` if the changeset failed, a configuration
    /// error if the template needs a bucket and none is set, or the remote
    /// error verbatim.
    pub async fn stage(
        &self,
        stack: &StackSpec,
        kind: ChangeSetKind,
        mode: &PlanMode,
        tags: &KeyValues,
    ) -> Result<PlanOutcome> {
        let (template, parameters) = match mode {
            PlanMode::Full => {
                let parameters = stack
                    .parameters
                    .iter()
                    .map(|(key, value)| ParameterValue::Set {
                        key: key.to_string(),
                        value: value.to_string(),
                    })
                    .collect();
                (self.template_source(stack).await?, parameters)
            }
            PlanMode::Reuse { keep } => {
                let parameters = keep
                    .iter()
                    .map(|key| ParameterValue::KeepExisting { key: key.clone() })
                    .collect();
                (TemplateSource::UsePrevious, parameters)
            }
        };

        let request = ChangeSetRequest::new(stack.name(), kind, template)
            .with_parameters(parameters)
            .with_tags(tags.clone());

        info!(
            "Creating {} changeset for {}/{} in {}",
            kind.as_str().to_lowercase(),
            stack.name(),
            stack.id.account,
            stack.id.region
        );
        let id = self.gateway.create_change_set(&request).await?;

        let change_set = self.wait_until_computed(&id).await?;
        self.classify(stack.name(), change_set).await
    }

    /// Polls a changeset until it leaves the staging states. Throttled polls
    /// are retried with backoff.
    ///
    /// # Errors
    ///
    /// Returns the gateway error, or `ReconcileError::MaxRetriesExceeded`
    /// once the retry policy is used up.
    pub async fn wait_until_computed(&self, id: &str) -> Result<ChangeSet> {
        loop {
            let change_set =
                retry_throttled(self.retry, "DescribeChangeSet", || self.gateway.describe_change_set(id)).await?;
            if change_set.status != ChangeSetStatus::Staging {
                return Ok(change_set);
            }
            debug!("Changeset {id} is still being computed");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn classify(&self, stack: &str, change_set: ChangeSet) -> Result<PlanOutcome> {
        match change_set.status {
            ChangeSetStatus::Empty => {
                info!("{stack} is up to date");
                self.gateway.delete_change_set(&change_set.id, stack).await?;
                Ok(PlanOutcome::UpToDate)
            }
            ChangeSetStatus::Ready => {
                info!("{stack} changeset created");
                Ok(PlanOutcome::Ready(change_set))
            }
            ChangeSetStatus::Failed | ChangeSetStatus::Staging => {
                let reason = change_set.status_reason.unwrap_or_default();
                if reason.contains(DOES_NOT_EXIST) {
                    return Err(StaxError::Remote(RemoteError::not_found(stack)));
                }
                Err(StaxError::Plan(PlanError::ChangeSetFailed {
                    stack: stack.to_string(),
                    reason,
                }))
            }
        }
    }

    /// Sends small templates inline and uploads large ones.
    async fn template_source(&self, stack: &StackSpec) -> Result<TemplateSource> {
        let template = &stack.template;
        if template.len() <= INLINE_TEMPLATE_LIMIT {
            return Ok(TemplateSource::Inline(template.body().to_string()));
        }

        let bucket = stack.bucket.as_ref().ok_or_else(|| {
            StaxError::Config(ConfigError::MissingBucket {
                stack: stack.name().to_string(),
                size: template.len(),
                limit: INLINE_TEMPLATE_LIMIT,
            })
        })?;

        let key = format!("{TEMPLATE_KEY_PREFIX}{}", self.hasher.template_hash(template.as_bytes()));
        self.gateway.put_object(bucket, &key, template.body()).await?;

        Ok(TemplateSource::Url(format!(
            "https://{}.s3.{}.amazonaws.com/{key}",
            bucket.name, bucket.region
        )))
    }
}

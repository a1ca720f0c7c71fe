//! Gateway implementation backed by the AWS SDK.
//!
//! CloudFormation does the provisioning, S3 holds templates that are too
//! large to send inline and STS reports which account the credentials
//! belong to.

use std::collections::BTreeMap;
use std::error::Error as StdError;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::types::{
    Capability, ChangeAction as SdkChangeAction, ChangeSetType, Parameter, Replacement, Stack, Tag,
};
use aws_sdk_cloudformation::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use crate::config::BucketConfig;
use crate::error::{RemoteError, Result, StaxError};
use crate::stack::KeyValues;

use super::gateway::StackGateway;
use super::retry::{retry_throttled, RetryPolicy};
use super::types::{
    ChangeAction, ChangeSet, ChangeSetRequest, ChangeSetStatus, LiveStack, ParameterValue,
    ResourceChange, StackResource, StackStatus, TemplateSource,
};

/// Service error code for rate limiting.
const THROTTLING_CODE: &str = "Throttling";

/// Message fragment for rate limiting.
const RATE_EXCEEDED: &str = "Rate exceeded";

/// Message fragment for a missing stack or changeset.
const DOES_NOT_EXIST: &str = "does not exist";

/// Gateway to one account and region.
#[derive(Debug, Clone)]
pub struct CloudFormationGateway {
    /// CloudFormation client.
    client: Client,
    /// Shared SDK configuration, reused for STS and S3.
    config: SdkConfig,
    /// Credentials profile.
    profile: String,
    /// Backoff for throttled reads.
    retry: RetryPolicy,
}

impl CloudFormationGateway {
    /// Connects using a credentials profile and region.
    pub async fn connect(profile: &str, region: &str) -> Self {
        let config = load_config(Some(profile), region).await;
        Self::with_config(config, profile)
    }

    /// Creates a gateway from an existing SDK configuration.
    #[must_use]
    pub fn with_config(config: SdkConfig, profile: &str) -> Self {
        Self {
            client: Client::new(&config),
            config,
            profile: profile.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    async fn describe_stack_once(&self, name: &str) -> Result<LiveStack> {
        trace!("DescribeStacks {name}");
        let output = self
            .client
            .describe_stacks()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| remote_error("DescribeStacks", name, &e))?;

        output
            .stacks()
            .optional()
            .unwrap_or_default()
            .first()
            .map(live_stack)
            .ok_or_else(|| StaxError::Remote(RemoteError::not_found(name)))
    }

    async fn describe_stacks_once(&self) -> Result<BTreeMap<String, LiveStack>> {
        let mut stacks = BTreeMap::new();
        let mut pages = self.client.describe_stacks().into_paginator().send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| remote_error("DescribeStacks", "*", &e))?;
            for stack in page.stacks().optional().unwrap_or_default() {
                let live = live_stack(stack);
                stacks.insert(live.name.clone(), live);
            }
        }

        debug!("Described {} stacks", stacks.len());
        Ok(stacks)
    }

    async fn get_template_once(&self, name: &str) -> Result<String> {
        let output = self
            .client
            .get_template()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| remote_error("GetTemplate", name, &e))?;

        Ok(output.template_body().unwrap_or_default().to_string())
    }

    async fn list_resources_once(&self, name: &str) -> Result<Vec<StackResource>> {
        let mut resources = Vec::new();
        let mut pages = self
            .client
            .list_stack_resources()
            .stack_name(name)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| remote_error("ListStackResources", name, &e))?;
            for summary in page.stack_resource_summaries().optional().unwrap_or_default() {
                resources.push(StackResource {
                    logical_id: text(summary.logical_resource_id().optional()),
                    physical_id: summary.physical_resource_id().map(str::to_string),
                    resource_type: text(summary.resource_type().optional()),
                    status: summary
                        .resource_status()
                        .optional()
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_default(),
                    status_reason: summary.resource_status_reason().map(str::to_string),
                });
            }
        }

        Ok(resources)
    }
}

#[async_trait]
impl StackGateway for CloudFormationGateway {
    async fn describe_stack(&self, name: &str) -> Result<LiveStack> {
        retry_throttled(self.retry, "DescribeStacks", || self.describe_stack_once(name)).await
    }

    async fn describe_stacks(&self) -> Result<BTreeMap<String, LiveStack>> {
        retry_throttled(self.retry, "DescribeStacks", || self.describe_stacks_once()).await
    }

    async fn get_template(&self, name: &str) -> Result<String> {
        retry_throttled(self.retry, "GetTemplate", || self.get_template_once(name)).await
    }

    async fn list_resources(&self, name: &str) -> Result<Vec<StackResource>> {
        retry_throttled(self.retry, "ListStackResources", || self.list_resources_once(name)).await
    }

    async fn create_change_set(&self, request: &ChangeSetRequest) -> Result<String> {
        let stack = request.stack_name.as_str();
        debug!("Creating {} changeset {} for {stack}", request.kind.as_str(), request.name);

        let mut builder = self
            .client
            .create_change_set()
            .stack_name(stack)
            .change_set_name(&request.name)
            .change_set_type(ChangeSetType::from(request.kind.as_str()))
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam);

        builder = match &request.template {
            TemplateSource::Inline(body) => builder.template_body(body),
            TemplateSource::Url(url) => builder.template_url(url),
            TemplateSource::UsePrevious => builder.use_previous_template(true),
        };

        for parameter in &request.parameters {
            let param = match parameter {
                ParameterValue::Set { key, value } => Parameter::builder()
                    .parameter_key(key)
                    .parameter_value(value)
                    .build(),
                ParameterValue::KeepExisting { key } => Parameter::builder()
                    .parameter_key(key)
                    .use_previous_value(true)
                    .build(),
            };
            builder = builder.parameters(param);
        }

        for (key, value) in request.tags.iter() {
            builder = builder.tags(Tag::builder().key(key).value(value).build());
        }

        let output = builder
            .send()
            .await
            .map_err(|e| remote_error("CreateChangeSet", stack, &e))?;

        output
            .id()
            .map(str::to_string)
            .ok_or_else(|| StaxError::Remote(RemoteError::service("CreateChangeSet", "no changeset id returned")))
    }

    // Throttled polls are retried by `ChangePlanner::wait_until_computed`.
    async fn describe_change_set(&self, id: &str) -> Result<ChangeSet> {
        let mut next_token: Option<String> = None;
        let mut changes = Vec::new();

        loop {
            let output = self
                .client
                .describe_change_set()
                .change_set_name(id)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| remote_error("DescribeChangeSet", id, &e))?;

            for change in output.changes().optional().unwrap_or_default() {
                if let Some(resource) = change.resource_change() {
                    changes.push(resource_change(resource));
                }
            }

            next_token = output.next_token().map(str::to_string);
            if next_token.is_some() {
                continue;
            }

            let raw_status = output
                .status()
                .optional()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default();
            let status_reason = output.status_reason().map(str::to_string);
            let created_at = output
                .creation_time()
                .optional()
                .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                .ok_or_else(|| RemoteError::service("DescribeChangeSet", "changeset has no creation time"))?;

            return Ok(ChangeSet {
                id: output.change_set_id().unwrap_or(id).to_string(),
                stack_name: output.stack_name().unwrap_or_default().to_string(),
                status: ChangeSetStatus::classify(&raw_status, status_reason.as_deref()),
                status_reason,
                created_at,
                changes,
            });
        }
    }

    async fn execute_change_set(&self, id: &str, stack: &str) -> Result<()> {
        info!("Executing changeset {id} on {stack}");
        self.client
            .execute_change_set()
            .change_set_name(id)
            .stack_name(stack)
            .send()
            .await
            .map_err(|e| remote_error("ExecuteChangeSet", stack, &e))?;
        Ok(())
    }

    async fn delete_change_set(&self, id: &str, stack: &str) -> Result<()> {
        debug!("Deleting changeset {id} on {stack}");
        self.client
            .delete_change_set()
            .change_set_name(id)
            .stack_name(stack)
            .send()
            .await
            .map_err(|e| remote_error("DeleteChangeSet", stack, &e))?;
        Ok(())
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        info!("Deleting stack {name}");
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| remote_error("DeleteStack", name, &e))?;
        Ok(())
    }

    async fn put_object(&self, bucket: &BucketConfig, key: &str, body: &str) -> Result<()> {
        let profile = bucket.profile.as_deref().unwrap_or(&self.profile);
        let config = load_config(Some(profile), &bucket.region).await;
        let s3 = aws_sdk_s3::Client::new(&config);

        debug!("Uploading template to s3://{}/{key}", bucket.name);
        s3.put_object()
            .bucket(&bucket.name)
            .key(key)
            .body(body.as_bytes().to_vec().into())
            .send()
            .await
            .map_err(|e| {
                StaxError::Remote(RemoteError::storage(format!(
                    "Failed to upload s3://{}/{key}: {}",
                    bucket.name,
                    DisplayErrorContext(&e)
                )))
            })?;

        Ok(())
    }

    async fn caller_account_id(&self) -> Result<String> {
        let sts = aws_sdk_sts::Client::new(&self.config);
        let output = sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| remote_error("GetCallerIdentity", &self.profile, &e))?;

        output
            .account()
            .map(str::to_string)
            .ok_or_else(|| StaxError::Remote(RemoteError::service("GetCallerIdentity", "no account id returned")))
    }
}

async fn load_config(profile: Option<&str>, region: &str) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

/// Maps an SDK error onto the remote error taxonomy.
fn remote_error<E>(operation: &str, subject: &str, err: &E) -> StaxError
where
    E: ProvideErrorMetadata + StdError,
{
    let message = err
        .message()
        .map_or_else(|| DisplayErrorContext(err).to_string(), str::to_string);

    let remote = if err.code() == Some(THROTTLING_CODE) || message.contains(RATE_EXCEEDED) {
        RemoteError::Throttled {
            operation: operation.to_string(),
            message,
        }
    } else if message.contains(DOES_NOT_EXIST) {
        RemoteError::not_found(subject)
    } else {
        RemoteError::service(operation, message)
    };

    StaxError::Remote(remote)
}

fn live_stack(stack: &Stack) -> LiveStack {
    let parameters: KeyValues = stack
        .parameters()
        .optional()
        .unwrap_or_default()
        .iter()
        .filter_map(|p| Some((p.parameter_key()?.to_string(), text(p.parameter_value()))))
        .collect();

    let tags: KeyValues = stack
        .tags()
        .optional()
        .unwrap_or_default()
        .iter()
        .map(|t| (text(t.key().optional()), text(t.value().optional())))
        .collect();

    let outputs: KeyValues = stack
        .outputs()
        .optional()
        .unwrap_or_default()
        .iter()
        .filter_map(|o| Some((o.output_key()?.to_string(), text(o.output_value()))))
        .collect();

    LiveStack {
        name: text(stack.stack_name().optional()),
        status: stack
            .stack_status()
            .optional()
            .map_or(StackStatus::Unknown(String::new()), |s| StackStatus::parse(s.as_str())),
        parameters,
        tags,
        outputs,
        creation_time: stack
            .creation_time()
            .optional()
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
    }
}

fn resource_change(change: &aws_sdk_cloudformation::types::ResourceChange) -> ResourceChange {
    let action = match change.action() {
        Some(SdkChangeAction::Add) => ChangeAction::Add,
        Some(SdkChangeAction::Remove) => ChangeAction::Remove,
        _ => ChangeAction::Modify,
    };

    let scopes: Vec<String> = change
        .scope()
        .optional()
        .unwrap_or_default()
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();

    let mut causing_entities: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for detail in change.details().optional().unwrap_or_default() {
        let Some(entity) = detail.causing_entity() else {
            continue;
        };
        let scope = detail
            .target()
            .and_then(|t| t.attribute())
            .map_or_else(String::new, |a| a.as_str().to_string());
        causing_entities.entry(scope).or_default().push(entity.to_string());
    }

    ResourceChange {
        logical_id: text(change.logical_resource_id()),
        resource_type: text(change.resource_type()),
        action,
        replacement_required: matches!(change.replacement(), Some(Replacement::True)),
        scopes,
        causing_entities,
    }
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

/// Normalises SDK accessors that return either `&T` or `Option<&T>`.
trait Optional<'a, T: ?Sized> {
    fn optional(self) -> Option<&'a T>;
}

impl<'a, T: ?Sized> Optional<'a, T> for &'a T {
    fn optional(self) -> Option<&'a T> {
        Some(self)
    }
}

impl<'a, T: ?Sized> Optional<'a, T> for Option<&'a T> {
    fn optional(self) -> Option<&'a T> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudformation::error::ErrorMetadata;
    use aws_sdk_cloudformation::operation::describe_stacks::DescribeStacksError;

    fn service_error(code: &str, message: &str) -> DescribeStacksError {
        DescribeStacksError::generic(ErrorMetadata::builder().code(code).message(message).build())
    }

    #[test]
    fn test_throttling_code_is_throttled() {
        let err = remote_error("DescribeStacks", "orders-api", &service_error("Throttling", "Slow down"));
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            StaxError::Remote(RemoteError::Throttled { ref operation, ref message })
                if operation == "DescribeStacks" && message == "Slow down"
        ));
    }

    #[test]
    fn test_rate_exceeded_message_is_throttled() {
        let err = remote_error("GetTemplate", "orders-api", &service_error("ServiceUnavailable", "Rate exceeded"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_missing_stack_is_not_found() {
        let err = remote_error(
            "DescribeStacks",
            "orders-api",
            &service_error("ValidationError", "Stack with id orders-api does not exist"),
        );
        assert!(err.is_not_found());
        assert!(matches!(
            err,
            StaxError::Remote(RemoteError::StackNotFound { ref stack }) if stack == "orders-api"
        ));
    }

    #[test]
    fn test_other_errors_keep_message() {
        let err = remote_error(
            "CreateChangeSet",
            "orders-api",
            &service_error("ValidationError", "Template format error: Unresolved resource dependencies"),
        );
        assert!(!err.is_retryable());
        assert!(!err.is_not_found());
        assert!(matches!(
            err,
            StaxError::Remote(RemoteError::ServiceError { ref operation, ref message })
                if operation == "CreateChangeSet"
                    && message == "Template format error: Unresolved resource dependencies"
        ));
    }
}

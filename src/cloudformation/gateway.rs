//! Live state gateway trait.
//!
//! The engine only talks to the provisioning service through this trait so
//! that every decision it makes can be exercised against a mock.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::config::BucketConfig;
use crate::error::Result;

use super::types::{ChangeSet, ChangeSetRequest, LiveStack, StackResource};

/// Operations the engine needs from the provisioning service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StackGateway: Send + Sync {
    /// Describes one stack.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::StackNotFound` if the stack does not exist.
    async fn describe_stack(&self, name: &str) -> Result<LiveStack>;

    /// Describes every stack visible in the account and region, keyed by name.
    async fn describe_stacks(&self) -> Result<BTreeMap<String, LiveStack>>;

    /// Returns the deployed template body.
    async fn get_template(&self, name: &str) -> Result<String>;

    /// Lists the resources of a stack in service order.
    async fn list_resources(&self, name: &str) -> Result<Vec<StackResource>>;

    /// Creates a changeset and returns its id.
    async fn create_change_set(&self, request: &ChangeSetRequest) -> Result<String>;

    /// Describes a changeset.
    async fn describe_change_set(&self, id: &str) -> Result<ChangeSet>;

    /// Executes a changeset.
    async fn execute_change_set(&self, id: &str, stack: &str) -> Result<()>;

    /// Deletes a changeset without executing it.
    async fn delete_change_set(&self, id: &str, stack: &str) -> Result<()>;

    /// Deletes a stack.
    async fn delete_stack(&self, name: &str) -> Result<()>;

    /// Uploads an object, used for templates over the inline limit.
    async fn put_object(&self, bucket: &BucketConfig, key: &str, body: &str) -> Result<()>;

    /// Returns the account id of the credentials in use.
    async fn caller_account_id(&self) -> Result<String>;
}

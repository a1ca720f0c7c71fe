//! Live state gateway.
//!
//! This module provides:
//! - The `StackGateway` trait the engine is written against
//! - Live stack, resource and changeset types
//! - An implementation backed by CloudFormation, S3 and STS
//! - Bounded backoff for throttled reads

mod client;
mod gateway;
mod retry;
mod types;

pub use client::CloudFormationGateway;
pub use gateway::StackGateway;
#[cfg(test)]
pub use gateway::MockStackGateway;
pub use retry::{retry_throttled, RetryPolicy};
pub use types::{
    ChangeAction, ChangeSet, ChangeSetKind, ChangeSetRequest, ChangeSetStatus, LiveStack,
    ParameterValue, ResourceChange, StackResource, StackStatus, TemplateSource,
};

//! Stack status polling.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info};

use crate::cloudformation::{StackGateway, StackStatus};
use crate::error::{ReconcileError, RemoteError, Result, StaxError};

/// The mutating action being waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAction {
    /// Stack creation.
    Create,
    /// Stack update.
    Update,
    /// Stack deletion.
    Delete,
}

impl fmt::Display for StackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "deletion"),
        }
    }
}

/// Polls a stack at a fixed interval until it reaches a terminal status.
///
/// A missing stack counts as success while waiting for a deletion.
///
/// # Errors
///
/// Returns `ReconcileError::StackFailed` on a terminal failure status,
/// `RemoteError::StackNotFound` if the stack vanished during any other
/// action, or the gateway error.
pub async fn wait_for_stack(
    gateway: &dyn StackGateway,
    name: &str,
    action: StackAction,
    interval: Duration,
) -> Result<StackStatus> {
    debug!("{name}: waiting for {action}");

    loop {
        let status = match gateway.describe_stack(name).await {
            Ok(live) => live.status,
            Err(e) if e.is_not_found() => {
                if action == StackAction::Delete {
                    info!("{name}: DELETE_COMPLETE (or stack not found)");
                    return Ok(StackStatus::DeleteComplete);
                }
                return Err(StaxError::Remote(RemoteError::not_found(name)));
            }
            Err(e) => return Err(e),
        };

        debug!("{name}: {status}");

        if status.is_terminal_failure() {
            return Err(ReconcileError::StackFailed {
                stack: name.to_string(),
                status: status.to_string(),
            }
            .into());
        }

        if status.is_terminal_success() {
            info!("{name}: {status}");
            return Ok(status);
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudformation::{LiveStack, MockStackGateway};
    use mockall::Sequence;

    fn status(s: StackStatus) -> Result<LiveStack> {
        Ok(LiveStack::new("orders-api", s))
    }

    #[tokio::test]
    async fn test_waits_until_complete() {
        let mut gateway = MockStackGateway::new();
        let mut seq = Sequence::new();
        gateway
            .expect_describe_stack()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| status(StackStatus::CreateInProgress));
        gateway
            .expect_describe_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| status(StackStatus::CreateComplete));

        let result = wait_for_stack(&gateway, "orders-api", StackAction::Create, Duration::ZERO)
            .await
            .expect("stack completes");
        assert_eq!(result, StackStatus::CreateComplete);
    }

    #[tokio::test]
    async fn test_rollback_is_failure() {
        let mut gateway = MockStackGateway::new();
        gateway
            .expect_describe_stack()
            .returning(|_| status(StackStatus::UpdateRollbackComplete));

        let err = wait_for_stack(&gateway, "orders-api", StackAction::Update, Duration::ZERO)
            .await
            .expect_err("rollback");
        assert!(err.to_string().contains("UPDATE_ROLLBACK_COMPLETE"));
    }

    #[tokio::test]
    async fn test_not_found_during_delete_is_success() {
        let mut gateway = MockStackGateway::new();
        gateway
            .expect_describe_stack()
            .returning(|name| Err(RemoteError::not_found(name).into()));

        let result = wait_for_stack(&gateway, "legacy", StackAction::Delete, Duration::ZERO)
            .await
            .expect("deleted");
        assert_eq!(result, StackStatus::DeleteComplete);
    }

    #[tokio::test]
    async fn test_not_found_during_update_is_error() {
        let mut gateway = MockStackGateway::new();
        gateway
            .expect_describe_stack()
            .returning(|name| Err(RemoteError::not_found(name).into()));

        let err = wait_for_stack(&gateway, "orders-api", StackAction::Update, Duration::ZERO)
            .await
            .expect_err("vanished");
        assert!(err.is_not_found());
    }
}

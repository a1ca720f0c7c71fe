//! Changeset age check.

use chrono::{DateTime, Duration, Utc};

use crate::cloudformation::ChangeSet;
use crate::error::{ReconcileError, Result};

/// Returns true once `now - created_at` exceeds the timeout.
#[must_use]
pub fn is_stale(created_at: DateTime<Utc>, timeout_minutes: u32, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(created_at) > Duration::minutes(i64::from(timeout_minutes))
}

/// Refuses a changeset that is older than the timeout. No timeout means any age is accepted.
///
/// # Errors
///
/// Returns `ReconcileError::StaleChangeSet` if the changeset is too old.
pub fn ensure_fresh(change_set: &ChangeSet, timeout_minutes: Option<u32>, now: DateTime<Utc>) -> Result<()> {
    let Some(timeout) = timeout_minutes else {
        return Ok(());
    };

    if is_stale(change_set.created_at, timeout, now) {
        return Err(ReconcileError::StaleChangeSet {
            change_set: change_set.id.clone(),
            age_minutes: now.signed_duration_since(change_set.created_at).num_minutes(),
            timeout_minutes: timeout,
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudformation::ChangeSetStatus;

    fn change_set(created_at: DateTime<Utc>) -> ChangeSet {
        ChangeSet {
            id: String::from("stax-1"),
            stack_name: String::from("orders-api"),
            status: ChangeSetStatus::Ready,
            status_reason: None,
            created_at,
            changes: Vec::new(),
        }
    }

    #[test]
    fn test_boundary() {
        let now = Utc::now();
        let timeout = 30;

        assert!(is_stale(now - Duration::minutes(31), timeout, now));
        assert!(!is_stale(now - Duration::minutes(29), timeout, now));
        assert!(!is_stale(now - Duration::minutes(30), timeout, now));
        assert!(!is_stale(now, timeout, now));
    }

    #[test]
    fn test_ensure_fresh() {
        let now = Utc::now();

        assert!(ensure_fresh(&change_set(now - Duration::minutes(29)), Some(30), now).is_ok());
        assert!(ensure_fresh(&change_set(now - Duration::days(10)), None, now).is_ok());

        let err = ensure_fresh(&change_set(now - Duration::minutes(31)), Some(30), now)
            .expect_err("stale changeset");
        assert!(err.to_string().contains("older than 30 minute(s)"));
        assert!(err.to_string().contains("age: 31"));
    }
}

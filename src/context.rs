//! Runtime settings shared by every component of a run.

use std::time::Duration;

use crate::config::{StaxConfig, DEFAULT_FAST_PATH_THRESHOLD, DEFAULT_POLL_INTERVAL_SECS};
use crate::stack::BuildMetadata;

/// Settings resolved once at start-up and passed by reference.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    /// Changesets older than this many minutes are refused.
    pub changeset_timeout: Option<u32>,
    /// Batches larger than this use the fingerprint fast path.
    pub fast_path_threshold: usize,
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Skip confirmation for create and update.
    pub assume_yes: bool,
    /// Build metadata to tag stacks with, when CI tagging is on.
    pub build: Option<BuildMetadata>,
}

impl Default for ReconcileContext {
    fn default() -> Self {
        Self {
            changeset_timeout: None,
            fast_path_threshold: DEFAULT_FAST_PATH_THRESHOLD,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            assume_yes: false,
            build: None,
        }
    }
}

impl ReconcileContext {
    /// Builds the context from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &StaxConfig) -> Self {
        Self {
            changeset_timeout: config.changeset_timeout(),
            fast_path_threshold: config.engine.fast_path_threshold,
            poll_interval: Duration::from_secs(config.engine.poll_interval_secs),
            build: config.buildkite_enabled().then(BuildMetadata::detect),
            ..Self::default()
        }
    }

    /// Sets unattended mode.
    #[must_use]
    pub const fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the changeset timeout.
    #[must_use]
    pub const fn with_changeset_timeout(mut self, minutes: Option<u32>) -> Self {
        self.changeset_timeout = minutes;
        self
    }

    /// Sets the fast path threshold.
    #[must_use]
    pub const fn with_fast_path_threshold(mut self, threshold: usize) -> Self {
        self.fast_path_threshold = threshold;
        self
    }

    /// Returns true if a batch of `batch_size` stacks should use the fast path.
    #[must_use]
    pub const fn use_fast_path(&self, batch_size: usize, force: bool) -> bool {
        !force && batch_size > self.fast_path_threshold
    }
}

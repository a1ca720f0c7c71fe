//! Configuration specification types for stax.
//!
//! This module defines the structs that map to `stax.json`. Everything a
//! push needs to know about the desired state of a stack is declared here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default fast-path threshold (batch size above which stacks are compared by fingerprint).
pub const DEFAULT_FAST_PATH_THRESHOLD: usize = 20;

/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// The root configuration structure (`stax.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaxConfig {
    /// Named accounts and the profile used to reach each of them.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
    /// Region used when a parameter key names only an account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_region: Option<String>,
    /// Bucket used for templates over the inline limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_bucket: Option<BucketConfig>,
    /// CI integration settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci: Option<CiConfig>,
    /// Engine tuning.
    #[serde(default, skip_serializing_if = "EngineConfig::is_default")]
    pub engine: EngineConfig,
    /// Stack definitions keyed by stack name.
    #[serde(default)]
    pub stacks: BTreeMap<String, StackConfig>,
}

/// An account entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountConfig {
    /// Numeric account id, checked against the caller identity.
    pub id: String,
    /// Credentials profile used for this account.
    pub profile: String,
}

/// Object storage location for large templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketConfig {
    /// Bucket name.
    pub name: String,
    /// Bucket region.
    pub region: String,
    /// Credentials profile used to write to the bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// CI integration settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiConfig {
    /// Maximum changeset age in minutes before execution is refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changeset_timeout: Option<u32>,
    /// Enables build metadata tags when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildkite: Option<serde_json::Value>,
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Batches larger than this use the fingerprint fast path.
    #[serde(default = "default_fast_path_threshold")]
    pub fast_path_threshold: usize,
    /// Seconds between status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// A stack definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackConfig {
    /// Template path; `$name` and `$account` are substituted.
    pub template: String,
    /// Parameters keyed by `region/account` or `account`.
    #[serde(default)]
    pub parameters: BTreeMap<String, KeyValueSource>,
    /// Tags applied to every instance of the stack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<KeyValueSource>,
    /// Bucket override for large templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<BucketConfig>,
    /// Delete the stack instead of reconciling it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub purge: bool,
}

/// Where a parameter or tag mapping comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum KeyValueSource {
    /// Path to a JSON file; an empty path means no values.
    FromFile(String),
    /// Inline mapping.
    FromMapping(BTreeMap<String, serde_json::Value>),
    /// Inline list of key/value pairs.
    FromPairList(Vec<KeyValuePair>),
}

/// A single key/value pair in the provider's list form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyValuePair {
    /// Key.
    #[serde(rename = "Key", alias = "ParameterKey")]
    pub key: String,
    /// Value.
    #[serde(rename = "Value", alias = "ParameterValue")]
    pub value: serde_json::Value,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fast_path_threshold: DEFAULT_FAST_PATH_THRESHOLD,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl EngineConfig {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

impl StaxConfig {
    /// Returns the configured changeset timeout, if any.
    #[must_use]
    pub fn changeset_timeout(&self) -> Option<u32> {
        self.ci.as_ref().and_then(|ci| ci.changeset_timeout)
    }

    /// Returns true if build metadata tags should be added.
    #[must_use]
    pub fn buildkite_enabled(&self) -> bool {
        self.ci.as_ref().is_some_and(|ci| ci.buildkite.is_some())
    }

    /// Looks up an account by name.
    #[must_use]
    pub fn account(&self, name: &str) -> Option<&AccountConfig> {
        self.accounts.get(name)
    }

    /// Returns a sample configuration suitable for `stax generate`.
    #[must_use]
    pub fn sample() -> Self {
        let account = |id: &str, profile: &str| AccountConfig {
            id: id.to_string(),
            profile: profile.to_string(),
        };

        let mut accounts = BTreeMap::new();
        accounts.insert(String::from("development"), account("123", "dev_profile"));
        accounts.insert(String::from("staging"), account("456", "staging_profile"));
        accounts.insert(String::from("production"), account("789", "prod_profile"));

        let mut first_params = BTreeMap::new();
        first_params.insert(
            String::from("development"),
            KeyValueSource::FromFile(String::new()),
        );

        let mut redis = BTreeMap::new();
        redis.insert(
            String::from("REDIS_USERNAME"),
            serde_json::Value::String(String::from("example")),
        );
        let mut second_params = BTreeMap::new();
        second_params.insert(String::from("staging"), KeyValueSource::FromMapping(redis));
        second_params.insert(
            String::from("production"),
            KeyValueSource::FromFile(String::from("my-second-stack-prod.json")),
        );

        let mut stacks = BTreeMap::new();
        stacks.insert(
            String::from("my-first-stack"),
            StackConfig {
                template: String::from("my-first-stack.json"),
                parameters: first_params,
                tags: None,
                bucket: None,
                purge: false,
            },
        );
        stacks.insert(
            String::from("my-second-stack"),
            StackConfig {
                template: String::from("my-second-stack.json"),
                parameters: second_params,
                tags: None,
                bucket: None,
                purge: false,
            },
        );

        Self {
            accounts,
            default_region: Some(String::from("ap-southeast-2")),
            default_bucket: None,
            ci: None,
            engine: EngineConfig::default(),
            stacks,
        }
    }
}

const fn default_fast_path_threshold() -> usize {
    DEFAULT_FAST_PATH_THRESHOLD
}

const fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

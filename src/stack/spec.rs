//! Desired state of a single stack instance.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::Serialize;

use crate::config::{BucketConfig, Fingerprinter};

use super::kv::KeyValues;
use super::tags::{default_tags, BuildMetadata};
use super::template::Template;

/// Identity of a stack: two specs are the same stack iff all three match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StackId {
    /// Account name from the configuration.
    pub account: String,
    /// Region the stack lives in.
    pub region: String,
    /// Stack name.
    pub name: String,
}

/// A locally declared stack.
#[derive(Debug, Clone)]
pub struct StackSpec {
    /// Stack identity.
    pub id: StackId,
    /// Template to deploy.
    pub template: Template,
    /// Parameters to deploy with.
    pub parameters: KeyValues,
    /// User supplied tags, without the defaults.
    pub tags: KeyValues,
    /// Where to upload the template if it is too large to send inline.
    pub bucket: Option<BucketConfig>,
    /// Delete this stack instead of reconciling it.
    pub purge: bool,
    /// Parameter file, when parameters came from one.
    pub parameters_file: Option<PathBuf>,
}

impl StackId {
    /// Creates a new stack identity.
    #[must_use]
    pub fn new(account: impl Into<String>, region: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.region, self.name)
    }
}

impl StackSpec {
    /// Creates a spec with no parameters, tags or bucket.
    #[must_use]
    pub fn new(id: StackId, template: Template) -> Self {
        Self {
            id,
            template,
            parameters: KeyValues::new(),
            tags: KeyValues::new(),
            bucket: None,
            purge: false,
            parameters_file: None,
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: KeyValues) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the user tags.
    #[must_use]
    pub fn with_tags(mut self, tags: KeyValues) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the upload bucket.
    #[must_use]
    pub fn with_bucket(mut self, bucket: Option<BucketConfig>) -> Self {
        self.bucket = bucket;
        self
    }

    /// Sets the purge flag.
    #[must_use]
    pub const fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }

    /// Stack name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Computes the fingerprint of the desired template and parameters.
    #[must_use]
    pub fn fingerprint(&self, hasher: &Fingerprinter) -> String {
        hasher.fingerprint(self.template.as_bytes(), self.parameters.iter())
    }

    /// Returns the tags to submit: user tags overlaid with the defaults.
    #[must_use]
    pub fn desired_tags(&self, fingerprint: &str, build: Option<&BuildMetadata>) -> KeyValues {
        self.tags.merged(&default_tags(fingerprint, build))
    }
}

impl PartialEq for StackSpec {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StackSpec {}

impl Hash for StackSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for StackSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

//! Default tags stamped onto every stack.

use std::process::Command;

use crate::config::FINGERPRINT_TAG;

use super::kv::KeyValues;

/// Build URL used when not running under CI.
const LOCAL_BUILD_URL: &str = "dev";

/// Build metadata attached to stacks when CI tagging is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMetadata {
    /// Commit being deployed.
    pub commit: String,
    /// URL of the build doing the deploy.
    pub build_url: String,
    /// Repository the templates come from.
    pub repo: String,
    /// Person or bot that started the build.
    pub creator: String,
}

impl BuildMetadata {
    /// Reads metadata from the process environment, falling back to git.
    #[must_use]
    pub fn detect() -> Self {
        Self::resolve(|name| std::env::var(name).ok(), run_git)
    }

    /// Resolves metadata from an environment lookup and a git runner.
    pub fn resolve<E, G>(env: E, git: G) -> Self
    where
        E: Fn(&str) -> Option<String>,
        G: Fn(&[&str]) -> Option<String>,
    {
        let or_git = |name: &str, args: &[&str]| {
            env(name).or_else(|| git(args)).unwrap_or_default()
        };

        Self {
            commit: or_git("BUILDKITE_COMMIT", &["rev-parse", "HEAD"]),
            build_url: env("BUILDKITE_BUILD_URL").unwrap_or_else(|| String::from(LOCAL_BUILD_URL)),
            repo: or_git("BUILDKITE_REPO", &["remote", "get-url", "origin"]),
            creator: or_git("BUILDKITE_BUILD_CREATOR", &["config", "user.email"]),
        }
    }

    /// Converts the metadata into tags.
    #[must_use]
    pub fn to_tags(&self) -> KeyValues {
        let mut tags = KeyValues::new();
        tags.insert("BUILDKITE_COMMIT", self.commit.as_str());
        tags.insert("BUILDKITE_BUILD_URL", self.build_url.as_str());
        tags.insert("BUILDKITE_REPO", self.repo.as_str());
        tags.insert("BUILDKITE_BUILD_CREATOR", self.creator.as_str());
        tags
    }
}

/// Builds the default tags for a stack with the given fingerprint.
#[must_use]
pub fn default_tags(fingerprint: &str, build: Option<&BuildMetadata>) -> KeyValues {
    let mut tags = build.map(BuildMetadata::to_tags).unwrap_or_default();
    tags.insert(FINGERPRINT_TAG, fingerprint);
    tags
}

fn run_git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_environment() {
        let meta = BuildMetadata::resolve(
            |name| match name {
                "BUILDKITE_COMMIT" => Some(String::from("abc123")),
                "BUILDKITE_BUILD_URL" => Some(String::from("https://ci/1")),
                _ => None,
            },
            |args| Some(format!("git {}", args.join(" "))),
        );

        assert_eq!(meta.commit, "abc123");
        assert_eq!(meta.build_url, "https://ci/1");
        assert_eq!(meta.repo, "git remote get-url origin");
        assert_eq!(meta.creator, "git config user.email");
    }

    #[test]
    fn test_resolve_without_ci_or_git() {
        let meta = BuildMetadata::resolve(|_| None, |_| None);
        assert_eq!(meta.build_url, "dev");
        assert!(meta.commit.is_empty());
    }

    #[test]
    fn test_default_tags_always_carry_fingerprint() {
        let plain = default_tags("f00d", None);
        assert_eq!(plain.len(), 1);
        assert_eq!(plain.get(FINGERPRINT_TAG), Some("f00d"));

        let meta = BuildMetadata::resolve(|_| None, |_| None);
        let with_ci = default_tags("f00d", Some(&meta));
        assert_eq!(with_ci.len(), 5);
        assert_eq!(with_ci.get("BUILDKITE_BUILD_URL"), Some("dev"));
    }
}

//! Generates local stack definitions from live stacks.
//!
//! Each pulled stack gets a template file and a parameter file under
//! `<account>/<name>/`, and an entry in the configuration keyed by
//! `<region>/<account>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::cloudformation::{LiveStack, StackGateway, StackStatus};
use crate::config::{KeyValueSource, StackConfig, StaxConfig};
use crate::error::{Result, StaxError};
use crate::planner::canonical_json;
use crate::stack::{substitute, KeyValues, StackId, Template};

/// Value the service returns for `NoEcho` parameters.
pub const REDACTED_VALUE: &str = "****";

/// Prefix of stacks owned by stack sets.
const STACK_SET_PREFIX: &str = "StackSet";

/// Default template path for pulled stacks.
const TEMPLATE_PATTERN: &str = "$account/$name/template";

/// What happened to one remote stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "reason", rename_all = "snake_case")]
pub enum PullAction {
    /// Files written and the entry saved.
    Saved,
    /// Left alone.
    Skipped(String),
}

/// Outcome of one remote stack.
#[derive(Debug, Clone, Serialize)]
pub struct PulledStack {
    /// Stack identity.
    pub stack: StackId,
    /// What happened.
    #[serde(flatten)]
    pub action: PullAction,
    /// Parameters whose values were hidden by the service and not written.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redacted: Vec<String>,
}

/// Result of a pull.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PullReport {
    /// Per-stack outcomes.
    pub stacks: Vec<PulledStack>,
}

impl PullReport {
    /// Number of saved stacks.
    #[must_use]
    pub fn saved(&self) -> usize {
        self.stacks.iter().filter(|s| s.action == PullAction::Saved).count()
    }

    /// Appends another report.
    pub fn extend(&mut self, other: Self) {
        self.stacks.extend(other.stacks);
    }
}

/// Pulls live stacks of one account and region into local files.
pub struct Puller<'a> {
    gateway: &'a dyn StackGateway,
    base_dir: PathBuf,
    account: String,
    region: String,
    force: bool,
}

impl<'a> Puller<'a> {
    /// Creates a puller writing below `base_dir`.
    #[must_use]
    pub fn new(
        gateway: &'a dyn StackGateway,
        base_dir: impl Into<PathBuf>,
        account: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            base_dir: base_dir.into(),
            account: account.into(),
            region: region.into(),
            force: false,
        }
    }

    /// Overwrites stacks already defined locally.
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Pulls every live stack, or only those in `names` when it is not empty.
    ///
    /// New entries are added to `config`; the caller saves it.
    ///
    /// # Errors
    ///
    /// Returns an error if the live stacks cannot be listed or a file cannot
    /// be written.
    pub async fn pull(&self, config: &mut StaxConfig, names: &[String]) -> Result<PullReport> {
        info!("Pulling {} in {}", self.account, self.region);

        let live_stacks = self.gateway.describe_stacks().await?;
        let mut report = PullReport::default();

        for live in live_stacks.values() {
            if !names.is_empty() && !names.iter().any(|n| n == &live.name) {
                continue;
            }
            let id = StackId::new(&self.account, &self.region, &live.name);

            if let Some(reason) = self.skip_reason(config, live) {
                info!("Skipping {id}: {reason}");
                report.stacks.push(PulledStack {
                    stack: id,
                    action: PullAction::Skipped(reason),
                    redacted: Vec::new(),
                });
                continue;
            }

            let redacted = self.save(config, live).await?;
            info!("Saved {id}");
            report.stacks.push(PulledStack {
                stack: id,
                action: PullAction::Saved,
                redacted,
            });
        }

        Ok(report)
    }

    fn skip_reason(&self, config: &StaxConfig, live: &LiveStack) -> Option<String> {
        if live.status == StackStatus::ReviewInProgress {
            return Some(format!("{} status", live.status));
        }
        if live.name.starts_with(STACK_SET_PREFIX) {
            return Some(String::from("owned by a stack set"));
        }
        if !self.force && self.is_defined(config, &live.name) {
            return Some(String::from(
                "exists in stax.json, the live stack may differ (use --force to overwrite)",
            ));
        }
        None
    }

    fn is_defined(&self, config: &StaxConfig, name: &str) -> bool {
        let Some(stack) = config.stacks.get(name) else {
            return false;
        };
        let bare_account = config.default_region.as_deref() == Some(self.region.as_str());
        stack.parameters.contains_key(&self.placement())
            || (bare_account && stack.parameters.contains_key(&self.account))
    }

    fn placement(&self) -> String {
        format!("{}/{}", self.region, self.account)
    }

    /// Writes the template and parameter files, then records the entry.
    async fn save(&self, config: &mut StaxConfig, live: &LiveStack) -> Result<Vec<String>> {
        let body = self.gateway.get_template(&live.name).await?;
        let template = Template::from_remote(body);

        let template_pattern = match config.stacks.get(&live.name) {
            Some(existing) => existing.template.clone(),
            None => format!("{TEMPLATE_PATTERN}.{}", template.encoding().extension()),
        };
        let template_path = self
            .base_dir
            .join(substitute(&template_pattern, &live.name, &self.account));
        write_file(&template_path, template.body()).await?;

        let (parameters, redacted) = visible_parameters(&live.parameters);
        for key in &redacted {
            warn!(
                "{}/{}: parameter {key} is NoEcho and was not written",
                self.account, live.name
            );
        }

        let params_file = format!("{}/{}/params.json", self.account, live.name);
        write_file(&self.base_dir.join(&params_file), &canonical_json(&parameters.to_document())?).await?;

        let bare_account = config.default_region.as_deref() == Some(self.region.as_str());
        let entry = config
            .stacks
            .entry(live.name.clone())
            .or_insert_with(|| StackConfig {
                template: template_pattern,
                parameters: BTreeMap::new(),
                tags: None,
                bucket: None,
                purge: false,
            });
        if bare_account {
            entry.parameters.remove(&self.account);
        }
        entry
            .parameters
            .insert(self.placement(), KeyValueSource::FromFile(params_file));

        Ok(redacted)
    }
}

/// Splits out parameters whose values the service hides.
fn visible_parameters(parameters: &KeyValues) -> (KeyValues, Vec<String>) {
    let mut visible = KeyValues::new();
    let mut redacted = Vec::new();
    for (key, value) in parameters.iter() {
        if value == REDACTED_VALUE {
            redacted.push(key.to_string());
        } else {
            visible.insert(key, value);
        }
    }
    (visible, redacted)
}

async fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    debug!("Writing {}", path.display());
    let mut file = fs::File::create(path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}

/// Saves the configuration, replacing the file atomically.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn save_config(config: &StaxConfig, path: &Path) -> Result<()> {
    let mut content = serde_json::to_string_pretty(config)
        .map_err(|e| StaxError::internal(format!("Failed to serialize configuration: {e}")))?;
    content.push('\n');

    let temp_path = path.with_extension("json.tmp");
    write_file(&temp_path, &content).await?;
    fs::rename(&temp_path, path).await?;

    info!("Saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudformation::MockStackGateway;
    use crate::config::ConfigParser;
    use crate::stack::{load_stacks, StackFilter};
    use tempfile::TempDir;

    const JSON_TEMPLATE: &str = r#"{"Resources": {"Queue": {"Type": "AWS::SQS::Queue"}}}"#;
    const YAML_TEMPLATE: &str = "Resources:\n  Topic:\n    Type: AWS::SNS::Topic\n";

    fn live_stacks() -> BTreeMap<String, LiveStack> {
        let mut params = KeyValues::new();
        params.insert("QueueName", "orders");
        params.insert("ApiKey", REDACTED_VALUE);

        let mut stacks = BTreeMap::new();
        stacks.insert(
            String::from("orders-api"),
            LiveStack::new("orders-api", StackStatus::UpdateComplete).with_parameters(params),
        );
        stacks.insert(
            String::from("notifications"),
            LiveStack::new("notifications", StackStatus::CreateComplete),
        );
        stacks.insert(
            String::from("half-made"),
            LiveStack::new("half-made", StackStatus::ReviewInProgress),
        );
        stacks.insert(
            String::from("StackSet-guardrails-1234"),
            LiveStack::new("StackSet-guardrails-1234", StackStatus::CreateComplete),
        );
        stacks
    }

    fn gateway() -> MockStackGateway {
        let mut gateway = MockStackGateway::new();
        gateway.expect_describe_stacks().returning(|| Ok(live_stacks()));
        gateway.expect_get_template().returning(|name| {
            Ok(String::from(if name == "notifications" {
                YAML_TEMPLATE
            } else {
                JSON_TEMPLATE
            }))
        });
        gateway
    }

    fn config() -> StaxConfig {
        ConfigParser::new()
            .parse_json(
                r#"{"accounts": {"dev": {"id": "111111111111", "profile": "dev"}}, "default_region": "ap-southeast-2"}"#,
                None,
            )
            .expect("config parses")
    }

    #[tokio::test]
    async fn test_pull_writes_files_and_entries() {
        let dir = TempDir::new().expect("temp dir");
        let gateway = gateway();
        let mut config = config();

        let report = Puller::new(&gateway, dir.path(), "dev", "ap-southeast-2")
            .pull(&mut config, &[])
            .await
            .expect("pull succeeds");

        assert_eq!(report.saved(), 2);
        assert_eq!(report.stacks.len(), 4);

        let orders = report
            .stacks
            .iter()
            .find(|s| s.stack.name == "orders-api")
            .expect("orders-api reported");
        assert_eq!(orders.redacted, vec![String::from("ApiKey")]);

        assert!(dir.path().join("dev/orders-api/template.json").exists());
        assert!(dir.path().join("dev/notifications/template.yaml").exists());

        let params = KeyValues::from_file(&dir.path().join("dev/orders-api/params.json")).expect("params");
        assert_eq!(params.get("QueueName"), Some("orders"));
        assert_eq!(params.get("ApiKey"), None);

        let entry = &config.stacks["orders-api"];
        assert_eq!(entry.template, "$account/$name/template.json");
        assert_eq!(
            entry.parameters["ap-southeast-2/dev"],
            KeyValueSource::FromFile(String::from("dev/orders-api/params.json"))
        );
        assert!(!config.stacks.contains_key("half-made"));
        assert!(!config.stacks.contains_key("StackSet-guardrails-1234"));

        // The generated definitions load back as stacks.
        let stacks = load_stacks(&config, dir.path(), &StackFilter::default()).expect("stacks load");
        assert_eq!(stacks.len(), 2);
    }

    #[tokio::test]
    async fn test_existing_entry_needs_force() {
        let dir = TempDir::new().expect("temp dir");
        let gateway = gateway();
        let mut config = config();
        let mut params = BTreeMap::new();
        params.insert(String::from("dev"), KeyValueSource::FromFile(String::new()));
        config.stacks.insert(
            String::from("orders-api"),
            StackConfig {
                template: String::from("templates/$name.json"),
                parameters: params,
                tags: None,
                bucket: None,
                purge: false,
            },
        );

        let names = vec![String::from("orders-api")];
        let report = Puller::new(&gateway, dir.path(), "dev", "ap-southeast-2")
            .pull(&mut config, &names)
            .await
            .expect("pull succeeds");
        assert_eq!(report.saved(), 0);
        assert!(matches!(&report.stacks[0].action, PullAction::Skipped(r) if r.contains("--force")));

        let report = Puller::new(&gateway, dir.path(), "dev", "ap-southeast-2")
            .with_force(true)
            .pull(&mut config, &names)
            .await
            .expect("pull succeeds");
        assert_eq!(report.saved(), 1);
        assert!(dir.path().join("templates/orders-api.json").exists());

        let entry = &config.stacks["orders-api"];
        assert!(!entry.parameters.contains_key("dev"));
        assert!(entry.parameters.contains_key("ap-southeast-2/dev"));
    }

    #[tokio::test]
    async fn test_save_config_round_trips() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("stax.json");
        let config = StaxConfig::sample();

        save_config(&config, &path).await.expect("saves");

        let loaded = ConfigParser::new().load_file(&path).expect("loads");
        assert_eq!(loaded.stacks, config.stacks);
        assert!(!dir.path().join("stax.json.tmp").exists());
    }
}

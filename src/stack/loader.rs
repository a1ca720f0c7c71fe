//! Builds stack specs from `stax.json`.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::config::{KeyValueSource, StackConfig, StaxConfig};
use crate::error::{ConfigError, Result, StaxError};

use super::kv::KeyValues;
use super::spec::{StackId, StackSpec};
use super::template::{Template, TemplateEncoding};

/// Selects stacks by account, region and name. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct StackFilter {
    /// Account names to include.
    pub accounts: Vec<String>,
    /// Regions to include.
    pub regions: Vec<String>,
    /// Stack names to include.
    pub names: Vec<String>,
}

impl StackFilter {
    /// Creates a filter.
    #[must_use]
    pub const fn new(accounts: Vec<String>, regions: Vec<String>, names: Vec<String>) -> Self {
        Self {
            accounts,
            regions,
            names,
        }
    }

    /// Returns true if the stack identity passes the filter.
    #[must_use]
    pub fn matches(&self, id: &StackId) -> bool {
        let allowed = |list: &[String], value: &str| list.is_empty() || list.iter().any(|v| v == value);
        allowed(&self.accounts, &id.account)
            && allowed(&self.regions, &id.region)
            && allowed(&self.names, &id.name)
    }
}

/// Loads every stack instance declared in the configuration that passes the filter.
///
/// Relative template and parameter paths resolve against `base_dir`.
///
/// # Errors
///
/// Returns an error if an account is unknown, a region cannot be determined
/// or a referenced file cannot be read.
pub fn load_stacks(config: &StaxConfig, base_dir: &Path, filter: &StackFilter) -> Result<Vec<StackSpec>> {
    let mut stacks = Vec::new();

    for (name, stack) in &config.stacks {
        for (placement, source) in &stack.parameters {
            let id = resolve_placement(config, name, placement)?;
            if !filter.matches(&id) {
                continue;
            }

            if !config.accounts.contains_key(&id.account) {
                return Err(StaxError::Config(ConfigError::UnknownAccount {
                    account: id.account,
                }));
            }

            debug!("Loading stack definition {id}");
            let spec = build_spec(config, stack, id, base_dir)?;
            let spec = StackSpec {
                parameters_file: match source {
                    KeyValueSource::FromFile(path) if !path.trim().is_empty() => {
                        Some(base_dir.join(path))
                    }
                    _ => None,
                },
                parameters: KeyValues::from_source(source, base_dir)?,
                ..spec
            };
            stacks.push(spec);
        }
    }

    Ok(stacks)
}

fn build_spec(config: &StaxConfig, stack: &StackConfig, id: StackId, base_dir: &Path) -> Result<StackSpec> {
    let template_path = base_dir.join(substitute(&stack.template, &id.name, &id.account));

    let template = match Template::from_file(&template_path) {
        Ok(template) => template,
        // A purged stack only needs its identity.
        Err(_) if stack.purge => Template::new("", TemplateEncoding::from_path(&template_path)),
        Err(e) => return Err(e),
    };

    let tags = stack
        .tags
        .as_ref()
        .map(|source| KeyValues::from_source(source, base_dir))
        .transpose()?
        .unwrap_or_default();

    Ok(StackSpec::new(id, template)
        .with_tags(tags)
        .with_bucket(stack.bucket.clone().or_else(|| config.default_bucket.clone()))
        .with_purge(stack.purge))
}

/// Splits a `region/account` or bare `account` parameter key into a stack identity.
fn resolve_placement(config: &StaxConfig, name: &str, placement: &str) -> Result<StackId> {
    if let Some((region, account)) = placement.split_once('/') {
        return Ok(StackId::new(account, region, name));
    }

    let region = config.default_region.as_deref().ok_or_else(|| {
        StaxError::Config(ConfigError::validation(
            format!("Stack {name} uses '{placement}' without a region and no default_region is set"),
            format!("stacks.{name}.parameters.{placement}"),
        ))
    })?;

    Ok(StackId::new(placement, region, name))
}

/// Groups stacks by `(account, region)`, keeping their order within a group.
#[must_use]
pub fn group_by_placement(stacks: &[StackSpec]) -> BTreeMap<(String, String), Vec<StackSpec>> {
    let mut groups: BTreeMap<(String, String), Vec<StackSpec>> = BTreeMap::new();
    for stack in stacks {
        groups
            .entry((stack.id.account.clone(), stack.id.region.clone()))
            .or_default()
            .push(stack.clone());
    }
    groups
}

/// Substitutes `$name`/`${name}` and `$account`/`${account}` in a template path.
#[must_use]
pub fn substitute(path: &str, name: &str, account: &str) -> String {
    path.replace("${name}", name)
        .replace("${account}", account)
        .replace("$name", name)
        .replace("$account", account)
}

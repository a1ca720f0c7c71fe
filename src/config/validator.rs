//! Configuration validation for `stax.json`.
//!
//! This module checks the configuration for mistakes that would otherwise
//! only show up halfway through a push.

use crate::error::{ConfigError, Result, StaxError};
use serde::Serialize;
use tracing::debug;

use super::spec::{StackConfig, StaxConfig};

/// Length of a numeric account id.
const ACCOUNT_ID_LEN: usize = 12;

/// Maximum stack name length accepted by the provisioning service.
const MAX_STACK_NAME_LEN: usize = 128;

/// Validator for `stax.json`.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug, Serialize)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Collects every error and warning in a configuration.
    #[must_use]
    pub fn check(&self, config: &StaxConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_accounts(config, &mut result);
        Self::validate_ci(config, &mut result);
        for (name, stack) in &config.stacks {
            Self::validate_stack(config, name, stack, &mut result);
        }

        result
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, config: &StaxConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.is_valid() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(StaxError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates account entries.
    fn validate_accounts(config: &StaxConfig, result: &mut ValidationResult) {
        if config.accounts.is_empty() && !config.stacks.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("accounts"),
                message: String::from("No accounts configured in stax.json"),
            });
        }

        for (name, account) in &config.accounts {
            if name.is_empty() {
                result.errors.push(ValidationError {
                    field: String::from("accounts"),
                    message: String::from("Account name cannot be empty"),
                });
            }

            if account.profile.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("accounts.{name}.profile"),
                    message: format!("Account '{name}' has no profile"),
                });
            }

            let looks_like_id = account.id.len() == ACCOUNT_ID_LEN
                && account.id.chars().all(|c| c.is_ascii_digit());
            if !looks_like_id {
                result.warnings.push(format!(
                    "Account '{name}' id '{}' is not a {ACCOUNT_ID_LEN}-digit account id",
                    account.id
                ));
            }
        }
    }

    /// Validates CI settings.
    fn validate_ci(config: &StaxConfig, result: &mut ValidationResult) {
        if config.changeset_timeout() == Some(0) {
            result.warnings.push(String::from(
                "ci.changeset_timeout is 0: every changeset will be refused as stale",
            ));
        }

        if config.engine.poll_interval_secs == 0 {
            result.warnings.push(String::from(
                "engine.poll_interval_secs is 0: status polling will not pause between requests",
            ));
        }
    }

    /// Validates one stack definition.
    fn validate_stack(
        config: &StaxConfig,
        name: &str,
        stack: &StackConfig,
        result: &mut ValidationResult,
    ) {
        let prefix = format!("stacks.{name}");

        if !is_valid_stack_name(name) {
            result.errors.push(ValidationError {
                field: prefix.clone(),
                message: format!(
                    "Stack name '{name}' is invalid. Must start with a letter and contain only letters, digits and hyphens."
                ),
            });
        }

        if stack.template.trim().is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.template"),
                message: format!("Stack '{name}' has no template"),
            });
        }

        if stack.parameters.is_empty() {
            result.warnings.push(format!(
                "Stack '{name}' has no parameter entries and will not be deployed anywhere"
            ));
        }

        for placement in stack.parameters.keys() {
            let (region, account) = match placement.split_once('/') {
                Some((region, account)) => (Some(region), account),
                None => (config.default_region.as_deref(), placement.as_str()),
            };

            if !config.accounts.contains_key(account) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.parameters.{placement}"),
                    message: format!("Stack '{name}' references unknown account '{account}'"),
                });
            }

            if region.is_none_or(str::is_empty) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.parameters.{placement}"),
                    message: format!(
                        "Stack '{name}' has no region for '{placement}' and no default_region is set"
                    ),
                });
            }
        }
    }
}

/// Checks a stack name against the provisioning service's naming rules.
fn is_valid_stack_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_STACK_NAME_LEN {
        return false;
    }

    let mut chars = name.chars();

    if let Some(first) = chars.next()
        && !first.is_ascii_alphabetic()
    {
        return false;
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl ValidationResult {
    /// Returns true if validation passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

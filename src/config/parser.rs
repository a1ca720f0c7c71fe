//! Configuration parser for `stax.json`.
//!
//! This module handles loading the stack configuration from disk, layering
//! environment overrides on top and locating the file from a working directory.

use crate::error::{ConfigError, Result, StaxError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::StaxConfig;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "stax.json";

/// Configuration parser for loading `stax.json`.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<StaxConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(StaxError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StaxError::Config(ConfigError::parse(
                format!("Failed to read file: {e}"),
                path.display().to_string(),
            ))
        })?;

        self.parse_json(&content, Some(path))
    }

    /// Parses configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid.
    pub fn parse_json(&self, content: &str, source: Option<&Path>) -> Result<StaxConfig> {
        debug!("Parsing JSON configuration");

        let config: StaxConfig = serde_json::from_str(content).map_err(|e| {
            StaxError::Config(ConfigError::ParseError {
                message: format!("Error decoding {CONFIG_FILE_NAME}: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!(
            "Parsed {} account(s) and {} stack definition(s)",
            config.accounts.len(),
            config.stacks.len()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognised variables: `STAX_DEFAULT_REGION`, `STAX_CHANGESET_TIMEOUT`
    /// and `STAX_FAST_PATH_THRESHOLD`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// is not a number where one is expected.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<StaxConfig> {
        let mut config = self.load_file(path)?;
        apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StaxError::Config(ConfigError::parse(
                    format!("Failed to load .env file: {e}"),
                    env_path.display().to_string(),
                ))
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Applies overrides from a variable lookup to the configuration.
///
/// # Errors
///
/// Returns an error if a numeric override cannot be parsed.
pub fn apply_overrides<F>(config: &mut StaxConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(region) = lookup("STAX_DEFAULT_REGION") {
        debug!("Overriding default_region from environment");
        config.default_region = Some(region);
    }

    if let Some(timeout) = lookup("STAX_CHANGESET_TIMEOUT") {
        debug!("Overriding ci.changeset_timeout from environment");
        let minutes = parse_number::<u32>("STAX_CHANGESET_TIMEOUT", &timeout)?;
        config.ci.get_or_insert_with(Default::default).changeset_timeout = Some(minutes);
    }

    if let Some(threshold) = lookup("STAX_FAST_PATH_THRESHOLD") {
        debug!("Overriding engine.fast_path_threshold from environment");
        config.engine.fast_path_threshold = parse_number("STAX_FAST_PATH_THRESHOLD", &threshold)?;
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        StaxError::Config(ConfigError::validation(
            format!("{name} must be a whole number, got '{value}'"),
            name,
        ))
    })
}

/// Finds `stax.json` in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            info!("Found configuration file: {}", config_path.display());
            return Ok(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    Err(StaxError::Config(ConfigError::FileNotFound {
        path: start.join(CONFIG_FILE_NAME),
    }))
}

//! Configuration module for stax.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `stax.json`
//! - Environment overrides and validation
//! - Computing stack fingerprints for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::{Fingerprinter, FINGERPRINT_TAG};
pub use parser::{apply_overrides, find_config_file, ConfigParser, CONFIG_FILE_NAME};
pub use spec::{
    AccountConfig, BucketConfig, CiConfig, EngineConfig, KeyValuePair, KeyValueSource,
    StackConfig, StaxConfig, DEFAULT_FAST_PATH_THRESHOLD, DEFAULT_POLL_INTERVAL_SECS,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};

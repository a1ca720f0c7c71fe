//! Canonical key/value mappings for parameters and tags.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{KeyValuePair, KeyValueSource};
use crate::error::{ConfigError, Result, StaxError};

/// A sorted mapping of unique keys to string values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeyValues(BTreeMap<String, String>);

impl KeyValues {
    /// Creates an empty mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Resolves a configured source, reading files relative to `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced file cannot be read or parsed.
    pub fn from_source(source: &KeyValueSource, base_dir: &Path) -> Result<Self> {
        match source {
            KeyValueSource::FromFile(path) if path.trim().is_empty() => Ok(Self::new()),
            KeyValueSource::FromFile(path) => Self::from_file(&base_dir.join(path)),
            KeyValueSource::FromMapping(map) => Self::from_mapping(map),
            KeyValueSource::FromPairList(pairs) => Self::from_pairs(pairs),
        }
    }

    /// Builds a mapping from JSON values, stringifying scalars.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is an object or array.
    pub fn from_mapping(map: &BTreeMap<String, serde_json::Value>) -> Result<Self> {
        map.iter()
            .map(|(key, value)| Ok((key.clone(), scalar_to_string(key, value)?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Self)
    }

    /// Builds a mapping from a list of pairs. A repeated key keeps its last value.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is an object or array.
    pub fn from_pairs(pairs: &[KeyValuePair]) -> Result<Self> {
        let mut values = BTreeMap::new();
        for pair in pairs {
            values.insert(pair.key.clone(), scalar_to_string(&pair.key, &pair.value)?);
        }
        Ok(Self(values))
    }

    /// Reads a JSON file holding either a mapping or a list of pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or has another shape.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StaxError::Config(ConfigError::parse(
                format!("Failed to read key/value file: {e}"),
                path.display().to_string(),
            ))
        })?;

        let source: KeyValueSource = serde_json::from_str(&content).map_err(|e| {
            StaxError::Config(ConfigError::parse(
                format!("Expected a JSON object or list of pairs: {e}"),
                path.display().to_string(),
            ))
        })?;

        match source {
            KeyValueSource::FromMapping(map) => Self::from_mapping(&map),
            KeyValueSource::FromPairList(pairs) => Self::from_pairs(&pairs),
            KeyValueSource::FromFile(_) => Err(StaxError::Config(ConfigError::parse(
                "Expected a JSON object or list of pairs, found a string",
                path.display().to_string(),
            ))),
        }
    }

    /// Returns the value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Returns a copy with `other` layered on top; `other` wins on conflicts.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut values = self.0.clone();
        values.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(values)
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts to the provider's list form.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<KeyValuePair> {
        self.0
            .iter()
            .map(|(key, value)| KeyValuePair {
                key: key.clone(),
                value: serde_json::Value::String(value.clone()),
            })
            .collect()
    }

    /// Converts to a JSON document with sorted keys.
    #[must_use]
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

impl FromIterator<(String, String)> for KeyValues {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn scalar_to_string(key: &str, value: &serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            Err(StaxError::Config(ConfigError::validation(
                format!("Value for '{key}' must be a string, number or boolean"),
                key,
            )))
        }
    }
}

//! Stack templates and their encodings.
//!
//! A template keeps the exact bytes it was loaded with (those are what get
//! submitted and fingerprinted) together with an encoding that is decided
//! once, when the template is created.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, PlanError, Result, StaxError};

/// Serialization format of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateEncoding {
    /// JSON document.
    Json,
    /// YAML document.
    Yaml,
}

/// A stack template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Raw template text, exactly as loaded.
    body: String,
    /// Encoding decided at load time.
    encoding: TemplateEncoding,
    /// File the template was read from, if any.
    source: Option<PathBuf>,
}

impl TemplateEncoding {
    /// Picks an encoding from a file extension. Unknown extensions are YAML.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }

    /// Returns the conventional file extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

impl Template {
    /// Creates a template from text with a known encoding.
    #[must_use]
    pub fn new(body: impl Into<String>, encoding: TemplateEncoding) -> Self {
        Self {
            body: body.into(),
            encoding,
            source: None,
        }
    }

    /// Creates a template from a body returned by the remote service.
    ///
    /// The service echoes templates back in either format, so the body is
    /// tried as JSON exactly once here and the answer is kept.
    #[must_use]
    pub fn from_remote(body: impl Into<String>) -> Self {
        let body = body.into();
        let encoding = if serde_json::from_str::<serde_json::Value>(&body).is_ok() {
            TemplateEncoding::Json
        } else {
            TemplateEncoding::Yaml
        };
        Self::new(body, encoding)
    }

    /// Reads a template file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path).map_err(|e| {
            StaxError::Config(ConfigError::parse(
                format!("Failed to read template: {e}"),
                path.display().to_string(),
            ))
        })?;

        Ok(Self {
            body,
            encoding: TemplateEncoding::from_path(path),
            source: Some(path.to_path_buf()),
        })
    }

    /// Returns the raw template text.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Returns the raw template bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.body.as_bytes()
    }

    /// Returns the size of the template in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Returns true if the template is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Returns the template encoding.
    #[must_use]
    pub const fn encoding(&self) -> TemplateEncoding {
        self.encoding
    }

    /// Returns the file the template was read from.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Parses the template into a JSON value according to its encoding.
    ///
    /// YAML short-form intrinsic functions (`!Ref Queue`) become single-key
    /// mappings (`{"!Ref": "Queue"}`).
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid for its encoding.
    pub fn document(&self) -> Result<serde_json::Value> {
        match self.encoding {
            TemplateEncoding::Json => serde_json::from_str(&self.body).map_err(|e| self.invalid(&e)),
            TemplateEncoding::Yaml => serde_yaml::from_str::<serde_yaml::Value>(&self.body)
                .map(yaml_to_json)
                .map_err(|e| self.invalid(&e)),
        }
    }

    fn invalid(&self, error: &dyn std::fmt::Display) -> StaxError {
        let stack = self
            .source
            .as_ref()
            .map_or_else(|| String::from("<inline>"), |p| p.display().to_string());
        StaxError::Plan(PlanError::InvalidTemplate {
            stack,
            message: error.to_string(),
        })
    }
}

/// Converts a YAML value into JSON, keeping tags as single-key mappings.
#[must_use]
pub fn yaml_to_json(value: serde_yaml::Value) -> serde_json::Value {
    use serde_json::Value as Json;
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Json::Null,
        Yaml::Bool(b) => Json::Bool(b),
        Yaml::Number(n) => n
            .as_i64()
            .map(Json::from)
            .or_else(|| n.as_u64().map(Json::from))
            .or_else(|| n.as_f64().and_then(serde_json::Number::from_f64).map(Json::Number))
            .unwrap_or_else(|| Json::String(n.to_string())),
        Yaml::String(s) => Json::String(s),
        Yaml::Sequence(items) => Json::Array(items.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(map) => Json::Object(
            map.into_iter()
                .map(|(k, v)| (yaml_key(k), yaml_to_json(v)))
                .collect(),
        ),
        Yaml::Tagged(tagged) => {
            let serde_yaml::value::TaggedValue { tag, value } = *tagged;
            let mut object = serde_json::Map::new();
            object.insert(tag.to_string(), yaml_to_json(value));
            Json::Object(object)
        }
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encoding_from_path() {
        assert_eq!(TemplateEncoding::from_path(Path::new("a/b.json")), TemplateEncoding::Json);
        assert_eq!(TemplateEncoding::from_path(Path::new("a/b.JSON")), TemplateEncoding::Json);
        assert_eq!(TemplateEncoding::from_path(Path::new("a/b.yaml")), TemplateEncoding::Yaml);
        assert_eq!(TemplateEncoding::from_path(Path::new("a/b.template")), TemplateEncoding::Yaml);
    }

    #[test]
    fn test_from_remote_decides_once() {
        assert_eq!(Template::from_remote("{\"Resources\": {}}").encoding(), TemplateEncoding::Json);
        assert_eq!(Template::from_remote("Resources: {}\n").encoding(), TemplateEncoding::Yaml);
    }

    #[test]
    fn test_from_file_keeps_exact_bytes() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("orders.json");
        let body = "{\n  \"Resources\": {}\n}\n";
        std::fs::write(&path, body).expect("write");

        let template = Template::from_file(&path).expect("template loads");
        assert_eq!(template.body(), body);
        assert_eq!(template.len(), body.len());
        assert_eq!(template.source(), Some(path.as_path()));
    }

    #[test]
    fn test_yaml_document_keeps_short_form_functions() {
        let template = Template::new(
            "Resources:\n  Queue:\n    Type: AWS::SQS::Queue\n    Properties:\n      QueueName: !Ref Name\n",
            TemplateEncoding::Yaml,
        );

        let doc = template.document().expect("yaml parses");
        assert_eq!(
            doc["Resources"]["Queue"]["Properties"]["QueueName"],
            serde_json::json!({"!Ref": "Name"})
        );
        assert_eq!(doc["Resources"]["Queue"]["Type"], "AWS::SQS::Queue");
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let template = Template::new("{", TemplateEncoding::Json);
        assert!(matches!(
            template.document(),
            Err(StaxError::Plan(PlanError::InvalidTemplate { .. }))
        ));
    }
}

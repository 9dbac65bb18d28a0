//! Step configuration.
//!
//! A [`CoalesceConfig`] is an ordered list of [`OutputSpec`]s plus the global
//! empty-string option. It is built once before a run and only read while
//! rows are processed.
//!
//! Three persisted forms are supported:
//!
//! - JSON documents, checked against the embedded configuration schema
//! - XML step fragments ([`xml`])
//! - Repository attribute triples ([`attributes`])

pub mod attributes;
pub mod xml;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::models::ValueType;
use crate::validation::validate_config_document;

/// Number of candidate slots an output spec gets by default.
pub const DEFAULT_CANDIDATE_SLOTS: usize = 3;

/// Environment variable overriding [`CoalesceConfig::empty_is_null`].
pub const EMPTY_IS_NULL_ENV: &str = "COALESCE_EMPTY_IS_NULL";

/// One output field and the input fields it is coalesced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Name of the field added to the row.
    #[serde(rename = "output_field")]
    pub output_name: String,

    /// Input fields tested in order. Empty slots are unused.
    #[serde(rename = "input_fields")]
    pub candidates: Vec<String>,

    /// Type of the output field, `None` to infer it from the candidates.
    #[serde(default)]
    pub value_type: ValueType,

    /// Remove the candidate fields from the outgoing rows.
    #[serde(default)]
    pub remove: bool,
}

impl OutputSpec {
    /// Create a spec with the given candidates, padded to the default slot count.
    pub fn new<S: AsRef<str>>(output_name: impl Into<String>, candidates: &[S]) -> Self {
        let mut candidates: Vec<String> =
            candidates.iter().map(|c| c.as_ref().to_string()).collect();
        while candidates.len() < DEFAULT_CANDIDATE_SLOTS {
            candidates.push(String::new());
        }
        Self {
            output_name: output_name.into(),
            candidates,
            value_type: ValueType::None,
            remove: false,
        }
    }

    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn removing_inputs(mut self, remove: bool) -> Self {
        self.remove = remove;
        self
    }

    /// The configured (non-empty) candidate names, in order.
    pub fn configured_candidates(&self) -> impl Iterator<Item = &str> {
        self.candidates
            .iter()
            .map(String::as_str)
            .filter(|c| !c.is_empty())
    }
}

/// Complete configuration of a Coalesce step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalesceConfig {
    /// Treat empty strings as nulls when selecting a value.
    #[serde(default = "default_empty_is_null")]
    pub empty_is_null: bool,

    /// Output specs, in the order their fields are appended.
    #[serde(default)]
    pub fields: Vec<OutputSpec>,
}

fn default_empty_is_null() -> bool {
    true
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self {
            empty_is_null: default_empty_is_null(),
            fields: Vec::new(),
        }
    }
}

impl CoalesceConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, spec: OutputSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn with_empty_is_null(mut self, empty_is_null: bool) -> Self {
        self.empty_is_null = empty_is_null;
        self
    }

    /// Check the configuration on its own, without any row schema.
    ///
    /// Output names must be present and unique, and every spec needs at
    /// least one candidate slot.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for (i, spec) in self.fields.iter().enumerate() {
            if spec.output_name.trim().is_empty() {
                return Err(ConfigError::EmptyOutputName(i + 1));
            }
            if spec.candidates.is_empty() {
                return Err(ConfigError::NoCandidates(spec.output_name.clone()));
            }
            if !seen.insert(spec.output_name.to_lowercase()) {
                return Err(ConfigError::DuplicateOutput(spec.output_name.clone()));
            }
        }
        Ok(())
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Parse a configuration from a JSON value, checking it against the schema first.
    pub fn from_value(value: &JsonValue) -> ConfigResult<Self> {
        validate_config_document(value).map_err(|errors| ConfigError::InvalidDocument { errors })?;
        let config: Self = serde_json::from_value(value.clone())?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a pretty JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a configuration file. `.xml` files are read as step XML, anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        if is_xml_path(path) {
            let config = xml::from_xml(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Self::from_json(&content)
        }
    }

    /// Save a configuration file, picking the format from the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = if is_xml_path(path) {
            xml::to_xml(self)?
        } else {
            self.to_json()?
        };
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply the [`EMPTY_IS_NULL_ENV`] override, if set.
    pub fn apply_env(&mut self) {
        if let Some(flag) = std::env::var(EMPTY_IS_NULL_ENV).ok().and_then(|v| parse_flag(&v)) {
            self.empty_is_null = flag;
        }
    }

    /// Every non-empty candidate name, across all specs.
    pub fn candidate_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for spec in &self.fields {
            for c in spec.configured_candidates() {
                if !names.iter().any(|n| n.eq_ignore_ascii_case(c)) {
                    names.push(c.to_string());
                }
            }
        }
        names
    }
}

fn is_xml_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
}

/// Parse a host-style boolean flag (`Y`/`N`, `true`/`false`, `1`/`0`).
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Some(true),
        "n" | "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Example configuration: one output coalescing three phone fields.
pub fn example_config() -> CoalesceConfig {
    CoalesceConfig::new()
        .with_output(
            OutputSpec::new("phone", &["home_phone", "work_phone", "mobile_phone"])
                .removing_inputs(true),
        )
        .with_output(
            OutputSpec::new("temperature", &["morning", "noon", "evening"])
                .with_type(ValueType::Number),
        )
}

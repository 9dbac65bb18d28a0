//! Repository attribute format.
//!
//! A repository stores step settings as `(nr, key, value)` triples. Each
//! output spec `i` is written under `nr = i` with the same keys as the XML
//! fragment; the global `empty_is_null` flag lives at `nr = 0`. The number
//! of output specs is the number of `output_field` attributes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::xml::{
    flag, input_field_index, input_field_key, TAG_EMPTY_IS_NULL, TAG_OUTPUT_FIELD, TAG_REMOVE,
    TAG_VALUE_TYPE,
};
use super::{parse_flag, CoalesceConfig, OutputSpec, DEFAULT_CANDIDATE_SLOTS};
use crate::error::ConfigResult;
use crate::models::ValueType;

/// Attribute storage of one step in a repository.
pub trait StepAttributes {
    fn set_attribute(&mut self, nr: usize, key: &str, value: &str);

    fn attribute(&self, nr: usize, key: &str) -> Option<&str>;

    /// Number of attributes stored under `key`.
    fn count_attributes(&self, key: &str) -> usize;

    /// Keys stored at position `nr`.
    fn keys_at(&self, nr: usize) -> Vec<&str>;
}

/// A single stored attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAttribute {
    pub nr: usize,
    pub key: String,
    pub value: String,
}

/// In-memory attribute store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryAttributes {
    values: BTreeMap<(usize, String), String>,
}

impl MemoryAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// All attributes, ordered by position then key.
    pub fn to_vec(&self) -> Vec<StepAttribute> {
        self.values
            .iter()
            .map(|((nr, key), value)| StepAttribute {
                nr: *nr,
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }

    pub fn from_vec(attributes: Vec<StepAttribute>) -> Self {
        let mut store = Self::new();
        for a in attributes {
            store.set_attribute(a.nr, &a.key, &a.value);
        }
        store
    }
}

impl StepAttributes for MemoryAttributes {
    fn set_attribute(&mut self, nr: usize, key: &str, value: &str) {
        self.values.insert((nr, key.to_string()), value.to_string());
    }

    fn attribute(&self, nr: usize, key: &str) -> Option<&str> {
        self.values.get(&(nr, key.to_string())).map(String::as_str)
    }

    fn count_attributes(&self, key: &str) -> usize {
        self.values.keys().filter(|(_, k)| k == key).count()
    }

    fn keys_at(&self, nr: usize) -> Vec<&str> {
        self.values
            .keys()
            .filter(|(n, _)| *n == nr)
            .map(|(_, k)| k.as_str())
            .collect()
    }
}

/// Write a configuration into an attribute store.
pub fn save_attributes<A: StepAttributes>(config: &CoalesceConfig, store: &mut A) -> ConfigResult<()> {
    store.set_attribute(0, TAG_EMPTY_IS_NULL, flag(config.empty_is_null));

    for (nr, spec) in config.fields.iter().enumerate() {
        store.set_attribute(nr, TAG_OUTPUT_FIELD, &spec.output_name);
        store.set_attribute(nr, TAG_VALUE_TYPE, spec.value_type.as_str());
        store.set_attribute(nr, TAG_REMOVE, flag(spec.remove));
        for (slot, candidate) in spec.candidates.iter().enumerate() {
            store.set_attribute(nr, &input_field_key(slot)?, candidate);
        }
    }
    Ok(())
}

/// Read a configuration from an attribute store.
pub fn load_attributes<A: StepAttributes>(store: &A) -> ConfigResult<CoalesceConfig> {
    let mut config = CoalesceConfig::new();
    if let Some(flag) = store.attribute(0, TAG_EMPTY_IS_NULL).and_then(parse_flag) {
        config.empty_is_null = flag;
    }

    let count = store.count_attributes(TAG_OUTPUT_FIELD);
    for nr in 0..count {
        let slots = store
            .keys_at(nr)
            .into_iter()
            .filter_map(input_field_index)
            .max()
            .map_or(0, |last| last + 1)
            .max(DEFAULT_CANDIDATE_SLOTS);

        let mut candidates = Vec::with_capacity(slots);
        for slot in 0..slots {
            let key = input_field_key(slot)?;
            candidates.push(store.attribute(nr, &key).unwrap_or("").to_string());
        }

        config.fields.push(OutputSpec {
            output_name: store.attribute(nr, TAG_OUTPUT_FIELD).unwrap_or("").to_string(),
            candidates,
            value_type: store
                .attribute(nr, TAG_VALUE_TYPE)
                .unwrap_or("")
                .parse::<ValueType>()?,
            remove: store
                .attribute(nr, TAG_REMOVE)
                .and_then(parse_flag)
                .unwrap_or(false),
        });
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::example_config;

    #[test]
    fn test_save_layout() {
        let config = example_config().with_empty_is_null(false);
        let mut store = MemoryAttributes::new();
        save_attributes(&config, &mut store).unwrap();

        assert_eq!(store.attribute(0, "empty_is_null"), Some("N"));
        assert_eq!(store.attribute(0, "output_field"), Some("phone"));
        assert_eq!(store.attribute(0, "remove"), Some("Y"));
        assert_eq!(store.attribute(1, "value_type"), Some("Number"));
        assert_eq!(store.attribute(1, "input_field_b"), Some("noon"));
        assert_eq!(store.count_attributes("output_field"), 2);
    }

    #[test]
    fn test_load_matches_saved() {
        let config = example_config();
        let mut store = MemoryAttributes::new();
        save_attributes(&config, &mut store).unwrap();

        let restored = MemoryAttributes::from_vec(store.to_vec());
        assert_eq!(load_attributes(&restored).unwrap(), config);
    }

    #[test]
    fn test_load_sparse_store() {
        let mut store = MemoryAttributes::new();
        store.set_attribute(0, "output_field", "out");
        store.set_attribute(0, "input_field_b", "b");

        let config = load_attributes(&store).unwrap();
        assert!(config.empty_is_null);
        assert_eq!(config.fields[0].candidates, vec!["", "b", ""]);
        assert_eq!(config.fields[0].value_type, ValueType::None);
    }
}

//! JSON Schema validation for configuration documents.
//!
//! Configuration documents are checked against an embedded JSON Schema
//! (Draft 7) before they are deserialized, so that a malformed document is
//! reported with every offending path at once instead of the first serde
//! error.
//!
//! # Embedded Schema
//!
//! Embedded at compile time from `schemas/coalesce-config.json`.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use coalesce::validation::is_valid_config_document;
//!
//! let doc = json!({
//!     "fields": [{ "output_field": "phone", "input_fields": ["home", "work", ""] }]
//! });
//! assert!(is_valid_config_document(&doc));
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

static CONFIG_SCHEMA_SOURCE: &str = include_str!("../../schemas/coalesce-config.json");

static CONFIG_SCHEMA: Lazy<Result<Value, String>> = Lazy::new(|| {
    serde_json::from_str(CONFIG_SCHEMA_SOURCE).map_err(|e| format!("Invalid embedded schema: {}", e))
});

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every error if invalid
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use coalesce::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["name"],
///     "properties": {
///         "name": { "type": "string" }
///     }
/// });
///
/// assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
/// assert!(validate(&schema, &json!({ "age": 42 })).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Simpler variant: just true/false.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate a configuration document against the embedded schema.
pub fn validate_config_document(data: &Value) -> Result<(), Vec<String>> {
    let schema = CONFIG_SCHEMA.as_ref().map_err(|e| vec![e.clone()])?;
    validate(schema, data)
}

/// Quick check against the configuration schema.
pub fn is_valid_config_document(data: &Value) -> bool {
    validate_config_document(data).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_document() {
        let doc = json!({
            "empty_is_null": false,
            "fields": [{
                "output_field": "temperature",
                "input_fields": ["morning", "noon", "evening"],
                "value_type": "Number",
                "remove": true
            }]
        });
        assert!(is_valid_config_document(&doc));
    }

    #[test]
    fn test_missing_input_fields() {
        let doc = json!({ "fields": [{ "output_field": "out" }] });
        assert!(!is_valid_config_document(&doc));
    }

    #[test]
    fn test_unknown_type() {
        let doc = json!({
            "fields": [{ "output_field": "out", "input_fields": ["a"], "value_type": "Money" }]
        });
        assert!(!is_valid_config_document(&doc));
    }

    #[test]
    fn test_errors_are_collected() {
        let doc = json!({
            "empty_is_null": "yes",
            "fields": [{ "output_field": "", "input_fields": [] }]
        });
        let errors = validate_config_document(&doc).unwrap_err();
        assert!(errors.len() >= 3, "{:?}", errors);
    }

    #[test]
    fn test_generic_validate() {
        let schema = json!({ "type": "object", "required": ["name"] });
        assert!(validate(&schema, &json!({ "name": "x" })).is_ok());
        assert!(!is_valid(&schema, &json!({})));
    }
}

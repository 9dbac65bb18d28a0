//! Error types for the Coalesce step.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`StepError`] - Fatal errors of a row-processing run
//! - [`ConfigError`] - Configuration loading and validation errors
//! - [`RegistryError`] - Configuration registry errors
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP adapter errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

use crate::models::ValueType;
use crate::parser::CsvError;

// =============================================================================
// Step Errors
// =============================================================================

/// Fatal errors raised while deriving the output schema or processing rows.
///
/// Any of these aborts the current run.
#[derive(Debug, Error)]
pub enum StepError {
    /// An output field name collides with a field already in the schema.
    #[error("Output field '{field}' already exists in the row")]
    SchemaConflict { field: String },

    /// Configured candidate fields are missing from the incoming rows.
    #[error("Fields used by output '{output}' not found in input stream: {}", .fields.join(", "))]
    MissingInStreamField { output: String, fields: Vec<String> },

    /// A selected value could not be converted to the output type.
    #[error("Value '{value}' of type {source_type} is incompatible with {target_type} for output '{output}': {message}")]
    ValueConversion {
        output: String,
        value: String,
        source_type: ValueType,
        target_type: ValueType,
        message: String,
    },

    /// Row width does not match the incoming schema.
    #[error("Row has {actual} values but the input schema has {expected} fields")]
    RowShape { expected: usize, actual: usize },

    /// The row source failed.
    #[error("Row source error: {0}")]
    Source(String),

    /// The row sink failed.
    #[error("Row sink error: {0}")]
    Sink(String),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading, writing or validating a step configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or write a configuration file.
    #[error("Configuration IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("Configuration JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed XML fragment.
    #[error("Unable to read step info from XML: {0}")]
    Xml(String),

    /// Document does not match the configuration schema.
    #[error("Invalid configuration document: {}", .errors.join("; "))]
    InvalidDocument { errors: Vec<String> },

    /// An output spec has no output field name.
    #[error("Output field #{0} has no name")]
    EmptyOutputName(usize),

    /// Two output specs produce the same field.
    #[error("Output field '{0}' is defined more than once")]
    DuplicateOutput(String),

    /// An output spec has no candidate slots at all.
    #[error("Output field '{0}' has no input fields")]
    NoCandidates(String),

    /// Unrecognised value type name.
    #[error("Unknown value type '{0}'")]
    UnknownValueType(String),
}

impl From<quick_xml::Error> for ConfigError {
    fn from(e: quick_xml::Error) -> Self {
        ConfigError::Xml(e.to_string())
    }
}

impl From<crate::models::UnknownValueType> for ConfigError {
    fn from(e: crate::models::UnknownValueType) -> Self {
        ConfigError::UnknownValueType(e.0)
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the configuration registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Stored configuration not found.
    #[error("Configuration not found: {0}")]
    NotFound(String),

    /// Invalid configuration data.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by [`crate::transform::pipeline::coalesce_csv`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Step run error.
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Configuration registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Output writing error.
    #[error("Output error: {0}")]
    Output(String),

    /// No stored configuration could process the input.
    #[error("No compatible configuration for {0}")]
    NoCompatibleConfig(String),
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        PipelineError::Output(e.to_string())
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for step operations.
pub type StepResult<T> = Result<T, StepError>;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // StepError -> PipelineError
        let step_err = StepError::SchemaConflict { field: "out".into() };
        let pipeline_err: PipelineError = step_err.into();
        assert!(pipeline_err.to_string().contains("out"));

        // ConfigError -> RegistryError
        let config_err = ConfigError::DuplicateOutput("phone".into());
        let registry_err: RegistryError = config_err.into();
        assert!(registry_err.to_string().contains("phone"));
    }

    #[test]
    fn test_missing_fields_format() {
        let err = StepError::MissingInStreamField {
            output: "out".into(),
            fields: vec!["home".into(), "work".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("home, work"));
        assert!(msg.contains("'out'"));
    }

    #[test]
    fn test_conversion_error_reports_value_and_types() {
        let err = StepError::ValueConversion {
            output: "temperature".into(),
            value: "warm".into(),
            source_type: ValueType::String,
            target_type: ValueType::Number,
            message: "invalid float literal".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'warm'"));
        assert!(msg.contains("String"));
        assert!(msg.contains("Number"));
    }
}

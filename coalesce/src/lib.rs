//! # Coalesce - first non-null value of candidate fields
//!
//! Coalesce is a row-processing step: for each configured output field it
//! picks the first present value among an ordered list of candidate input
//! fields, converts it to the output type and appends it to the row,
//! optionally dropping the candidate fields.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│    Step     │────▶│  CSV / JSON │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │ (coalescer) │     │   output    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use coalesce::{coalesce_csv, CoalesceConfig, OutputSpec, RunOptions};
//! use std::path::Path;
//!
//! let config = CoalesceConfig::new()
//!     .with_output(OutputSpec::new("phone", &["home", "work", "mobile"]).removing_inputs(true));
//! let result = coalesce_csv(Path::new("contacts.csv"), config, &RunOptions::default()).unwrap();
//! println!("Wrote {} rows", result.stats.lines_written);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Row model (Value, ValueType, RowMeta)
//! - [`convert`] - Value conversion between field types
//! - [`config`] - Step configuration and its JSON, XML and attribute forms
//! - [`validation`] - JSON Schema validation of configuration documents
//! - [`parser`] - CSV parsing with auto-detection
//! - [`transform`] - Schema derivation, row selection, step and pipeline
//! - [`cache`] - Configuration registry
//! - [`logs`] - Step log broadcaster
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;
pub mod convert;

// Configuration
pub mod config;
pub mod validation;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Registry
pub mod cache;

// Logging
pub mod logs;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    PipelineError,
    RegistryError,
    ServerError,
    StepError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Row,
    RowMeta,
    Value,
    ValueMeta,
    ValueType,
};

// =============================================================================
// Re-exports - Conversion
// =============================================================================

pub use convert::{ConversionError, HostConverter, ValueConverter};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{
    example_config,
    CoalesceConfig,
    OutputSpec,
};
pub use config::attributes::{load_attributes, save_attributes, MemoryAttributes, StepAttributes};
pub use config::xml::{from_xml, to_xml};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    is_valid,
    is_valid_config_document,
    validate,
    validate_config_document,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    parse_bytes_auto,
    parse_csv_file_auto,
    parse_str,
    detect_encoding,
    detect_delimiter,
    decode_content,
    CsvError,
    ParseOptions,
    ParseResult,
};

// =============================================================================
// Re-exports - Step
// =============================================================================

pub use transform::{
    check,
    derive_output_schema,
    CheckKind,
    CheckResult,
    CheckSeverity,
    CoalesceStep,
    CollectingSink,
    CsvRowSink,
    RowCoalescer,
    RowPlan,
    RowSink,
    RowSource,
    RunStats,
    VecRowSource,
};

// =============================================================================
// Re-exports - Registry (Cache)
// =============================================================================

pub use cache::{ConfigRegistry, StoredConfig};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    coalesce_bytes,
    coalesce_csv,
    coalesce_records,
    coalesce_with_registry,
    coalesce_with_stored,
    CsvInfo,
    PipelineResult,
    RunOptions,
};

// =============================================================================
// Re-exports - Logging
// =============================================================================

pub use logs::{log_error, log_info, log_success, log_warning, set_verbosity, LogEntry, LogLevel};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{
    CheckRequest,
    CheckResponse,
    CoalesceResponse,
    CsvMetadata,
    ResponseMetadata,
    error_response,
};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}

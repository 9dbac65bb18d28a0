//! Transformation module.
//!
//! This module handles the coalescing of candidate fields:
//! - Schema: output schema derivation
//! - Selector: per-row value selection and conversion
//! - Check: design-time and run-start validation
//! - Coalescer / Step: the row transformer and its per-run driver
//! - Stream: row sources and sinks
//! - Pipeline: CSV in, coalesced rows out

pub mod check;
pub mod coalescer;
pub mod pipeline;
pub mod schema;
pub mod selector;
pub mod step;
pub mod stream;

pub use check::{check, check_fields_exist_upstream, CheckKind, CheckResult, CheckSeverity};
pub use coalescer::{RowCoalescer, DEFAULT_STEP_NAME};
pub use schema::{derive_output_schema, resolve_output_type};
pub use selector::{is_present, RowPlan};
pub use step::{CoalesceStep, RunStats};
pub use stream::{CollectingSink, CsvRowSink, RowSink, RowSource, VecRowSource};

//! High-level pipeline API: CSV in, coalesced rows out.
//!
//! This module combines parsing, configuration overrides, the step run and
//! output formatting.
//!
//! # Example
//!
//! ```rust,ignore
//! use coalesce::config::CoalesceConfig;
//! use coalesce::transform::pipeline::{coalesce_csv, RunOptions};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CoalesceConfig::load("phones.json")?;
//!     let result = coalesce_csv(Path::new("contacts.csv"), config, &RunOptions::default())?;
//!
//!     println!("Wrote {} rows", result.stats.lines_written);
//!     Ok(())
//! }
//! ```

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::io::Write;
use std::path::Path;

use crate::cache::ConfigRegistry;
use crate::config::CoalesceConfig;
use crate::error::PipelineError;
use crate::logs::{log_error, log_info, log_success, log_warning};
use crate::models::{Row, RowMeta};
use crate::parser::{parse_bytes_auto, parse_csv_file_auto, ParseOptions, ParseResult};

use super::coalescer::{RowCoalescer, DEFAULT_STEP_NAME};
use super::step::{CoalesceStep, RunStats, DEFAULT_FEEDBACK_SIZE};
use super::stream::{rows_to_json, CollectingSink, CsvRowSink, RowSink, VecRowSource};

/// Options for a pipeline run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Step name recorded as the origin of output fields
    pub step_name: String,
    /// How to read the CSV input
    pub parse: ParseOptions,
    /// Overrides the configuration's `empty_is_null`
    pub empty_is_null: Option<bool>,
    /// Rows between progress log lines
    pub feedback_size: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            step_name: DEFAULT_STEP_NAME.to_string(),
            parse: ParseOptions::default(),
            empty_is_null: None,
            feedback_size: DEFAULT_FEEDBACK_SIZE,
        }
    }
}

/// Result of a pipeline run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Schema of the outgoing rows
    pub output_meta: RowMeta,
    /// Outgoing rows
    #[serde(skip)]
    pub rows: Vec<Row>,
    /// Row counters
    pub stats: RunStats,
    /// Registry id of the configuration, if it came from the registry
    pub config_id: Option<String>,
    /// CSV parsing metadata
    pub csv_info: CsvInfo,
}

impl PipelineResult {
    /// Outgoing rows as JSON objects keyed by field name.
    pub fn to_json(&self) -> JsonValue {
        rows_to_json(&self.output_meta, &self.rows)
    }

    /// Write the outgoing rows as CSV. The header is written even without rows.
    pub fn write_csv<W: Write>(&self, writer: W, delimiter: char, typed_header: bool) -> Result<W, PipelineError> {
        let delimiter = u8::try_from(delimiter).unwrap_or(b',');
        let mut sink = CsvRowSink::new(writer, delimiter).with_typed_header(typed_header);
        sink.write_header(&self.output_meta)?;
        for row in &self.rows {
            sink.put_row(&self.output_meta, row.clone())?;
        }
        sink.finish()?;
        Ok(sink.into_inner()?)
    }
}

/// CSV file information
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Coalesce a CSV file.
///
/// 1. Parses the CSV with auto-detection
/// 2. Applies the environment and option overrides to `config`
/// 3. Runs the step over every row
pub fn coalesce_csv(
    path: &Path,
    config: CoalesceConfig,
    options: &RunOptions,
) -> Result<PipelineResult, PipelineError> {
    log_info(format!("📖 Reading {}...", path.display()));
    let parsed = parse_csv_file_auto(path, &options.parse)?;
    coalesce_parsed(parsed, config, options, None)
}

/// Same as [`coalesce_csv`] but accepts raw bytes instead of a file path.
pub fn coalesce_bytes(
    bytes: &[u8],
    config: CoalesceConfig,
    options: &RunOptions,
) -> Result<PipelineResult, PipelineError> {
    let parsed = parse_bytes_auto(bytes, &options.parse)?;
    coalesce_parsed(parsed, config, options, None)
}

/// Coalesce rows that are already in memory.
pub fn coalesce_records(
    meta: RowMeta,
    rows: Vec<Row>,
    config: CoalesceConfig,
    options: &RunOptions,
) -> Result<PipelineResult, PipelineError> {
    let parsed = ParseResult {
        headers: meta.names().into_iter().map(str::to_string).collect(),
        meta,
        rows,
        encoding: "utf-8".to_string(),
        delimiter: ',',
    };
    coalesce_parsed(parsed, config, options, None)
}

/// Coalesce a CSV file with the best matching stored configuration.
///
/// Only configurations whose candidate columns all appear in the CSV header
/// are considered. The best ranked one is run; its outcome updates its
/// statistics and a failed run is returned as is.
pub fn coalesce_with_registry(
    path: &Path,
    registry: &mut ConfigRegistry,
    options: &RunOptions,
) -> Result<PipelineResult, PipelineError> {
    log_info(format!("📖 Reading {}...", path.display()));
    let parsed = parse_csv_file_auto(path, &options.parse)?;

    log_info("Looking for compatible stored configurations...");
    let compatible = registry.find_compatible(&parsed.headers);
    let Some(best) = compatible.first() else {
        log_warning("No compatible configurations found");
        return Err(PipelineError::NoCompatibleConfig(path.display().to_string()));
    };
    log_success(format!(
        "Found {} compatible configuration(s), using \"{}\"",
        compatible.len(),
        best.name
    ));

    let id = best.id.clone();
    run_stored(parsed, registry, &id, options)
}

/// Coalesce a CSV file with the stored configuration `id`.
pub fn coalesce_with_stored(
    path: &Path,
    registry: &mut ConfigRegistry,
    id: &str,
    options: &RunOptions,
) -> Result<PipelineResult, PipelineError> {
    registry.get(id)?;
    log_info(format!("📖 Reading {}...", path.display()));
    let parsed = parse_csv_file_auto(path, &options.parse)?;
    run_stored(parsed, registry, id, options)
}

fn run_stored(
    parsed: ParseResult,
    registry: &mut ConfigRegistry,
    id: &str,
    options: &RunOptions,
) -> Result<PipelineResult, PipelineError> {
    let stored = registry.get(id)?;
    log_info(format!("→ Using configuration {} ({})", stored.name, stored.id));
    let config = stored.config.clone();

    let result = coalesce_parsed(parsed, config, options, Some(id.to_string()));
    if let Err(e) = registry.update_stats(id, result.is_ok()) {
        log_warning(format!("Could not update statistics of {}: {}", id, e));
    }
    result
}

/// Apply the environment override, then the explicit option.
pub fn effective_config(mut config: CoalesceConfig, options: &RunOptions) -> CoalesceConfig {
    config.apply_env();
    if let Some(flag) = options.empty_is_null {
        config.empty_is_null = flag;
    }
    config
}

fn coalesce_parsed(
    parsed: ParseResult,
    config: CoalesceConfig,
    options: &RunOptions,
    config_id: Option<String>,
) -> Result<PipelineResult, PipelineError> {
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows", parsed.rows.len()));

    let csv_info = CsvInfo {
        encoding: parsed.encoding.clone(),
        delimiter: parsed.delimiter,
        headers: parsed.headers.clone(),
        row_count: parsed.rows.len(),
    };

    let config = effective_config(config, options);
    let coalescer = RowCoalescer::configure(config)?.named(options.step_name.clone());
    log_info(format!("⚙️  Coalescing into {} output field(s)...", coalescer.config().fields.len()));

    let input_meta = parsed.meta;
    let mut step = CoalesceStep::new(coalescer).with_feedback_size(options.feedback_size);
    let mut source = VecRowSource::new(input_meta.clone(), parsed.rows);
    let mut sink = CollectingSink::new();

    let stats = step.run(&mut source, &mut sink).map_err(|e| {
        log_error(e.to_string());
        e
    })?;

    let output_meta = match sink.meta.take() {
        Some(meta) => meta,
        None => step.coalescer().derive_schema(&input_meta)?,
    };
    log_success(format!("Wrote {} rows", stats.lines_written));

    Ok(PipelineResult {
        output_meta,
        rows: sink.rows,
        stats,
        config_id,
        csv_info,
    })
}

/// Format delimiter for display
fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputSpec;
    use crate::error::StepError;
    use crate::models::{Value, ValueType};
    use serde_json::json;
    use tempfile::tempdir;

    const PHONES: &str = "A;B;C\n248-0532;125-2044;216-9620\n;125-2044;216-9620\n;;216-9620\n;;\n";

    fn phone_config() -> CoalesceConfig {
        CoalesceConfig::new().with_output(OutputSpec::new("out", &["A", "B", "C"]))
    }

    #[test]
    fn test_default_options() {
        let opts = RunOptions::default();
        assert_eq!(opts.step_name, "Coalesce");
        assert_eq!(opts.feedback_size, 50_000);
        assert!(opts.empty_is_null.is_none());
    }

    #[test]
    fn test_coalesce_bytes_phone_numbers() {
        let result = coalesce_bytes(PHONES.as_bytes(), phone_config(), &RunOptions::default()).unwrap();

        assert_eq!(result.output_meta.names(), vec!["A", "B", "C", "out"]);
        let out: Vec<_> = result.rows.iter().map(|r| r[3].clone()).collect();
        assert_eq!(
            out,
            vec![
                Some(Value::from("248-0532")),
                Some(Value::from("125-2044")),
                Some(Value::from("216-9620")),
                None,
            ]
        );
        assert_eq!(result.csv_info.row_count, 4);
        assert_eq!(result.stats.lines_written, 4);
    }

    #[test]
    fn test_empty_string_override() {
        let csv = "A;B\n\"\";x\n";
        let lenient = coalesce_bytes(csv.as_bytes(), phone_config_two(), &RunOptions::default()).unwrap();
        assert_eq!(lenient.rows[0][2], Some(Value::from("x")));

        let options = RunOptions {
            empty_is_null: Some(false),
            ..RunOptions::default()
        };
        let strict = coalesce_bytes(csv.as_bytes(), phone_config_two(), &options).unwrap();
        assert_eq!(strict.rows[0][2], Some(Value::from("")));
    }

    fn phone_config_two() -> CoalesceConfig {
        CoalesceConfig::new().with_output(OutputSpec::new("out", &["A", "B"]))
    }

    #[test]
    fn test_typed_temperatures() {
        let csv = "morning;noon;evening\n1;1;1\n;7.5;9\n;;\n";
        let options = RunOptions {
            parse: ParseOptions {
                delimiter: Some(';'),
                typed_header: true,
            },
            ..RunOptions::default()
        };
        let config = CoalesceConfig::new().with_output(
            OutputSpec::new("temperature", &["morning", "noon", "evening"]).removing_inputs(true),
        );

        let result = coalesce_bytes(csv.as_bytes(), config, &options).unwrap();
        assert_eq!(result.output_meta.get(0).unwrap().value_type, ValueType::Number);
        assert_eq!(result.to_json(), json!([{ "temperature": 7.5 }, { "temperature": null }]));
    }

    #[test]
    fn test_average_temperatures() {
        let csv = "morning,noon,evening\n1,2,1\n10.5,6,8\n,7.5,9\n,,10.5\n,,\n";
        let options = RunOptions {
            parse: ParseOptions {
                delimiter: None,
                typed_header: true,
            },
            ..RunOptions::default()
        };
        let config = CoalesceConfig::new().with_output(
            OutputSpec::new("temperature", &["morning", "noon", "evening"])
                .with_type(ValueType::Number),
        );

        let result = coalesce_bytes(csv.as_bytes(), config, &options).unwrap();
        assert_eq!(result.output_meta.names(), vec!["morning", "noon", "evening", "temperature"]);
        assert_eq!(result.output_meta.get(3).unwrap().value_type, ValueType::Number);
        assert_eq!(
            result.rows[0],
            vec![
                Some(Value::Number(10.5)),
                Some(Value::from("6")),
                Some(Value::Number(8.0)),
                Some(Value::Number(10.5)),
            ]
        );
        let temperatures: Vec<_> = result.rows.iter().map(|r| r[3].clone()).collect();
        assert_eq!(
            temperatures,
            vec![
                Some(Value::Number(10.5)),
                Some(Value::Number(7.5)),
                Some(Value::Number(10.5)),
                None,
            ]
        );
    }

    #[test]
    fn test_missing_field_fails_run() {
        let config = CoalesceConfig::new().with_output(OutputSpec::new("out", &["A", "Z"]));
        match coalesce_bytes(PHONES.as_bytes(), config, &RunOptions::default()) {
            Err(PipelineError::Step(StepError::MissingInStreamField { fields, .. })) => {
                assert_eq!(fields, vec!["Z"]);
            }
            other => panic!("expected MissingInStreamField, got {:?}", other.map(|r| r.stats)),
        }
    }

    #[test]
    fn test_header_only_input_still_has_schema() {
        let result = coalesce_bytes(b"A;B;C\n", phone_config(), &RunOptions::default()).unwrap();
        assert!(result.rows.is_empty());

        let csv = result.write_csv(Vec::new(), ';', false).unwrap();
        assert_eq!(String::from_utf8(csv).unwrap(), "A;B;C;out\n");
    }

    #[test]
    fn test_write_csv() {
        let config = phone_config().with_output(OutputSpec::new("first", &["C"]));
        let result = coalesce_bytes(b"A;B;C\n1;;3\n", config, &RunOptions::default()).unwrap();

        let csv = result.write_csv(Vec::new(), ',', true).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "A,B,C,out,first\nString,String,String,String,String\n1,,3,1,3\n"
        );
    }

    #[test]
    fn test_coalesce_with_registry() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("phones.csv");
        std::fs::write(&csv_path, PHONES).unwrap();

        let mut registry = ConfigRegistry::with_dir(dir.path().join("registry"));
        let id = registry.save(phone_config(), "phones").unwrap();

        let result = coalesce_with_registry(&csv_path, &mut registry, &RunOptions::default()).unwrap();
        assert_eq!(result.config_id.as_deref(), Some(id.as_str()));
        assert_eq!(registry.get(&id).unwrap().use_count, 1);
    }

    #[test]
    fn test_stored_config_with_missing_candidate_fails_run() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("ab.csv");
        std::fs::write(&csv_path, "a,b\n1,2\n").unwrap();

        let mut registry = ConfigRegistry::with_dir(dir.path().join("registry"));
        let config = CoalesceConfig::new().with_output(OutputSpec::new("out", &["a", "b", "zzz"]));
        let id = registry.save(config, "bad").unwrap();

        assert!(matches!(
            coalesce_with_registry(&csv_path, &mut registry, &RunOptions::default()),
            Err(PipelineError::NoCompatibleConfig(_))
        ));

        let err = coalesce_with_stored(&csv_path, &mut registry, &id, &RunOptions::default()).unwrap_err();
        match err {
            PipelineError::Step(StepError::MissingInStreamField { output, fields }) => {
                assert_eq!(output, "out");
                assert_eq!(fields, vec!["zzz".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let stored = registry.get(&id).unwrap();
        assert_eq!(stored.use_count, 1);
        assert!(stored.success_rate < 1.0);
    }

    #[test]
    fn test_registry_run_error_is_not_retried() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("temps.csv");
        std::fs::write(&csv_path, "am;pm\nwarm;\n").unwrap();

        let mut registry = ConfigRegistry::with_dir(dir.path().join("registry"));
        let strict = CoalesceConfig::new()
            .with_output(OutputSpec::new("temp", &["am", "pm"]).with_type(ValueType::Number));
        let lenient = CoalesceConfig::new().with_output(OutputSpec::new("temp", &["am", "pm"]));
        let strict_id = registry.save(strict, "strict").unwrap();
        let lenient_id = registry.save(lenient, "lenient").unwrap();
        registry.update_stats(&lenient_id, false).unwrap();

        let err = coalesce_with_registry(&csv_path, &mut registry, &RunOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Step(StepError::ValueConversion { .. })));
        assert_eq!(registry.get(&strict_id).unwrap().use_count, 1);
        assert_eq!(registry.get(&lenient_id).unwrap().use_count, 1);
    }

    #[test]
    fn test_registry_without_match() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("other.csv");
        std::fs::write(&csv_path, "x;y\n1;2\n").unwrap();

        let mut registry = ConfigRegistry::with_dir(dir.path().join("registry"));
        registry.save(phone_config(), "phones").unwrap();

        assert!(matches!(
            coalesce_with_registry(&csv_path, &mut registry, &RunOptions::default()),
            Err(PipelineError::NoCompatibleConfig(_))
        ));
    }
}

//! REST API types.
//!
//! Every response carries a fresh `jobId` so clients can correlate it with
//! the log entries streamed over SSE.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::ValueMeta;
use crate::transform::check::CheckResult;
use crate::transform::pipeline::PipelineResult;
use crate::transform::step::RunStats;

/// Response sent after a CSV upload has been coalesced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoalesceResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready" or "error"
    pub status: String,

    /// Schema of the outgoing rows
    pub fields: Vec<ValueMeta>,

    /// Outgoing rows as JSON objects
    pub rows: Value,

    /// Metadata about the run
    pub metadata: ResponseMetadata,
}

/// Metadata about a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub stats: RunStats,

    /// Registry id of the configuration, if it came from the registry
    pub config_id: Option<String>,

    pub csv_info: CsvMetadata,
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl From<PipelineResult> for CoalesceResponse {
    fn from(result: PipelineResult) -> Self {
        let rows = result.to_json();
        CoalesceResponse {
            job_id: Uuid::new_v4().to_string(),
            status: "ready".to_string(),
            fields: result.output_meta.fields().to_vec(),
            rows,
            metadata: ResponseMetadata {
                stats: result.stats,
                config_id: result.config_id,
                csv_info: CsvMetadata {
                    encoding: result.csv_info.encoding,
                    delimiter: result.csv_info.delimiter.to_string(),
                    row_count: result.csv_info.row_count,
                    columns: result.csv_info.headers,
                },
            },
        }
    }
}

/// Body of a design-time check request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    /// Configuration document
    pub config: Value,

    /// Schema produced by the upstream steps, if known
    #[serde(default)]
    pub fields: Option<Vec<ValueMeta>>,

    /// Names of the connected upstream steps
    #[serde(default)]
    pub input_steps: Vec<String>,

    #[serde(default)]
    pub step_name: Option<String>,
}

/// Response to a design-time check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub job_id: String,

    /// "ok" when no remark is an error, "error" otherwise
    pub status: String,

    pub remarks: Vec<CheckResult>,

    /// Outgoing schema, when the upstream schema is known and compatible
    pub output_fields: Option<Vec<ValueMeta>>,
}

impl CheckResponse {
    pub fn new(remarks: Vec<CheckResult>, output_fields: Option<Vec<ValueMeta>>) -> Self {
        let status = if remarks.iter().any(CheckResult::is_error) {
            "error"
        } else {
            "ok"
        };
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            remarks,
            output_fields,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "rows": []
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoalesceConfig, OutputSpec};
    use crate::models::{RowMeta, Value as RowValue};
    use crate::transform::pipeline::{coalesce_records, RunOptions};

    #[test]
    fn test_response_from_result() {
        let meta = RowMeta::strings(&["home", "work"]);
        let rows = vec![vec![None, Some(RowValue::from("125-2044"))]];
        let config = CoalesceConfig::new()
            .with_output(OutputSpec::new("phone", &["home", "work"]).removing_inputs(true));
        let result = coalesce_records(meta, rows, config, &RunOptions::default()).unwrap();

        let response = CoalesceResponse::from(result);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "ready");
        assert_eq!(json["fields"][0]["name"], "phone");
        assert_eq!(json["fields"][0]["type"], "String");
        assert_eq!(json["rows"][0]["phone"], "125-2044");
        assert_eq!(json["metadata"]["stats"]["linesWritten"], 1);
        assert!(Uuid::parse_str(&response.job_id).is_ok());
    }

    #[test]
    fn test_check_request_defaults() {
        let request: CheckRequest = serde_json::from_value(json!({
            "config": { "fields": [] }
        }))
        .unwrap();
        assert!(request.fields.is_none());
        assert!(request.input_steps.is_empty());
    }

    #[test]
    fn test_error_response() {
        let body = error_response("boom");
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "boom");
    }
}

//! Upfront validation of a configuration against its incoming schema.
//!
//! [`check`] is the design-time variant: it never fails, it returns remarks.
//! [`check_fields_exist_upstream`] is the run-start variant: it fails the run
//! when a configured candidate is missing from the incoming rows.

use serde::{Deserialize, Serialize};

use crate::config::{CoalesceConfig, OutputSpec};
use crate::error::{StepError, StepResult};
use crate::models::RowMeta;

use super::schema::derive_output_schema;

/// Severity of a check remark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSeverity {
    Ok,
    Error,
}

/// What a check remark is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckKind {
    ReceivingRows,
    NoInputStream,
    FoundUpstreamFields,
    MissingUpstreamField,
    SchemaConflict,
}

/// A single remark produced by [`check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub severity: CheckSeverity,
    pub kind: CheckKind,
    pub message: String,
    pub step: String,
}

impl CheckResult {
    fn ok(kind: CheckKind, message: impl Into<String>, step: &str) -> Self {
        Self {
            severity: CheckSeverity::Ok,
            kind,
            message: message.into(),
            step: step.to_string(),
        }
    }

    fn error(kind: CheckKind, message: impl Into<String>, step: &str) -> Self {
        Self {
            severity: CheckSeverity::Error,
            kind,
            message: message.into(),
            step: step.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == CheckSeverity::Error
    }
}

/// Configured candidates of `spec` that `meta` does not contain.
pub fn missing_candidates(spec: &OutputSpec, meta: &RowMeta) -> Vec<String> {
    spec.configured_candidates()
        .filter(|c| !meta.contains(c))
        .map(str::to_string)
        .collect()
}

/// Design-time check.
///
/// `prev` is the schema produced by the upstream steps, `None` when unknown;
/// `input_steps` names the steps connected to this one.
pub fn check(
    config: &CoalesceConfig,
    step_name: &str,
    prev: Option<&RowMeta>,
    input_steps: &[String],
) -> Vec<CheckResult> {
    let mut remarks = Vec::new();

    if input_steps.is_empty() {
        remarks.push(CheckResult::error(
            CheckKind::NoInputStream,
            "No input received from other steps",
            step_name,
        ));
    } else {
        remarks.push(CheckResult::ok(
            CheckKind::ReceivingRows,
            format!("Step is receiving rows from: {}", input_steps.join(", ")),
            step_name,
        ));
    }

    let Some(prev) = prev else {
        return remarks;
    };

    let first_missing = config.fields.iter().find_map(|spec| {
        let missing = missing_candidates(spec, prev);
        (!missing.is_empty()).then(|| (spec, missing))
    });

    match first_missing {
        Some((spec, missing)) => remarks.push(CheckResult::error(
            CheckKind::MissingUpstreamField,
            format!(
                "Fields used by output '{}' not found in input stream: {}",
                spec.output_name,
                missing.join(", ")
            ),
            step_name,
        )),
        None => remarks.push(CheckResult::ok(
            CheckKind::FoundUpstreamFields,
            "All input fields are found in the input stream",
            step_name,
        )),
    }

    if let Err(e) = derive_output_schema(prev, config, step_name) {
        remarks.push(CheckResult::error(CheckKind::SchemaConflict, e.to_string(), step_name));
    }

    remarks
}

/// Run-start check: every configured candidate must exist in `meta`.
///
/// Fails on the first output spec with missing candidates.
pub fn check_fields_exist_upstream(config: &CoalesceConfig, meta: &RowMeta) -> StepResult<()> {
    for spec in &config.fields {
        let missing = missing_candidates(spec, meta);
        if !missing.is_empty() {
            return Err(StepError::MissingInStreamField {
                output: spec.output_name.clone(),
                fields: missing,
            });
        }
    }
    Ok(())
}

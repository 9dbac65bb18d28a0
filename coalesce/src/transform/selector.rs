//! Row value selection.
//!
//! A [`RowPlan`] is computed once per run from the incoming schema: the
//! outgoing schema, which incoming values are carried forward, and for each
//! output the positions and types of its present candidates. Applying the
//! plan to a row is then a matter of index lookups.

use crate::config::CoalesceConfig;
use crate::convert::ValueConverter;
use crate::error::{StepError, StepResult};
use crate::logs::{log_step, LogLevel};
use crate::models::{Row, RowMeta, Value, ValueType};

use super::schema::derive_output_schema;

/// Whether a value counts as present for coalescing.
pub fn is_present(value: Option<&Value>, empty_is_null: bool) -> bool {
    match value {
        None => false,
        Some(v) => !(empty_is_null && v.is_empty_text()),
    }
}

/// Candidate of one output, resolved against the incoming schema.
#[derive(Debug, Clone, PartialEq)]
struct CandidateSlot {
    index: usize,
    value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq)]
struct OutputSlot {
    name: String,
    target: usize,
    target_type: ValueType,
    candidates: Vec<CandidateSlot>,
}

/// Index mappings between an incoming and an outgoing schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPlan {
    step_name: String,
    input_width: usize,
    output_meta: RowMeta,
    carry: Vec<(usize, usize)>,
    outputs: Vec<OutputSlot>,
    empty_is_null: bool,
}

impl RowPlan {
    /// Build the plan for rows shaped like `input`.
    pub fn new(input: &RowMeta, config: &CoalesceConfig, step_name: &str) -> StepResult<Self> {
        let output_meta = derive_output_schema(input, config, step_name)?;
        let surviving = output_meta.len() - config.fields.len();

        let carry = input
            .fields()
            .iter()
            .enumerate()
            .filter_map(|(i, field)| {
                output_meta
                    .index_of(&field.name)
                    .filter(|&o| o < surviving)
                    .map(|o| (i, o))
            })
            .collect();

        let outputs = config
            .fields
            .iter()
            .enumerate()
            .map(|(n, spec)| {
                let target = surviving + n;
                let candidates = spec
                    .configured_candidates()
                    .filter_map(|c| {
                        input.index_of(c).map(|index| CandidateSlot {
                            index,
                            value_type: input.fields()[index].value_type,
                        })
                    })
                    .collect();
                OutputSlot {
                    name: spec.output_name.clone(),
                    target,
                    target_type: output_meta.fields()[target].value_type,
                    candidates,
                }
            })
            .collect();

        Ok(Self {
            step_name: step_name.to_string(),
            input_width: input.len(),
            output_meta,
            carry,
            outputs,
            empty_is_null: config.empty_is_null,
        })
    }

    pub fn output_meta(&self) -> &RowMeta {
        &self.output_meta
    }

    /// Build the outgoing row for `row`.
    ///
    /// Fails on the first value that cannot be converted to its output type.
    pub fn apply<C: ValueConverter>(&self, row: &[Option<Value>], converter: &C) -> StepResult<Row> {
        if row.len() < self.input_width {
            return Err(StepError::RowShape {
                expected: self.input_width,
                actual: row.len(),
            });
        }

        let mut out: Row = vec![None; self.output_meta.len()];

        for &(from, to) in &self.carry {
            out[to] = row[from].clone();
        }

        for output in &self.outputs {
            out[output.target] = self.coalesce(output, row, converter)?;
        }

        Ok(out)
    }

    fn coalesce<C: ValueConverter>(
        &self,
        output: &OutputSlot,
        row: &[Option<Value>],
        converter: &C,
    ) -> StepResult<Option<Value>> {
        let winner = output
            .candidates
            .iter()
            .find(|c| is_present(row[c.index].as_ref(), self.empty_is_null));

        let Some(slot) = winner else {
            return Ok(None);
        };
        let Some(value) = row[slot.index].as_ref() else {
            return Ok(None);
        };

        converter
            .convert(value, slot.value_type, output.target_type)
            .map_err(|e| {
                log_step(
                    LogLevel::Error,
                    &self.step_name,
                    format!(
                        "Data '{}' of type {} is incompatible with output '{}' of type {}",
                        value, slot.value_type, output.name, output.target_type
                    ),
                );
                StepError::ValueConversion {
                    output: output.name.clone(),
                    value: value.to_string(),
                    source_type: slot.value_type,
                    target_type: output.target_type,
                    message: e.message,
                }
            })
    }
}

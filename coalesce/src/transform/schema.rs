//! Output schema derivation.
//!
//! The outgoing schema is the incoming schema minus the candidate fields of
//! every spec with `remove` set, followed by one field per output spec in
//! configuration order.
//!
//! Removal is always computed against the *incoming* schema, never against a
//! schema already changed by an earlier spec, so two specs sharing a
//! candidate give the same result in any order. Name collisions are checked
//! after removal: an output may take over the name of a candidate it removes.

use crate::config::{CoalesceConfig, OutputSpec};
use crate::error::{StepError, StepResult};
use crate::models::{RowMeta, ValueMeta, ValueType};

/// Resolve the type of the output field produced by `spec`.
///
/// A declared type always wins. Otherwise the candidates present in `input`
/// must all share one type; any disagreement, or no present candidate at
/// all, falls back to `String`.
pub fn resolve_output_type(input: &RowMeta, spec: &OutputSpec) -> ValueType {
    if !spec.value_type.is_none() {
        return spec.value_type;
    }

    let mut common: Option<ValueType> = None;
    for candidate in spec.configured_candidates() {
        let Some(meta) = input.search(candidate) else {
            continue;
        };
        match common {
            None => common = Some(meta.value_type),
            Some(t) if t == meta.value_type => {}
            Some(_) => return ValueType::String,
        }
    }

    match common {
        Some(t) if !t.is_none() => t,
        _ => ValueType::String,
    }
}

/// Names of the incoming fields removed by the configuration, in schema order.
pub fn removed_fields(input: &RowMeta, config: &CoalesceConfig) -> Vec<String> {
    input
        .fields()
        .iter()
        .filter(|field| {
            config.fields.iter().filter(|spec| spec.remove).any(|spec| {
                spec.configured_candidates()
                    .any(|c| c.eq_ignore_ascii_case(&field.name))
            })
        })
        .map(|field| field.name.clone())
        .collect()
}

/// Derive the outgoing schema. `input` is left untouched.
pub fn derive_output_schema(
    input: &RowMeta,
    config: &CoalesceConfig,
    step_name: &str,
) -> StepResult<RowMeta> {
    let mut output = input.clone();
    for name in removed_fields(input, config) {
        output.remove(&name);
    }

    for spec in &config.fields {
        if output.contains(&spec.output_name) {
            return Err(StepError::SchemaConflict {
                field: spec.output_name.clone(),
            });
        }
        let value_type = resolve_output_type(input, spec);
        output.push(ValueMeta::new(&spec.output_name, value_type).with_origin(step_name));
    }

    Ok(output)
}

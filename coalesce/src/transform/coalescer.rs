//! The row coalescer.
//!
//! [`RowCoalescer`] holds a validated configuration and a value converter.
//! It derives the outgoing schema for an incoming one and transforms rows
//! against a [`RowPlan`]. It keeps no per-run state; see
//! [`super::step::CoalesceStep`] for that.
//!
//! # Example
//!
//! ```rust,ignore
//! use coalesce::config::{CoalesceConfig, OutputSpec};
//! use coalesce::models::{RowMeta, Value};
//! use coalesce::transform::RowCoalescer;
//!
//! let config = CoalesceConfig::new()
//!     .with_output(OutputSpec::new("phone", &["home", "work", "mobile"]));
//! let coalescer = RowCoalescer::configure(config)?;
//!
//! let meta = RowMeta::strings(&["home", "work", "mobile"]);
//! let plan = coalescer.plan(&meta)?;
//! let row = coalescer.transform_row(&plan, &[None, Some(Value::from("125-2044")), None])?;
//! ```

use crate::config::CoalesceConfig;
use crate::convert::{HostConverter, ValueConverter};
use crate::error::{ConfigResult, StepResult};
use crate::models::{Row, RowMeta, Value};

use super::check::{check, check_fields_exist_upstream, CheckResult};
use super::schema::derive_output_schema;
use super::selector::RowPlan;

/// Default step name used in schema origins and log entries.
pub const DEFAULT_STEP_NAME: &str = "Coalesce";

/// Coalesces candidate fields into output fields.
#[derive(Debug, Clone)]
pub struct RowCoalescer<C = HostConverter> {
    config: CoalesceConfig,
    converter: C,
    step_name: String,
}

impl RowCoalescer<HostConverter> {
    /// Validate `config` and build a coalescer using the host conversion rules.
    pub fn configure(config: CoalesceConfig) -> ConfigResult<Self> {
        Self::with_converter(config, HostConverter)
    }
}

impl<C: ValueConverter> RowCoalescer<C> {
    /// Validate `config` and build a coalescer with a custom converter.
    pub fn with_converter(config: CoalesceConfig, converter: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            converter,
            step_name: DEFAULT_STEP_NAME.to_string(),
        })
    }

    /// Set the step name recorded as the origin of output fields.
    pub fn named(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = step_name.into();
        self
    }

    pub fn config(&self) -> &CoalesceConfig {
        &self.config
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Outgoing schema for rows shaped like `input`.
    pub fn derive_schema(&self, input: &RowMeta) -> StepResult<RowMeta> {
        derive_output_schema(input, &self.config, &self.step_name)
    }

    /// Fail if a configured candidate is missing from `input`.
    pub fn check_input(&self, input: &RowMeta) -> StepResult<()> {
        check_fields_exist_upstream(&self.config, input)
    }

    /// Precompute the index mappings for rows shaped like `input`.
    pub fn plan(&self, input: &RowMeta) -> StepResult<RowPlan> {
        RowPlan::new(input, &self.config, &self.step_name)
    }

    /// Transform one row. `row` must be aligned with the schema `plan` was built for.
    pub fn transform_row(&self, plan: &RowPlan, row: &[Option<Value>]) -> StepResult<Row> {
        plan.apply(row, &self.converter)
    }

    /// Design-time check against an upstream schema.
    pub fn check(&self, prev: Option<&RowMeta>, input_steps: &[String]) -> Vec<CheckResult> {
        check(&self.config, &self.step_name, prev, input_steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputSpec;
    use crate::convert::ConversionError;
    use crate::error::{ConfigError, StepError};
    use crate::models::ValueType;

    struct RejectAll;

    impl ValueConverter for RejectAll {
        fn convert(
            &self,
            _value: &Value,
            _source: ValueType,
            _target: ValueType,
        ) -> Result<Option<Value>, ConversionError> {
            Err(ConversionError::new("rejected"))
        }
    }

    #[test]
    fn test_configure_validates() {
        let config = CoalesceConfig::new()
            .with_output(OutputSpec::new("out", &["a"]))
            .with_output(OutputSpec::new("out", &["b"]));
        assert!(matches!(
            RowCoalescer::configure(config),
            Err(ConfigError::DuplicateOutput(_))
        ));
    }

    #[test]
    fn test_schema_origin_uses_step_name() {
        let coalescer = RowCoalescer::configure(
            CoalesceConfig::new().with_output(OutputSpec::new("out", &["a"])),
        )
        .unwrap()
        .named("merge phones");

        let schema = coalescer.derive_schema(&RowMeta::strings(&["a"])).unwrap();
        assert_eq!(schema.search("out").unwrap().origin.as_deref(), Some("merge phones"));
    }

    #[test]
    fn test_custom_converter() {
        let config = CoalesceConfig::new()
            .with_output(OutputSpec::new("out", &["a"]).with_type(ValueType::Integer));
        let coalescer = RowCoalescer::with_converter(config, RejectAll).unwrap();
        let plan = coalescer.plan(&RowMeta::strings(&["a"])).unwrap();

        assert!(matches!(
            coalescer.transform_row(&plan, &[Some(Value::from("1"))]),
            Err(StepError::ValueConversion { .. })
        ));
        // nothing present: converter never consulted
        assert_eq!(coalescer.transform_row(&plan, &[None]).unwrap(), vec![None, None]);
    }
}

//! Per-run step driver.
//!
//! [`CoalesceStep`] owns the state of one run: the plan built lazily from the
//! first row's schema and the row counters. Once the plan exists, later rows
//! only go through index lookups and value conversion.

use serde::Serialize;

use crate::convert::{HostConverter, ValueConverter};
use crate::error::StepResult;
use crate::logs::{log_enabled, log_step, LogLevel};
use crate::models::{Row, RowMeta, Value};

use super::coalescer::RowCoalescer;
use super::selector::RowPlan;
use super::stream::{RowSink, RowSource};

/// Rows between two progress log lines.
pub const DEFAULT_FEEDBACK_SIZE: u64 = 50_000;

/// Counters of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub lines_read: u64,
    pub lines_written: u64,
}

/// Drives a [`RowCoalescer`] over a stream of rows.
#[derive(Debug)]
pub struct CoalesceStep<C = HostConverter> {
    coalescer: RowCoalescer<C>,
    plan: Option<RowPlan>,
    stats: RunStats,
    feedback_size: u64,
}

impl<C: ValueConverter> CoalesceStep<C> {
    pub fn new(coalescer: RowCoalescer<C>) -> Self {
        Self {
            coalescer,
            plan: None,
            stats: RunStats::default(),
            feedback_size: DEFAULT_FEEDBACK_SIZE,
        }
    }

    /// Log progress every `rows` rows. `0` disables progress logging.
    pub fn with_feedback_size(mut self, rows: u64) -> Self {
        self.feedback_size = rows;
        self
    }

    pub fn coalescer(&self) -> &RowCoalescer<C> {
        &self.coalescer
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Outgoing schema, once the first row has been processed.
    pub fn output_meta(&self) -> Option<&RowMeta> {
        self.plan.as_ref().map(RowPlan::output_meta)
    }

    /// Forget the plan and counters so the step can start a new run.
    pub fn reset(&mut self) {
        self.plan = None;
        self.stats = RunStats::default();
    }

    /// Transform one row of the current run.
    ///
    /// The first call checks `input_meta` and builds the plan; later calls
    /// reuse it and ignore `input_meta`.
    pub fn process_row(&mut self, input_meta: &RowMeta, row: &[Option<Value>]) -> StepResult<Row> {
        self.stats.lines_read += 1;
        let plan = match self.plan.take() {
            Some(plan) => plan,
            None => self.first_row_plan(input_meta)?,
        };
        let result = self.coalescer.transform_row(&plan, row);
        self.plan = Some(plan);
        let out = result?;

        if log_enabled(LogLevel::Rowlevel) {
            log_step(
                LogLevel::Rowlevel,
                self.coalescer.step_name(),
                format!("Wrote row to next step: {}", format_row(&out)),
            );
        }
        if self.feedback_size > 0 && self.stats.lines_read % self.feedback_size == 0 {
            log_step(
                LogLevel::Info,
                self.coalescer.step_name(),
                format!("Line nr {}", self.stats.lines_read),
            );
        }

        Ok(out)
    }

    /// Count a row handed to the next step.
    fn row_written(&mut self) {
        self.stats.lines_written += 1;
    }

    fn first_row_plan(&self, input_meta: &RowMeta) -> StepResult<RowPlan> {
        self.coalescer.check_input(input_meta)?;
        let plan = self.coalescer.plan(input_meta)?;
        if log_enabled(LogLevel::Debug) {
            log_step(
                LogLevel::Debug,
                self.coalescer.step_name(),
                format!(
                    "Started processing, output fields: {}",
                    plan.output_meta().names().join(", ")
                ),
            );
        }
        Ok(plan)
    }

    /// Pull every row from `source`, transform it and push it to `sink`.
    ///
    /// The first failure stops the run; rows already written stay written.
    pub fn run<S: RowSource, K: RowSink>(&mut self, source: &mut S, sink: &mut K) -> StepResult<RunStats> {
        self.reset();
        let input_meta = source.row_meta().clone();

        while let Some(row) = source.next_row()? {
            let out = self.process_row(&input_meta, &row)?;
            let Some(plan) = &self.plan else {
                break;
            };
            sink.put_row(plan.output_meta(), out)?;
            self.row_written();
        }
        sink.finish()?;

        log_step(
            LogLevel::Success,
            self.coalescer.step_name(),
            format!(
                "Finished processing (I={}, O={})",
                self.stats.lines_read, self.stats.lines_written
            ),
        );
        Ok(self.stats)
    }
}

fn format_row(row: &[Option<Value>]) -> String {
    let values: Vec<String> = row
        .iter()
        .map(|v| v.as_ref().map_or_else(|| "<null>".to_string(), |v| v.to_string()))
        .collect();
    format!("[{}]", values.join(", "))
}

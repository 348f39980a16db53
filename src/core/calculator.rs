//! Calculation orchestrator: partition, evaluate every row within its group,
//! and reassemble the results in original row order.

use super::evaluator::{check, evaluate};
use super::grouper::{partition, Group, GroupView, Grouping};
use crate::config::{CalcOptions, PanelConfig};
use crate::error::{ExpressionError, PanelError, PanelResult};
use crate::formula::Expr;
use crate::types::{CellValue, RowStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, debug_span, field};

/// Outcome for one row: a value (possibly `Absent`) or an evaluation error
pub type RowResult = Result<CellValue, ExpressionError>;

/// An evaluation error attached to the row that raised it
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub position: usize,
    pub error: ExpressionError,
}

/// Results of one run, aligned 1:1 with the input rows
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationOutput {
    results: Vec<RowResult>,
}

impl CalculationOutput {
    pub fn results(&self) -> &[RowResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<RowResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// The value at `position`; `None` if that row failed or does not exist
    pub fn value(&self, position: usize) -> Option<&CellValue> {
        self.results.get(position)?.as_ref().ok()
    }

    pub fn errors(&self) -> Vec<RowError> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(position, r)| {
                r.as_ref().err().map(|error| RowError {
                    position,
                    error: error.clone(),
                })
            })
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(Result::is_err)
    }
}

/// Cooperative cancellation flag, checked before each group
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Evaluates row formulas over a panel configuration
#[derive(Debug, Clone)]
pub struct Calculator<'a> {
    config: &'a PanelConfig,
    options: CalcOptions,
    cancel: Option<CancelToken>,
}

impl<'a> Calculator<'a> {
    #[must_use]
    pub fn new(config: &'a PanelConfig) -> Self {
        Self {
            config,
            options: CalcOptions::default(),
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: CalcOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Evaluate `expr` for every row of `store`.
    ///
    /// A missing group key column is a configuration error and an unknown
    /// column in `expr` is an expression error; both fail the whole run.
    /// Type problems on individual rows are returned per row.
    pub fn run(&self, store: &RowStore, expr: &Expr) -> PanelResult<CalculationOutput> {
        if let Some(key) = self.config.group_key_column.as_deref() {
            if !store.has_column(key) {
                return Err(PanelError::Configuration(format!(
                    "group key column '{}' does not exist",
                    key
                )));
            }
        }
        check(expr, store)?;

        let grouping = partition(store, self.config)?;
        self.run_grouped(store, &grouping, expr)
    }

    /// Evaluate against an existing partition of `store`
    pub(crate) fn run_grouped(
        &self,
        store: &RowStore,
        grouping: &Grouping,
        expr: &Expr,
    ) -> PanelResult<CalculationOutput> {
        if grouping.row_count() != store.len() {
            return Err(PanelError::Configuration(format!(
                "grouping covers {} rows but the table has {}",
                grouping.row_count(),
                store.len()
            )));
        }
        let per_group = self.evaluate_groups(store, grouping, expr)?;

        let mut results: Vec<RowResult> = vec![Ok(CellValue::Absent); store.len()];
        for (group, group_results) in grouping.groups().iter().zip(per_group) {
            for (&position, result) in group.positions().iter().zip(group_results) {
                results[position] = result;
            }
        }

        debug!(
            rows = store.len(),
            groups = grouping.len(),
            parallel = self.options.parallel,
            "formula evaluated"
        );
        Ok(CalculationOutput { results })
    }

    fn evaluate_groups(
        &self,
        store: &RowStore,
        grouping: &Grouping,
        expr: &Expr,
    ) -> PanelResult<Vec<Vec<RowResult>>> {
        #[cfg(feature = "parallel")]
        {
            if self.options.parallel {
                use rayon::prelude::*;
                return grouping
                    .groups()
                    .par_iter()
                    .map(|group| self.evaluate_group(store, group, expr))
                    .collect();
            }
        }

        grouping
            .groups()
            .iter()
            .map(|group| self.evaluate_group(store, group, expr))
            .collect()
    }

    fn evaluate_group(
        &self,
        store: &RowStore,
        group: &Group,
        expr: &Expr,
    ) -> PanelResult<Vec<RowResult>> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(PanelError::Cancelled);
        }

        let _span = debug_span!("group", key = %group.key(), rows = group.len()).entered();
        let view = GroupView::new(store, group);
        let time_column = self.config.time_column.as_deref();
        Ok(group
            .positions()
            .iter()
            .enumerate()
            .map(|(local_index, &position)| {
                let span = debug_span!("row", position, local_index, time = field::Empty);
                if let Some(column) = time_column.filter(|_| !span.is_disabled()) {
                    span.record("time", field::display(store.cell(position, column)));
                }
                let _row = span.enter();
                evaluate(expr, &view, local_index)
            })
            .collect())
    }
}

/// Evaluate `expr` over `store` with default options
pub fn run(store: &RowStore, config: &PanelConfig, expr: &Expr) -> PanelResult<CalculationOutput> {
    Calculator::new(config).run(store, expr)
}

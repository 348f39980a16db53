//! Named variables computed in declaration order
//!
//! Every computed column is appended to a working copy of the row store, so a
//! later formula can reference an earlier one (`ROA` then `ROA(x) - ROA(x-1)`).
//! The input store itself is never modified.

use super::aggregate::aggregate;
use super::calculator::{CalculationOutput, Calculator, CancelToken};
use super::evaluator::check;
use super::grouper::partition;
use crate::config::{CalcOptions, PanelConfig};
use crate::error::{ExpressionError, PanelError, PanelResult};
use crate::formula::{classify, FormulaKind};
use crate::types::{CellValue, RowStore};
use std::collections::HashSet;
use tracing::{info, warn};

/// A named formula
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaDef {
    pub name: String,
    pub kind: FormulaKind,
}

impl FormulaDef {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FormulaKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Parse `expression`, detecting `mean`/`stdev` shorthands
    pub fn parse(name: impl Into<String>, expression: &str) -> Result<Self, ExpressionError> {
        Ok(Self::new(name, classify(expression)?))
    }
}

/// A row-level evaluation error, tagged with the formula that raised it
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaError {
    pub formula: String,
    pub position: usize,
    pub error: ExpressionError,
}

/// Output table (id, time, then every computed variable) and row errors
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub table: RowStore,
    pub errors: Vec<FormulaError>,
}

type Progress<'a> = Box<dyn Fn(usize, usize, &str) + Send + Sync + 'a>;

/// Runs a list of formulas over one panel
pub struct Pipeline<'a> {
    config: &'a PanelConfig,
    options: CalcOptions,
    cancel: Option<CancelToken>,
    progress: Option<Progress<'a>>,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(config: &'a PanelConfig) -> Self {
        Self {
            config,
            options: CalcOptions::default(),
            cancel: None,
            progress: None,
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

    /// Called with `(index, total, name)` before each formula is computed
    #[must_use]
    pub fn with_progress(
        mut self,
        progress: impl Fn(usize, usize, &str) + Send + Sync + 'a,
    ) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Check names, columns and functions without evaluating any row
    pub fn check(&self, store: &RowStore, formulas: &[FormulaDef]) -> PanelResult<()> {
        self.check_panel_columns(store)?;
        check_names(store, formulas)?;

        let mut schema = RowStore::new(store.columns().to_vec());
        for formula in formulas {
            check_formula(&schema, formula)?;
            schema
                .add_column(&formula.name, Vec::new())
                .map_err(PanelError::Configuration)?;
        }
        Ok(())
    }

    /// Compute every formula in order.
    ///
    /// Configuration problems and unknown columns fail the whole run before
    /// any value is produced. Row-level errors are collected and the affected
    /// cells are left `Absent` in the output table.
    pub fn run(&self, store: &RowStore, formulas: &[FormulaDef]) -> PanelResult<PipelineOutput> {
        self.check(store, formulas)?;

        let grouping = partition(store, self.config)?;
        let mut calculator = Calculator::new(self.config).with_options(self.options);
        if let Some(token) = &self.cancel {
            calculator = calculator.with_cancel(token.clone());
        }

        let mut working = store.clone();
        let mut errors = Vec::new();
        let total = formulas.len();

        for (index, formula) in formulas.iter().enumerate() {
            if let Some(progress) = &self.progress {
                progress(index, total, &formula.name);
            }
            info!(formula = %formula.name, index = index + 1, total, "computing variable");

            let values = match &formula.kind {
                FormulaKind::Row(expr) => {
                    check(expr, &working)?;
                    let output = calculator.run_grouped(&working, &grouping, expr)?;
                    collect_row_errors(&formula.name, output, &mut errors)
                }
                FormulaKind::Aggregate {
                    statistic,
                    variable,
                    groups,
                } => aggregate(&working, *statistic, variable, groups)?,
            };

            let blank = values.iter().filter(|v| v.is_absent()).count();
            if !working.is_empty() && blank == working.len() {
                warn!(formula = %formula.name, "every row of the variable is blank");
            }

            working
                .add_column(&formula.name, values)
                .map_err(PanelError::Configuration)?;
        }

        let columns: Vec<String> = self
            .config
            .group_key_column
            .iter()
            .chain(self.config.time_column.iter())
            .cloned()
            .chain(formulas.iter().map(|f| f.name.clone()))
            .collect();

        info!(
            rows = working.len(),
            variables = total,
            errors = errors.len(),
            "pipeline finished"
        );

        Ok(PipelineOutput {
            table: working.select(&columns),
            errors,
        })
    }

    fn check_panel_columns(&self, store: &RowStore) -> PanelResult<()> {
        let configured = [
            ("group key", self.config.group_key_column.as_deref()),
            ("time", self.config.time_column.as_deref()),
        ];
        for (role, column) in configured {
            if let Some(column) = column {
                if !store.has_column(column) {
                    return Err(PanelError::Configuration(format!(
                        "{} column '{}' does not exist",
                        role, column
                    )));
                }
            }
        }
        if let [(_, Some(id)), (_, Some(time))] = configured {
            if id == time {
                return Err(PanelError::Configuration(format!(
                    "'{}' cannot be both the group key and the time column",
                    id
                )));
            }
        }
        Ok(())
    }
}

fn check_names(store: &RowStore, formulas: &[FormulaDef]) -> PanelResult<()> {
    let mut seen = HashSet::new();
    for formula in formulas {
        if formula.name.trim().is_empty() {
            return Err(PanelError::Configuration(
                "formula name must not be empty".to_string(),
            ));
        }
        if store.has_column(&formula.name) {
            return Err(PanelError::Configuration(format!(
                "formula '{}' clashes with an existing data column",
                formula.name
            )));
        }
        if !seen.insert(formula.name.as_str()) {
            return Err(PanelError::Configuration(format!(
                "formula '{}' is defined more than once",
                formula.name
            )));
        }
    }
    Ok(())
}

fn check_formula(schema: &RowStore, formula: &FormulaDef) -> PanelResult<()> {
    match &formula.kind {
        FormulaKind::Row(expr) => check(expr, schema)?,
        FormulaKind::Aggregate {
            variable, groups, ..
        } => {
            if let Some(missing) = std::iter::once(variable)
                .chain(groups)
                .find(|c| !schema.has_column(c))
            {
                return Err(ExpressionError::unknown_column(missing.as_str()).into());
            }
        }
    }
    Ok(())
}

fn collect_row_errors(
    formula: &str,
    output: CalculationOutput,
    errors: &mut Vec<FormulaError>,
) -> Vec<CellValue> {
    output
        .into_results()
        .into_iter()
        .enumerate()
        .map(|(position, result)| {
            result.unwrap_or_else(|error| {
                errors.push(FormulaError {
                    formula: formula.to_string(),
                    position,
                    error,
                });
                CellValue::Absent
            })
        })
        .collect()
}

/// Run `formulas` with default options
pub fn run_formulas(
    store: &RowStore,
    config: &PanelConfig,
    formulas: &[FormulaDef],
) -> PanelResult<PipelineOutput> {
    Pipeline::new(config).run(store, formulas)
}

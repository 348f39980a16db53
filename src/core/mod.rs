//! Core calculation engine: grouping, offset resolution, null-propagating
//! evaluation and the variable pipeline

pub mod aggregate;
pub mod calculator;
pub mod continuity;
pub mod evaluator;
pub mod functions;
pub mod grouper;
pub mod pipeline;
pub mod resolver;

pub use calculator::{run, CalculationOutput, Calculator, CancelToken, RowError, RowResult};
pub use continuity::{check_continuity, Continuity, ContinuityReport, EntityPeriods, PeriodGap};
pub use grouper::{partition, Group, GroupKey, GroupView, Grouping};
pub use pipeline::{run_formulas, FormulaDef, FormulaError, Pipeline, PipelineOutput};

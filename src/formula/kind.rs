//! Formula kinds: row formulas and the `mean`/`stdev` group shorthands

use super::parse_formula;
use super::parser::Expr;
use crate::error::ExpressionError;
use regex::Regex;
use std::fmt;

/// Grouped statistic broadcast back onto every row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    /// Sample standard deviation (n - 1 denominator)
    Stdev,
}

impl Statistic {
    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Stdev => "stdev",
        }
    }
}

/// What a named formula computes
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaKind {
    /// Evaluated per row within its entity group
    Row(Expr),
    /// `mean(variable) by g1, g2` / `stdev(variable) [by g1, ...]`
    Aggregate {
        statistic: Statistic,
        variable: String,
        groups: Vec<String>,
    },
}

impl fmt::Display for FormulaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaKind::Row(expr) => write!(f, "{}", expr),
            FormulaKind::Aggregate {
                statistic,
                variable,
                groups,
            } => {
                write!(f, "{}({})", statistic.name(), variable)?;
                if !groups.is_empty() {
                    write!(f, " by {}", groups.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

fn aggregate_pattern() -> Result<Regex, ExpressionError> {
    Regex::new(r"(?i)^\s*(mean|stdev)\s*\(\s*([^()]+?)\s*\)\s*(?:by\s+(.+?))?\s*$").map_err(|e| {
        ExpressionError::Parse {
            message: format!("Regex error: {}", e),
            position: 0,
        }
    })
}

fn clean_name(raw: &str) -> String {
    raw.trim().trim_matches('`').trim().to_string()
}

/// Split a comma separated group list, dropping empty entries
pub fn split_groups(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(clean_name)
        .filter(|g| !g.is_empty())
        .collect()
}

/// Detect the kind of a formula from its text.
///
/// `mean(...)` requires a `by` clause; `stdev(...)` without one is computed
/// over the whole column. Everything else is parsed as a row formula.
pub fn classify(expression: &str) -> Result<FormulaKind, ExpressionError> {
    if let Some(caps) = aggregate_pattern()?.captures(expression) {
        let statistic = if caps[1].eq_ignore_ascii_case("mean") {
            Statistic::Mean
        } else {
            Statistic::Stdev
        };
        let groups = caps.get(3).map_or_else(Vec::new, |m| split_groups(m.as_str()));

        if statistic == Statistic::Mean && groups.is_empty() {
            return Err(ExpressionError::Parse {
                message: "mean(...) needs a 'by' clause naming its group columns".to_string(),
                position: 0,
            });
        }

        return Ok(FormulaKind::Aggregate {
            statistic,
            variable: clean_name(&caps[2]),
            groups,
        });
    }

    parse_formula(expression).map(FormulaKind::Row)
}

//! Formula language: `Column(x)`, `Column(x-1)`, operators and functions

pub mod kind;
pub mod parser;
pub mod tokenizer;

pub use kind::{classify, split_groups, FormulaKind, Statistic};
pub use parser::{BinaryOp, Expr, UnaryOp};

use crate::error::ExpressionError;

/// Tokenize and parse a formula string into an expression tree
pub fn parse_formula(formula: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenizer::tokenize(formula).map_err(|e| ExpressionError::Parse {
        message: e.message,
        position: e.position,
    })?;
    parser::parse(tokens).map_err(|e| ExpressionError::Parse {
        message: e.message,
        position: e.position,
    })
}

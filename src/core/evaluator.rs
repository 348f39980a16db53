//! Per-row expression evaluation with strict null propagation
//!
//! Any `Absent` operand makes the enclosing operator or function `Absent`,
//! at every depth of the tree. Errors are reserved for formulas that cannot
//! be computed even though all their inputs are present.

use super::functions::Function;
use super::grouper::GroupView;
use super::resolver::resolve;
use crate::error::ExpressionError;
use crate::formula::{BinaryOp, Expr, UnaryOp};
use crate::types::{CellValue, RowStore};
use std::cmp::Ordering;
use tracing::debug;

/// Evaluate `expr` for the row at `local_index` of the viewed group
pub fn evaluate(
    expr: &Expr,
    view: &GroupView<'_>,
    local_index: usize,
) -> Result<CellValue, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Column { name, offset } => {
            if !view.store.has_column(name) {
                return Err(ExpressionError::unknown_column(name));
            }
            Ok(resolve(view, local_index, name, *offset).clone())
        }

        Expr::Unary { op, operand } => {
            let value = evaluate(operand, view, local_index)?;
            evaluate_unary(*op, value)
        }

        Expr::Binary { op, left, right } => {
            let left = evaluate(left, view, local_index)?;
            let right = evaluate(right, view, local_index)?;
            if left.is_absent() || right.is_absent() {
                return Ok(CellValue::Absent);
            }
            evaluate_binary(*op, &left, &right)
        }

        Expr::Call { name, args } => {
            let function = Function::lookup(name)?;
            function.check_arity(args.len())?;

            let values = args
                .iter()
                .map(|arg| evaluate(arg, view, local_index))
                .collect::<Result<Vec<_>, _>>()?;
            if values.iter().any(CellValue::is_absent) {
                return Ok(CellValue::Absent);
            }
            function.apply(&values)
        }
    }
}

/// Static checks that do not depend on any row: every referenced column
/// exists in `store`, every function is known and called with a valid arity.
pub fn check(expr: &Expr, store: &RowStore) -> Result<(), ExpressionError> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Column { name, .. } => {
            if store.has_column(name) {
                Ok(())
            } else {
                Err(ExpressionError::unknown_column(name))
            }
        }
        Expr::Unary { operand, .. } => check(operand, store),
        Expr::Binary { left, right, .. } => {
            check(left, store)?;
            check(right, store)
        }
        Expr::Call { name, args } => {
            Function::lookup(name)?.check_arity(args.len())?;
            args.iter().try_for_each(|arg| check(arg, store))
        }
    }
}

fn evaluate_unary(op: UnaryOp, value: CellValue) -> Result<CellValue, ExpressionError> {
    if value.is_absent() {
        return Ok(CellValue::Absent);
    }
    let symbol = match op {
        UnaryOp::Neg => "-",
        UnaryOp::Plus => "+",
    };
    let n = value
        .as_number()
        .ok_or_else(|| ExpressionError::type_mismatch(symbol, value.type_name(), "Number"))?;
    Ok(match op {
        UnaryOp::Neg => CellValue::number(-n),
        UnaryOp::Plus => CellValue::number(n),
    })
}

/// Apply a binary operator to two concrete values
fn evaluate_binary(
    op: BinaryOp,
    left: &CellValue,
    right: &CellValue,
) -> Result<CellValue, ExpressionError> {
    if op.is_comparison() {
        return compare(op, left, right);
    }

    let mismatch =
        || ExpressionError::type_mismatch(op.symbol(), left.type_name(), right.type_name());
    let l = left.as_number().ok_or_else(mismatch)?;
    let r = right.as_number().ok_or_else(mismatch)?;

    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                debug!(left = l, "division by zero");
                return Ok(CellValue::Absent);
            }
            l / r
        }
        BinaryOp::Pow => l.powf(r),
        _ => unreachable!("comparisons handled above"),
    };

    if !result.is_finite() {
        debug!(op = op.symbol(), l, r, "non-finite result");
    }
    Ok(CellValue::number(result))
}

fn compare(
    op: BinaryOp,
    left: &CellValue,
    right: &CellValue,
) -> Result<CellValue, ExpressionError> {
    let ordering = match (left, right) {
        (CellValue::Text(l), CellValue::Text(r)) => Some(l.cmp(r)),
        (CellValue::Text(_), _) | (_, CellValue::Text(_)) => None,
        _ => match (left.as_number(), right.as_number()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        },
    };

    let result = match (op, ordering) {
        (BinaryOp::Eq, ordering) => ordering == Some(Ordering::Equal),
        (BinaryOp::Ne, ordering) => ordering != Some(Ordering::Equal),
        (_, None) => {
            return Err(ExpressionError::type_mismatch(
                op.symbol(),
                left.type_name(),
                right.type_name(),
            ))
        }
        (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
        (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
        (BinaryOp::Le, Some(o)) => o != Ordering::Greater,
        (BinaryOp::Ge, Some(o)) => o != Ordering::Less,
        _ => unreachable!("arithmetic operators handled by evaluate_binary"),
    };
    Ok(CellValue::Boolean(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelConfig;
    use crate::core::grouper::partition;
    use crate::formula::parse_formula;
    use crate::types::Record;

    fn single_firm(rows: Vec<Record>) -> RowStore {
        RowStore::from_records(Vec::new(), rows)
    }

    fn eval_all(store: &RowStore, formula: &str) -> Vec<Result<CellValue, ExpressionError>> {
        let expr = parse_formula(formula).unwrap();
        let grouping = partition(store, &PanelConfig::new()).unwrap();
        let view = GroupView::new(store, &grouping.groups()[0]);
        (0..view.len()).map(|i| evaluate(&expr, &view, i)).collect()
    }

    fn values(store: &RowStore, formula: &str) -> Vec<CellValue> {
        eval_all(store, formula)
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    fn abc_store() -> RowStore {
        single_firm(vec![
            Record::new().with("A", 1.0).with("B", 2.0).with("C", 3.0),
            Record::new().with("A", 4.0).with("B", CellValue::Absent).with("C", 6.0),
            Record::new().with("A", 7.0).with("B", 8.0).with("C", 9.0),
        ])
    }

    #[test]
    fn test_null_propagates_through_nested_operators() {
        let store = abc_store();
        // row 0: C(x-1) out of bounds; row 1: B absent; row 2: (7 + 8) - 6
        assert_eq!(
            values(&store, "(A(x) + B(x)) - C(x-1)"),
            vec![CellValue::Absent, CellValue::Absent, CellValue::Number(9.0)]
        );
    }

    #[test]
    fn test_null_propagates_through_functions() {
        let store = abc_store();
        assert_eq!(
            values(&store, "IF(A(x) > 0, ROUND(B(x) / 2), 0)"),
            vec![CellValue::Number(1.0), CellValue::Absent, CellValue::Number(4.0)]
        );
        // strict: even the branch not taken invalidates the row
        assert_eq!(values(&store, "IF(FALSE, B(x), 0)")[1], CellValue::Absent);
    }

    #[test]
    fn test_null_literal_is_absent() {
        let store = abc_store();
        assert!(values(&store, "A(x) + NULL").iter().all(CellValue::is_absent));
        assert!(values(&store, "-NULL").iter().all(CellValue::is_absent));
    }

    #[test]
    fn test_literal_is_never_absent() {
        let store = abc_store();
        assert_eq!(values(&store, "42"), vec![CellValue::Number(42.0); 3]);
    }

    #[test]
    fn test_unknown_column_is_error_not_absent() {
        let store = abc_store();
        let results = eval_all(&store, "A(x) + Missing(x-1)");
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(ExpressionError::UnknownColumn { column }) if column == "Missing")));
    }

    #[test]
    fn test_text_arithmetic_is_type_mismatch() {
        let store = single_firm(vec![Record::new().with("Name", "Acme").with("V", 1.0)]);
        let results = eval_all(&store, "Name(x) - V(x)");
        assert!(matches!(
            results[0],
            Err(ExpressionError::TypeMismatch { left: "Text", right: "Number", .. })
        ));
    }

    #[test]
    fn test_absent_wins_over_type_mismatch() {
        let store = single_firm(vec![Record::new().with("Name", "Acme").with("V", 1.0)]);
        let results = eval_all(&store, "Name(x) - V(x-1)");
        assert_eq!(results[0], Ok(CellValue::Absent));
    }

    #[test]
    fn test_division_by_zero_is_absent() {
        let store = single_firm(vec![Record::new().with("A", 1.0).with("Z", 0.0)]);
        assert_eq!(values(&store, "A / Z"), vec![CellValue::Absent]);
    }

    #[test]
    fn test_comparisons() {
        let store = single_firm(vec![Record::new()
            .with("A", 2.0)
            .with("T", "x")
            .with("F", true)]);
        assert_eq!(values(&store, "A == 2")[0], CellValue::Boolean(true));
        assert_eq!(values(&store, "A <> 2")[0], CellValue::Boolean(false));
        assert_eq!(values(&store, "A >= 1")[0], CellValue::Boolean(true));
        assert_eq!(values(&store, "T = \"x\"")[0], CellValue::Boolean(true));
        assert_eq!(values(&store, "T = 1")[0], CellValue::Boolean(false));
        assert_eq!(values(&store, "F = 1")[0], CellValue::Boolean(true));
        assert!(eval_all(&store, "T < 1")[0].is_err());
    }

    #[test]
    fn test_boolean_arithmetic_and_power() {
        let store = single_firm(vec![Record::new().with("F", true).with("A", 3.0)]);
        assert_eq!(values(&store, "F + A")[0], CellValue::Number(4.0));
        assert_eq!(values(&store, "A ** 2")[0], CellValue::Number(9.0));
        assert_eq!(values(&store, "-A ^ 2")[0], CellValue::Number(-9.0));
    }

    #[test]
    fn test_check_reports_static_problems() {
        let store = abc_store();
        assert!(check(&parse_formula("A(x) + B(x-1)").unwrap(), &store).is_ok());
        assert!(matches!(
            check(&parse_formula("A + Q").unwrap(), &store),
            Err(ExpressionError::UnknownColumn { .. })
        ));
        assert!(matches!(
            check(&parse_formula("MEDIAN(A)").unwrap(), &store),
            Err(ExpressionError::UnknownFunction(_))
        ));
        assert!(matches!(
            check(&parse_formula("IF(A, B)").unwrap(), &store),
            Err(ExpressionError::Arity { .. })
        ));
    }
}

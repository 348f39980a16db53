//! Grouped statistics broadcast back onto every row
//!
//! `mean(V) by G1, G2` and `stdev(V) [by G1, ...]`. Rows are grouped on the
//! combination of their group column values; blank group values form a
//! combination of their own. Blank values of `V` are skipped.

use super::grouper::GroupKey;
use crate::error::ExpressionError;
use crate::formula::Statistic;
use crate::types::{CellValue, RowStore};
use std::collections::HashMap;
use tracing::debug;

/// Running mean and variance (Welford)
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    count: usize,
    mean: f64,
    m2: f64,
}

impl Accumulator {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn finish(&self, statistic: Statistic) -> CellValue {
        match statistic {
            Statistic::Mean if self.count >= 1 => CellValue::number(self.mean),
            Statistic::Stdev if self.count >= 2 => {
                CellValue::number((self.m2 / (self.count - 1) as f64).sqrt())
            }
            _ => CellValue::Absent,
        }
    }
}

/// Compute `statistic` of `variable` per combination of `groups`, one value per row
pub fn aggregate(
    store: &RowStore,
    statistic: Statistic,
    variable: &str,
    groups: &[String],
) -> Result<Vec<CellValue>, ExpressionError> {
    for column in std::iter::once(variable).chain(groups.iter().map(String::as_str)) {
        if !store.has_column(column) {
            return Err(ExpressionError::unknown_column(column));
        }
    }

    let keys: Vec<Vec<Option<GroupKey>>> = store
        .rows()
        .iter()
        .map(|record| {
            groups
                .iter()
                .map(|g| GroupKey::from_cell(record.get(g)))
                .collect()
        })
        .collect();

    let mut accumulators: HashMap<&[Option<GroupKey>], Accumulator> = HashMap::new();
    for (record, key) in store.rows().iter().zip(&keys) {
        let acc = accumulators.entry(key.as_slice()).or_default();
        match record.get(variable) {
            CellValue::Absent => {}
            CellValue::Text(_) => {
                return Err(ExpressionError::type_mismatch(
                    statistic.name(),
                    "Text",
                    "Number",
                ))
            }
            value => {
                if let Some(x) = value.as_number() {
                    acc.push(x);
                }
            }
        }
    }

    debug!(
        statistic = statistic.name(),
        variable,
        combinations = accumulators.len(),
        "aggregated"
    );

    Ok(keys
        .iter()
        .map(|key| {
            accumulators
                .get(key.as_slice())
                .map_or(CellValue::Absent, |acc| acc.finish(statistic))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    fn store() -> RowStore {
        let rows = [
            ("Tech", Some(2.0)),
            ("Bank", Some(10.0)),
            ("Tech", Some(4.0)),
            ("Tech", None),
            ("Bank", Some(10.0)),
            ("Retail", Some(5.0)),
        ];
        let records = rows
            .iter()
            .map(|(industry, v)| Record::new().with("Industry", *industry).with("ROA", *v))
            .collect();
        RowStore::from_records(vec!["Industry".to_string(), "ROA".to_string()], records)
    }

    fn numbers(values: &[CellValue]) -> Vec<Option<f64>> {
        values.iter().map(CellValue::as_number).collect()
    }

    #[test]
    fn test_grouped_mean_broadcasts() {
        let result =
            aggregate(&store(), Statistic::Mean, "ROA", &["Industry".to_string()]).unwrap();
        assert_eq!(
            numbers(&result),
            vec![Some(3.0), Some(10.0), Some(3.0), Some(3.0), Some(10.0), Some(5.0)]
        );
    }

    #[test]
    fn test_grouped_stdev_needs_two_values() {
        let result =
            aggregate(&store(), Statistic::Stdev, "ROA", &["Industry".to_string()]).unwrap();
        let tech = result[0].as_number().unwrap();
        assert!((tech - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(result[1], CellValue::Number(0.0));
        // Retail has a single observation
        assert!(result[5].is_absent());
    }

    #[test]
    fn test_ungrouped_stdev() {
        let result = aggregate(&store(), Statistic::Stdev, "ROA", &[]).unwrap();
        // values 2, 10, 4, 10, 5: mean 6.2, sample variance 13.2
        let expected = 13.2f64.sqrt();
        for value in &result {
            assert!((value.as_number().unwrap() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_blank_group_values_form_their_own_group() {
        let records = vec![
            Record::new().with("G", "a").with("V", 1.0),
            Record::new().with("V", 5.0),
            Record::new().with("V", 7.0),
        ];
        let store = RowStore::from_records(vec!["G".to_string(), "V".to_string()], records);
        let result = aggregate(&store, Statistic::Mean, "V", &["G".to_string()]).unwrap();
        assert_eq!(numbers(&result), vec![Some(1.0), Some(6.0), Some(6.0)]);
    }

    #[test]
    fn test_unknown_columns_and_text() {
        assert!(matches!(
            aggregate(&store(), Statistic::Mean, "ROE", &["Industry".to_string()]),
            Err(ExpressionError::UnknownColumn { .. })
        ));
        assert!(matches!(
            aggregate(&store(), Statistic::Mean, "ROA", &["Sector".to_string()]),
            Err(ExpressionError::UnknownColumn { .. })
        ));
        assert!(matches!(
            aggregate(&store(), Statistic::Mean, "Industry", &["Industry".to_string()]),
            Err(ExpressionError::TypeMismatch { .. })
        ));
    }
}

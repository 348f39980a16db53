//! Period continuity per entity
//!
//! `Revenue(x-1)` reads the previous *row* of a firm. That is the previous
//! period only when the firm's periods are consecutive and unique, which is
//! what this report checks.

use super::grouper::{GroupKey, Grouping};
use crate::error::{PanelError, PanelResult};
use crate::loader::merge::compare_cells;
use crate::types::{CellValue, RowStore};
use std::fmt;

/// Two neighbouring periods more than one step apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodGap {
    pub from: i64,
    pub to: i64,
}

impl fmt::Display for PeriodGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Continuity {
    Continuous,
    Gaps(Vec<PeriodGap>),
    /// The entity has no concrete period values
    NoPeriods,
    /// Periods are not all whole numbers, so steps cannot be measured
    Unchecked,
}

/// Periods of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPeriods {
    pub key: GroupKey,
    /// Distinct concrete periods, ascending
    pub periods: Vec<CellValue>,
    /// Periods that appear on more than one row
    pub duplicates: Vec<CellValue>,
    pub continuity: Continuity,
}

impl EntityPeriods {
    pub fn is_continuous(&self) -> bool {
        matches!(self.continuity, Continuity::Continuous | Continuity::Unchecked)
            && self.duplicates.is_empty()
    }

    /// `2019–2022` style span, empty when there are no periods
    pub fn span(&self) -> String {
        match (self.periods.first(), self.periods.last()) {
            (Some(first), Some(last)) if self.periods.len() > 1 => format!("{}–{}", first, last),
            (Some(only), _) => only.to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContinuityReport {
    pub entities: Vec<EntityPeriods>,
}

impl ContinuityReport {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn continuous_count(&self) -> usize {
        self.entities.iter().filter(|e| e.is_continuous()).count()
    }

    pub fn has_gaps(&self) -> bool {
        self.continuous_count() < self.len()
    }
}

/// Check every group of `grouping` for gaps and repeats in `time_column`
pub fn check_continuity(
    store: &RowStore,
    grouping: &Grouping,
    time_column: &str,
) -> PanelResult<ContinuityReport> {
    if !store.has_column(time_column) {
        return Err(PanelError::Configuration(format!(
            "time column '{}' does not exist (available: {})",
            time_column,
            store.columns().join(", ")
        )));
    }

    let entities = grouping
        .groups()
        .iter()
        .map(|group| {
            let mut values: Vec<CellValue> = group
                .positions()
                .iter()
                .map(|&p| store.cell(p, time_column))
                .filter(|v| !v.is_absent())
                .cloned()
                .collect();
            values.sort_by(compare_cells);

            let mut periods: Vec<CellValue> = Vec::with_capacity(values.len());
            let mut duplicates: Vec<CellValue> = Vec::new();
            for value in values {
                if periods.last() == Some(&value) {
                    if duplicates.last() != Some(&value) {
                        duplicates.push(value);
                    }
                } else {
                    periods.push(value);
                }
            }

            let continuity = continuity_of(&periods);
            EntityPeriods {
                key: group.key().clone(),
                periods,
                duplicates,
                continuity,
            }
        })
        .collect();

    Ok(ContinuityReport { entities })
}

fn continuity_of(periods: &[CellValue]) -> Continuity {
    if periods.is_empty() {
        return Continuity::NoPeriods;
    }
    let whole: Option<Vec<i64>> = periods
        .iter()
        .map(|p| match p {
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(*n as i64),
            _ => None,
        })
        .collect();
    let Some(whole) = whole else {
        return Continuity::Unchecked;
    };

    let gaps: Vec<PeriodGap> = whole
        .windows(2)
        .filter(|w| w[1] - w[0] != 1)
        .map(|w| PeriodGap { from: w[0], to: w[1] })
        .collect();
    if gaps.is_empty() {
        Continuity::Continuous
    } else {
        Continuity::Gaps(gaps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelConfig;
    use crate::core::grouper::partition;
    use crate::types::Record;
    use pretty_assertions::assert_eq;

    fn panel(rows: &[(&str, Option<f64>)]) -> RowStore {
        let records = rows
            .iter()
            .map(|(firm, year)| Record::new().with("Firm", *firm).with("Year", *year))
            .collect();
        RowStore::from_records(vec!["Firm".to_string(), "Year".to_string()], records)
    }

    fn report(store: &RowStore) -> ContinuityReport {
        let grouping = partition(store, &PanelConfig::grouped_by("Firm")).unwrap();
        check_continuity(store, &grouping, "Year").unwrap()
    }

    #[test]
    fn test_gaps_are_listed_per_firm() {
        let store = panel(&[
            ("A", Some(2019.0)),
            ("A", Some(2021.0)),
            ("B", Some(2020.0)),
            ("A", Some(2022.0)),
            ("B", Some(2021.0)),
            ("A", Some(2025.0)),
        ]);
        let report = report(&store);
        assert_eq!(report.len(), 2);

        let a = &report.entities[0];
        assert_eq!(a.key, GroupKey::Text("A".to_string()));
        assert_eq!(
            a.continuity,
            Continuity::Gaps(vec![
                PeriodGap { from: 2019, to: 2021 },
                PeriodGap { from: 2022, to: 2025 },
            ])
        );
        assert_eq!(a.span(), "2019–2025");
        assert!(!a.is_continuous());

        assert_eq!(report.entities[1].continuity, Continuity::Continuous);
        assert_eq!(report.continuous_count(), 1);
        assert!(report.has_gaps());
    }

    #[test]
    fn test_unsorted_rows_and_blank_periods() {
        let store = panel(&[("A", Some(2021.0)), ("A", None), ("A", Some(2020.0))]);
        let a = &report(&store).entities[0];
        assert_eq!(a.periods, vec![CellValue::Number(2020.0), CellValue::Number(2021.0)]);
        assert!(a.is_continuous());
    }

    #[test]
    fn test_repeated_period_is_not_continuous() {
        let store = panel(&[("A", Some(2020.0)), ("A", Some(2021.0)), ("A", Some(2021.0))]);
        let a = &report(&store).entities[0];
        assert_eq!(a.continuity, Continuity::Continuous);
        assert_eq!(a.duplicates, vec![CellValue::Number(2021.0)]);
        assert!(!a.is_continuous());
    }

    #[test]
    fn test_firm_without_periods() {
        let store = panel(&[("A", None), ("B", Some(2020.0))]);
        let report = report(&store);
        assert_eq!(report.entities[0].continuity, Continuity::NoPeriods);
        assert_eq!(report.entities[0].span(), "");
        assert_eq!(report.entities[1].span(), "2020");
    }

    #[test]
    fn test_text_periods_are_unchecked() {
        let records = vec![
            Record::new().with("Firm", "A").with("Year", "2020Q1"),
            Record::new().with("Firm", "A").with("Year", "2020Q3"),
        ];
        let store = RowStore::from_records(vec!["Firm".to_string(), "Year".to_string()], records);
        assert_eq!(report(&store).entities[0].continuity, Continuity::Unchecked);
    }

    #[test]
    fn test_missing_time_column() {
        let store = panel(&[("A", Some(2020.0))]);
        let grouping = partition(&store, &PanelConfig::grouped_by("Firm")).unwrap();
        let err = check_continuity(&store, &grouping, "Quarter").unwrap_err();
        assert!(matches!(err, PanelError::Configuration(_)));
    }

    #[test]
    fn test_gap_display() {
        assert_eq!(PeriodGap { from: 2019, to: 2021 }.to_string(), "2019 → 2021");
    }
}

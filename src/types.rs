use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

//==============================================================================
// Cell values
//==============================================================================

/// A single cell: a concrete scalar or `Absent`.
///
/// `Absent` covers blank source cells, offsets that fall outside the group and
/// operands that were themselves absent. Non-finite numbers are never stored as
/// `Number`; [`CellValue::number`] folds them into `Absent`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    #[default]
    Absent,
}

static ABSENT: CellValue = CellValue::Absent;

impl CellValue {
    /// Build a numeric cell, mapping NaN and infinities to `Absent`
    pub fn number(n: f64) -> Self {
        if n.is_finite() {
            CellValue::Number(n)
        } else {
            CellValue::Absent
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// Interpret raw text from a CSV or spreadsheet cell
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Absent;
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            return CellValue::number(n);
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return CellValue::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return CellValue::Boolean(false);
        }
        CellValue::Text(raw.to_string())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, CellValue::Absent)
    }

    /// Numeric view used by arithmetic: booleans count as 1/0, text has none
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(_) | CellValue::Absent => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Number(_) => "Number",
            CellValue::Text(_) => "Text",
            CellValue::Boolean(_) => "Boolean",
            CellValue::Absent => "Absent",
        }
    }

    /// Replace non-finite numbers with `Absent`
    pub fn normalized(self) -> Self {
        match self {
            CellValue::Number(n) => CellValue::number(n),
            other => other,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Absent => Ok(()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Absent, Into::into)
    }
}

//==============================================================================
// Records and the row store
//==============================================================================

/// One input row. Columns missing from the mapping read as `Absent`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: HashMap<String, CellValue>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.values
            .insert(column.into(), value.into().normalized());
    }

    pub fn get(&self, column: &str) -> &CellValue {
        self.values.get(column).unwrap_or(&ABSENT)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Ordered rows plus the ordered schema they share.
///
/// Row positions in `rows` are the records' identities; every calculation
/// result is aligned to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowStore {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl RowStore {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a store from positional rows matching `columns`
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|cells| {
                let mut record = Record::new();
                for (name, cell) in columns.iter().zip(cells) {
                    record.insert(name.clone(), cell);
                }
                record
            })
            .collect();
        Self { columns, rows }
    }

    /// Build a store from records, deriving the schema from their keys.
    /// Columns unseen in `columns` are appended in sorted order per record.
    pub fn from_records(columns: Vec<String>, records: Vec<Record>) -> Self {
        let mut store = Self::new(columns);
        for record in records {
            store.push(record);
        }
        store
    }

    pub fn push(&mut self, record: Record) {
        let mut unseen: Vec<String> = record
            .column_names()
            .filter(|name| !self.has_column(name))
            .map(str::to_string)
            .collect();
        unseen.sort();
        self.columns.extend(unseen);
        self.rows.push(record);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Cell at `position` in `column`; out-of-range positions are `Absent`
    pub fn cell(&self, position: usize, column: &str) -> &CellValue {
        self.rows
            .get(position)
            .map_or(&ABSENT, |record| record.get(column))
    }

    pub fn column_values(&self, column: &str) -> Option<Vec<&CellValue>> {
        if !self.has_column(column) {
            return None;
        }
        Some(self.rows.iter().map(|r| r.get(column)).collect())
    }

    /// Append (or overwrite) a column. `values` must have one entry per row.
    pub fn add_column(&mut self, name: &str, values: Vec<CellValue>) -> Result<(), String> {
        if values.len() != self.rows.len() {
            return Err(format!(
                "Column '{}' has {} rows, expected {} rows",
                name,
                values.len(),
                self.rows.len()
            ));
        }
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
        for (record, value) in self.rows.iter_mut().zip(values) {
            record.insert(name, value);
        }
        Ok(())
    }

    /// Project onto `columns`, keeping row order. Unknown names yield `Absent` cells.
    pub fn select(&self, columns: &[String]) -> RowStore {
        let rows = self
            .rows
            .iter()
            .map(|record| columns.iter().map(|c| record.get(c).clone()).collect())
            .collect();
        RowStore::from_rows(columns.to_vec(), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_normalizes_non_finite() {
        assert_eq!(CellValue::number(f64::NAN), CellValue::Absent);
        assert_eq!(CellValue::number(f64::INFINITY), CellValue::Absent);
        assert_eq!(CellValue::number(2.5), CellValue::Number(2.5));
    }

    #[test]
    fn test_parse_raw_cells() {
        assert_eq!(CellValue::parse(""), CellValue::Absent);
        assert_eq!(CellValue::parse("  "), CellValue::Absent);
        assert_eq!(CellValue::parse("12.5"), CellValue::Number(12.5));
        assert_eq!(CellValue::parse("-3"), CellValue::Number(-3.0));
        assert_eq!(CellValue::parse("NaN"), CellValue::Absent);
        assert_eq!(CellValue::parse("TRUE"), CellValue::Boolean(true));
        assert_eq!(CellValue::parse("Acme"), CellValue::text("Acme"));
    }

    #[test]
    fn test_display() {
        assert_eq!(CellValue::Number(5.0).to_string(), "5");
        assert_eq!(CellValue::Number(-0.25).to_string(), "-0.25");
        assert_eq!(CellValue::Absent.to_string(), "");
        assert_eq!(CellValue::Boolean(false).to_string(), "FALSE");
    }

    #[test]
    fn test_record_missing_column_is_absent() {
        let record = Record::new().with("Revenue", 10.0);
        assert_eq!(record.get("Revenue"), &CellValue::Number(10.0));
        assert_eq!(record.get("Cost"), &CellValue::Absent);
    }

    #[test]
    fn test_push_extends_schema() {
        let mut store = RowStore::new(vec!["Firm".to_string()]);
        store.push(Record::new().with("Firm", "A").with("b", 1.0).with("a", 2.0));
        assert_eq!(store.columns(), &["Firm", "a", "b"]);
    }

    #[test]
    fn test_add_column_checks_length() {
        let mut store = RowStore::from_rows(
            vec!["v".to_string()],
            vec![vec![1.0.into()], vec![2.0.into()]],
        );
        assert!(store.add_column("w", vec![CellValue::Absent]).is_err());
        store
            .add_column("w", vec![3.0.into(), CellValue::Absent])
            .unwrap();
        assert_eq!(store.cell(0, "w"), &CellValue::Number(3.0));
        assert!(store.cell(1, "w").is_absent());
        assert!(store.cell(9, "w").is_absent());
    }
}

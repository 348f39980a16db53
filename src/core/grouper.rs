//! Partitioning rows into independent entity groups
//!
//! Each group keeps an explicit map from group-local index to original row
//! position. Offsets are resolved against that map, never against the
//! original row order.

use crate::config::{NullKeyPolicy, PanelConfig};
use crate::error::{PanelError, PanelResult};
use crate::types::{CellValue, RowStore};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Value-equality key of a group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// No identifier column: the whole table is one group
    All,
    /// Numeric key stored as normalised bits so `1` and `1.0` compare equal
    Number(u64),
    Text(String),
    Boolean(bool),
    /// Shared group of blank-key rows
    Blank,
    /// A blank-key row isolated in its own group, identified by its position
    BlankRow(usize),
}

impl GroupKey {
    /// Key for a concrete cell; `None` for `Absent`
    pub fn from_cell(cell: &CellValue) -> Option<Self> {
        match cell {
            CellValue::Number(n) => {
                // -0.0 and 0.0 are the same firm id
                let n = if *n == 0.0 { 0.0 } else { *n };
                Some(GroupKey::Number(n.to_bits()))
            }
            CellValue::Text(s) => Some(GroupKey::Text(s.clone())),
            CellValue::Boolean(b) => Some(GroupKey::Boolean(*b)),
            CellValue::Absent => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, GroupKey::Blank | GroupKey::BlankRow(_))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::All => f.write_str("(all rows)"),
            GroupKey::Number(bits) => write!(f, "{}", CellValue::Number(f64::from_bits(*bits))),
            GroupKey::Text(s) => f.write_str(s),
            GroupKey::Boolean(b) => write!(f, "{}", CellValue::Boolean(*b)),
            GroupKey::Blank => f.write_str("(blank)"),
            GroupKey::BlankRow(position) => write!(f, "(blank, row {})", position),
        }
    }
}

/// Rows sharing one key, in original order
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    key: GroupKey,
    positions: Vec<usize>,
}

impl Group {
    fn new(key: GroupKey) -> Self {
        Self {
            key,
            positions: Vec::new(),
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Original row positions, indexed by group-local index
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Original position of the row at `local_index`
    pub fn position(&self, local_index: usize) -> Option<usize> {
        self.positions.get(local_index).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// A group paired with the rows it indexes into
#[derive(Debug, Clone, Copy)]
pub struct GroupView<'a> {
    pub store: &'a RowStore,
    pub group: &'a Group,
}

impl<'a> GroupView<'a> {
    #[must_use]
    pub fn new(store: &'a RowStore, group: &'a Group) -> Self {
        Self { store, group }
    }

    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }
}

/// The full partition of a row store
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    groups: Vec<Group>,
    /// For every original position: (group index, group-local index), or
    /// `None` for an excluded blank-key row
    membership: Vec<Option<(usize, usize)>>,
}

impl Grouping {
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of rows in the partitioned store
    pub fn row_count(&self) -> usize {
        self.membership.len()
    }

    /// The group holding `position` and the row's group-local index
    pub fn group_of(&self, position: usize) -> Option<(&Group, usize)> {
        let (group_idx, local) = (*self.membership.get(position)?)?;
        Some((&self.groups[group_idx], local))
    }

    /// Positions of blank-key rows left out of every group
    pub fn excluded(&self) -> impl Iterator<Item = usize> + '_ {
        self.membership
            .iter()
            .enumerate()
            .filter_map(|(position, m)| m.is_none().then_some(position))
    }

    pub fn find(&self, key: &GroupKey) -> Option<&Group> {
        self.groups.iter().find(|g| &g.key == key)
    }
}

/// Partition `store` by `config.group_key_column`.
///
/// Groups appear in first-seen order of their key and keep original row order
/// internally. Without a key column the whole store is one group.
pub fn partition(store: &RowStore, config: &PanelConfig) -> PanelResult<Grouping> {
    let Some(key_column) = config.group_key_column.as_deref() else {
        let groups = if store.is_empty() {
            Vec::new()
        } else {
            vec![Group {
                key: GroupKey::All,
                positions: (0..store.len()).collect(),
            }]
        };
        let membership = (0..store.len()).map(|p| Some((0, p))).collect();
        return Ok(Grouping { groups, membership });
    };

    if !store.has_column(key_column) {
        return Err(PanelError::Configuration(format!(
            "group key column '{}' does not exist (available: {})",
            key_column,
            store.columns().join(", ")
        )));
    }

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut membership = Vec::with_capacity(store.len());

    for (position, record) in store.rows().iter().enumerate() {
        let key = match GroupKey::from_cell(record.get(key_column)) {
            Some(key) => key,
            None => match config.null_keys {
                NullKeyPolicy::Exclude => {
                    membership.push(None);
                    continue;
                }
                NullKeyPolicy::Isolate => GroupKey::BlankRow(position),
                NullKeyPolicy::Group => GroupKey::Blank,
                NullKeyPolicy::Reject => {
                    return Err(PanelError::Configuration(format!(
                        "row {} has a blank value in group key column '{}'",
                        position, key_column
                    )));
                }
            },
        };

        let group_idx = *index.entry(key).or_insert_with_key(|key| {
            groups.push(Group::new(key.clone()));
            groups.len() - 1
        });
        let group = &mut groups[group_idx];
        membership.push(Some((group_idx, group.positions.len())));
        group.positions.push(position);
    }

    debug!(
        key_column,
        rows = store.len(),
        groups = groups.len(),
        excluded = membership.iter().filter(|m| m.is_none()).count(),
        "partitioned rows"
    );

    Ok(Grouping { groups, membership })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;
    use pretty_assertions::assert_eq;

    fn firms(ids: &[Option<&str>]) -> RowStore {
        let records = ids
            .iter()
            .map(|id| Record::new().with("Firm", *id))
            .collect();
        RowStore::from_records(vec!["Firm".to_string()], records)
    }

    #[test]
    fn test_interleaved_rows_reindex_per_firm() {
        let store = firms(&[Some("A"), Some("A"), Some("B"), Some("A"), Some("B")]);
        let grouping = partition(&store, &PanelConfig::grouped_by("Firm")).unwrap();

        assert_eq!(grouping.len(), 2);
        let a = &grouping.groups()[0];
        let b = &grouping.groups()[1];
        assert_eq!(a.key(), &GroupKey::Text("A".to_string()));
        assert_eq!(a.positions(), &[0, 1, 3]);
        assert_eq!(b.positions(), &[2, 4]);

        let (group, local) = grouping.group_of(3).unwrap();
        assert_eq!(group.key(), &GroupKey::Text("A".to_string()));
        assert_eq!(local, 2);
        assert_eq!(grouping.group_of(4).map(|(_, i)| i), Some(1));
        assert!(grouping.group_of(5).is_none());
    }

    #[test]
    fn test_no_key_column_is_one_group() {
        let store = firms(&[Some("A"), Some("B"), Some("A")]);
        let grouping = partition(&store, &PanelConfig::new()).unwrap();
        assert_eq!(grouping.len(), 1);
        assert_eq!(grouping.groups()[0].key(), &GroupKey::All);
        assert_eq!(grouping.groups()[0].positions(), &[0, 1, 2]);
    }

    #[test]
    fn test_empty_store_has_no_groups() {
        let store = RowStore::new(vec!["Firm".to_string()]);
        assert!(partition(&store, &PanelConfig::new()).unwrap().is_empty());
        assert!(partition(&store, &PanelConfig::grouped_by("Firm"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_missing_key_column_is_configuration_error() {
        let store = firms(&[Some("A")]);
        let err = partition(&store, &PanelConfig::grouped_by("Ticker")).unwrap_err();
        assert!(matches!(err, PanelError::Configuration(_)));
        assert!(err.to_string().contains("Ticker"));
    }

    #[test]
    fn test_numeric_keys_use_value_equality() {
        let records = vec![
            Record::new().with("Id", 1.0),
            Record::new().with("Id", "1"),
            Record::new().with("Id", 1.0),
            Record::new().with("Id", -0.0),
            Record::new().with("Id", 0.0),
        ];
        let store = RowStore::from_records(vec!["Id".to_string()], records);
        let grouping = partition(&store, &PanelConfig::grouped_by("Id")).unwrap();
        let positions: Vec<&[usize]> = grouping.groups().iter().map(|g| g.positions()).collect();
        assert_eq!(positions, vec![&[0, 2][..], &[1][..], &[3, 4][..]]);
    }

    #[test]
    fn test_blank_keys_excluded_by_default() {
        let store = firms(&[Some("A"), None, Some("B"), None]);
        let grouping = partition(&store, &PanelConfig::grouped_by("Firm")).unwrap();
        assert_eq!(grouping.len(), 2);
        assert_eq!(grouping.row_count(), 4);
        assert_eq!(grouping.excluded().collect::<Vec<_>>(), vec![1, 3]);
        assert!(grouping.group_of(1).is_none());
        assert_eq!(grouping.group_of(2).map(|(_, i)| i), Some(0));
    }

    #[test]
    fn test_blank_keys_isolated() {
        let store = firms(&[Some("A"), None, Some("A"), None]);
        let config = PanelConfig::grouped_by("Firm").with_null_keys(NullKeyPolicy::Isolate);
        let grouping = partition(&store, &config).unwrap();
        let keys: Vec<GroupKey> = grouping.groups().iter().map(|g| g.key().clone()).collect();
        assert_eq!(
            keys,
            vec![
                GroupKey::Text("A".to_string()),
                GroupKey::BlankRow(1),
                GroupKey::BlankRow(3),
            ]
        );
    }

    #[test]
    fn test_blank_keys_shared_group() {
        let store = firms(&[Some("A"), None, Some("A"), None]);
        let config = PanelConfig::grouped_by("Firm").with_null_keys(NullKeyPolicy::Group);
        let grouping = partition(&store, &config).unwrap();
        let blank = grouping.find(&GroupKey::Blank).unwrap();
        assert_eq!(blank.positions(), &[1, 3]);
        assert!(blank.key().is_blank());
    }

    #[test]
    fn test_blank_keys_rejected() {
        let store = firms(&[Some("A"), None]);
        let config = PanelConfig::grouped_by("Firm").with_null_keys(NullKeyPolicy::Reject);
        let err = partition(&store, &config).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(GroupKey::from_cell(&CellValue::Number(7.0)).unwrap().to_string(), "7");
        assert_eq!(GroupKey::Text("ACME".to_string()).to_string(), "ACME");
        assert_eq!(GroupKey::from_cell(&CellValue::Absent), None);
    }
}

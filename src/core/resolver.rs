//! Relative row references within one group

use super::grouper::GroupView;
use crate::types::CellValue;

/// Group-local index `local_index + offset`, if it lies inside a group of `len` rows
pub fn target_index(local_index: usize, offset: i64, len: usize) -> Option<usize> {
    let target = i64::try_from(local_index).ok()?.checked_add(offset)?;
    let target = usize::try_from(target).ok()?;
    (target < len).then_some(target)
}

/// Read `column` at `local_index + offset` inside the same group.
///
/// Out-of-bounds targets (before the group's first row or past its last) and
/// stored blanks are both `Absent`. Rows of other groups are unreachable.
pub fn resolve<'a>(
    view: &GroupView<'a>,
    local_index: usize,
    column: &str,
    offset: i64,
) -> &'a CellValue {
    const ABSENT: &CellValue = &CellValue::Absent;

    match target_index(local_index, offset, view.len()).and_then(|t| view.group.position(t)) {
        Some(position) => view.store.cell(position, column),
        None => ABSENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelConfig;
    use crate::core::grouper::partition;
    use crate::types::{Record, RowStore};

    fn store() -> RowStore {
        // A, A, B, A, B interleaved
        let rows = [("A", 1.0), ("A", 2.0), ("B", 10.0), ("A", 3.0), ("B", 20.0)];
        let records = rows
            .iter()
            .map(|(firm, v)| Record::new().with("Firm", *firm).with("v", *v))
            .collect();
        RowStore::from_records(vec!["Firm".to_string(), "v".to_string()], records)
    }

    #[test]
    fn test_target_index_bounds() {
        assert_eq!(target_index(0, -1, 3), None);
        assert_eq!(target_index(2, 1, 3), None);
        assert_eq!(target_index(1, 1, 3), Some(2));
        assert_eq!(target_index(0, 0, 0), None);
        assert_eq!(target_index(0, i64::MIN, 3), None);
        assert_eq!(target_index(usize::MAX, 1, 3), None);
    }

    #[test]
    fn test_resolve_within_group_only() {
        let store = store();
        let grouping = partition(&store, &PanelConfig::grouped_by("Firm")).unwrap();
        let a = GroupView::new(&store, &grouping.groups()[0]);
        let b = GroupView::new(&store, &grouping.groups()[1]);

        // A's local 1 is original row 1; its next row is original row 3, not B's row 2
        assert_eq!(resolve(&a, 1, "v", 1), &CellValue::Number(3.0));
        assert_eq!(resolve(&a, 2, "v", -1), &CellValue::Number(2.0));
        assert_eq!(resolve(&b, 1, "v", -1), &CellValue::Number(10.0));
    }

    #[test]
    fn test_resolve_boundaries_are_absent() {
        let store = store();
        let grouping = partition(&store, &PanelConfig::grouped_by("Firm")).unwrap();
        let b = GroupView::new(&store, &grouping.groups()[1]);

        assert!(resolve(&b, 0, "v", -1).is_absent());
        assert!(resolve(&b, 1, "v", 1).is_absent());
        assert!(resolve(&b, 0, "v", 5).is_absent());
    }

    #[test]
    fn test_resolve_stored_blank_is_absent() {
        let records = vec![Record::new().with("v", 1.0), Record::new()];
        let store = RowStore::from_records(vec!["v".to_string()], records);
        let grouping = partition(&store, &PanelConfig::new()).unwrap();
        let all = GroupView::new(&store, &grouping.groups()[0]);
        assert!(resolve(&all, 0, "v", 1).is_absent());
        assert_eq!(resolve(&all, 1, "v", -1), &CellValue::Number(1.0));
    }
}

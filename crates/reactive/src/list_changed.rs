//! List change notifications emitted by tables and views.

/// What happened to the list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListChangedKind {
    /// The whole list must be re-read.
    Reset,
    ItemAdded,
    ItemDeleted,
    ItemChanged,
    /// An item changed position, for example after a re-sort.
    ItemMoved,
    ColumnAdded,
    ColumnRemoved,
    ColumnChanged,
}

/// A single change notification.
///
/// Item events carry positions in the notifying list. For tables the
/// position is the row's index among live rows; for views it is the index
/// in the view's ordered row sequence. Column events carry the column
/// ordinal in `new_index` (or `old_index` for removals).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListChanged {
    pub kind: ListChangedKind,
    pub new_index: Option<usize>,
    pub old_index: Option<usize>,
}

impl ListChanged {
    pub fn new(kind: ListChangedKind, new_index: Option<usize>, old_index: Option<usize>) -> Self {
        Self {
            kind,
            new_index,
            old_index,
        }
    }

    pub fn reset() -> Self {
        Self::new(ListChangedKind::Reset, None, None)
    }

    pub fn added(index: usize) -> Self {
        Self::new(ListChangedKind::ItemAdded, Some(index), None)
    }

    pub fn deleted(index: usize) -> Self {
        Self::new(ListChangedKind::ItemDeleted, None, Some(index))
    }

    pub fn changed(index: usize) -> Self {
        Self::new(ListChangedKind::ItemChanged, Some(index), Some(index))
    }

    pub fn moved(new_index: usize, old_index: usize) -> Self {
        Self::new(ListChangedKind::ItemMoved, Some(new_index), Some(old_index))
    }

    pub fn column_added(ordinal: usize) -> Self {
        Self::new(ListChangedKind::ColumnAdded, Some(ordinal), None)
    }

    pub fn column_removed(ordinal: usize) -> Self {
        Self::new(ListChangedKind::ColumnRemoved, None, Some(ordinal))
    }

    pub fn column_changed(ordinal: usize) -> Self {
        Self::new(ListChangedKind::ColumnChanged, Some(ordinal), Some(ordinal))
    }

    #[inline]
    pub fn is_reset(&self) -> bool {
        self.kind == ListChangedKind::Reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(ListChanged::added(3).new_index, Some(3));
        assert_eq!(ListChanged::deleted(3).old_index, Some(3));
        assert_eq!(ListChanged::deleted(3).new_index, None);
        let m = ListChanged::moved(1, 4);
        assert_eq!((m.kind, m.new_index, m.old_index), (ListChangedKind::ItemMoved, Some(1), Some(4)));
        assert!(ListChanged::reset().is_reset());
    }
}

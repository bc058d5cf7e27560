//! Undo journal for compound mutations.
//!
//! Every row a compound operation touches is imaged the first time it is
//! touched. If the operation fails, [`Journal::rollback`] puts every imaged
//! row back exactly as it was, so a failed cascade leaves no trace. If it
//! succeeds, the journal tells the data set which rows changed so that
//! tables and views can publish their notifications.

use crate::table::Table;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use hashbrown::HashSet;
use tabula_core::schema::TableId;
use tabula_core::{Row, RowId};
use tabula_reactive::ListChanged;

/// Where a row was, and what it held, before the operation touched it.
#[derive(Clone, Debug)]
pub enum RowImage {
    /// The row did not exist.
    Absent,
    /// The row was attached at the given position.
    Attached(Row, usize),
    /// The row existed but had not been inserted.
    Detached(Row),
}

impl RowImage {
    /// Position the row had in its table, if it was attached.
    pub fn position(&self) -> Option<usize> {
        match self {
            RowImage::Attached(_, pos) => Some(*pos),
            _ => None,
        }
    }
}

/// Operations that cascade from parent rows to child rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cascade {
    Delete,
    Accept,
    Reject,
}

/// A journal entry: the first image of one row.
#[derive(Clone, Debug)]
pub struct JournalEntry {
    pub table: TableId,
    pub row: RowId,
    pub before: RowImage,
}

/// Change record of one compound operation.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
    seen: HashSet<(TableId, RowId)>,
    /// Generation counters and next order key, per table.
    counters: BTreeMap<TableId, (Vec<i64>, u64)>,
    /// Cascading operations in progress, for cycle detection.
    cascading: HashSet<(Cascade, TableId, RowId)>,
    /// Tables whose shape changed.
    structural: BTreeSet<TableId>,
    column_events: Vec<(TableId, ListChanged)>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images a row before its first change.
    pub fn record(&mut self, table: &Table, row: RowId) {
        let key = (table.id(), row);
        if !self.seen.insert(key) {
            return;
        }
        if !self.counters.contains_key(&key.0) {
            self.counters.insert(key.0, table.counters());
        }
        let before = match table.position(row) {
            Some(pos) => table
                .row(row)
                .map_or(RowImage::Absent, |r| RowImage::Attached(r.clone(), pos)),
            None => table
                .row(row)
                .map_or(RowImage::Absent, |r| RowImage::Detached(r.clone())),
        };
        self.entries.push(JournalEntry {
            table: key.0,
            row,
            before,
        });
    }

    /// Snapshots the counters of a table without imaging any row.
    pub fn record_counters(&mut self, table: &Table) {
        if !self.counters.contains_key(&table.id()) {
            self.counters.insert(table.id(), table.counters());
        }
    }

    /// Marks `op` as running on a row. Returns false if it already is.
    pub fn enter(&mut self, op: Cascade, table: TableId, row: RowId) -> bool {
        self.cascading.insert((op, table, row))
    }

    pub fn leave(&mut self, op: Cascade, table: TableId, row: RowId) {
        self.cascading.remove(&(op, table, row));
    }

    pub fn mark_structural(&mut self, table: TableId) {
        self.structural.insert(table);
    }

    pub fn push_column_event(&mut self, table: TableId, event: ListChanged) {
        self.structural.insert(table);
        self.column_events.push((table, event));
    }

    #[inline]
    pub fn is_structural(&self, table: TableId) -> bool {
        self.structural.contains(&table)
    }

    pub fn column_events(&self, table: TableId) -> impl Iterator<Item = &ListChanged> {
        self.column_events
            .iter()
            .filter(move |(t, _)| *t == table)
            .map(|(_, e)| e)
    }

    /// Entries recorded for one table.
    pub fn entries_for(&self, table: TableId) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter().filter(move |e| e.table == table)
    }

    /// Tables touched by row changes or shape changes.
    pub fn tables(&self) -> BTreeSet<TableId> {
        self.entries
            .iter()
            .map(|e| e.table)
            .chain(self.structural.iter().copied())
            .collect()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.structural.is_empty()
    }

    /// Restores every imaged row and counter. Tables that no longer exist
    /// are skipped.
    pub fn rollback(self, tables: &mut [Table]) {
        fn find(tables: &mut [Table], id: TableId) -> Option<&mut Table> {
            tables.iter_mut().find(|t| t.id() == id)
        }
        for entry in &self.entries {
            if let Some(table) = find(tables, entry.table) {
                table.detach(entry.row);
                table.take_detached(entry.row);
            }
        }
        // attach() places rows by order key, so restore order is free
        for entry in self.entries {
            let Some(table) = find(tables, entry.table) else {
                continue;
            };
            match entry.before {
                RowImage::Absent => {}
                RowImage::Attached(row, _) => table.attach(row),
                RowImage::Detached(row) => table.insert_detached(row),
            }
        }
        for (id, (generated, next_order)) in self.counters {
            if let Some(table) = find(tables, id) {
                table.restore_counters(generated, next_order);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use tabula_core::schema::TableBuilder;
    use tabula_core::{next_row_id, DataType, RowEvent, RowState, RowVersion, Value};

    fn table() -> Table {
        let schema = TableBuilder::new("t")
            .unwrap()
            .add_column("v", DataType::Int32)
            .unwrap()
            .build()
            .unwrap();
        Table::new(schema).unwrap()
    }

    fn insert(t: &mut Table, v: i32) -> RowId {
        insert_as(t, next_row_id(), v)
    }

    fn insert_as(t: &mut Table, id: RowId, v: i32) -> RowId {
        let mut row = Row::detached(id, vec![Value::Int32(v)]);
        row.apply(RowEvent::Insert).unwrap();
        row.set_order(t.take_order());
        let id = row.id();
        t.attach(row);
        id
    }

    #[test]
    fn test_rollback_restores_rows() {
        let mut t = table();
        let a = insert(&mut t, 1);
        let b = insert(&mut t, 2);

        let mut journal = Journal::new();
        journal.record(&t, a);
        t.update_row(a, |r| r.apply(RowEvent::Delete)).unwrap().unwrap();
        journal.record(&t, b);
        t.detach(b);
        let c = next_row_id();
        journal.record(&t, c);
        insert_as(&mut t, c, 3);

        let tables = journal.tables();
        assert_eq!(tables.len(), 1);
        journal.rollback(core::slice::from_mut(&mut t));

        assert_eq!(t.row_ids(), vec![a, b]);
        assert_eq!(t.row(a).unwrap().state(), RowState::Added);
        assert_eq!(
            t.row(b).unwrap().value(0, RowVersion::Current).unwrap(),
            &Value::Int32(2)
        );
    }

    #[test]
    fn test_first_image_wins() {
        let mut t = table();
        let a = insert(&mut t, 1);
        let mut journal = Journal::new();
        journal.record(&t, a);
        t.update_row(a, |r| {
            r.begin_edit();
            r.set_proposed(0, Value::Int32(9));
            r.commit_proposed();
        });
        journal.record(&t, a);
        assert_eq!(journal.entries_for(t.id()).count(), 1);
        journal.rollback(core::slice::from_mut(&mut t));
        assert_eq!(
            t.row(a).unwrap().value(0, RowVersion::Current).unwrap(),
            &Value::Int32(1)
        );
    }

    #[test]
    fn test_cascade_guard() {
        let mut journal = Journal::new();
        assert!(journal.enter(Cascade::Delete, TableId(0), 1));
        assert!(!journal.enter(Cascade::Delete, TableId(0), 1));
        assert!(journal.enter(Cascade::Accept, TableId(0), 1));
        journal.leave(Cascade::Delete, TableId(0), 1);
        assert!(journal.enter(Cascade::Delete, TableId(0), 1));
    }
}

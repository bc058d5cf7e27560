//! Live sorted and filtered projections over a table.
//!
//! A [`DataView`] keeps an ordered list of the rows of one table that pass
//! its row state filter and row filter, sorted by its sort keys and then by
//! table order. The data set refreshes every view after each published
//! change. A change to a single row under a filter and sort that read only
//! that row is applied in place and reported as one item event; anything
//! else rebuilds the list and reports a reset.

use crate::context::{column_is_row_local, filter_is_row_local};
use crate::dataset::DataSet;
use crate::journal::Journal;
use crate::table::Table;
use crate::RowStateFilter;
use alloc::format;
use alloc::vec::Vec;
use core::cmp::Ordering;
use tabula_core::schema::TableId;
use tabula_core::{Error, Result, Row, RowId, RowVersion, Value};
use tabula_expr::{Expression, SortKey};
use tabula_reactive::{ListChanged, SubscriptionId, SubscriptionManager};

/// Identifies a view within its data set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u32);

/// One visible row with its sort key.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ViewEntry {
    pub row: RowId,
    pub version: RowVersion,
    pub key: Vec<Value>,
    pub order: u64,
}

/// Resolved sort column: ordinal and direction.
type SortColumn = (usize, bool);

pub struct DataView {
    id: ViewId,
    table: TableId,
    sort: Vec<SortKey>,
    filter: Option<Expression>,
    states: RowStateFilter,
    pub(crate) allow_new: bool,
    pub(crate) allow_edit: bool,
    pub(crate) allow_delete: bool,
    apply_default_sort: bool,
    entries: Vec<ViewEntry>,
    /// Row added through the view and not yet inserted; shown last.
    pub(crate) pending: Option<RowId>,
    events: SubscriptionManager<ListChanged>,
}

impl core::fmt::Debug for DataView {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DataView")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("sort", &self.sort)
            .field("filter", &self.filter.as_ref().map(Expression::text))
            .field("states", &self.states)
            .field("len", &self.len())
            .finish()
    }
}

fn compare_entries(a: &ViewEntry, b: &ViewEntry, sort: &[SortColumn], cs: bool) -> Ordering {
    for ((x, y), &(_, ascending)) in a.key.iter().zip(&b.key).zip(sort) {
        let ord = x.compare_with(y, cs);
        let ord = if ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.order.cmp(&b.order)
}

/// Compares the sort values of an entry with a search key.
fn compare_key(entry: &ViewEntry, key: &[Value], sort: &[SortColumn], cs: bool) -> Ordering {
    for (i, (have, target)) in entry.key.iter().zip(key).enumerate() {
        let ord = have.compare_with(target, cs);
        let ord = if sort[i].1 { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl DataView {
    pub(crate) fn new(id: ViewId, table: TableId) -> Self {
        Self {
            id,
            table,
            sort: Vec::new(),
            filter: None,
            states: RowStateFilter::CURRENT_ROWS,
            allow_new: true,
            allow_edit: true,
            allow_delete: true,
            apply_default_sort: false,
            entries: Vec::new(),
            pending: None,
            events: SubscriptionManager::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ViewId {
        self.id
    }

    #[inline]
    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn filter(&self) -> Option<&Expression> {
        self.filter.as_ref()
    }

    pub fn row_state_filter(&self) -> RowStateFilter {
        self.states
    }

    pub fn apply_default_sort(&self) -> bool {
        self.apply_default_sort
    }

    /// Number of visible rows, counting a row added through the view.
    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.pending.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The row shown at `index`.
    pub fn row_at(&self, index: usize) -> Option<(RowId, RowVersion)> {
        match self.entries.get(index) {
            Some(e) => Some((e.row, e.version)),
            None if index == self.entries.len() => self.pending.map(|r| (r, RowVersion::Default)),
            None => None,
        }
    }

    pub fn row_ids(&self) -> Vec<RowId> {
        self.entries
            .iter()
            .map(|e| e.row)
            .chain(self.pending)
            .collect()
    }

    pub(crate) fn position_of(&self, row: RowId) -> Option<usize> {
        self.entries.iter().position(|e| e.row == row)
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&ListChanged) + 'static,
    {
        self.events.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub(crate) fn emit(&self, event: ListChanged) {
        self.events.notify_all(&event);
    }

    // ---- configuration ----------------------------------------------
    // Setters only swap state; the caller rebuilds and restores on error.

    pub(crate) fn replace_sort(&mut self, sort: Vec<SortKey>) -> Vec<SortKey> {
        core::mem::replace(&mut self.sort, sort)
    }

    pub(crate) fn replace_filter(&mut self, filter: Option<Expression>) -> Option<Expression> {
        core::mem::replace(&mut self.filter, filter)
    }

    pub(crate) fn replace_states(&mut self, states: RowStateFilter) -> RowStateFilter {
        core::mem::replace(&mut self.states, states)
    }

    pub(crate) fn replace_default_sort(&mut self, apply: bool) -> bool {
        core::mem::replace(&mut self.apply_default_sort, apply)
    }

    pub(crate) fn replace_table(&mut self, table: TableId) -> TableId {
        core::mem::replace(&mut self.table, table)
    }

    pub(crate) fn set_entries(&mut self, entries: Vec<ViewEntry>) {
        self.entries = entries;
    }

    // ---- building ---------------------------------------------------

    /// Sort columns in effect: the explicit sort, else the primary key or
    /// first unique constraint when default sorting is on.
    fn effective_sort(&self, table: &Table) -> Result<Vec<SortColumn>> {
        if !self.sort.is_empty() {
            return self
                .sort
                .iter()
                .map(|k| Ok((table.schema().column_index(&k.column)?, k.ascending)))
                .collect();
        }
        if !self.apply_default_sort {
            return Ok(Vec::new());
        }
        let pk = table.schema().primary_key();
        let columns = if pk.is_empty() {
            table
                .schema()
                .unique_constraints()
                .next()
                .map(|(_, u)| u.columns.clone())
                .unwrap_or_default()
        } else {
            pk.to_vec()
        };
        Ok(columns.into_iter().map(|c| (c, true)).collect())
    }

    /// The entry of `row` if it is visible.
    fn entry_for(
        &self,
        ds: &DataSet,
        table: &Table,
        row: &Row,
        sort: &[SortColumn],
    ) -> Result<Option<ViewEntry>> {
        let Some(version) = self.states.version_for(row.state()) else {
            return Ok(None);
        };
        if let Some(filter) = &self.filter {
            if !ds.row_matches(table, row, version, filter)? {
                return Ok(None);
            }
        }
        let key = sort
            .iter()
            .map(|&(c, _)| ds.read_cell(table, row, c, version))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(ViewEntry {
            row: row.id(),
            version,
            key,
            order: row.order(),
        }))
    }

    /// Computes the visible rows. With `checked`, the first evaluation
    /// error is returned; otherwise failing rows are left out.
    pub(crate) fn build(&self, ds: &DataSet, checked: bool) -> Result<Vec<ViewEntry>> {
        let table = ds.table(self.table)?;
        let sort = self.effective_sort(table)?;
        let mut entries = Vec::new();
        for row in table.rows() {
            match self.entry_for(ds, table, row, &sort) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) if checked => return Err(e),
                Err(e) => {
                    tracing::warn!(view = self.id.0, row = row.id(), error = %e, "row left out of view");
                }
            }
        }
        let cs = table.case_sensitive();
        entries.sort_by(|a, b| compare_entries(a, b, &sort, cs));
        Ok(entries)
    }

    /// True if a change to one row can only move that row.
    fn is_row_local(&self, table: &Table) -> bool {
        self.filter.as_ref().map_or(true, |f| filter_is_row_local(table, f))
            && self.effective_sort(table).map_or(false, |sort| {
                sort.iter().all(|&(c, _)| column_is_row_local(table, c))
            })
    }

    /// Brings the view up to date after a change and notifies subscribers.
    pub(crate) fn refresh(&mut self, ds: &DataSet, journal: Option<&Journal>) {
        let Ok(table) = ds.table(self.table) else {
            return;
        };
        // a pending row leaves the tail once it is inserted or dropped
        let tail = self.entries.len();
        let resolved = self.pending.filter(|p| !table.is_detached(*p));
        if resolved.is_some() {
            self.pending = None;
        }

        if let Some(journal) = journal {
            if journal.is_structural(self.table) {
                self.rebuild_silently(ds);
                let mut forwarded = false;
                for event in journal.column_events(self.table) {
                    self.emit(*event);
                    forwarded = true;
                }
                if !forwarded {
                    self.emit(ListChanged::reset());
                }
                return;
            }
            let mine: Vec<RowId> = journal.entries_for(self.table).map(|e| e.row).collect();
            if mine.is_empty() && self.is_row_local(table) {
                return;
            }
            if let [row] = mine[..] {
                if self.is_row_local(table) && self.apply_row_change(ds, table, row, resolved.map(|_| tail)) {
                    return;
                }
            }
            let changed = self.rebuild_silently(ds);
            if changed || !mine.is_empty() {
                tracing::trace!(view = self.id.0, "view reset");
                self.emit(ListChanged::reset());
            }
            return;
        }
        if self.rebuild_silently(ds) || resolved.is_some() {
            self.emit(ListChanged::reset());
        }
    }

    /// Rebuilds the entries. Returns true if the visible rows or their
    /// order changed.
    fn rebuild_silently(&mut self, ds: &DataSet) -> bool {
        let entries = match self.build(ds, false) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(view = self.id.0, error = %e, "view cleared");
                Vec::new()
            }
        };
        let changed = entries.len() != self.entries.len()
            || entries.iter().zip(&self.entries).any(|(a, b)| a.row != b.row);
        self.entries = entries;
        changed
    }

    /// Moves a single changed row to its new place. Returns false if the
    /// change cannot be applied in place.
    fn apply_row_change(&mut self, ds: &DataSet, table: &Table, row: RowId, from_tail: Option<usize>) -> bool {
        let Ok(sort) = self.effective_sort(table) else {
            return false;
        };
        if self.entries.first().map_or(false, |e| e.key.len() != sort.len()) {
            return false;
        }
        let old = self.position_of(row).or(from_tail);
        if let Some(pos) = self.position_of(row) {
            self.entries.remove(pos);
        }
        let entry = match table.row(row).filter(|_| table.is_attached(row)) {
            Some(r) => match self.entry_for(ds, table, r, &sort) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(view = self.id.0, row = row, error = %e, "row left out of view");
                    None
                }
            },
            None => None,
        };
        let cs = table.case_sensitive();
        let new = entry.map(|entry| {
            let pos = self
                .entries
                .partition_point(|e| compare_entries(e, &entry, &sort, cs) == Ordering::Less);
            self.entries.insert(pos, entry);
            pos
        });
        tracing::trace!(view = self.id.0, row = row, ?old, ?new, "view row change");
        match (old, new) {
            (None, Some(n)) => self.emit(ListChanged::added(n)),
            (Some(o), None) => self.emit(ListChanged::deleted(o)),
            (Some(o), Some(n)) if o == n => self.emit(ListChanged::changed(n)),
            (Some(o), Some(n)) => self.emit(ListChanged::moved(n, o)),
            (None, None) => {}
        }
        true
    }

    // ---- lookup -----------------------------------------------------

    /// Range of entries whose sort values equal `key`.
    fn key_range(&self, ds: &DataSet, key: &[Value]) -> Result<core::ops::Range<usize>> {
        let table = ds.table(self.table)?;
        let sort = self.effective_sort(table)?;
        if sort.is_empty() {
            return Err(Error::invalid_argument(
                "Find requires a sorted view; set a sort order first",
            ));
        }
        if key.len() != sort.len() {
            return Err(Error::invalid_argument(format!(
                "Expecting {} key value(s) for the sort order, got {}",
                sort.len(),
                key.len()
            )));
        }
        let target = key
            .iter()
            .zip(&sort)
            .map(|(v, &(c, _))| {
                let col = &table.schema().columns()[c];
                v.coerce_to(col.data_type()).ok_or_else(|| Error::InvalidCast {
                    column: col.name().into(),
                    value: format!("{}", v),
                    expected: col.data_type(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let cs = table.case_sensitive();
        let start = self
            .entries
            .partition_point(|e| compare_key(e, &target, &sort, cs) == Ordering::Less);
        let end = self
            .entries
            .partition_point(|e| compare_key(e, &target, &sort, cs) != Ordering::Greater);
        Ok(start..end.max(start))
    }

    /// Index of the first row whose sort values equal `key`, one value per
    /// sort column.
    pub fn find(&self, ds: &DataSet, key: &[Value]) -> Result<Option<usize>> {
        let range = self.key_range(ds, key)?;
        Ok(if range.is_empty() { None } else { Some(range.start) })
    }

    /// Every row whose sort values equal `key`, in view order.
    pub fn find_rows(&self, ds: &DataSet, key: &[Value]) -> Result<Vec<RowId>> {
        let range = self.key_range(ds, key)?;
        Ok(self.entries[range].iter().map(|e| e.row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use tabula_core::schema::{Column, TableBuilder};
    use tabula_core::DataType;

    fn entry(row: RowId, key: Vec<Value>, order: u64) -> ViewEntry {
        ViewEntry {
            row,
            version: RowVersion::Current,
            key,
            order,
        }
    }

    #[test]
    fn test_compare_entries_direction_and_order() {
        let a = entry(1, vec![Value::from("b")], 1);
        let b = entry(2, vec![Value::from("A")], 2);
        let asc = [(0, true)];
        let desc = [(0, false)];
        assert_eq!(compare_entries(&a, &b, &asc, false), Ordering::Greater);
        assert_eq!(compare_entries(&a, &b, &desc, false), Ordering::Less);
        let c = entry(3, vec![Value::from("B")], 3);
        assert_eq!(compare_entries(&a, &c, &asc, false), Ordering::Less);
    }

    #[test]
    fn test_build_filters_and_sorts() {
        let mut ds = DataSet::new("ds");
        let schema = TableBuilder::new("people")
            .unwrap()
            .add_column("age", DataType::Int32)
            .unwrap()
            .column(Column::new("name", DataType::String))
            .unwrap()
            .build()
            .unwrap();
        let t = ds.add_table(Table::new(schema).unwrap()).unwrap();
        let b = ds.add_row(t, vec![Value::Int32(40), Value::from("B")]).unwrap();
        ds.add_row(t, vec![Value::Int32(20), Value::from("A")]).unwrap();
        let c = ds.add_row(t, vec![Value::Int32(50), Value::from("C")]).unwrap();

        let mut view = DataView::new(ViewId(1), t);
        view.replace_sort(vec![SortKey::desc("name")]);
        view.replace_filter(Some(Expression::parse("age > 30").unwrap()));
        let entries = view.build(&ds, true).unwrap();
        view.set_entries(entries);
        assert_eq!(view.row_ids(), vec![c, b]);
        assert_eq!(view.find(&ds, &[Value::from("b")]).unwrap(), Some(1));
        assert_eq!(view.find(&ds, &[Value::from("z")]).unwrap(), None);
    }

    #[test]
    fn test_find_requires_sort() {
        let mut ds = DataSet::new("ds");
        let schema = TableBuilder::new("t")
            .unwrap()
            .add_column("v", DataType::Int32)
            .unwrap()
            .build()
            .unwrap();
        let t = ds.add_table(Table::new(schema).unwrap()).unwrap();
        let view = DataView::new(ViewId(1), t);
        assert!(matches!(
            view.find(&ds, &[Value::Int32(1)]),
            Err(Error::InvalidArgument { .. })
        ));
    }
}

//! Borrowing handles over rows and views.
//!
//! [`RowRef`] and [`ViewRef`] read through a shared borrow of the data set;
//! [`RowMut`] and [`ViewMut`] route writes through the data set's mutation
//! pipeline so that constraints, cascades and notifications always apply.

use crate::dataset::DataSet;
use crate::table::Table;
use crate::view::{DataView, ViewId};
use crate::RowStateFilter;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use tabula_core::schema::TableId;
use tabula_core::{Error, Result, Row, RowId, RowState, RowVersion, Value};
use tabula_expr::{format_sort, parse_sort, Expression};
use tabula_reactive::{ListChanged, SubscriptionId};

/// Anything that names a column: an ordinal or a name.
pub trait ColumnSelector {
    fn ordinal(&self, table: &Table) -> Result<usize>;
}

impl ColumnSelector for usize {
    fn ordinal(&self, table: &Table) -> Result<usize> {
        if *self < table.schema().width() {
            Ok(*self)
        } else {
            Err(Error::invalid_argument(format!(
                "column ordinal {} out of range for table '{}'",
                self,
                table.name()
            )))
        }
    }
}

impl ColumnSelector for &str {
    fn ordinal(&self, table: &Table) -> Result<usize> {
        table.column_index(self)
    }
}

impl ColumnSelector for String {
    fn ordinal(&self, table: &Table) -> Result<usize> {
        table.column_index(self)
    }
}

impl ColumnSelector for &String {
    fn ordinal(&self, table: &Table) -> Result<usize> {
        table.column_index(self)
    }
}

/// Read access to one row.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    ds: &'a DataSet,
    table: &'a Table,
    row: &'a Row,
}

impl<'a> core::fmt::Debug for RowRef<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RowRef")
            .field("table", &self.table.name())
            .field("row", self.row)
            .finish()
    }
}

impl<'a> RowRef<'a> {
    #[inline]
    pub fn id(&self) -> RowId {
        self.row.id()
    }

    #[inline]
    pub fn table(&self) -> &'a Table {
        self.table
    }

    #[inline]
    pub fn state(&self) -> RowState {
        self.row.state()
    }

    pub fn is_editing(&self) -> bool {
        self.row.is_editing()
    }

    /// Value at the default version: Proposed while editing, else Current.
    pub fn get(&self, column: impl ColumnSelector) -> Result<Value> {
        self.get_version(column, RowVersion::Default)
    }

    pub fn get_version(&self, column: impl ColumnSelector, version: RowVersion) -> Result<Value> {
        let c = column.ordinal(self.table)?;
        self.ds.read_cell(self.table, self.row, c, version)
    }

    pub fn has_version(&self, version: RowVersion) -> bool {
        self.row.has_version(version)
    }

    /// Every value at the default version, computed columns included.
    pub fn values(&self) -> Result<Vec<Value>> {
        self.ds.read_row(self.table, self.row, RowVersion::Default)
    }

    pub fn values_at(&self, version: RowVersion) -> Result<Vec<Value>> {
        self.ds.read_row(self.table, self.row, version)
    }

    /// Version used to match related rows: Original for a deleted row.
    fn key_version(&self) -> RowVersion {
        if self.row.state() == RowState::Deleted {
            RowVersion::Original
        } else {
            RowVersion::Default
        }
    }

    /// Child rows under a relation in which this row's table is the parent.
    pub fn child_rows(&self, relation: &str) -> Result<Vec<RowRef<'a>>> {
        let rel = self.ds.relation(relation)?;
        if rel.parent_table() != self.table.id() {
            return Err(Error::invalid_argument(format!(
                "relation '{}' does not have table '{}' as its parent",
                rel.name(),
                self.table.name()
            )));
        }
        let child = self.ds.table(rel.child_table())?;
        Ok(self
            .ds
            .children_of(rel, self.row, self.key_version())?
            .into_iter()
            .map(|row| RowRef {
                ds: self.ds,
                table: child,
                row,
            })
            .collect())
    }

    /// The parent row under a relation in which this row's table is the
    /// child, if the key is set and matched.
    pub fn parent_row(&self, relation: &str) -> Result<Option<RowRef<'a>>> {
        let rel = self.ds.relation(relation)?;
        if rel.child_table() != self.table.id() {
            return Err(Error::invalid_argument(format!(
                "relation '{}' does not have table '{}' as its child",
                rel.name(),
                self.table.name()
            )));
        }
        let parent = self.ds.table(rel.parent_table())?;
        Ok(self
            .ds
            .parent_of(rel, self.row, self.key_version())?
            .map(|row| RowRef {
                ds: self.ds,
                table: parent,
                row,
            }))
    }

    pub fn row_error(&self) -> Option<&'a str> {
        self.row.error()
    }

    pub fn column_error(&self, column: impl ColumnSelector) -> Result<Option<&'a str>> {
        let c = column.ordinal(self.table)?;
        Ok(self.row.column_error(c))
    }

    pub fn has_errors(&self) -> bool {
        self.row.has_errors()
    }

    pub(crate) fn raw(&self) -> &'a Row {
        self.row
    }
}

/// Write access to one row.
pub struct RowMut<'a> {
    ds: &'a mut DataSet,
    table: TableId,
    row: RowId,
}

impl<'a> RowMut<'a> {
    #[inline]
    pub fn id(&self) -> RowId {
        self.row
    }

    pub fn read(&self) -> Result<RowRef<'_>> {
        self.ds.row(self.table, self.row)
    }

    pub fn state(&self) -> Result<RowState> {
        Ok(self.read()?.state())
    }

    pub fn get(&self, column: impl ColumnSelector) -> Result<Value> {
        self.read()?.get(column)
    }

    /// Writes one cell, committing it at once outside an edit scope.
    pub fn set(&mut self, column: impl ColumnSelector, value: impl Into<Value>) -> Result<()> {
        let c = column.ordinal(self.ds.table(self.table)?)?;
        self.ds.set_value(self.table, self.row, c, value.into())
    }

    pub fn begin_edit(&mut self) -> Result<()> {
        self.ds.begin_edit(self.table, self.row)
    }

    pub fn end_edit(&mut self) -> Result<()> {
        self.ds.end_edit(self.table, self.row)
    }

    pub fn cancel_edit(&mut self) -> Result<()> {
        self.ds.cancel_edit(self.table, self.row)
    }

    pub fn delete(&mut self) -> Result<()> {
        self.ds.delete_row(self.table, self.row)
    }

    pub fn accept_changes(&mut self) -> Result<()> {
        self.ds.accept_row(self.table, self.row)
    }

    pub fn reject_changes(&mut self) -> Result<()> {
        self.ds.reject_row(self.table, self.row)
    }

    pub fn set_added(&mut self) -> Result<()> {
        self.ds.set_added(self.table, self.row)
    }

    pub fn set_modified(&mut self) -> Result<()> {
        self.ds.set_modified(self.table, self.row)
    }

    pub fn set_parent_row(&mut self, relation: &str, parent: Option<RowId>) -> Result<()> {
        self.ds.set_parent_row(self.table, self.row, relation, parent)
    }

    pub fn set_row_error(&mut self, error: Option<&str>) -> Result<()> {
        self.ds.set_row_error(self.table, self.row, error)
    }

    pub fn set_column_error(&mut self, column: impl ColumnSelector, error: Option<&str>) -> Result<()> {
        let c = column.ordinal(self.ds.table(self.table)?)?;
        self.ds.set_column_error(self.table, self.row, c, error)
    }

    pub fn clear_errors(&mut self) -> Result<()> {
        self.ds.clear_errors(self.table, self.row)
    }
}

/// Read access to one view.
pub struct ViewRef<'a> {
    ds: &'a DataSet,
    view: &'a DataView,
}

impl<'a> ViewRef<'a> {
    pub fn id(&self) -> ViewId {
        self.view.id()
    }

    pub fn table(&self) -> TableId {
        self.view.table()
    }

    pub fn count(&self) -> usize {
        self.view.len()
    }

    pub fn row_id(&self, index: usize) -> Option<RowId> {
        self.view.row_at(index).map(|(r, _)| r)
    }

    pub fn row_ids(&self) -> Vec<RowId> {
        self.view.row_ids()
    }

    /// The row at `index`, read at the version the view shows.
    pub fn row(&self, index: usize) -> Result<RowRef<'a>> {
        let (id, _) = self.view.row_at(index).ok_or_else(|| out_of_range(index))?;
        self.ds.row(self.view.table(), id)
    }

    pub fn get(&self, index: usize, column: impl ColumnSelector) -> Result<Value> {
        let (id, version) = self.view.row_at(index).ok_or_else(|| out_of_range(index))?;
        self.ds.row(self.view.table(), id)?.get_version(column, version)
    }

    pub fn find(&self, key: &[Value]) -> Result<Option<usize>> {
        self.view.find(self.ds, key)
    }

    pub fn find_rows(&self, key: &[Value]) -> Result<Vec<RowId>> {
        self.view.find_rows(self.ds, key)
    }

    /// The sort order as text, `[col]` or `[col] DESC` joined by commas.
    pub fn sort(&self) -> String {
        format_sort(self.view.sort_keys())
    }

    pub fn row_filter(&self) -> Option<&'a str> {
        self.view.filter().map(Expression::text)
    }

    pub fn row_state_filter(&self) -> RowStateFilter {
        self.view.row_state_filter()
    }

    pub fn allow_new(&self) -> bool {
        self.view.allow_new
    }

    pub fn allow_edit(&self) -> bool {
        self.view.allow_edit
    }

    pub fn allow_delete(&self) -> bool {
        self.view.allow_delete
    }
}

fn out_of_range(index: usize) -> Error {
    Error::invalid_argument(format!("view index {} out of range", index))
}

/// Write access to one view.
pub struct ViewMut<'a> {
    ds: &'a mut DataSet,
    id: ViewId,
}

impl<'a> ViewMut<'a> {
    pub fn read(&self) -> Result<ViewRef<'_>> {
        self.ds.view(self.id)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.read()?.count())
    }

    pub fn set_sort(&mut self, sort: &str) -> Result<()> {
        let keys = parse_sort(sort)?;
        self.ds.reconfigure(self.id, |v| v.replace_sort(keys), |v, old| {
            v.replace_sort(old);
        })
    }

    /// Sets the row filter. Empty text removes it.
    pub fn set_row_filter(&mut self, filter: &str) -> Result<()> {
        let expr = if filter.trim().is_empty() {
            None
        } else {
            Some(Expression::parse(filter)?)
        };
        self.ds.reconfigure(self.id, |v| v.replace_filter(expr), |v, old| {
            v.replace_filter(old);
        })
    }

    pub fn set_row_state_filter(&mut self, states: RowStateFilter) -> Result<()> {
        self.ds.reconfigure(self.id, |v| v.replace_states(states), |v, old| {
            v.replace_states(old);
        })
    }

    pub fn set_apply_default_sort(&mut self, apply: bool) -> Result<()> {
        self.ds.reconfigure(self.id, |v| v.replace_default_sort(apply), |v, old| {
            v.replace_default_sort(old);
        })
    }

    /// Points the view at another table, clearing its sort and filter.
    pub fn set_table(&mut self, table: TableId) -> Result<()> {
        self.ds.table(table)?;
        self.ds.cancel_view_row(self.id)?;
        self.ds.reconfigure(
            self.id,
            |v| {
                let sort = v.replace_sort(Vec::new());
                let filter = v.replace_filter(None);
                (v.replace_table(table), sort, filter)
            },
            |v, (old_table, sort, filter)| {
                v.replace_table(old_table);
                v.replace_sort(sort);
                v.replace_filter(filter);
            },
        )
    }

    pub fn set_allow_new(&mut self, allow: bool) -> Result<()> {
        self.ds.view_state(self.id)?.allow_new = allow;
        Ok(())
    }

    pub fn set_allow_edit(&mut self, allow: bool) -> Result<()> {
        self.ds.view_state(self.id)?.allow_edit = allow;
        Ok(())
    }

    pub fn set_allow_delete(&mut self, allow: bool) -> Result<()> {
        self.ds.view_state(self.id)?.allow_delete = allow;
        Ok(())
    }

    /// Starts a new row shown at the end of the view. Returns its index.
    pub fn add_new(&mut self) -> Result<usize> {
        self.ds.view_add_new(self.id)
    }

    /// Inserts the row started by [`ViewMut::add_new`].
    pub fn end_edit(&mut self) -> Result<()> {
        self.ds.commit_view_row(self.id)
    }

    /// Drops the row started by [`ViewMut::add_new`].
    pub fn cancel_edit(&mut self) -> Result<()> {
        self.ds.cancel_view_row(self.id)
    }

    pub fn set(&mut self, index: usize, column: impl ColumnSelector, value: impl Into<Value>) -> Result<()> {
        let view = self.ds.view_state(self.id)?;
        let (row, _) = view.row_at(index).ok_or_else(|| out_of_range(index))?;
        if !view.allow_edit && view.pending != Some(row) {
            return Err(Error::invalid_state("Cannot edit rows in this view"));
        }
        let t = view.table();
        let c = column.ordinal(self.ds.table(t)?)?;
        self.ds.set_value(t, row, c, value.into())
    }

    /// Deletes the row at `index`. A row started by `add_new` is dropped.
    pub fn delete(&mut self, index: usize) -> Result<()> {
        let view = self.ds.view_state(self.id)?;
        if !view.allow_delete {
            return Err(Error::invalid_state("Cannot delete rows from this view"));
        }
        let (row, _) = view.row_at(index).ok_or_else(|| out_of_range(index))?;
        let t = view.table();
        if view.pending == Some(row) {
            return self.ds.cancel_view_row(self.id);
        }
        self.ds.delete_row(t, row)
    }

    pub fn subscribe<F>(&mut self, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&ListChanged) + 'static,
    {
        Ok(self.ds.view_state(self.id)?.subscribe(callback))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<bool> {
        Ok(self.ds.view_state(self.id)?.unsubscribe(id))
    }
}

impl DataSet {
    pub fn row(&self, t: TableId, id: RowId) -> Result<RowRef<'_>> {
        let table = self.table(t)?;
        let row = table.get_row(id)?;
        Ok(RowRef {
            ds: self,
            table,
            row,
        })
    }

    pub fn row_mut(&mut self, t: TableId, id: RowId) -> Result<RowMut<'_>> {
        self.table(t)?.get_row(id)?;
        Ok(RowMut {
            ds: self,
            table: t,
            row: id,
        })
    }

    /// Rows of a table in table order, at their default version.
    pub fn rows(&self, t: TableId) -> Result<Vec<RowRef<'_>>> {
        let table = self.table(t)?;
        Ok(table
            .rows()
            .map(|row| RowRef {
                ds: self,
                table,
                row,
            })
            .collect())
    }

    /// Creates a view showing the current rows of `t` in table order.
    pub fn create_view(&mut self, t: TableId) -> Result<ViewId> {
        self.create_view_with(t, None, None, RowStateFilter::CURRENT_ROWS)
    }

    pub fn create_view_with(
        &mut self,
        t: TableId,
        filter: Option<&str>,
        sort: Option<&str>,
        states: RowStateFilter,
    ) -> Result<ViewId> {
        self.table(t)?;
        let id = ViewId(self.next_view);
        let mut view = DataView::new(id, t);
        if let Some(text) = filter.filter(|f| !f.trim().is_empty()) {
            view.replace_filter(Some(Expression::parse(text)?));
        }
        if let Some(text) = sort {
            view.replace_sort(parse_sort(text)?);
        }
        view.replace_states(states);
        let entries = view.build(self, true)?;
        view.set_entries(entries);
        self.next_view += 1;
        tracing::debug!(view = id.0, table = t.0, "create view");
        self.views.insert(id, view);
        Ok(id)
    }

    pub fn view(&self, id: ViewId) -> Result<ViewRef<'_>> {
        let view = self.views.get(&id).ok_or_else(|| view_not_found(id))?;
        Ok(ViewRef { ds: self, view })
    }

    pub fn view_mut(&mut self, id: ViewId) -> Result<ViewMut<'_>> {
        self.views.get(&id).ok_or_else(|| view_not_found(id))?;
        Ok(ViewMut { ds: self, id })
    }

    /// Drops a view, discarding a row started through it.
    pub fn drop_view(&mut self, id: ViewId) -> Result<()> {
        self.cancel_view_row(id)?;
        self.views.remove(&id);
        Ok(())
    }

    fn view_state(&mut self, id: ViewId) -> Result<&mut DataView> {
        self.views.get_mut(&id).ok_or_else(|| view_not_found(id))
    }

    /// Applies a configuration change and rebuilds. On an evaluation error
    /// the change is undone and the error returned.
    fn reconfigure<S>(
        &mut self,
        id: ViewId,
        apply: impl FnOnce(&mut DataView) -> S,
        undo: impl FnOnce(&mut DataView, S),
    ) -> Result<()> {
        let mut view = self.views.remove(&id).ok_or_else(|| view_not_found(id))?;
        let saved = apply(&mut view);
        let result = match view.build(self, true) {
            Ok(entries) => {
                view.set_entries(entries);
                view.emit(ListChanged::reset());
                Ok(())
            }
            Err(e) => {
                undo(&mut view, saved);
                Err(e)
            }
        };
        self.views.insert(id, view);
        result
    }

    fn view_add_new(&mut self, id: ViewId) -> Result<usize> {
        let view = self.view_state(id)?;
        if !view.allow_new {
            return Err(Error::invalid_state("Cannot add new rows to this view"));
        }
        if view.pending.is_some() {
            self.commit_view_row(id)?;
        }
        let t = self.view_state(id)?.table();
        let row = self.new_row(t)?;
        let view = self.view_state(id)?;
        view.pending = Some(row);
        let index = view.len() - 1;
        view.emit(ListChanged::added(index));
        Ok(index)
    }

    fn commit_view_row(&mut self, id: ViewId) -> Result<()> {
        let view = self.view_state(id)?;
        let (t, pending) = (view.table(), view.pending);
        match pending {
            Some(row) => self.insert_row(t, row),
            None => Ok(()),
        }
    }

    fn cancel_view_row(&mut self, id: ViewId) -> Result<()> {
        let view = self.view_state(id)?;
        let Some(row) = view.pending.take() else {
            return Ok(());
        };
        let index = view.len();
        let t = view.table();
        view.emit(ListChanged::deleted(index));
        self.table_mut(t)?.take_detached(row);
        Ok(())
    }
}

fn view_not_found(id: ViewId) -> Error {
    Error::invalid_argument(format!("view {} does not exist", id.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::RefCell;
    use tabula_core::schema::TableBuilder;
    use tabula_core::DataType;
    use tabula_reactive::ListChangedKind;

    fn people() -> (DataSet, TableId) {
        let mut ds = DataSet::new("ds");
        let schema = TableBuilder::new("people")
            .unwrap()
            .add_column("age", DataType::Int32)
            .unwrap()
            .add_column("name", DataType::String)
            .unwrap()
            .build()
            .unwrap();
        let t = ds.add_table(Table::new(schema).unwrap()).unwrap();
        (ds, t)
    }

    #[test]
    fn test_column_selector() {
        let (ds, t) = people();
        let table = ds.table(t).unwrap();
        assert_eq!("NAME".ordinal(table).unwrap(), 1);
        assert_eq!(1usize.ordinal(table).unwrap(), 1);
        assert!(2usize.ordinal(table).is_err());
        assert!(matches!(
            "missing".ordinal(table),
            Err(Error::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_row_mut_edit_scope() {
        let (mut ds, t) = people();
        let id = ds.add_row(t, vec![Value::Int32(1), Value::from("a")]).unwrap();
        ds.accept_changes().unwrap();
        let mut row = ds.row_mut(t, id).unwrap();
        row.begin_edit().unwrap();
        row.set("age", 5).unwrap();
        assert_eq!(row.get("age").unwrap(), Value::Int32(5));
        row.cancel_edit().unwrap();
        assert_eq!(row.get("age").unwrap(), Value::Int32(1));
        assert_eq!(row.state().unwrap(), RowState::Unchanged);
    }

    #[test]
    fn test_view_add_new_then_cancel() {
        let (mut ds, t) = people();
        ds.add_row(t, vec![Value::Int32(1), Value::from("a")]).unwrap();
        let v = ds.create_view(t).unwrap();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let mut view = ds.view_mut(v).unwrap();
        view.subscribe(move |e| sink.borrow_mut().push(*e)).unwrap();
        let index = view.add_new().unwrap();
        assert_eq!(index, 1);
        assert_eq!(view.count().unwrap(), 2);
        view.cancel_edit().unwrap();
        assert_eq!(view.count().unwrap(), 1);
        assert_eq!(ds.table(t).unwrap().len(), 1);
        assert_eq!(
            events.borrow().as_slice(),
            &[ListChanged::added(1), ListChanged::deleted(1)]
        );
    }

    #[test]
    fn test_view_tracks_single_row_edits() {
        let (mut ds, t) = people();
        let a = ds.add_row(t, vec![Value::Int32(40), Value::from("B")]).unwrap();
        ds.add_row(t, vec![Value::Int32(50), Value::from("C")]).unwrap();
        let v = ds
            .create_view_with(t, Some("age > 30"), Some("name"), RowStateFilter::CURRENT_ROWS)
            .unwrap();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        ds.view_mut(v)
            .unwrap()
            .subscribe(move |e| sink.borrow_mut().push(e.kind))
            .unwrap();

        ds.set_value(t, a, 1, Value::from("D")).unwrap();
        assert_eq!(ds.view(v).unwrap().get(1, "name").unwrap(), Value::from("D"));
        ds.set_value(t, a, 0, Value::Int32(10)).unwrap();
        assert_eq!(ds.view(v).unwrap().count(), 1);
        assert_eq!(
            events.borrow().as_slice(),
            &[ListChangedKind::ItemMoved, ListChangedKind::ItemDeleted]
        );
    }

    #[test]
    fn test_view_flags() {
        let (mut ds, t) = people();
        ds.add_row(t, vec![Value::Int32(1), Value::from("a")]).unwrap();
        let v = ds.create_view(t).unwrap();
        let mut view = ds.view_mut(v).unwrap();
        view.set_allow_delete(false).unwrap();
        assert!(matches!(view.delete(0), Err(Error::InvalidState { .. })));
        view.set_allow_new(false).unwrap();
        assert!(view.add_new().is_err());
        view.set_allow_edit(false).unwrap();
        assert!(view.set(0, "age", 3).is_err());
    }
}

//! The data set: tables, relations and views, and the change pipeline.
//!
//! Every mutation that can touch more than one row runs inside
//! [`DataSet::run`]. The first call opens a [`Journal`]; nested calls share
//! it. When the outermost call fails, every row the journal imaged is put
//! back and nothing is published. When it succeeds, tables and views are
//! told what changed.

use crate::journal::{Cascade, Journal};
use crate::relation::Relation;
use crate::settings::DataSetOptions;
use crate::table::Table;
use crate::view::{DataView, ViewId};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use tabula_core::schema::{names_match, TableBuilder, TableId};
use tabula_core::{Error, Result, RowId};
use tabula_reactive::{ListChanged, SubscriptionId};

/// A named collection of tables, relations and views.
pub struct DataSet {
    pub(crate) name: String,
    pub(crate) options: DataSetOptions,
    pub(crate) tables: Vec<Table>,
    pub(crate) relations: Vec<Relation>,
    pub(crate) views: BTreeMap<ViewId, DataView>,
    pub(crate) next_table: u32,
    pub(crate) next_relation: u32,
    pub(crate) next_view: u32,
    pub(crate) journal: Option<Journal>,
}

impl core::fmt::Debug for DataSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DataSet")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("tables", &self.tables)
            .field("relations", &self.relations.len())
            .field("views", &self.views.len())
            .finish()
    }
}

impl Default for DataSet {
    fn default() -> Self {
        Self::new("NewDataSet")
    }
}

impl DataSet {
    /// Creates an empty data set with default options.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, DataSetOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: DataSetOptions) -> Self {
        Self {
            name: name.into(),
            options,
            tables: Vec::new(),
            relations: Vec::new(),
            views: BTreeMap::new(),
            next_table: 1,
            next_relation: 1,
            next_view: 1,
            journal: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[inline]
    pub fn options(&self) -> &DataSetOptions {
        &self.options
    }

    #[inline]
    pub fn case_sensitive(&self) -> bool {
        self.options.case_sensitive
    }

    #[inline]
    pub fn enforce_constraints(&self) -> bool {
        self.options.enforce_constraints
    }

    #[inline]
    pub fn locale(&self) -> &str {
        &self.options.locale
    }

    /// Sets the locale of every table that did not choose its own.
    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.options.locale = locale.into();
        self.propagate_settings();
    }

    pub(crate) fn propagate_settings(&mut self) {
        let options = self.options.clone();
        for table in &mut self.tables {
            let settings = table.settings().resolve(&options);
            table.set_settings(settings);
        }
    }

    // ---- tables ------------------------------------------------------

    /// Adds a table, returning its id.
    pub fn add_table(&mut self, mut table: Table) -> Result<TableId> {
        TableBuilder::check_naming_rules(table.name())?;
        let cs = self.options.case_sensitive;
        if self
            .tables
            .iter()
            .any(|t| t.name() == table.name() || (!cs && names_match(t.name(), table.name(), false)))
        {
            return Err(Error::DuplicateTable(table.name().into()));
        }
        let id = TableId(self.next_table);
        self.next_table += 1;
        table.set_id(id);
        table.set_settings(table.settings().resolve(&self.options));
        tracing::debug!(table = table.name(), "add table");
        self.tables.push(table);
        Ok(id)
    }

    /// Removes a table that no relation or foreign key refers to.
    pub fn remove_table(&mut self, name: &str) -> Result<()> {
        let id = self.table_id(name)?;
        if self
            .relations
            .iter()
            .any(|r| r.parent_table == id || r.child_table == id)
        {
            return Err(Error::invalid_argument(format!(
                "Cannot remove table '{}' because it is referenced in a relation",
                name
            )));
        }
        let referenced = self
            .tables
            .iter()
            .filter(|t| t.id() != id)
            .any(|t| t.schema().foreign_keys().any(|(_, fk)| fk.parent_table == id));
        if referenced {
            return Err(Error::invalid_argument(format!(
                "Cannot remove table '{}' because a foreign key refers to it",
                name
            )));
        }
        self.views.retain(|_, v| v.table() != id);
        self.tables.retain(|t| t.id() != id);
        tracing::debug!(table = name, "remove table");
        Ok(())
    }

    /// Resolves a table name: exact match first, then a single
    /// case-insensitive match.
    pub fn table_id(&self, name: &str) -> Result<TableId> {
        if let Some(t) = self.tables.iter().find(|t| t.name() == name) {
            return Ok(t.id());
        }
        let mut found = self.tables.iter().filter(|t| names_match(t.name(), name, false));
        match (found.next(), found.next()) {
            (Some(t), None) => Ok(t.id()),
            (Some(_), Some(_)) => Err(Error::invalid_argument(format!(
                "Table name '{}' is ambiguous",
                name
            ))),
            _ => Err(Error::table_not_found(name)),
        }
    }

    pub fn table(&self, id: TableId) -> Result<&Table> {
        self.tables
            .iter()
            .find(|t| t.id() == id)
            .ok_or_else(|| Error::table_not_found(format!("{}", id)))
    }

    pub(crate) fn table_mut(&mut self, id: TableId) -> Result<&mut Table> {
        self.tables
            .iter_mut()
            .find(|t| t.id() == id)
            .ok_or_else(|| Error::table_not_found(format!("{}", id)))
    }

    /// Looks up a table by name.
    pub fn table_by_name(&self, name: &str) -> Result<&Table> {
        self.table_id(name).and_then(|id| self.table(id))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(Table::name).collect()
    }

    /// Overrides the case rule of one table.
    pub fn set_table_case_sensitive(&mut self, t: TableId, case_sensitive: bool) -> Result<()> {
        let settings = self.table(t)?.settings().clone().with_case_sensitive(case_sensitive);
        self.check_case_change(t, case_sensitive)?;
        self.table_mut(t)?.set_settings(settings);
        self.structure_changed(t, ListChanged::reset());
        Ok(())
    }

    /// Overrides the locale of one table.
    pub fn set_table_locale(&mut self, t: TableId, locale: &str) -> Result<()> {
        let table = self.table_mut(t)?;
        let settings = table.settings().clone().with_locale(locale);
        table.set_settings(settings);
        Ok(())
    }

    /// Changes the data set wide case rule. Tables that chose their own
    /// rule keep it. Fails without changing anything if an enforced unique
    /// constraint would be violated under the new rule.
    pub fn set_case_sensitive(&mut self, case_sensitive: bool) -> Result<()> {
        if case_sensitive == self.options.case_sensitive {
            return Ok(());
        }
        let affected: Vec<TableId> = self
            .tables
            .iter()
            .filter(|t| !t.settings().is_case_explicit())
            .map(Table::id)
            .collect();
        for &t in &affected {
            self.check_case_change(t, case_sensitive)?;
        }
        self.options.case_sensitive = case_sensitive;
        self.propagate_settings();
        for t in affected {
            self.structure_changed(t, ListChanged::reset());
        }
        Ok(())
    }

    /// Subscribes to the row and column notifications of a table.
    pub fn subscribe_table<F>(&mut self, t: TableId, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&ListChanged) + 'static,
    {
        Ok(self.table_mut(t)?.subscribe(callback))
    }

    pub fn unsubscribe_table(&mut self, t: TableId, id: SubscriptionId) -> Result<bool> {
        Ok(self.table_mut(t)?.unsubscribe(id))
    }

    // ---- relations ---------------------------------------------------

    /// Resolves a relation name: exact match first, then a single
    /// case-insensitive match.
    pub fn relation(&self, name: &str) -> Result<&Relation> {
        if let Some(r) = self.relations.iter().find(|r| r.name == name) {
            return Ok(r);
        }
        let mut found = self.relations.iter().filter(|r| names_match(&r.name, name, false));
        match (found.next(), found.next()) {
            (Some(r), None) => Ok(r),
            (Some(_), Some(_)) => Err(Error::invalid_argument(format!(
                "Relation name '{}' is ambiguous",
                name
            ))),
            _ => Err(Error::RelationNotFound(name.into())),
        }
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    /// Relations in which `t` is the parent.
    pub fn child_relations(&self, t: TableId) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(move |r| r.parent_table == t)
    }

    /// Relations in which `t` is the child.
    pub fn parent_relations(&self, t: TableId) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(move |r| r.child_table == t)
    }

    // ---- whole data set ----------------------------------------------

    /// Returns true if any row is Added, Modified or Deleted, or only rows
    /// in the states `filter` selects.
    pub fn has_changes(&self, filter: Option<crate::RowStateFilter>) -> bool {
        self.tables.iter().any(|t| {
            t.rows().any(|r| {
                r.state().is_changed() && filter.map_or(true, |f| f.admits(r.state()))
            })
        })
    }

    /// Returns true if any row carries a row or column error.
    pub fn has_errors(&self) -> bool {
        self.tables.iter().any(|t| t.rows().any(|r| r.has_errors()))
    }

    /// Returns true if any row of one table carries an error.
    pub fn table_has_errors(&self, t: TableId) -> Result<bool> {
        Ok(self.table(t)?.rows().any(|r| r.has_errors()))
    }

    /// Removes every row of every table, ignoring foreign keys.
    pub fn clear(&mut self) -> Result<()> {
        self.run(|ds| {
            let ids: Vec<TableId> = ds.tables.iter().map(Table::id).collect();
            for t in ids {
                ds.remove_all_rows(t)?;
            }
            Ok(())
        })
    }

    /// Drops every table, relation and view.
    pub fn reset(&mut self) {
        self.views.clear();
        self.relations.clear();
        self.tables.clear();
        tracing::debug!(dataset = self.name.as_str(), "reset");
    }

    pub(crate) fn remove_all_rows(&mut self, t: TableId) -> Result<()> {
        let ids = self.table(t)?.row_ids();
        for id in &ids {
            self.touch(t, *id);
        }
        self.table_mut(t)?.clear_rows();
        Ok(())
    }

    // ---- change pipeline ---------------------------------------------

    /// Runs `f` as one atomic unit.
    pub(crate) fn run<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if self.journal.is_some() {
            return f(self);
        }
        self.journal = Some(Journal::new());
        let result = f(self);
        let journal = self.journal.take().unwrap_or_default();
        match result {
            Ok(value) => {
                self.publish(&journal);
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, "rolling back failed operation");
                journal.rollback(&mut self.tables);
                Err(e)
            }
        }
    }

    /// Images a row in the open journal.
    pub(crate) fn touch(&mut self, t: TableId, row: RowId) {
        if let Some(journal) = self.journal.as_mut() {
            if let Some(table) = self.tables.iter().find(|x| x.id() == t) {
                journal.record(table, row);
            }
        }
    }

    pub(crate) fn touch_counters(&mut self, t: TableId) {
        if let Some(journal) = self.journal.as_mut() {
            if let Some(table) = self.tables.iter().find(|x| x.id() == t) {
                journal.record_counters(table);
            }
        }
    }

    /// Guards a row against re-entry in a cascade cycle.
    pub(crate) fn enter(&mut self, op: Cascade, t: TableId, row: RowId) -> bool {
        self.journal.as_mut().map_or(true, |j| j.enter(op, t, row))
    }

    pub(crate) fn leave(&mut self, op: Cascade, t: TableId, row: RowId) {
        if let Some(j) = self.journal.as_mut() {
            j.leave(op, t, row);
        }
    }

    /// Publishes a change of a table's shape.
    pub(crate) fn structure_changed(&mut self, t: TableId, event: ListChanged) {
        let record = |journal: &mut Journal| {
            if event.is_reset() {
                journal.mark_structural(t);
            } else {
                journal.push_column_event(t, event);
            }
        };
        if let Some(journal) = self.journal.as_mut() {
            record(journal);
            return;
        }
        let mut journal = Journal::new();
        record(&mut journal);
        self.publish(&journal);
    }

    fn publish(&mut self, journal: &Journal) {
        if journal.is_empty() {
            return;
        }
        for t in journal.tables() {
            let Ok(table) = self.table(t) else {
                continue;
            };
            if journal.is_structural(t) {
                let mut forwarded = false;
                for event in journal.column_events(t) {
                    table.notify(event);
                    forwarded = true;
                }
                if !forwarded {
                    table.notify(&ListChanged::reset());
                }
            } else if let Some(event) = table_event(table, journal, t) {
                table.notify(&event);
            }
        }
        self.refresh_views(Some(journal));
    }

    /// Brings every view up to date, emitting view notifications.
    pub(crate) fn refresh_views(&mut self, journal: Option<&Journal>) {
        let mut views = core::mem::take(&mut self.views);
        for view in views.values_mut() {
            view.refresh(self, journal);
        }
        self.views = views;
    }

    /// Records `error` as the row error of one row.
    pub(crate) fn flag_row(&mut self, t: TableId, row: RowId, error: &Error) {
        if let Ok(table) = self.table_mut(t) {
            let message = format!("{}", error);
            let _ = table.with_row(row, |r| r.set_error(Some(message)));
        }
    }
}

/// The single event describing the row changes of one table, if any.
fn table_event(table: &Table, journal: &Journal, t: TableId) -> Option<ListChanged> {
    let visible: Vec<_> = journal
        .entries_for(t)
        .filter(|e| e.before.position().is_some() || table.is_attached(e.row))
        .collect();
    match visible.as_slice() {
        [] => None,
        [entry] => match (entry.before.position(), table.position(entry.row)) {
            (None, Some(pos)) => Some(ListChanged::added(pos)),
            (Some(pos), None) => Some(ListChanged::deleted(pos)),
            (Some(_), Some(pos)) => Some(ListChanged::changed(pos)),
            (None, None) => None,
        },
        _ => Some(ListChanged::reset()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::RefCell;
    use tabula_core::schema::{Column, TableBuilder};
    use tabula_core::{DataType, Value};
    use tabula_reactive::ListChangedKind;

    fn people() -> Table {
        let schema = TableBuilder::new("People")
            .unwrap()
            .column(Column::new("id", DataType::Int32))
            .unwrap()
            .add_column("name", DataType::String)
            .unwrap()
            .add_primary_key(&["id"])
            .unwrap()
            .build()
            .unwrap();
        Table::new(schema).unwrap()
    }

    #[test]
    fn test_table_registry() {
        let mut ds = DataSet::new("ds");
        let id = ds.add_table(people()).unwrap();
        assert_eq!(ds.table_id("people").unwrap(), id);
        assert!(matches!(ds.add_table(people()), Err(Error::DuplicateTable(_))));
        ds.remove_table("PEOPLE").unwrap();
        assert!(matches!(ds.table_id("People"), Err(Error::TableNotFound(_))));
    }

    #[test]
    fn test_failed_run_rolls_back_and_stays_silent() {
        let mut ds = DataSet::new("ds");
        let t = ds.add_table(people()).unwrap();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        ds.subscribe_table(t, move |e| sink.borrow_mut().push(e.kind)).unwrap();

        let result: Result<()> = ds.run(|ds| {
            ds.add_row(t, vec![Value::Int32(1), Value::from("a")])?;
            ds.add_row(t, vec![Value::Int32(1), Value::from("b")])?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::UniqueViolation { .. })));
        assert!(ds.table(t).unwrap().is_empty());
        assert!(events.borrow().is_empty());

        ds.add_row(t, vec![Value::Int32(1), Value::from("a")]).unwrap();
        assert_eq!(events.borrow().as_slice(), &[ListChangedKind::ItemAdded]);
    }

    #[test]
    fn test_clear_emits_reset() {
        let mut ds = DataSet::new("ds");
        let t = ds.add_table(people()).unwrap();
        ds.add_row(t, vec![Value::Int32(1), Value::Null]).unwrap();
        ds.add_row(t, vec![Value::Int32(2), Value::Null]).unwrap();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        ds.subscribe_table(t, move |e| sink.borrow_mut().push(e.kind)).unwrap();
        ds.clear().unwrap();
        assert!(ds.table(t).unwrap().is_empty());
        assert_eq!(events.borrow().as_slice(), &[ListChangedKind::Reset]);
    }

    #[test]
    fn test_case_change_rejected_on_duplicates() {
        let mut ds = DataSet::with_options("ds", DataSetOptions::default().case_sensitive(true));
        let schema = TableBuilder::new("codes")
            .unwrap()
            .column(Column::new("code", DataType::String).unique(true))
            .unwrap()
            .build()
            .unwrap();
        let t = ds.add_table(Table::new(schema).unwrap()).unwrap();
        ds.add_row(t, vec![Value::from("a")]).unwrap();
        ds.add_row(t, vec![Value::from("A")]).unwrap();
        assert!(matches!(
            ds.set_case_sensitive(false),
            Err(Error::UniqueViolation { .. })
        ));
        assert!(ds.case_sensitive());
    }
}

//! Row mutation: insertion, edits, deletion and change acceptance.
//!
//! Every public operation runs inside [`DataSet::run`], so a failure at any
//! depth of a cascade puts every touched row back. Internal `*_inner`
//! functions assume an open journal and call [`DataSet::touch`] before they
//! change a row.

use crate::constraint::ConstraintChecker;
use crate::context::{is_live, key_values};
use crate::dataset::DataSet;
use crate::journal::Cascade;
use crate::table::Table;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use tabula_core::schema::{AcceptRejectRule, ForeignKeyConstraint, Rule, TableId};
use tabula_core::{next_row_id, Error, Result, Row, RowEvent, RowId, RowState, RowVersion, Value};
use tabula_index::tuple_key;

/// Child rows to rewrite after a parent key changed or went away.
struct Rewrite {
    table: TableId,
    rows: Vec<RowId>,
    columns: Vec<usize>,
    values: Vec<Value>,
}

/// Coerces `value` to the type of `column` and checks its length.
pub(crate) fn coerce_value(table: &Table, column: usize, value: Value) -> Result<Value> {
    let col = table.schema().column(column).ok_or_else(|| {
        Error::invalid_argument(format!(
            "column ordinal {} out of range for table '{}'",
            column,
            table.name()
        ))
    })?;
    let coerced = value.coerce_to(col.data_type()).ok_or_else(|| Error::InvalidCast {
        column: col.name().into(),
        value: format!("{}", value),
        expected: col.data_type(),
    })?;
    check_length(table, column, &coerced)?;
    Ok(coerced)
}

fn check_length(table: &Table, column: usize, value: &Value) -> Result<()> {
    let col = &table.schema().columns()[column];
    if let (Some(max), Some(s)) = (col.max_len(), value.as_str()) {
        let length = s.chars().count();
        if length > max {
            return Err(Error::MaxLengthExceeded {
                table: table.name().into(),
                column: col.name().into(),
                max_length: max,
                length,
            });
        }
    }
    Ok(())
}

fn column_name(table: &Table, column: usize) -> String {
    table
        .schema()
        .column(column)
        .map_or_else(String::new, |c| c.name().into())
}

impl DataSet {
    // ---- creation ----------------------------------------------------

    /// Creates a detached row holding generated and default values.
    pub fn new_row(&mut self, t: TableId) -> Result<RowId> {
        let table = self.table_mut(t)?;
        let row = Row::detached(next_row_id(), table.initial_values()?);
        let id = row.id();
        table.insert_detached(row);
        Ok(id)
    }

    /// Inserts a row created by [`DataSet::new_row`].
    pub fn insert_row(&mut self, t: TableId, id: RowId) -> Result<()> {
        self.run(|ds| {
            let table = ds.table(t)?;
            if table.is_attached(id) {
                return Err(Error::invalid_argument(format!(
                    "row {} already belongs to table '{}'",
                    id,
                    table.name()
                )));
            }
            if !table.is_detached(id) {
                return Err(table.missing(id));
            }
            ds.touch(t, id);
            ds.touch_counters(t);
            let table = ds.table_mut(t)?;
            let mut row = table.take_detached(id).ok_or_else(|| table.missing(id))?;
            row.cancel_edit();
            ds.attach_new(t, row)
        })
    }

    /// Adds a row built from `values`, in column order.
    ///
    /// Missing or null values take the generated or default value of their
    /// column. A non-null value for a computed column is rejected.
    pub fn add_row(&mut self, t: TableId, values: Vec<Value>) -> Result<RowId> {
        self.run(|ds| ds.add_row_inner(t, values))
    }

    pub(crate) fn add_row_inner(&mut self, t: TableId, values: Vec<Value>) -> Result<RowId> {
        self.touch_counters(t);
        let table = self.table_mut(t)?;
        let width = table.schema().width();
        if values.len() > width {
            return Err(Error::invalid_argument(format!(
                "{} values given for the {} columns of table '{}'",
                values.len(),
                width,
                table.name()
            )));
        }
        let mut given = values.into_iter();
        let mut full = Vec::with_capacity(width);
        for c in 0..width {
            let value = match given.next().filter(|v| !v.is_null()) {
                Some(v) => {
                    if table.expression(c).is_some() {
                        return Err(Error::read_only(table.name(), column_name(table, c)));
                    }
                    coerce_value(table, c, v)?
                }
                None => match table.generate(c)? {
                    Some(v) => v,
                    None => table.schema().columns()[c].initial_value(),
                },
            };
            full.push(value);
        }
        let row = Row::detached(next_row_id(), full);
        let id = row.id();
        self.touch(t, id);
        self.attach_new(t, row)?;
        Ok(id)
    }

    fn attach_new(&mut self, t: TableId, mut row: Row) -> Result<()> {
        let values = row.values(RowVersion::Proposed)?;
        ConstraintChecker::check_values(self, t, row.id(), &values, None)?;
        let table = self.table_mut(t)?;
        for (c, value) in values.iter().enumerate() {
            if !value.is_null() {
                table.advance_generated(c, value);
            }
        }
        row.set_order(table.take_order());
        row.apply(RowEvent::Insert)?;
        tracing::trace!(table = table.name(), row = row.id(), "insert row");
        table.attach(row);
        Ok(())
    }

    // ---- edits -------------------------------------------------------

    /// Writes one cell. Outside an edit scope the write is committed at
    /// once, with the same checks as [`DataSet::end_edit`].
    pub fn set_value(&mut self, t: TableId, id: RowId, column: usize, value: Value) -> Result<()> {
        self.run(|ds| ds.set_value_inner(t, id, column, value, false))
    }

    pub(crate) fn set_value_inner(
        &mut self,
        t: TableId,
        id: RowId,
        column: usize,
        value: Value,
        bypass_read_only: bool,
    ) -> Result<()> {
        let table = self.table(t)?;
        let row = table.get_row(id)?;
        if row.state() == RowState::Deleted {
            return Err(Error::DeletedRowInaccessible { row: id });
        }
        let col = table.schema().column(column).ok_or_else(|| {
            Error::invalid_argument(format!(
                "column ordinal {} out of range for table '{}'",
                column,
                table.name()
            ))
        })?;
        let value = value.coerce_to(col.data_type()).ok_or_else(|| Error::InvalidCast {
            column: col.name().into(),
            value: format!("{}", value),
            expected: col.data_type(),
        })?;
        let computed = table.expression(column).is_some();
        if value.is_null() && !col.allows_null() && !computed && table.enforce_constraints() {
            return Err(Error::null_violation(table.name(), col.name()));
        }
        check_length(table, column, &value)?;
        if computed {
            return Err(Error::read_only(table.name(), col.name()));
        }
        let detached = row.state() == RowState::Detached;
        if col.is_read_only() && !bypass_read_only && !detached {
            return Err(Error::read_only(table.name(), col.name()));
        }
        let editing = row.is_editing();
        self.touch(t, id);
        let table = self.table_mut(t)?;
        if detached || editing {
            return table.with_row(id, |r| r.set_proposed(column, value));
        }
        table.with_row(id, |r| {
            r.begin_edit();
            r.set_proposed(column, value);
        })?;
        self.end_edit_inner(t, id)
    }

    /// Opens an edit scope on a row.
    pub fn begin_edit(&mut self, t: TableId, id: RowId) -> Result<()> {
        let table = self.table_mut(t)?;
        if table.get_row(id)?.state() == RowState::Deleted {
            return Err(Error::DeletedRowInaccessible { row: id });
        }
        table.with_row(id, Row::begin_edit)
    }

    /// Discards the open edit scope of a row.
    pub fn cancel_edit(&mut self, t: TableId, id: RowId) -> Result<()> {
        self.table_mut(t)?.with_row(id, Row::cancel_edit)
    }

    /// Validates and commits the open edit scope of a row.
    pub fn end_edit(&mut self, t: TableId, id: RowId) -> Result<()> {
        self.run(|ds| ds.end_edit_inner(t, id))
    }

    pub(crate) fn end_edit_inner(&mut self, t: TableId, id: RowId) -> Result<()> {
        let table = self.table(t)?;
        let row = table.get_row(id)?;
        if !row.is_editing() {
            return Ok(());
        }
        if row.state() == RowState::Detached {
            self.touch(t, id);
            return self.table_mut(t)?.with_row(id, Row::commit_proposed);
        }
        if !row.is_touched() {
            self.touch(t, id);
            return self.table_mut(t)?.with_row(id, Row::cancel_edit);
        }
        let proposed = row.values(RowVersion::Proposed)?;
        let current = row.values(RowVersion::Current)?;
        let changed: Vec<usize> = (0..proposed.len())
            .filter(|&c| proposed[c] != current[c])
            .collect();
        ConstraintChecker::check_values(self, t, id, &proposed, Some(&changed))?;
        let rewrites = self.update_rewrites(t, id, &current, &proposed, &changed)?;
        self.touch(t, id);
        self.table_mut(t)?
            .with_row(id, |r| {
                r.commit_proposed();
                r.apply(RowEvent::Edit)
            })??;
        self.apply_rewrites(rewrites)
    }

    /// Child rewrites required by a change of parent key columns.
    fn update_rewrites(
        &self,
        t: TableId,
        id: RowId,
        current: &[Value],
        proposed: &[Value],
        changed: &[usize],
    ) -> Result<Vec<Rewrite>> {
        let mut out = Vec::new();
        if changed.is_empty() {
            return Ok(out);
        }
        let cs = self.table(t)?.case_sensitive();
        for (child_t, fk) in self.referencing_fks(t) {
            if !fk.parent_columns.iter().any(|c| changed.contains(c)) {
                continue;
            }
            let pick = |values: &[Value]| -> Vec<Value> {
                fk.parent_columns.iter().map(|&c| values[c].clone()).collect()
            };
            let old_key = pick(current);
            let new_key = pick(proposed);
            if tuple_key(&old_key, cs) == tuple_key(&new_key, cs) {
                continue;
            }
            let rows = self.children_by_key(child_t, &fk, &old_key, cs, Some((t, id)))?;
            if rows.is_empty() {
                continue;
            }
            let values = match self.rule_values(child_t, &fk, fk.update_rule, new_key)? {
                Some(values) => values,
                None => {
                    if self.table(child_t)?.enforce_constraints() {
                        return Err(self.children_exist(t, child_t, &fk, "change the key of"));
                    }
                    continue;
                }
            };
            tracing::trace!(constraint = fk.name.as_str(), rows = rows.len(), "cascade update");
            out.push(Rewrite {
                table: child_t,
                rows,
                columns: fk.child_columns.clone(),
                values,
            });
        }
        Ok(out)
    }

    /// Values a rule writes into child key columns, or `None` for
    /// `Rule::None`.
    fn rule_values(
        &self,
        child_t: TableId,
        fk: &ForeignKeyConstraint,
        rule: Rule,
        new_key: Vec<Value>,
    ) -> Result<Option<Vec<Value>>> {
        let child = self.table(child_t)?;
        Ok(match rule {
            Rule::Cascade => Some(new_key),
            Rule::SetNull => Some(vec![Value::Null; fk.child_columns.len()]),
            Rule::SetDefault => Some(
                fk.child_columns
                    .iter()
                    .map(|&c| child.schema().columns()[c].initial_value())
                    .collect(),
            ),
            Rule::None => None,
        })
    }

    fn children_exist(&self, t: TableId, child_t: TableId, fk: &ForeignKeyConstraint, action: &str) -> Error {
        let parent = self.table(t).map_or("", |x| x.name());
        let child = self.table(child_t).map_or("", |x| x.name());
        Error::foreign_key(
            &fk.name,
            format!(
                "cannot {} a row of table '{}' because child rows exist in table '{}'",
                action, parent, child
            ),
        )
    }

    fn apply_rewrites(&mut self, rewrites: Vec<Rewrite>) -> Result<()> {
        for rw in rewrites {
            for row in rw.rows {
                let live = self
                    .table(rw.table)?
                    .row(row)
                    .map_or(false, is_live);
                if live {
                    self.write_columns(rw.table, row, &rw.columns, &rw.values)?;
                }
            }
        }
        Ok(())
    }

    /// Writes several cells as one edit, bypassing read-only flags.
    pub(crate) fn write_columns(
        &mut self,
        t: TableId,
        id: RowId,
        columns: &[usize],
        values: &[Value],
    ) -> Result<()> {
        let row = self.table(t)?.get_row(id)?;
        if row.state() == RowState::Deleted {
            return Err(Error::DeletedRowInaccessible { row: id });
        }
        let was_editing = row.is_editing();
        let detached = row.state() == RowState::Detached;
        self.touch(t, id);
        self.table_mut(t)?.with_row(id, |r| {
            r.begin_edit();
            for (&c, v) in columns.iter().zip(values) {
                r.set_proposed(c, v.clone());
            }
        })?;
        if was_editing {
            return Ok(());
        }
        if detached {
            return self.table_mut(t)?.with_row(id, Row::commit_proposed);
        }
        self.end_edit_inner(t, id)
    }

    // ---- relations ---------------------------------------------------

    /// Foreign keys, in any table, whose parent table is `t`.
    pub(crate) fn referencing_fks(&self, t: TableId) -> Vec<(TableId, ForeignKeyConstraint)> {
        self.tables
            .iter()
            .flat_map(|table| {
                table
                    .schema()
                    .foreign_keys()
                    .filter(|(_, fk)| fk.parent_table == t)
                    .map(move |(_, fk)| (table.id(), fk.clone()))
            })
            .collect()
    }

    /// Live rows of `child_t` whose child key equals `key`. `except`
    /// excludes a parent row from its own self-relation.
    fn children_by_key(
        &self,
        child_t: TableId,
        fk: &ForeignKeyConstraint,
        key: &[Value],
        case_sensitive: bool,
        except: Option<(TableId, RowId)>,
    ) -> Result<Vec<RowId>> {
        let Some(key) = tuple_key(key, case_sensitive) else {
            return Ok(Vec::new());
        };
        let child = self.table(child_t)?;
        Ok(child
            .live_rows()
            .filter(|r| except != Some((child_t, r.id())))
            .filter(|r| {
                key_values(r, &fk.child_columns, RowVersion::Current)
                    .ok()
                    .and_then(|v| tuple_key(&v, case_sensitive))
                    .map_or(false, |k| k == key)
            })
            .map(Row::id)
            .collect())
    }

    /// Rewrites the foreign key columns of a child row to point at
    /// `parent` under `relation`, or clears them.
    pub fn set_parent_row(
        &mut self,
        t: TableId,
        id: RowId,
        relation: &str,
        parent: Option<RowId>,
    ) -> Result<()> {
        self.run(|ds| {
            let rel = ds.relation(relation)?.clone();
            if rel.child_table != t {
                return Err(Error::invalid_argument(format!(
                    "relation '{}' does not have table '{}' as its child",
                    rel.name,
                    ds.table(t)?.name()
                )));
            }
            let values = match parent {
                Some(p) => {
                    let parent_table = ds.table(rel.parent_table)?;
                    let row = parent_table.get_row(p)?;
                    if !is_live(row) {
                        return Err(Error::invalid_argument(format!(
                            "row {} is not a live row of table '{}'",
                            p,
                            parent_table.name()
                        )));
                    }
                    key_values(row, &rel.parent_columns, RowVersion::Current)?
                }
                None => vec![Value::Null; rel.child_columns.len()],
            };
            ds.write_columns(t, id, &rel.child_columns, &values)
        })
    }

    // ---- deletion ----------------------------------------------------

    /// Deletes a row, applying the delete rule of every foreign key that
    /// refers to it. An Added row leaves the table at once.
    pub fn delete_row(&mut self, t: TableId, id: RowId) -> Result<()> {
        self.run(|ds| ds.delete_inner(t, id))
    }

    pub(crate) fn delete_inner(&mut self, t: TableId, id: RowId) -> Result<()> {
        match self.table(t)?.get_row(id)?.state() {
            RowState::Deleted => return Err(Error::DeletedRowInaccessible { row: id }),
            RowState::Detached => {
                return Err(Error::invalid_state(format!(
                    "row {} cannot be deleted before it is added to a table",
                    id
                )))
            }
            _ => {}
        }
        if !self.enter(Cascade::Delete, t, id) {
            return Ok(());
        }
        let result = self.delete_guarded(t, id);
        self.leave(Cascade::Delete, t, id);
        result
    }

    fn delete_guarded(&mut self, t: TableId, id: RowId) -> Result<()> {
        let cs = self.table(t)?.case_sensitive();
        let parent_values = self.table(t)?.get_row(id)?.values(RowVersion::Current)?;
        let mut rewrites = Vec::new();
        for (child_t, fk) in self.referencing_fks(t) {
            let key: Vec<Value> = fk.parent_columns.iter().map(|&c| parent_values[c].clone()).collect();
            let rows = self.children_by_key(child_t, &fk, &key, cs, Some((t, id)))?;
            if rows.is_empty() {
                continue;
            }
            match fk.delete_rule {
                Rule::Cascade => {
                    tracing::trace!(constraint = fk.name.as_str(), rows = rows.len(), "cascade delete");
                    for row in rows {
                        let live = self.table(child_t)?.row(row).map_or(false, is_live);
                        if live {
                            self.delete_inner(child_t, row)?;
                        }
                    }
                }
                Rule::None => {
                    if self.table(child_t)?.enforce_constraints() {
                        return Err(self.children_exist(t, child_t, &fk, "delete"));
                    }
                }
                rule => {
                    if let Some(values) = self.rule_values(child_t, &fk, rule, Vec::new())? {
                        rewrites.push(Rewrite {
                            table: child_t,
                            rows,
                            columns: fk.child_columns.clone(),
                            values,
                        });
                    }
                }
            }
        }
        self.touch(t, id);
        let table = self.table_mut(t)?;
        if table.get_row(id)?.state() == RowState::Added {
            table.detach(id);
        } else {
            table.with_row(id, |r| r.apply(RowEvent::Delete))??;
        }
        self.apply_rewrites(rewrites)
    }

    // ---- accept / reject ---------------------------------------------

    /// Commits the pending changes of one row.
    pub fn accept_row(&mut self, t: TableId, id: RowId) -> Result<()> {
        self.run(|ds| ds.accept_inner(t, id))
    }

    /// Reverts the pending changes of one row.
    pub fn reject_row(&mut self, t: TableId, id: RowId) -> Result<()> {
        self.run(|ds| ds.reject_inner(t, id))
    }

    pub(crate) fn accept_inner(&mut self, t: TableId, id: RowId) -> Result<()> {
        if !self.table(t)?.is_attached(id) || !self.enter(Cascade::Accept, t, id) {
            return Ok(());
        }
        let result = self.accept_guarded(t, id);
        self.leave(Cascade::Accept, t, id);
        result
    }

    fn accept_guarded(&mut self, t: TableId, id: RowId) -> Result<()> {
        if self.table(t)?.get_row(id)?.is_editing() {
            self.end_edit_inner(t, id)?;
        }
        let children = self.cascade_children(t, id)?;
        self.touch(t, id);
        let table = self.table_mut(t)?;
        if table.get_row(id)?.state() == RowState::Deleted {
            table.detach(id);
        } else {
            table.with_row(id, |r| r.apply(RowEvent::Accept))??;
        }
        for (child_t, child) in children {
            self.accept_inner(child_t, child)?;
        }
        Ok(())
    }

    pub(crate) fn reject_inner(&mut self, t: TableId, id: RowId) -> Result<()> {
        if !self.table(t)?.is_attached(id) || !self.enter(Cascade::Reject, t, id) {
            return Ok(());
        }
        let result = self.reject_guarded(t, id);
        self.leave(Cascade::Reject, t, id);
        result
    }

    fn reject_guarded(&mut self, t: TableId, id: RowId) -> Result<()> {
        let children = self.cascade_children(t, id)?;
        self.touch(t, id);
        let table = self.table_mut(t)?;
        table.with_row(id, Row::cancel_edit)?;
        if table.get_row(id)?.state() == RowState::Added {
            table.detach(id);
        } else {
            table.with_row(id, |r| r.apply(RowEvent::Reject))??;
            if table.enforce_constraints() {
                let values = table.get_row(id)?.values(RowVersion::Current)?;
                ConstraintChecker::check_unique(table, id, &values, None)?;
            }
        }
        for (child_t, child) in children {
            self.reject_inner(child_t, child)?;
        }
        Ok(())
    }

    /// Child rows reached through foreign keys whose accept/reject rule
    /// cascades. A deleted parent is matched on its Original key.
    fn cascade_children(&self, t: TableId, id: RowId) -> Result<Vec<(TableId, RowId)>> {
        let table = self.table(t)?;
        let row = table.get_row(id)?;
        let version = if row.state() == RowState::Deleted {
            RowVersion::Original
        } else {
            RowVersion::Current
        };
        let cs = table.case_sensitive();
        let mut out = Vec::new();
        for (child_t, fk) in self.referencing_fks(t) {
            if fk.accept_reject_rule != AcceptRejectRule::Cascade {
                continue;
            }
            let Some(key) = tuple_key(&key_values(row, &fk.parent_columns, version)?, cs) else {
                continue;
            };
            let child = self.table(child_t)?;
            for r in child.rows() {
                if (child_t, r.id()) == (t, id) {
                    continue;
                }
                let v = if r.state() == RowState::Deleted {
                    RowVersion::Original
                } else {
                    RowVersion::Current
                };
                let matches = key_values(r, &fk.child_columns, v)
                    .ok()
                    .and_then(|vals| tuple_key(&vals, cs))
                    .map_or(false, |k| k == key);
                if matches {
                    out.push((child_t, r.id()));
                }
            }
        }
        Ok(out)
    }

    /// Accepts every pending change of one table.
    pub fn accept_table_changes(&mut self, t: TableId) -> Result<()> {
        self.run(|ds| ds.accept_all_rows(t))
    }

    /// Rejects every pending change of one table.
    pub fn reject_table_changes(&mut self, t: TableId) -> Result<()> {
        self.run(|ds| ds.reject_all_rows(t))
    }

    fn accept_all_rows(&mut self, t: TableId) -> Result<()> {
        for id in self.table(t)?.row_ids() {
            self.accept_inner(t, id)?;
        }
        Ok(())
    }

    fn reject_all_rows(&mut self, t: TableId) -> Result<()> {
        for id in self.table(t)?.row_ids() {
            self.reject_inner(t, id)?;
        }
        Ok(())
    }

    /// Accepts every pending change of every table.
    pub fn accept_changes(&mut self) -> Result<()> {
        self.run(|ds| {
            let ids: Vec<TableId> = ds.tables.iter().map(Table::id).collect();
            ids.into_iter().try_for_each(|t| ds.accept_all_rows(t))
        })
    }

    /// Rejects every pending change of every table.
    pub fn reject_changes(&mut self) -> Result<()> {
        self.run(|ds| {
            let ids: Vec<TableId> = ds.tables.iter().map(Table::id).collect();
            ids.into_iter().try_for_each(|t| ds.reject_all_rows(t))
        })
    }

    /// Marks an Unchanged row as Added.
    pub fn set_added(&mut self, t: TableId, id: RowId) -> Result<()> {
        self.run(|ds| ds.transition(t, id, RowEvent::SetAdded))
    }

    /// Marks an Unchanged row as Modified.
    pub fn set_modified(&mut self, t: TableId, id: RowId) -> Result<()> {
        self.run(|ds| ds.transition(t, id, RowEvent::SetModified))
    }

    fn transition(&mut self, t: TableId, id: RowId, event: RowEvent) -> Result<()> {
        let table = self.table(t)?;
        table.get_row(id)?;
        if !table.is_attached(id) {
            return Err(Error::invalid_state(format!(
                "row {} is not in table '{}'",
                id,
                table.name()
            )));
        }
        self.touch(t, id);
        self.table_mut(t)?.with_row(id, |r| r.apply(event))??;
        Ok(())
    }

    // ---- errors ------------------------------------------------------

    pub fn set_row_error(&mut self, t: TableId, id: RowId, error: Option<&str>) -> Result<()> {
        self.table_mut(t)?
            .with_row(id, |r| r.set_error(error.map(String::from)))
    }

    pub fn set_column_error(
        &mut self,
        t: TableId,
        id: RowId,
        column: usize,
        error: Option<&str>,
    ) -> Result<()> {
        let table = self.table_mut(t)?;
        if column >= table.schema().width() {
            return Err(Error::invalid_argument(format!(
                "column ordinal {} out of range for table '{}'",
                column,
                table.name()
            )));
        }
        table.with_row(id, |r| r.set_column_error(column, error.map(String::from)))
    }

    pub fn clear_errors(&mut self, t: TableId, id: RowId) -> Result<()> {
        self.table_mut(t)?.with_row(id, Row::clear_errors)
    }

    // ---- bulk --------------------------------------------------------

    /// Updates the row with the same primary key, or adds a new one.
    ///
    /// On update, null values leave their cell alone and read-only columns
    /// are written. With `accept`, the row is accepted afterwards.
    pub fn load_row(&mut self, t: TableId, values: Vec<Value>, accept: bool) -> Result<RowId> {
        self.run(|ds| {
            let existing = ds.row_with_primary_key(t, &values)?;
            let id = match existing {
                Some(id) => {
                    let table = ds.table(t)?;
                    let mut columns = Vec::new();
                    let mut coerced = Vec::new();
                    for (c, v) in values.into_iter().enumerate() {
                        if v.is_null() || table.expression(c).is_some() {
                            continue;
                        }
                        coerced.push(coerce_value(table, c, v)?);
                        columns.push(c);
                    }
                    ds.write_columns(t, id, &columns, &coerced)?;
                    id
                }
                None => ds.add_row_inner(t, values)?,
            };
            if accept {
                ds.accept_inner(t, id)?;
            }
            Ok(id)
        })
    }

    /// The live row whose primary key equals the key held by `values`.
    fn row_with_primary_key(&self, t: TableId, values: &[Value]) -> Result<Option<RowId>> {
        let table = self.table(t)?;
        let pk = table.schema().primary_key();
        if pk.is_empty() || pk.iter().any(|&c| values.get(c).map_or(true, Value::is_null)) {
            return Ok(None);
        }
        let key: Vec<Value> = pk
            .iter()
            .map(|&c| coerce_value(table, c, values[c].clone()))
            .collect::<Result<_>>()?;
        Ok(tuple_key(&key, table.case_sensitive()).and_then(|k| self.find_by_key(table, pk, &k)))
    }

    /// Removes every row of a table.
    ///
    /// Fails while an enforced foreign key in another table has a live
    /// child row pointing into this one.
    pub fn clear_table(&mut self, t: TableId) -> Result<()> {
        self.run(|ds| {
            for (child_t, fk) in ds.referencing_fks(t) {
                if child_t == t {
                    continue;
                }
                let child = ds.table(child_t)?;
                if !child.enforce_constraints() {
                    continue;
                }
                let referenced = child.live_rows().any(|r| {
                    key_values(r, &fk.child_columns, RowVersion::Current)
                        .map_or(false, |v| v.iter().any(|x| !x.is_null()))
                });
                if referenced {
                    return Err(ds.children_exist(t, child_t, &fk, "clear"));
                }
            }
            ds.remove_all_rows(t)
        })
    }
}

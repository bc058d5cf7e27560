//! Schema changes on tables hosted by a data set.
//!
//! Every change validates the existing data first and only then touches the
//! schema, so a rejected change leaves the table as it was.

use crate::constraint::ConstraintChecker;
use crate::context::{is_live, key_values};
use crate::dataset::DataSet;
use crate::handle::ColumnSelector;
use crate::relation::{ForeignKeyDef, Relation, RelationDef};
use crate::table::Table;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use tabula_core::schema::{
    names_match, next_constraint_id, same_columns, AcceptRejectRule, Column, Constraint,
    ConstraintId, ConstraintKind, ForeignKeyConstraint, RelationId, Rule, TableBuilder, TableId,
    UniqueConstraint,
};
use tabula_core::{DataType, Error, Result, RowVersion, Value};
use tabula_expr::Expression;
use tabula_reactive::ListChanged;

/// Checks that an expression for column `own` names existing columns and
/// does not reach `own` again through other computed columns.
fn check_expression(table: &Table, own: &str, expr: &Expression) -> Result<()> {
    let cyclic = || Error::CyclicEvaluation {
        table: table.name().into(),
        column: own.into(),
    };
    let mut pending = Vec::new();
    for name in expr.ast().local_columns() {
        if names_match(name, own, false) {
            return Err(cyclic());
        }
        let c = table
            .schema()
            .find_column(name)
            .ok_or_else(|| Error::evaluate(format!("Cannot find column [{}]", name)))?;
        pending.push(c);
    }
    let mut seen = Vec::new();
    while let Some(c) = pending.pop() {
        if seen.contains(&c) {
            continue;
        }
        seen.push(c);
        if let Some(e) = table.expression(c) {
            for name in e.ast().local_columns() {
                if names_match(name, own, false) {
                    return Err(cyclic());
                }
                if let Some(n) = table.schema().find_column(name) {
                    pending.push(n);
                }
            }
        }
    }
    Ok(())
}

fn resolve_columns(table: &Table, names: &[String]) -> Result<Vec<usize>> {
    if names.is_empty() {
        return Err(Error::invalid_argument("at least one column is required"));
    }
    names.iter().map(|n| table.schema().column_index(n)).collect()
}

fn check_types_match(parent: &Table, pcols: &[usize], child: &Table, ccols: &[usize]) -> Result<()> {
    if pcols.len() != ccols.len() {
        return Err(Error::invalid_argument(
            "parent and child column lists differ in length",
        ));
    }
    for (&p, &c) in pcols.iter().zip(ccols) {
        let (pc, cc) = (&parent.schema().columns()[p], &child.schema().columns()[c]);
        if pc.data_type() != cc.data_type() {
            return Err(Error::invalid_schema(format!(
                "parent column '{}' ({}) and child column '{}' ({}) have different types",
                pc.name(),
                pc.data_type(),
                cc.name(),
                cc.data_type()
            )));
        }
    }
    Ok(())
}

impl DataSet {
    fn column_of(&self, t: TableId, column: impl ColumnSelector) -> Result<usize> {
        column.ordinal(self.table(t)?)
    }

    fn column_event(&mut self, t: TableId, event: ListChanged) {
        self.structure_changed(t, event);
    }

    /// True if a view over `t` sorts or filters on `column`.
    fn view_uses_column(&self, t: TableId, column: &str) -> bool {
        self.views.values().filter(|v| v.table() == t).any(|v| {
            v.sort_keys().iter().any(|k| names_match(&k.column, column, false))
                || v.filter().map_or(false, |f| {
                    f.ast().local_columns().iter().any(|c| names_match(c, column, false))
                })
        })
    }

    /// Names of other columns of `t` whose expression reads `column`.
    fn expression_users(&self, t: TableId, column: &str) -> Result<Vec<String>> {
        let table = self.table(t)?;
        Ok(table
            .schema()
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, c)| {
                !names_match(c.name(), column, false)
                    && table.expression(*i).map_or(false, |e| {
                        e.ast().local_columns().iter().any(|n| names_match(n, column, false))
                    })
            })
            .map(|(_, c)| String::from(c.name()))
            .collect())
    }

    // ---- columns -----------------------------------------------------

    /// Appends a column. Existing rows get its generated, default or null
    /// value.
    pub fn add_column(&mut self, t: TableId, mut column: Column) -> Result<usize> {
        TableBuilder::check_naming_rules(column.name())?;
        column.validate()?;
        let table = self.table(t)?;
        if table.schema().conflicting_column(column.name(), false).is_some() {
            return Err(Error::DuplicateColumn {
                table: table.name().into(),
                column: column.name().into(),
            });
        }
        let expr = column.expression_text().map(Expression::parse).transpose()?;
        if let Some(e) = &expr {
            check_expression(table, column.name(), e)?;
            if column.is_unique() {
                return Err(Error::invalid_schema(format!(
                    "Computed column '{}' cannot be unique",
                    column.name()
                )));
            }
        }
        let live = table.live_rows().count();
        if table.enforce_constraints() && expr.is_none() && column.auto_increment_rule().is_none() {
            let fill = column.initial_value();
            if fill.is_null() && !column.allows_null() && live > 0 {
                return Err(Error::null_violation(table.name(), column.name()));
            }
            if !fill.is_null() && column.is_unique() && live > 1 {
                return Err(Error::UniqueViolation {
                    table: table.name().into(),
                    constraint: table.schema().next_constraint_name(),
                    columns: column.name().into(),
                    value: format!("{}", fill),
                });
            }
        }
        let unique = column.is_unique();
        let name = String::from(column.name());
        let ordinal = self.table_mut(t)?.append_column(column, expr)?;
        if unique {
            self.install_unique(t, String::new(), alloc::vec![ordinal], false, None);
        }
        tracing::debug!(table = t.0, column = name.as_str(), "add column");
        self.column_event(t, ListChanged::column_added(ordinal));
        Ok(ordinal)
    }

    /// Removes a column no constraint, relation, expression or view uses.
    pub fn remove_column(&mut self, t: TableId, column: impl ColumnSelector) -> Result<()> {
        let ordinal = self.column_of(t, column)?;
        let table = self.table(t)?;
        let name = String::from(table.schema().columns()[ordinal].name());
        let in_use = |what: &str| {
            Error::invalid_argument(format!(
                "Cannot remove column '{}' of table '{}' because it is used by {}",
                name,
                table.name(),
                what
            ))
        };
        if let Some(c) = table
            .schema()
            .constraints()
            .iter()
            .find(|c| c.columns().contains(&ordinal))
        {
            return Err(in_use(&format!("constraint '{}'", c.name())));
        }
        if self.tables.iter().any(|other| {
            other
                .schema()
                .foreign_keys()
                .any(|(_, fk)| fk.parent_table == t && fk.parent_columns.contains(&ordinal))
        }) {
            return Err(in_use("a foreign key"));
        }
        if let Some(r) = self.relations.iter().find(|r| r.uses_column(t, ordinal)) {
            return Err(in_use(&format!("relation '{}'", r.name)));
        }
        if let Some(user) = self.expression_users(t, &name)?.first() {
            return Err(in_use(&format!("the expression of column '{}'", user)));
        }
        if self.view_uses_column(t, &name) {
            return Err(in_use("a view"));
        }
        self.table_mut(t)?.drop_column(ordinal);
        for r in &mut self.relations {
            r.shift_columns(t, ordinal);
        }
        for other in &mut self.tables {
            let mut touched = false;
            for c in other.schema_mut().constraints_mut() {
                if let ConstraintKind::ForeignKey(fk) = &mut c.kind {
                    if fk.parent_table == t {
                        fk.shift_parent_columns(ordinal);
                        touched = true;
                    }
                }
            }
            if touched {
                other.rebuild_keys();
            }
        }
        tracing::debug!(table = t.0, column = name.as_str(), "remove column");
        self.column_event(t, ListChanged::column_removed(ordinal));
        Ok(())
    }

    /// Renames a column no expression or view refers to by name.
    pub fn rename_column(&mut self, t: TableId, column: impl ColumnSelector, new_name: &str) -> Result<()> {
        let ordinal = self.column_of(t, column)?;
        TableBuilder::check_naming_rules(new_name)?;
        let table = self.table(t)?;
        let old = String::from(table.schema().columns()[ordinal].name());
        if old == new_name {
            return Ok(());
        }
        if let Some(other) = table.schema().conflicting_column(new_name, false) {
            if other != ordinal {
                return Err(Error::DuplicateColumn {
                    table: table.name().into(),
                    column: new_name.into(),
                });
            }
        }
        if let Some(user) = self.expression_users(t, &old)?.first() {
            return Err(Error::invalid_argument(format!(
                "Cannot rename column '{}' because the expression of column '{}' refers to it",
                old, user
            )));
        }
        if self.view_uses_column(t, &old) {
            return Err(Error::invalid_argument(format!(
                "Cannot rename column '{}' because a view refers to it",
                old
            )));
        }
        if let Some(col) = self.table_mut(t)?.schema_mut().column_mut(ordinal) {
            col.set_name(new_name);
        }
        self.column_event(t, ListChanged::column_changed(ordinal));
        Ok(())
    }

    /// Changes the declared type of a column, converting stored values.
    ///
    /// Key columns cannot change type, and a value that does not convert
    /// rejects the change.
    pub fn set_column_type(&mut self, t: TableId, column: impl ColumnSelector, data_type: DataType) -> Result<()> {
        let ordinal = self.column_of(t, column)?;
        let table = self.table(t)?;
        let current = &table.schema().columns()[ordinal];
        if current.data_type() == data_type {
            return Ok(());
        }
        let keyed = table.schema().constraints().iter().any(|c| c.columns().contains(&ordinal))
            || self.relations.iter().any(|r| r.uses_column(t, ordinal))
            || self.tables.iter().any(|o| {
                o.schema()
                    .foreign_keys()
                    .any(|(_, fk)| fk.parent_table == t && fk.parent_columns.contains(&ordinal))
            });
        if keyed {
            return Err(Error::invalid_schema(format!(
                "Cannot change the type of key column '{}'",
                current.name()
            )));
        }
        let mut candidate = current.clone();
        candidate.set_data_type(data_type);
        candidate.validate()?;
        let table = self.table_mut(t)?;
        if table.expression(ordinal).is_none() {
            table.convert_column(ordinal, data_type)?;
        }
        if let Some(col) = table.schema_mut().column_mut(ordinal) {
            *col = candidate;
        }
        self.column_event(t, ListChanged::column_changed(ordinal));
        Ok(())
    }

    /// Sets or clears the expression of a column.
    ///
    /// Clearing it keeps the last computed values as stored values.
    pub fn set_column_expression(
        &mut self,
        t: TableId,
        column: impl ColumnSelector,
        expression: Option<&str>,
    ) -> Result<()> {
        let ordinal = self.column_of(t, column)?;
        let table = self.table(t)?;
        let col = &table.schema().columns()[ordinal];
        match expression.filter(|e| !e.trim().is_empty()) {
            Some(text) => {
                let expr = Expression::parse(text)?;
                if col.auto_increment_rule().is_some() {
                    return Err(Error::invalid_schema(format!(
                        "Auto-increment column '{}' cannot be computed",
                        col.name()
                    )));
                }
                let keyed = table.schema().constraints().iter().any(|c| c.columns().contains(&ordinal))
                    || self.relations.iter().any(|r| r.uses_column(t, ordinal));
                if keyed {
                    return Err(Error::invalid_schema(format!(
                        "Key column '{}' cannot be computed",
                        col.name()
                    )));
                }
                check_expression(table, col.name(), &expr)?;
                let table = self.table_mut(t)?;
                if let Some(col) = table.schema_mut().column_mut(ordinal) {
                    col.set_expression(Some(String::from(text)));
                }
                table.set_expression(ordinal, Some(expr));
            }
            None => {
                if table.expression(ordinal).is_none() {
                    return Ok(());
                }
                let values: Vec<_> = table
                    .all_row_ids()
                    .into_iter()
                    .filter_map(|id| table.row(id))
                    .map(|row| {
                        let version = if is_live(row) || row.is_editing() {
                            RowVersion::Default
                        } else {
                            RowVersion::Original
                        };
                        let value = self.read_cell(table, row, ordinal, version).unwrap_or_else(|e| {
                            tracing::warn!(error = %e, "computed value dropped while clearing expression");
                            Value::Null
                        });
                        (row.id(), value)
                    })
                    .collect();
                let table = self.table_mut(t)?;
                for (id, value) in values {
                    table.with_row(id, |r| r.map_cell(ordinal, |_| Ok(value.clone())))??;
                }
                if let Some(col) = table.schema_mut().column_mut(ordinal) {
                    col.set_expression(None);
                }
                table.set_expression(ordinal, None);
            }
        }
        self.column_event(t, ListChanged::column_changed(ordinal));
        Ok(())
    }

    /// Allows or forbids nulls. Forbidding them fails while a live row
    /// holds a null and constraints are enforced.
    pub fn set_allow_null(&mut self, t: TableId, column: impl ColumnSelector, allow: bool) -> Result<()> {
        let ordinal = self.column_of(t, column)?;
        let table = self.table(t)?;
        let col = &table.schema().columns()[ordinal];
        if !allow && table.enforce_constraints() && table.expression(ordinal).is_none() {
            let has_null = table.live_rows().any(|r| {
                r.value(ordinal, RowVersion::Current).map_or(false, Value::is_null)
            });
            if has_null {
                return Err(Error::null_violation(table.name(), col.name()));
            }
        }
        if let Some(col) = self.table_mut(t)?.schema_mut().column_mut(ordinal) {
            col.set_allow_null(allow);
        }
        Ok(())
    }

    /// Sets the maximum length of a string column.
    pub fn set_max_length(&mut self, t: TableId, column: impl ColumnSelector, max_length: Option<usize>) -> Result<()> {
        let ordinal = self.column_of(t, column)?;
        let table = self.table(t)?;
        let col = &table.schema().columns()[ordinal];
        if let Some(max) = max_length {
            if col.data_type() != DataType::String {
                return Err(Error::invalid_schema(format!(
                    "MaxLength applies only to string columns; '{}' is {}",
                    col.name(),
                    col.data_type()
                )));
            }
            for row in table.live_rows() {
                let length = row
                    .value(ordinal, RowVersion::Current)
                    .ok()
                    .and_then(Value::as_str)
                    .map_or(0, |s| s.chars().count());
                if length > max {
                    return Err(Error::MaxLengthExceeded {
                        table: table.name().into(),
                        column: col.name().into(),
                        max_length: max,
                        length,
                    });
                }
            }
        }
        if let Some(col) = self.table_mut(t)?.schema_mut().column_mut(ordinal) {
            col.set_max_length(max_length);
        }
        Ok(())
    }

    pub fn set_read_only(&mut self, t: TableId, column: impl ColumnSelector, read_only: bool) -> Result<()> {
        let ordinal = self.column_of(t, column)?;
        if let Some(col) = self.table_mut(t)?.schema_mut().column_mut(ordinal) {
            col.set_read_only(read_only);
        }
        Ok(())
    }

    /// Sets the default value new rows start with.
    pub fn set_default_value(&mut self, t: TableId, column: impl ColumnSelector, value: Option<Value>) -> Result<()> {
        let ordinal = self.column_of(t, column)?;
        let table = self.table(t)?;
        let mut candidate = table.schema().columns()[ordinal].clone();
        candidate.set_default(value);
        candidate.validate()?;
        if let Some(col) = self.table_mut(t)?.schema_mut().column_mut(ordinal) {
            *col = candidate;
        }
        Ok(())
    }

    /// Adds or removes the single-column unique constraint of a column.
    pub fn set_unique(&mut self, t: TableId, column: impl ColumnSelector, unique: bool) -> Result<()> {
        let ordinal = self.column_of(t, column)?;
        let existing = self.table(t)?.schema().find_unique(&[ordinal]);
        match (unique, existing) {
            (true, None) => {
                self.add_unique_inner(t, String::new(), alloc::vec![ordinal], None)?;
            }
            (false, Some(id)) => {
                self.check_removable(t, id)?;
                self.table_mut(t)?.schema_mut().remove_constraint(id);
                self.table_mut(t)?.rebuild_keys();
            }
            _ => {}
        }
        if let Some(col) = self.table_mut(t)?.schema_mut().column_mut(ordinal) {
            col.set_unique(unique);
        }
        Ok(())
    }

    /// Declares the primary key. An empty list clears the declaration and
    /// keeps the unique constraint.
    pub fn set_primary_key(&mut self, t: TableId, columns: &[&str]) -> Result<()> {
        if columns.is_empty() {
            let table = self.table_mut(t)?;
            let old: Vec<usize> = table.schema().primary_key().to_vec();
            table.schema_mut().set_primary_key_id(None);
            for c in old {
                if let Some(col) = table.schema_mut().column_mut(c) {
                    col.set_read_only(false);
                }
            }
            tracing::debug!(table = t.0, "clear primary key");
            self.refresh_views(None);
            return Ok(());
        }
        let names: Vec<String> = columns.iter().map(|c| String::from(*c)).collect();
        let cols = resolve_columns(self.table(t)?, &names)?;
        let table = self.table(t)?;
        if table.enforce_constraints() {
            for &c in &cols {
                let has_null = table
                    .live_rows()
                    .any(|r| r.value(c, RowVersion::Current).map_or(false, Value::is_null));
                if has_null {
                    return Err(Error::null_violation(
                        table.name(),
                        table.schema().columns()[c].name(),
                    ));
                }
            }
        }
        let id = match table.schema().find_unique(&cols) {
            Some(id) => id,
            None => self.add_unique_inner(t, String::new(), cols.clone(), None)?,
        };
        let table = self.table_mut(t)?;
        table.schema_mut().set_primary_key_id(Some(id));
        let single = cols.len() == 1;
        for &c in &cols {
            if let Some(col) = table.schema_mut().column_mut(c) {
                col.set_allow_null(false);
                col.set_read_only(true);
                if single {
                    col.set_unique(true);
                }
            }
        }
        tracing::debug!(table = t.0, columns = ?columns, "set primary key");
        self.refresh_views(None);
        Ok(())
    }

    // ---- constraints -------------------------------------------------

    fn install_unique(
        &mut self,
        t: TableId,
        name: String,
        columns: Vec<usize>,
        is_primary_key: bool,
        installer: Option<RelationId>,
    ) -> ConstraintId {
        let id = next_constraint_id();
        let Ok(table) = self.table_mut(t) else {
            return id;
        };
        let name = if name.is_empty() {
            table.schema().next_constraint_name()
        } else {
            name
        };
        tracing::debug!(table = table.name(), constraint = name.as_str(), "install unique constraint");
        table.schema_mut().push_constraint(Constraint {
            id,
            kind: ConstraintKind::Unique(UniqueConstraint {
                name,
                columns,
                is_primary_key,
            }),
            installer,
        });
        table.rebuild_keys();
        self.refresh_views(None);
        id
    }

    fn check_constraint_name(&self, t: TableId, name: &str) -> Result<()> {
        let table = self.table(t)?;
        if !name.is_empty() && table.schema().constraint_by_name(name).is_some() {
            return Err(Error::DuplicateConstraint {
                table: table.name().into(),
                constraint: name.into(),
            });
        }
        Ok(())
    }

    fn add_unique_inner(
        &mut self,
        t: TableId,
        name: String,
        columns: Vec<usize>,
        installer: Option<RelationId>,
    ) -> Result<ConstraintId> {
        self.check_constraint_name(t, &name)?;
        let table = self.table(t)?;
        for &c in &columns {
            if table.expression(c).is_some() {
                return Err(Error::invalid_schema(format!(
                    "Computed column '{}' cannot be part of a unique constraint",
                    table.schema().columns()[c].name()
                )));
            }
        }
        if table.schema().find_unique(&columns).is_some() {
            return Err(Error::invalid_argument(format!(
                "Columns '{}' of table '{}' already have a unique constraint",
                table.schema().column_names(&columns),
                table.name()
            )));
        }
        if table.enforce_constraints() {
            let candidate = UniqueConstraint {
                name: name.clone(),
                columns: columns.clone(),
                is_primary_key: false,
            };
            ConstraintChecker::validate_unique(table, &candidate)?;
        }
        Ok(self.install_unique(t, name, columns, false, installer))
    }

    /// Adds a unique constraint over named columns, validating existing
    /// rows first. With `is_primary_key` it also becomes the primary key.
    pub fn add_unique_constraint(
        &mut self,
        t: TableId,
        name: &str,
        columns: &[&str],
        is_primary_key: bool,
    ) -> Result<ConstraintId> {
        let names: Vec<String> = columns.iter().map(|c| String::from(*c)).collect();
        let cols = resolve_columns(self.table(t)?, &names)?;
        let id = self.add_unique_inner(t, String::from(name), cols.clone(), None)?;
        if cols.len() == 1 {
            if let Some(col) = self.table_mut(t)?.schema_mut().column_mut(cols[0]) {
                col.set_unique(true);
            }
        }
        if is_primary_key {
            self.set_primary_key(t, columns)?;
        }
        Ok(id)
    }

    /// Adds a foreign key, validating existing child rows first. A unique
    /// constraint is added on the parent columns if none covers them.
    pub fn add_foreign_key(&mut self, def: ForeignKeyDef) -> Result<ConstraintId> {
        let parent_t = self.table_id(&def.parent_table)?;
        let child_t = self.table_id(&def.child_table)?;
        let pcols = resolve_columns(self.table(parent_t)?, &def.parent_columns)?;
        let ccols = resolve_columns(self.table(child_t)?, &def.child_columns)?;
        let fk = ForeignKeyConstraint {
            name: def.name,
            parent_table: parent_t,
            parent_columns: pcols,
            child_columns: ccols,
            delete_rule: def.delete_rule,
            update_rule: def.update_rule,
            accept_reject_rule: def.accept_reject_rule,
        };
        let (_, fk_id) = self.install_key_pair(child_t, fk, None, true)?;
        Ok(fk_id)
    }

    /// Validates and installs a foreign key and, when missing, a unique
    /// constraint on its parent columns. Returns the parent constraint and
    /// whether it was created, plus the foreign key id.
    fn install_key_pair(
        &mut self,
        child_t: TableId,
        mut fk: ForeignKeyConstraint,
        installer: Option<RelationId>,
        create_parent_key: bool,
    ) -> Result<((Option<ConstraintId>, bool), ConstraintId)> {
        let parent_t = fk.parent_table;
        let parent = self.table(parent_t)?;
        let child = self.table(child_t)?;
        check_types_match(parent, &fk.parent_columns, child, &fk.child_columns)?;
        if fk.name.is_empty() || child.schema().constraint_by_name(&fk.name).is_some() {
            if installer.is_none() && !fk.name.is_empty() {
                return Err(Error::DuplicateConstraint {
                    table: child.name().into(),
                    constraint: fk.name,
                });
            }
            fk.name = child.schema().next_constraint_name();
        }
        let existing = parent.schema().find_unique(&fk.parent_columns);
        if existing.is_none() && create_parent_key && parent.enforce_constraints() {
            let candidate = UniqueConstraint {
                name: String::new(),
                columns: fk.parent_columns.clone(),
                is_primary_key: false,
            };
            ConstraintChecker::validate_unique(parent, &candidate)?;
        }
        if child.enforce_constraints() {
            if existing.is_some() || !create_parent_key {
                ConstraintChecker::validate_foreign_key(self, child, &fk)?;
            } else {
                // no parent index yet: match by scan
                let cs = parent.case_sensitive();
                let keys: Vec<_> = parent
                    .live_rows()
                    .filter_map(|r| {
                        key_values(r, &fk.parent_columns, RowVersion::Current)
                            .ok()
                            .and_then(|v| tabula_index::tuple_key(&v, cs))
                    })
                    .collect();
                for row in child.live_rows() {
                    let values = key_values(row, &fk.child_columns, RowVersion::Current)?;
                    if values.iter().all(Value::is_null) {
                        continue;
                    }
                    let found = tabula_index::tuple_key(&values, cs).map_or(false, |k| keys.contains(&k));
                    if !found {
                        return Err(Error::foreign_key(
                            &fk.name,
                            format!(
                                "row {} of table '{}' has no parent in table '{}'",
                                row.id(),
                                child.name(),
                                parent.name()
                            ),
                        ));
                    }
                }
            }
        }
        let parent_key = match existing {
            Some(id) => (Some(id), false),
            None if create_parent_key => {
                let cols = fk.parent_columns.clone();
                let single = cols.len() == 1;
                let id = self.install_unique(parent_t, String::new(), cols.clone(), false, installer);
                if single {
                    if let Some(col) = self.table_mut(parent_t)?.schema_mut().column_mut(cols[0]) {
                        col.set_unique(true);
                    }
                }
                (Some(id), true)
            }
            None => (None, false),
        };
        let id = next_constraint_id();
        let child = self.table_mut(child_t)?;
        tracing::debug!(table = child.name(), constraint = fk.name.as_str(), "install foreign key");
        child.schema_mut().push_constraint(Constraint {
            id,
            kind: ConstraintKind::ForeignKey(fk),
            installer,
        });
        Ok((parent_key, id))
    }

    /// Why a constraint cannot be removed, if it cannot.
    fn removal_blocker(&self, t: TableId, id: ConstraintId) -> Result<Option<String>> {
        let table = self.table(t)?;
        let constraint = table.schema().constraint(id).ok_or_else(|| Error::ConstraintNotFound {
            table: table.name().into(),
            constraint: format!("{:?}", id),
        })?;
        if let Some(rel) = constraint
            .installer
            .and_then(|r| self.relations.iter().find(|x| x.id == r))
        {
            return Ok(Some(format!("it belongs to relation '{}'", rel.name)));
        }
        if let Some(unique) = constraint.as_unique() {
            if unique.is_primary_key {
                return Ok(Some(String::from("it is the primary key")));
            }
            for other in &self.tables {
                for (_, fk) in other.schema().foreign_keys() {
                    if fk.parent_table == t && same_columns(&fk.parent_columns, &unique.columns) {
                        return Ok(Some(format!(
                            "foreign key '{}' of table '{}' depends on it",
                            fk.name,
                            other.name()
                        )));
                    }
                }
            }
            if let Some(rel) = self.relations.iter().find(|r| {
                r.parent_table == t && same_columns(&r.parent_columns, &unique.columns) && r.foreign_key.is_some()
            }) {
                return Ok(Some(format!("relation '{}' depends on it", rel.name)));
            }
        }
        Ok(None)
    }

    fn check_removable(&self, t: TableId, id: ConstraintId) -> Result<()> {
        match self.removal_blocker(t, id)? {
            Some(message) => {
                let name = self
                    .table(t)?
                    .schema()
                    .constraint(id)
                    .map_or_else(String::new, |c| String::from(c.name()));
                Err(Error::ConstraintInUse {
                    constraint: name,
                    message,
                })
            }
            None => Ok(()),
        }
    }

    fn constraint_id(&self, t: TableId, name: &str) -> Result<ConstraintId> {
        let table = self.table(t)?;
        table
            .schema()
            .constraint_by_name(name)
            .map(|c| c.id)
            .ok_or_else(|| Error::ConstraintNotFound {
                table: table.name().into(),
                constraint: name.into(),
            })
    }

    /// Returns false if a relation, foreign key or primary key depends on
    /// the constraint.
    pub fn can_remove_constraint(&self, t: TableId, name: &str) -> Result<bool> {
        let id = self.constraint_id(t, name)?;
        Ok(self.removal_blocker(t, id)?.is_none())
    }

    /// Removes a constraint nothing depends on.
    pub fn remove_constraint(&mut self, t: TableId, name: &str) -> Result<()> {
        let id = self.constraint_id(t, name)?;
        self.check_removable(t, id)?;
        self.drop_constraint(t, id);
        Ok(())
    }

    /// Replaces the delete, update and accept/reject rules of a foreign key
    /// on the child table `t`, including one installed by a relation.
    pub fn set_foreign_key_rules(
        &mut self,
        t: TableId,
        name: &str,
        delete: Rule,
        update: Rule,
        accept_reject: AcceptRejectRule,
    ) -> Result<()> {
        let id = self.constraint_id(t, name)?;
        let table = self.table_mut(t)?;
        let table_name = String::from(table.name());
        let fk = table
            .schema_mut()
            .constraints_mut()
            .iter_mut()
            .find(|c| c.id == id)
            .and_then(|c| match &mut c.kind {
                ConstraintKind::ForeignKey(fk) => Some(fk),
                _ => None,
            })
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "Constraint '{}' of table '{}' is not a foreign key",
                    name, table_name
                ))
            })?;
        fk.delete_rule = delete;
        fk.update_rule = update;
        fk.accept_reject_rule = accept_reject;
        tracing::debug!(
            table = table_name.as_str(),
            constraint = name,
            delete = ?delete,
            update = ?update,
            accept_reject = ?accept_reject,
            "set foreign key rules"
        );
        Ok(())
    }

    fn drop_constraint(&mut self, t: TableId, id: ConstraintId) {
        let Ok(table) = self.table_mut(t) else {
            return;
        };
        let Some(removed) = table.schema_mut().remove_constraint(id) else {
            return;
        };
        if let Some(unique) = removed.as_unique() {
            if let [c] = unique.columns[..] {
                if let Some(col) = table.schema_mut().column_mut(c) {
                    col.set_unique(false);
                }
            }
        }
        table.rebuild_keys();
        tracing::debug!(table = table.name(), constraint = removed.name(), "remove constraint");
        if removed.as_unique().is_some() {
            self.refresh_views(None);
        }
    }

    // ---- relations ---------------------------------------------------

    /// Adds a relation. With `create_constraints`, a unique constraint is
    /// installed on the parent columns unless one exists, and a foreign key
    /// on the child columns; existing rows must satisfy both or nothing is
    /// installed.
    pub fn add_relation(&mut self, def: RelationDef, create_constraints: bool) -> Result<RelationId> {
        let parent_t = self.table_id(&def.parent_table)?;
        let child_t = self.table_id(&def.child_table)?;
        let parent = self.table(parent_t)?;
        let child = self.table(child_t)?;
        let pcols = resolve_columns(parent, &def.parent_columns)?;
        let ccols = resolve_columns(child, &def.child_columns)?;
        check_types_match(parent, &pcols, child, &ccols)?;
        if parent_t == child_t && same_columns(&pcols, &ccols) {
            return Err(Error::invalid_argument(
                "A relation cannot pair a column set with itself",
            ));
        }
        let name = if def.name.is_empty() {
            (1..)
                .map(|n| format!("Relation{}", n))
                .find(|n| !self.relations.iter().any(|r| names_match(&r.name, n, false)))
                .unwrap_or_default()
        } else {
            def.name
        };
        if self.relations.iter().any(|r| r.name == name) {
            return Err(Error::DuplicateRelation(name));
        }
        if self.relations.iter().any(|r| {
            r.parent_table == parent_t
                && r.child_table == child_t
                && r.parent_columns == pcols
                && r.child_columns == ccols
        }) {
            return Err(Error::invalid_argument(format!(
                "A relation between these columns already exists; '{}' not added",
                name
            )));
        }
        let id = RelationId(self.next_relation);
        let mut relation = Relation {
            id,
            name,
            parent_table: parent_t,
            parent_columns: pcols.clone(),
            child_table: child_t,
            child_columns: ccols.clone(),
            nested: def.nested,
            parent_key: None,
            foreign_key: None,
        };
        if create_constraints {
            let existing_fk = self.table(child_t)?.schema().foreign_keys().find(|(_, fk)| {
                fk.parent_table == parent_t
                    && fk.parent_columns == pcols
                    && fk.child_columns == ccols
            });
            match existing_fk.map(|(id, _)| id) {
                Some(fk_id) => {
                    relation.foreign_key = Some(fk_id);
                    relation.parent_key = self.table(parent_t)?.schema().find_unique(&pcols);
                }
                None => {
                    let fk = ForeignKeyConstraint {
                        name: relation.name.clone(),
                        parent_table: parent_t,
                        parent_columns: pcols,
                        child_columns: ccols,
                        delete_rule: Default::default(),
                        update_rule: Default::default(),
                        accept_reject_rule: Default::default(),
                    };
                    let ((parent_key, _), fk_id) = self.install_key_pair(child_t, fk, Some(id), true)?;
                    relation.parent_key = parent_key;
                    relation.foreign_key = Some(fk_id);
                }
            }
        }
        self.next_relation += 1;
        tracing::debug!(relation = relation.name.as_str(), constraints = create_constraints, "add relation");
        self.relations.push(relation);
        self.refresh_views(None);
        Ok(id)
    }

    /// Removes a relation and the constraints it installed. A unique
    /// constraint another foreign key still relies on is kept and handed
    /// over.
    pub fn remove_relation(&mut self, name: &str) -> Result<()> {
        let rel = self.relation(name)?.clone();
        if let Some(fk) = rel.foreign_key {
            let installed = self
                .table(rel.child_table)?
                .schema()
                .constraint(fk)
                .map_or(false, |c| c.installer == Some(rel.id));
            if installed {
                self.drop_constraint(rel.child_table, fk);
            }
        }
        if let Some(uq) = rel.parent_key {
            let installed = self
                .table(rel.parent_table)?
                .schema()
                .constraint(uq)
                .map_or(false, |c| c.installer == Some(rel.id));
            if installed {
                let still_used = self.tables.iter().any(|t| {
                    t.schema().foreign_keys().any(|(_, fk)| {
                        fk.parent_table == rel.parent_table
                            && same_columns(&fk.parent_columns, &rel.parent_columns)
                    })
                });
                if still_used {
                    let parent = self.table_mut(rel.parent_table)?;
                    if let Some(c) = parent
                        .schema_mut()
                        .constraints_mut()
                        .iter_mut()
                        .find(|c| c.id == uq)
                    {
                        c.installer = None;
                    }
                } else {
                    self.drop_constraint(rel.parent_table, uq);
                }
            }
        }
        self.relations.retain(|r| r.id != rel.id);
        tracing::debug!(relation = rel.name.as_str(), "remove relation");
        self.refresh_views(None);
        Ok(())
    }
}

//! Constraint checking.
//!
//! [`ConstraintChecker`] validates candidate row values against the
//! not-null, unique and foreign key rules of a table, and validates whole
//! tables when a constraint is added or enforcement is switched back on.
//! Checks read the key indexes kept by [`Table`]; a table without a unique
//! index on the referenced columns is scanned.

use crate::context::{is_live, key_values};
use crate::dataset::DataSet;
use crate::table::Table;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashMap;
use tabula_core::schema::{ForeignKeyConstraint, TableId, UniqueConstraint};
use tabula_core::{Error, Result, RowId, RowVersion, Value};
use tabula_index::{tuple_key, TupleKey};

/// Stateless constraint checks over a data set.
pub struct ConstraintChecker;

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn touches(columns: &[usize], changed: Option<&[usize]>) -> bool {
    changed.map_or(true, |changed| columns.iter().any(|c| changed.contains(c)))
}

impl ConstraintChecker {
    /// Checks not-null on every stored (non-computed) column.
    pub fn check_not_null(table: &Table, values: &[Value], changed: Option<&[usize]>) -> Result<()> {
        for (i, col) in table.schema().columns().iter().enumerate() {
            if col.allows_null() || table.expression(i).is_some() || !touches(&[i], changed) {
                continue;
            }
            if values.get(i).map_or(true, Value::is_null) {
                return Err(Error::null_violation(table.name(), col.name()));
            }
        }
        Ok(())
    }

    /// Checks every unique constraint against the key indexes, ignoring
    /// the row itself.
    pub fn check_unique(
        table: &Table,
        row: RowId,
        values: &[Value],
        changed: Option<&[usize]>,
    ) -> Result<()> {
        let cs = table.case_sensitive();
        for (id, unique) in table.schema().unique_constraints() {
            if !touches(&unique.columns, changed) {
                continue;
            }
            let tuple: Vec<Value> = unique.columns.iter().map(|&c| values[c].clone()).collect();
            let Some(key) = tuple_key(&tuple, cs) else {
                continue;
            };
            if table.key_conflict(id, &key, row) {
                return Err(unique_violation(table, unique, &tuple));
            }
        }
        Ok(())
    }

    /// Checks that the child tuple of `fk` in `values` has a live parent.
    ///
    /// An all-null tuple is exempt. A tuple that refers to the row itself
    /// through a self-relation is accepted.
    pub fn check_parent_exists(
        ds: &DataSet,
        child: &Table,
        fk: &ForeignKeyConstraint,
        values: &[Value],
    ) -> Result<()> {
        let tuple: Vec<Value> = fk.child_columns.iter().map(|&c| values[c].clone()).collect();
        if tuple.iter().all(Value::is_null) {
            return Ok(());
        }
        let parent = ds.table(fk.parent_table)?;
        let found = tuple_key(&tuple, parent.case_sensitive()).map_or(false, |key| {
            ds.find_by_key(parent, &fk.parent_columns, &key).is_some()
                || (fk.parent_table == child.id() && {
                    let own: Vec<Value> =
                        fk.parent_columns.iter().map(|&c| values[c].clone()).collect();
                    tuple_key(&own, parent.case_sensitive()).map_or(false, |k| k == key)
                })
        });
        if found {
            Ok(())
        } else {
            Err(Error::foreign_key(
                &fk.name,
                format!(
                    "child key ({}) of table '{}' has no matching row in table '{}'",
                    join_values(&tuple),
                    child.name(),
                    parent.name()
                ),
            ))
        }
    }

    /// Checks candidate values of a row of `t`. `changed` limits the
    /// unique and foreign key checks to constraints covering those columns.
    /// Nothing is checked while enforcement is off.
    pub fn check_values(
        ds: &DataSet,
        t: TableId,
        row: RowId,
        values: &[Value],
        changed: Option<&[usize]>,
    ) -> Result<()> {
        let table = ds.table(t)?;
        if !table.enforce_constraints() {
            return Ok(());
        }
        Self::check_not_null(table, values, changed)?;
        Self::check_unique(table, row, values, changed)?;
        for (_, fk) in table.schema().foreign_keys() {
            if touches(&fk.child_columns, changed) {
                Self::check_parent_exists(ds, table, fk, values)?;
            }
        }
        Ok(())
    }

    /// Validates that no two live rows share a key on `columns`.
    pub fn validate_unique(table: &Table, unique: &UniqueConstraint) -> Result<()> {
        let cs = table.case_sensitive();
        let mut seen: HashMap<TupleKey, ()> = HashMap::new();
        for row in table.live_rows() {
            let tuple = key_values(row, &unique.columns, RowVersion::Current)?;
            if let Some(key) = tuple_key(&tuple, cs) {
                if seen.insert(key, ()).is_some() {
                    return Err(unique_violation(table, unique, &tuple));
                }
            }
        }
        Ok(())
    }

    /// Validates every live child row of `fk`.
    pub fn validate_foreign_key(ds: &DataSet, child: &Table, fk: &ForeignKeyConstraint) -> Result<()> {
        for row in child.live_rows() {
            let values = row.values(RowVersion::Current)?;
            Self::check_parent_exists(ds, child, fk, &values)?;
        }
        Ok(())
    }

    /// Collects every violation in the data set, with the offending row.
    pub fn violations(ds: &DataSet) -> Vec<(TableId, RowId, Error)> {
        let mut out = Vec::new();
        for table in ds.tables() {
            for row in table.live_rows() {
                let Ok(values) = row.values(RowVersion::Current) else {
                    continue;
                };
                if let Err(e) = Self::check_not_null(table, &values, None) {
                    out.push((table.id(), row.id(), e));
                }
                for (_, fk) in table.schema().foreign_keys() {
                    if let Err(e) = Self::check_parent_exists(ds, table, fk, &values) {
                        out.push((table.id(), row.id(), e));
                    }
                }
            }
            for (id, rows) in table.duplicate_keys() {
                let Some(unique) = table.schema().constraint(id).and_then(|c| c.as_unique()) else {
                    continue;
                };
                for row in rows {
                    let tuple = table
                        .row(row)
                        .and_then(|r| key_values(r, &unique.columns, RowVersion::Current).ok())
                        .unwrap_or_default();
                    out.push((table.id(), row, unique_violation(table, unique, &tuple)));
                }
            }
        }
        out
    }
}

fn unique_violation(table: &Table, unique: &UniqueConstraint, tuple: &[Value]) -> Error {
    Error::UniqueViolation {
        table: table.name().into(),
        constraint: unique.name.clone(),
        columns: table.schema().column_names(&unique.columns),
        value: join_values(tuple),
    }
}

impl DataSet {
    /// Fails if switching table `t` to `case_sensitive` would leave two
    /// live rows with equal keys under an enforced unique constraint.
    pub(crate) fn check_case_change(&self, t: TableId, case_sensitive: bool) -> Result<()> {
        let table = self.table(t)?;
        if case_sensitive || !table.enforce_constraints() {
            return Ok(());
        }
        for (_, unique) in table.schema().unique_constraints() {
            let mut seen: HashMap<TupleKey, ()> = HashMap::new();
            for row in table.rows().filter(|r| is_live(r)) {
                let tuple = key_values(row, &unique.columns, RowVersion::Current)?;
                if let Some(key) = tuple_key(&tuple, false) {
                    if seen.insert(key, ()).is_some() {
                        return Err(unique_violation(table, unique, &tuple));
                    }
                }
            }
        }
        Ok(())
    }

    /// Turns constraint enforcement on or off.
    ///
    /// Turning it on validates every row. On failure every offending row
    /// gets a row error, enforcement stays off and the first violation is
    /// returned.
    pub fn set_enforce_constraints(&mut self, enforce: bool) -> Result<()> {
        if enforce == self.options.enforce_constraints {
            return Ok(());
        }
        if enforce {
            let violations = ConstraintChecker::violations(self);
            if !violations.is_empty() {
                tracing::debug!(count = violations.len(), "constraint violations on enable");
                let mut first = None;
                for (t, row, error) in violations {
                    self.flag_row(t, row, &error);
                    if first.is_none() {
                        first = Some(error);
                    }
                }
                if let Some(error) = first {
                    return Err(error);
                }
            }
        }
        tracing::debug!(enforce = enforce, "enforce constraints");
        self.options.enforce_constraints = enforce;
        self.propagate_settings();
        Ok(())
    }
}

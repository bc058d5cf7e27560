//! Whole data set operations: schema clones, copies, change extraction,
//! merging and row import.

use crate::constraint::ConstraintChecker;
use crate::context::key_values;
use crate::dataset::DataSet;
use crate::handle::RowRef;
use crate::relation::RelationDef;
use crate::table::Table;
use crate::RowStateFilter;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashSet;
use tabula_core::schema::{ConstraintId, TableId};
use tabula_core::{next_row_id, Error, Result, Row, RowId, RowState, RowVersion, Value};
use tabula_index::tuple_key;

/// What `merge` does with source tables and columns the target lacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MissingSchemaAction {
    /// Add them to the target.
    #[default]
    Add,
    /// Leave them out.
    Ignore,
    /// Fail the merge.
    Error,
}

/// Source table merged into a target table, with the source ordinal of
/// every target column.
struct TablePlan {
    source: TableId,
    target: TableId,
    columns: Vec<Option<usize>>,
}

/// Version images of a row: state, Original and Current values.
type Images = (RowState, Option<Vec<Value>>, Option<Vec<Value>>);

fn images(row: &Row) -> Result<Images> {
    let original = if row.has_version(RowVersion::Original) {
        Some(row.values(RowVersion::Original)?)
    } else {
        None
    };
    let current = if row.has_version(RowVersion::Current) {
        Some(row.values(RowVersion::Current)?)
    } else {
        None
    };
    Ok((row.state(), original, current))
}

/// Projects source values onto target columns. Unmapped columns keep
/// `base`, or take `fill` when there is no base.
fn project(values: &[Value], columns: &[Option<usize>], base: Option<&[Value]>, fill: &[Value]) -> Vec<Value> {
    columns
        .iter()
        .enumerate()
        .map(|(c, source)| match source {
            Some(s) => values.get(*s).cloned().unwrap_or(Value::Null),
            None => base.and_then(|b| b.get(c)).unwrap_or(&fill[c]).clone(),
        })
        .collect()
}

impl DataSet {
    /// A data set with the same tables, constraints and relations, and no
    /// rows or views.
    pub fn clone_schema(&self) -> DataSet {
        let mut out = DataSet::with_options(self.name.clone(), self.options.clone());
        out.tables = self.tables.iter().map(Table::clone_schema).collect();
        out.relations = self.relations.clone();
        out.next_table = self.next_table;
        out.next_relation = self.next_relation;
        out
    }

    /// A data set with the same schema and rows, row states and versions
    /// included. Rows not yet inserted are not copied.
    pub fn copy(&self) -> DataSet {
        let mut out = self.clone_schema();
        out.tables = self.tables.iter().map(Table::copy).collect();
        out
    }

    /// Foreign key edges leaving table `t`: parent table, parent columns
    /// and child columns, from relations and from standalone foreign keys.
    fn parent_edges(&self, t: TableId) -> Result<Vec<(TableId, Vec<usize>, Vec<usize>)>> {
        let mut edges: Vec<_> = self
            .parent_relations(t)
            .map(|r| (r.parent_table, r.parent_columns.clone(), r.child_columns.clone()))
            .collect();
        for (_, fk) in self.table(t)?.schema().foreign_keys() {
            let edge = (fk.parent_table, fk.parent_columns.clone(), fk.child_columns.clone());
            if !edges.contains(&edge) {
                edges.push(edge);
            }
        }
        Ok(edges)
    }

    /// The rows changed in the given states (Added, Modified and Deleted by
    /// default) with the parent rows they refer to, as a new data set.
    /// Returns `None` if nothing changed.
    pub fn get_changes(&self, filter: Option<RowStateFilter>) -> Result<Option<DataSet>> {
        let filter = filter.unwrap_or(RowStateFilter::CHANGES);
        let mut picked: BTreeMap<TableId, HashSet<RowId>> = BTreeMap::new();
        let mut frontier = Vec::new();
        for table in &self.tables {
            for row in table.rows() {
                if row.state().is_changed() && filter.admits(row.state()) {
                    picked.entry(table.id()).or_default().insert(row.id());
                    frontier.push((table.id(), row.id()));
                }
            }
        }
        if frontier.is_empty() {
            return Ok(None);
        }
        while let Some((t, id)) = frontier.pop() {
            let table = self.table(t)?;
            let Some(row) = table.row(id) else {
                continue;
            };
            let version = if row.has_version(RowVersion::Current) {
                RowVersion::Current
            } else {
                RowVersion::Original
            };
            for (parent_t, pcols, ccols) in self.parent_edges(t)? {
                let parent = self.table(parent_t)?;
                let cs = parent.case_sensitive();
                let Some(key) = tuple_key(&key_values(row, &ccols, version)?, cs) else {
                    continue;
                };
                let found = parent.rows().find(|p| {
                    let pv = if p.has_version(version) { version } else { RowVersion::Original };
                    key_values(p, &pcols, pv)
                        .ok()
                        .and_then(|v| tuple_key(&v, cs))
                        .map_or(false, |k| k == key)
                });
                if let Some(p) = found {
                    if picked.entry(parent_t).or_default().insert(p.id()) {
                        frontier.push((parent_t, p.id()));
                    }
                }
            }
        }
        let mut out = self.clone_schema();
        for table in &mut out.tables {
            let source = self.table(table.id())?;
            if let Some(ids) = picked.get(&table.id()) {
                for row in source.rows().filter(|r| ids.contains(&r.id())) {
                    table.attach(row.clone());
                }
            }
            let (generated, next_order) = source.counters();
            table.restore_counters(generated, next_order);
        }
        tracing::debug!(
            rows = picked.values().map(HashSet::len).sum::<usize>(),
            "extract changes"
        );
        Ok(Some(out))
    }

    /// Merges the rows of `source` into this data set.
    ///
    /// Tables are matched by name and columns by name. Rows are matched by
    /// primary key; matched rows take the source's values and state, and
    /// unmatched rows are appended. With `preserve_changes`, a changed
    /// target row keeps its Current values and only its Original values are
    /// refreshed. Constraints are checked once, after every row is in; on a
    /// violation no row changes. Missing tables, columns and relations are
    /// handled per `action`.
    pub fn merge(&mut self, source: &DataSet, preserve_changes: bool, action: MissingSchemaAction) -> Result<()> {
        let plans = self.merge_schema(source, action)?;
        let enforce = self.options.enforce_constraints;
        self.options.enforce_constraints = false;
        self.propagate_settings();
        let result = self.run(|ds| {
            for plan in &plans {
                ds.merge_rows(source, plan, preserve_changes)?;
            }
            if enforce {
                if let Some((t, row, e)) = ConstraintChecker::violations(ds).into_iter().next() {
                    tracing::debug!(table = t.0, row = row, "merge violates constraints");
                    return Err(e);
                }
            }
            Ok(())
        });
        self.options.enforce_constraints = enforce;
        self.propagate_settings();
        result?;
        if action == MissingSchemaAction::Add {
            self.merge_relations(source)?;
        }
        tracing::debug!(source = source.name(), preserve_changes, "merge");
        Ok(())
    }

    /// Matches source tables and columns with this data set, adding what is
    /// missing when `action` allows it.
    fn merge_schema(&mut self, source: &DataSet, action: MissingSchemaAction) -> Result<Vec<TablePlan>> {
        // fail before changing anything
        if action == MissingSchemaAction::Error {
            for src in &source.tables {
                let dst = self.table_by_name(src.name())?;
                for col in src.schema().columns() {
                    if dst.schema().find_column(col.name()).is_none() {
                        return Err(Error::invalid_schema(format!(
                            "Target table '{}' is missing column '{}'",
                            dst.name(),
                            col.name()
                        )));
                    }
                }
            }
        }
        let mut plans = Vec::new();
        for src in &source.tables {
            let target = match self.table_id(src.name()) {
                Ok(t) => t,
                Err(_) if action == MissingSchemaAction::Add => {
                    let mut table = src.clone_schema();
                    let foreign: Vec<ConstraintId> =
                        table.schema().foreign_keys().map(|(id, _)| id).collect();
                    for id in foreign {
                        table.schema_mut().remove_constraint(id);
                    }
                    self.add_table(table)?
                }
                Err(_) => continue,
            };
            for col in src.schema().columns() {
                let existing = self.table(target)?.schema().find_column(col.name());
                match existing {
                    Some(c) => {
                        let dst = &self.table(target)?.schema().columns()[c];
                        if dst.data_type() != col.data_type() {
                            return Err(Error::invalid_schema(format!(
                                "Column '{}' is {} in the target and {} in the source",
                                col.name(),
                                dst.data_type(),
                                col.data_type()
                            )));
                        }
                    }
                    None if action == MissingSchemaAction::Add => {
                        let mut added = col.clone();
                        added.set_unique(false);
                        self.add_column(target, added)?;
                    }
                    None => {}
                }
            }
            let dst = self.table(target)?;
            let columns = dst
                .schema()
                .columns()
                .iter()
                .enumerate()
                .map(|(c, col)| {
                    if dst.expression(c).is_some() {
                        None
                    } else {
                        src.schema().find_column(col.name())
                    }
                })
                .collect();
            plans.push(TablePlan {
                source: src.id(),
                target,
                columns,
            });
        }
        Ok(plans)
    }

    /// The attached target row whose primary key equals that of `images`.
    fn merge_target(&self, t: TableId, columns: &[Option<usize>], images: &Images) -> Result<Option<RowId>> {
        let table = self.table(t)?;
        let pk = table.schema().primary_key();
        if pk.is_empty() {
            return Ok(None);
        }
        let Some(values) = images.2.as_ref().or(images.1.as_ref()) else {
            return Ok(None);
        };
        let lookup: Vec<Value> = pk
            .iter()
            .map(|&c| columns[c].and_then(|s| values.get(s).cloned()).unwrap_or(Value::Null))
            .collect();
        let cs = table.case_sensitive();
        let Some(key) = tuple_key(&lookup, cs) else {
            return Ok(None);
        };
        Ok(table
            .rows()
            .find(|r| {
                let version = if r.has_version(RowVersion::Current) {
                    RowVersion::Current
                } else {
                    RowVersion::Original
                };
                key_values(r, pk, version)
                    .ok()
                    .and_then(|v| tuple_key(&v, cs))
                    .map_or(false, |k| k == key)
            })
            .map(Row::id))
    }

    fn merge_rows(&mut self, source: &DataSet, plan: &TablePlan, preserve_changes: bool) -> Result<()> {
        let src = source.table(plan.source)?;
        let fill: Vec<Value> = self
            .table(plan.target)?
            .schema()
            .columns()
            .iter()
            .map(|c| c.initial_value())
            .collect();
        for row in src.rows() {
            let incoming = images(row)?;
            match self.merge_target(plan.target, &plan.columns, &incoming)? {
                Some(id) => {
                    self.touch(plan.target, id);
                    let table = self.table_mut(plan.target)?;
                    let existing = images(table.get_row(id)?)?;
                    let (state, original, current) =
                        merged_images(existing, incoming, &plan.columns, &fill, preserve_changes);
                    table.update_row(id, |r| r.restore(state, original, current));
                }
                None => {
                    let id = next_row_id();
                    self.touch(plan.target, id);
                    self.touch_counters(plan.target);
                    let (state, original, current) = incoming;
                    let original = original.map(|v| project(&v, &plan.columns, None, &fill));
                    let current = current.map(|v| project(&v, &plan.columns, None, &fill));
                    let table = self.table_mut(plan.target)?;
                    let mut row = Row::from_versions(id, state, original, current);
                    row.set_order(table.take_order());
                    table.attach(row);
                }
            }
        }
        Ok(())
    }

    /// Adds source relations whose tables exist here and whose name is free.
    fn merge_relations(&mut self, source: &DataSet) -> Result<()> {
        for rel in &source.relations {
            if self.relation(&rel.name).is_ok() {
                continue;
            }
            let (Ok(parent), Ok(child)) = (
                source.table(rel.parent_table),
                source.table(rel.child_table),
            ) else {
                continue;
            };
            let names = |t: &Table, cols: &[usize]| -> Vec<String> {
                cols.iter()
                    .map(|&c| String::from(t.schema().columns()[c].name()))
                    .collect()
            };
            let pcols = names(parent, &rel.parent_columns);
            let ccols = names(child, &rel.child_columns);
            let pref: Vec<&str> = pcols.iter().map(String::as_str).collect();
            let cref: Vec<&str> = ccols.iter().map(String::as_str).collect();
            let def = RelationDef::new(rel.name.clone(), parent.name(), &pref, child.name(), &cref)
                .nested(rel.nested);
            self.add_relation(def, rel.foreign_key.is_some())?;
        }
        Ok(())
    }

    /// Copies a row into table `t` with its state and versions. Columns
    /// are matched by name; columns the source lacks take their default.
    pub fn import_row(&mut self, t: TableId, row: &RowRef<'_>) -> Result<RowId> {
        if row.state() == RowState::Detached {
            return Err(Error::invalid_state(format!(
                "row {} is not in a table and cannot be imported",
                row.id()
            )));
        }
        let source = row.table();
        let (state, original, current) = images(row.raw())?;
        let target = self.table(t)?;
        let columns: Vec<Option<usize>> = target
            .schema()
            .columns()
            .iter()
            .enumerate()
            .map(|(c, col)| {
                if target.expression(c).is_some() {
                    None
                } else {
                    source.schema().find_column(col.name())
                }
            })
            .collect();
        let fill: Vec<Value> = target.schema().columns().iter().map(|c| c.initial_value()).collect();
        let original = original.map(|v| project(&v, &columns, None, &fill));
        let current = current.map(|v| project(&v, &columns, None, &fill));
        self.run(|ds| {
            let id = next_row_id();
            if let Some(values) = &current {
                ConstraintChecker::check_values(ds, t, id, values, None)?;
            }
            ds.touch(t, id);
            ds.touch_counters(t);
            let table = ds.table_mut(t)?;
            let mut row = Row::from_versions(id, state, original, current);
            row.set_order(table.take_order());
            table.attach(row);
            Ok(id)
        })
    }
}

/// Combines a matched target row with an incoming source row.
fn merged_images(
    existing: Images,
    incoming: Images,
    columns: &[Option<usize>],
    fill: &[Value],
    preserve_changes: bool,
) -> Images {
    let (old_state, old_original, old_current) = existing;
    let (state, original, current) = incoming;
    let base = old_current.as_deref().or(old_original.as_deref());
    let original = original
        .or_else(|| current.clone())
        .map(|v| project(&v, columns, old_original.as_deref().or(base), fill));
    if preserve_changes && old_state.is_changed() {
        let state = match old_state {
            RowState::Added => RowState::Modified,
            other => other,
        };
        return (state, original, old_current);
    }
    let current = current.map(|v| project(&v, columns, base, fill));
    let original = if state == RowState::Added { None } else { original };
    (state, original, current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use tabula_core::schema::TableBuilder;
    use tabula_core::DataType;

    fn items(ds: &mut DataSet) -> TableId {
        let schema = TableBuilder::new("items")
            .unwrap()
            .add_column("id", DataType::Int32)
            .unwrap()
            .add_column("label", DataType::String)
            .unwrap()
            .add_primary_key(&["id"])
            .unwrap()
            .build()
            .unwrap();
        ds.add_table(Table::new(schema).unwrap()).unwrap()
    }

    #[test]
    fn test_copy_keeps_states() {
        let mut ds = DataSet::new("ds");
        let t = items(&mut ds);
        let a = ds.add_row(t, vec![Value::Int32(1), Value::from("a")]).unwrap();
        ds.accept_changes().unwrap();
        ds.set_value(t, a, 1, Value::from("b")).unwrap();
        let copy = ds.copy();
        let row = copy.row(t, a).unwrap();
        assert_eq!(row.state(), RowState::Modified);
        assert_eq!(row.get_version(1, RowVersion::Original).unwrap(), Value::from("a"));
        assert!(ds.clone_schema().table(t).unwrap().is_empty());
    }

    #[test]
    fn test_get_changes_none_when_clean() {
        let mut ds = DataSet::new("ds");
        let t = items(&mut ds);
        ds.add_row(t, vec![Value::Int32(1), Value::from("a")]).unwrap();
        ds.accept_changes().unwrap();
        assert!(ds.get_changes(None).unwrap().is_none());
        ds.add_row(t, vec![Value::Int32(2), Value::from("b")]).unwrap();
        let changes = ds.get_changes(None).unwrap().unwrap();
        assert_eq!(changes.table(t).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_overwrites_by_key_and_appends() {
        let mut target = DataSet::new("target");
        let t = items(&mut target);
        target.add_row(t, vec![Value::Int32(1), Value::from("old")]).unwrap();
        target.accept_changes().unwrap();

        let mut source = DataSet::new("source");
        let s = items(&mut source);
        source.add_row(s, vec![Value::Int32(1), Value::from("new")]).unwrap();
        source.add_row(s, vec![Value::Int32(2), Value::from("extra")]).unwrap();
        source.accept_changes().unwrap();

        target.merge(&source, false, MissingSchemaAction::Add).unwrap();
        let labels: Vec<Value> = target
            .rows(t)
            .unwrap()
            .iter()
            .map(|r| r.get("label").unwrap())
            .collect();
        assert_eq!(labels, vec![Value::from("new"), Value::from("extra")]);
    }

    #[test]
    fn test_merge_preserve_changes_keeps_current() {
        let mut target = DataSet::new("target");
        let t = items(&mut target);
        let a = target.add_row(t, vec![Value::Int32(1), Value::from("old")]).unwrap();
        target.accept_changes().unwrap();
        target.set_value(t, a, 1, Value::from("mine")).unwrap();

        let mut source = DataSet::new("source");
        let s = items(&mut source);
        source.add_row(s, vec![Value::Int32(1), Value::from("theirs")]).unwrap();
        source.accept_changes().unwrap();

        target.merge(&source, true, MissingSchemaAction::Add).unwrap();
        let row = target.row(t, a).unwrap();
        assert_eq!(row.get("label").unwrap(), Value::from("mine"));
        assert_eq!(row.get_version("label", RowVersion::Original).unwrap(), Value::from("theirs"));
        assert_eq!(row.state(), RowState::Modified);
    }

    #[test]
    fn test_merge_missing_schema() {
        let mut target = DataSet::new("target");
        let mut source = DataSet::new("source");
        let s = items(&mut source);
        source.add_row(s, vec![Value::Int32(1), Value::from("a")]).unwrap();
        assert!(target.merge(&source, false, MissingSchemaAction::Error).is_err());
        target.merge(&source, false, MissingSchemaAction::Ignore).unwrap();
        assert!(target.table_id("items").is_err());
        target.merge(&source, false, MissingSchemaAction::Add).unwrap();
        let t = target.table_id("items").unwrap();
        assert_eq!(target.table(t).unwrap().len(), 1);
        assert_eq!(target.row(t, target.table(t).unwrap().row_ids()[0]).unwrap().state(), RowState::Added);
    }

    #[test]
    fn test_import_row_keeps_versions() {
        let mut source = DataSet::new("source");
        let s = items(&mut source);
        let a = source.add_row(s, vec![Value::Int32(1), Value::from("a")]).unwrap();
        source.accept_changes().unwrap();
        source.delete_row(s, a).unwrap();

        let mut target = DataSet::new("target");
        let t = items(&mut target);
        let id = target.import_row(t, &source.row(s, a).unwrap()).unwrap();
        let row = target.row(t, id).unwrap();
        assert_eq!(row.state(), RowState::Deleted);
        assert_eq!(row.get_version("label", RowVersion::Original).unwrap(), Value::from("a"));
    }
}

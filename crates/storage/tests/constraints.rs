//! Integration tests for unique, not null, max length and foreign key
//! enforcement.

use tabula_core::schema::{Column, Rule, TableBuilder, TableId};
use tabula_core::{DataType, ErrorKind, RowState, Value};
use tabula_storage::{DataSet, ForeignKeyDef, RowStateFilter, Table};

/// Helper to create a table with (id:int unique, name:string).
fn people(ds: &mut DataSet) -> TableId {
    let schema = TableBuilder::new("people")
        .unwrap()
        .column(Column::new("id", DataType::Int32).unique(true))
        .unwrap()
        .column(Column::new("name", DataType::String).max_length(8))
        .unwrap()
        .build()
        .unwrap();
    ds.add_table(Table::new(schema).unwrap()).unwrap()
}

/// Helper to create parent(id unique) and child(pid) tables joined by a
/// foreign key with the given delete rule.
fn parent_child(rule: Rule) -> (DataSet, TableId, TableId) {
    let mut ds = DataSet::new("family");
    let parent = TableBuilder::new("parent")
        .unwrap()
        .column(Column::new("id", DataType::Int32).unique(true))
        .unwrap()
        .build()
        .unwrap();
    let child = TableBuilder::new("child")
        .unwrap()
        .add_column("pid", DataType::Int32)
        .unwrap()
        .add_column("tag", DataType::String)
        .unwrap()
        .build()
        .unwrap();
    let p = ds.add_table(Table::new(parent).unwrap()).unwrap();
    let c = ds.add_table(Table::new(child).unwrap()).unwrap();
    ds.add_foreign_key(
        ForeignKeyDef::new("fk_child", "parent", &["id"], "child", &["pid"]).delete_rule(rule),
    )
    .unwrap();
    for id in [1, 2] {
        ds.add_row(p, vec![Value::Int32(id)]).unwrap();
    }
    for (pid, tag) in [(1, "a"), (1, "b"), (2, "c")] {
        ds.add_row(c, vec![Value::Int32(pid), Value::from(tag)]).unwrap();
    }
    ds.accept_changes().unwrap();
    (ds, p, c)
}

fn live_count(ds: &DataSet, t: TableId) -> usize {
    ds.select(t, None, None, RowStateFilter::CURRENT_ROWS).unwrap().len()
}

fn row_with_key(ds: &DataSet, t: TableId, column: &str, key: i32) -> tabula_core::RowId {
    ds.rows(t)
        .unwrap()
        .into_iter()
        .find(|r| r.get(column).unwrap() == Value::Int32(key))
        .unwrap()
        .id()
}

#[test]
fn test_duplicate_unique_insert_fails() {
    let mut ds = DataSet::new("ds");
    let t = people(&mut ds);
    ds.add_row(t, vec![Value::Int32(1), Value::from("A")]).unwrap();
    ds.add_row(t, vec![Value::Int32(2), Value::from("B")]).unwrap();

    let err = ds.add_row(t, vec![Value::Int32(1), Value::from("C")]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert_eq!(ds.table(t).unwrap().len(), 2);
}

#[test]
fn test_unique_allows_reuse_after_delete_and_nulls() {
    let mut ds = DataSet::new("ds");
    let t = people(&mut ds);
    let a = ds.add_row(t, vec![Value::Int32(1), Value::from("A")]).unwrap();
    ds.accept_changes().unwrap();
    ds.delete_row(t, a).unwrap();
    ds.add_row(t, vec![Value::Int32(1), Value::from("again")]).unwrap();

    ds.add_row(t, vec![Value::Null, Value::from("x")]).unwrap();
    ds.add_row(t, vec![Value::Null, Value::from("y")]).unwrap();
    assert_eq!(live_count(&ds, t), 3);
}

#[test]
fn test_update_to_duplicate_key_is_rejected() {
    let mut ds = DataSet::new("ds");
    let t = people(&mut ds);
    ds.add_row(t, vec![Value::Int32(1), Value::from("A")]).unwrap();
    let b = ds.add_row(t, vec![Value::Int32(2), Value::from("B")]).unwrap();

    let err = ds.row_mut(t, b).unwrap().set("id", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert_eq!(ds.row(t, b).unwrap().get("id").unwrap(), Value::Int32(2));
}

#[test]
fn test_case_insensitive_string_keys() {
    let mut ds = DataSet::new("ds");
    let schema = TableBuilder::new("codes")
        .unwrap()
        .column(Column::new("code", DataType::String).unique(true))
        .unwrap()
        .build()
        .unwrap();
    let t = ds.add_table(Table::new(schema).unwrap()).unwrap();
    ds.add_row(t, vec![Value::from("abc")]).unwrap();
    assert!(ds.add_row(t, vec![Value::from("ABC")]).is_err());

    ds.set_case_sensitive(true).unwrap();
    ds.add_row(t, vec![Value::from("ABC")]).unwrap();
    // back to insensitive would leave two equal keys
    assert!(ds.set_case_sensitive(false).is_err());
}

#[test]
fn test_not_null_and_max_length() {
    let mut ds = DataSet::new("ds");
    let t = people(&mut ds);
    ds.set_allow_null(t, "name", false).unwrap();
    let err = ds.add_row(t, vec![Value::Int32(1)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);

    let err = ds
        .add_row(t, vec![Value::Int32(1), Value::from("far too long")])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert!(ds.table(t).unwrap().is_empty());
}

#[test]
fn test_orphan_child_rejected() {
    let (mut ds, _, c) = parent_child(Rule::Cascade);
    let err = ds.add_row(c, vec![Value::Int32(9), Value::from("z")]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    // a null key is exempt
    ds.add_row(c, vec![Value::Null, Value::from("z")]).unwrap();
}

#[test]
fn test_cascade_delete_removes_children() {
    let (mut ds, p, c) = parent_child(Rule::Cascade);
    let one = row_with_key(&ds, p, "id", 1);
    ds.delete_row(p, one).unwrap();

    let remaining: Vec<Value> = ds
        .select(c, None, None, RowStateFilter::CURRENT_ROWS)
        .unwrap()
        .into_iter()
        .map(|id| ds.row(c, id).unwrap().get("pid").unwrap())
        .collect();
    assert_eq!(remaining, vec![Value::Int32(2)]);
    let deleted = ds.select(c, None, None, RowStateFilter::DELETED).unwrap();
    assert_eq!(deleted.len(), 2);
}

#[test]
fn test_restrict_delete_leaves_tables_unchanged() {
    let (mut ds, p, c) = parent_child(Rule::None);
    let one = row_with_key(&ds, p, "id", 1);
    let err = ds.delete_row(p, one).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert_eq!(ds.row(p, one).unwrap().state(), RowState::Unchanged);
    assert_eq!(live_count(&ds, p), 2);
    assert_eq!(live_count(&ds, c), 3);
    assert!(!ds.has_changes(None));
}

#[test]
fn test_set_null_rule_clears_child_keys() {
    let (mut ds, p, c) = parent_child(Rule::SetNull);
    let one = row_with_key(&ds, p, "id", 1);
    ds.delete_row(p, one).unwrap();
    let nulls = ds
        .rows(c)
        .unwrap()
        .into_iter()
        .filter(|r| r.get("pid").unwrap().is_null())
        .count();
    assert_eq!(nulls, 2);
    assert_eq!(live_count(&ds, c), 3);
}

#[test]
fn test_cascade_update_rewrites_children() {
    let (mut ds, p, c) = parent_child(Rule::Cascade);
    // the unique column is not a primary key, so it stays writable
    let two = row_with_key(&ds, p, "id", 2);
    ds.row_mut(p, two).unwrap().set("id", 20).unwrap();
    let moved = ds
        .rows(c)
        .unwrap()
        .into_iter()
        .filter(|r| r.get("pid").unwrap() == Value::Int32(20))
        .count();
    assert_eq!(moved, 1);
}

#[test]
fn test_enable_enforcement_flags_violations() {
    let (mut ds, _, c) = parent_child(Rule::Cascade);
    ds.set_enforce_constraints(false).unwrap();
    let orphan = ds.add_row(c, vec![Value::Int32(7), Value::from("o")]).unwrap();

    let err = ds.set_enforce_constraints(true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert!(!ds.enforce_constraints());
    assert!(ds.row(c, orphan).unwrap().row_error().is_some());
    assert!(ds.has_errors());

    ds.row_mut(c, orphan).unwrap().delete().unwrap();
    ds.set_enforce_constraints(true).unwrap();
    assert!(ds.enforce_constraints());
}

#[test]
fn test_constraint_in_use_cannot_be_removed() {
    let (mut ds, p, c) = parent_child(Rule::Cascade);
    let unique = ds.table(p).unwrap().schema().unique_constraints().next().unwrap().1.name.clone();
    assert!(!ds.can_remove_constraint(p, &unique).unwrap());
    let err = ds.remove_constraint(p, &unique).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    ds.remove_constraint(c, "fk_child").unwrap();
    assert!(ds.can_remove_constraint(p, &unique).unwrap());
    ds.add_row(c, vec![Value::Int32(42), Value::from("free")]).unwrap();
}

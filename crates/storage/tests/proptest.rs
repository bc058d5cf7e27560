//! Property-based tests for tabula-storage using proptest.

use proptest::prelude::*;
use std::collections::HashSet;
use tabula_core::schema::{Column, Rule, TableBuilder, TableId};
use tabula_core::{DataType, RowId, RowState, RowVersion, Value};
use tabula_storage::{DataSet, ForeignKeyDef, RowStateFilter, Table};

fn keyed() -> (DataSet, TableId) {
    let mut ds = DataSet::new("ds");
    let schema = TableBuilder::new("items")
        .unwrap()
        .column(Column::new("k", DataType::Int32).unique(true))
        .unwrap()
        .add_column("v", DataType::Int32)
        .unwrap()
        .build()
        .unwrap();
    let t = ds.add_table(Table::new(schema).unwrap()).unwrap();
    (ds, t)
}

#[derive(Clone, Debug)]
enum Op {
    Add(i32, i32),
    Set(usize, i32),
    Delete(usize),
    Accept,
    Reject,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0i32..20, any::<i32>()).prop_map(|(k, v)| Op::Add(k, v)),
        (0usize..32, 0i32..20).prop_map(|(i, k)| Op::Set(i, k)),
        (0usize..32).prop_map(Op::Delete),
        Just(Op::Accept),
        Just(Op::Reject),
    ]
}

fn apply(ds: &mut DataSet, t: TableId, op: &Op) {
    let ids = ds.table(t).unwrap().row_ids();
    let pick = |i: usize| (!ids.is_empty()).then(|| ids[i % ids.len()]);
    // failures are part of the property: they must leave no trace
    let _ = match *op {
        Op::Add(k, v) => ds.add_row(t, vec![Value::Int32(k), Value::Int32(v)]).map(|_| ()),
        Op::Set(i, k) => match pick(i) {
            Some(id) => ds.set_value(t, id, 0, Value::Int32(k)),
            None => Ok(()),
        },
        Op::Delete(i) => match pick(i) {
            Some(id) => ds.delete_row(t, id),
            None => Ok(()),
        },
        Op::Accept => ds.accept_changes(),
        Op::Reject => ds.reject_changes(),
    };
}

fn snapshot(ds: &DataSet, t: TableId) -> Vec<(RowId, RowState, Vec<Value>)> {
    ds.rows(t)
        .unwrap()
        .iter()
        .map(|r| {
            let values = if r.has_version(RowVersion::Current) {
                r.values_at(RowVersion::Current).unwrap()
            } else {
                r.values_at(RowVersion::Original).unwrap()
            };
            (r.id(), r.state(), values)
        })
        .collect()
}

proptest! {
    /// No two live rows ever share a non-null unique key.
    #[test]
    fn unique_keys_stay_distinct(ops in prop::collection::vec(op(), 1..60)) {
        let (mut ds, t) = keyed();
        for op in &ops {
            apply(&mut ds, t, op);
            let mut seen = HashSet::new();
            for id in ds.select(t, None, None, RowStateFilter::CURRENT_ROWS).unwrap() {
                let k = ds.row(t, id).unwrap().get("k").unwrap();
                prop_assert!(seen.insert(format!("{}", k)), "duplicate key {}", k);
            }
        }
    }

    /// Versions exist exactly as the row state allows.
    #[test]
    fn versions_match_state(ops in prop::collection::vec(op(), 1..60)) {
        let (mut ds, t) = keyed();
        for op in &ops {
            apply(&mut ds, t, op);
        }
        for row in ds.rows(t).unwrap() {
            let state = row.state();
            prop_assert_eq!(row.has_version(RowVersion::Current), state != RowState::Deleted);
            prop_assert_eq!(row.has_version(RowVersion::Original), state != RowState::Added);
        }
    }

    /// Rejecting right after accepting changes nothing.
    #[test]
    fn reject_after_accept_is_noop(ops in prop::collection::vec(op(), 1..40)) {
        let (mut ds, t) = keyed();
        for op in &ops {
            apply(&mut ds, t, op);
        }
        ds.accept_changes().unwrap();
        let before = snapshot(&ds, t);
        ds.reject_changes().unwrap();
        prop_assert_eq!(snapshot(&ds, t), before);
        prop_assert!(!ds.has_changes(None));
    }

    /// A committed write reads back as the Current value.
    #[test]
    fn write_reads_back(v in any::<i32>(), edit in any::<bool>()) {
        let (mut ds, t) = keyed();
        let id = ds.add_row(t, vec![Value::Int32(1), Value::Int32(0)]).unwrap();
        let mut row = ds.row_mut(t, id).unwrap();
        if edit {
            row.begin_edit().unwrap();
        }
        row.set("v", v).unwrap();
        if edit {
            row.end_edit().unwrap();
        }
        prop_assert_eq!(
            ds.row(t, id).unwrap().get_version("v", RowVersion::Current).unwrap(),
            Value::Int32(v)
        );
    }

    /// Computed values are stable and follow their inputs.
    #[test]
    fn expression_follows_inputs(a in -1000i32..1000, b in -1000i32..1000) {
        let (mut ds, t) = keyed();
        ds.add_column(t, Column::new("sum", DataType::Int32).expression("k + v")).unwrap();
        let id = ds.add_row(t, vec![Value::Int32(a), Value::Int32(0)]).unwrap();
        let first = ds.row(t, id).unwrap().get("sum").unwrap();
        prop_assert_eq!(first.clone(), ds.row(t, id).unwrap().get("sum").unwrap());
        prop_assert_eq!(first, Value::Int32(a));
        ds.set_value(t, id, 1, Value::Int32(b)).unwrap();
        prop_assert_eq!(ds.row(t, id).unwrap().get("sum").unwrap(), Value::Int32(a + b));
    }

    /// Cascading deletes leave no live child of a deleted parent; a
    /// restricting rule leaves both tables as they were.
    #[test]
    fn delete_rules_hold(children in prop::collection::vec(0i32..4, 0..12), victim in 0i32..4, cascade in any::<bool>()) {
        let mut ds = DataSet::new("ds");
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
            .build()
            .unwrap();
        let p = ds.add_table(Table::new(parent).unwrap()).unwrap();
        let c = ds.add_table(Table::new(child).unwrap()).unwrap();
        let rule = if cascade { Rule::Cascade } else { Rule::None };
        ds.add_foreign_key(ForeignKeyDef::new("fk", "parent", &["id"], "child", &["pid"]).delete_rule(rule))
            .unwrap();
        for id in 0..4 {
            ds.add_row(p, vec![Value::Int32(id)]).unwrap();
        }
        for &pid in &children {
            ds.add_row(c, vec![Value::Int32(pid)]).unwrap();
        }
        ds.accept_changes().unwrap();

        let target = ds.select(p, Some(&format!("id = {}", victim)), None, RowStateFilter::CURRENT_ROWS)
            .unwrap()[0];
        let referenced = children.contains(&victim);
        let result = ds.delete_row(p, target);
        let live = |ds: &DataSet, t| ds.select(t, None, None, RowStateFilter::CURRENT_ROWS).unwrap().len();
        if cascade || !referenced {
            prop_assert!(result.is_ok());
            let orphans = ds.select(c, Some(&format!("pid = {}", victim)), None, RowStateFilter::CURRENT_ROWS)
                .unwrap();
            prop_assert!(orphans.is_empty());
        } else {
            prop_assert!(result.is_err());
            prop_assert_eq!(live(&ds, p), 4);
            prop_assert_eq!(live(&ds, c), children.len());
            prop_assert!(!ds.has_changes(None));
        }
    }
}

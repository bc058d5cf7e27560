//! Integration tests for whole data set operations: schema changes,
//! change extraction, copies, merges and table notifications.

use std::cell::RefCell;
use std::rc::Rc;

use tabula_core::schema::{Column, TableBuilder, TableId};
use tabula_core::{DataType, ErrorKind, RowState, RowVersion, Value};
use tabula_reactive::{ListChanged, ListChangedKind};
use tabula_storage::{
    DataSet, DataSetOptions, MissingSchemaAction, RelationDef, RowStateFilter, Table,
};

struct Orders {
    ds: DataSet,
    customers: TableId,
    orders: TableId,
}

/// Helper to create customers(id pk, name) and orders(id pk, customer, qty)
/// related by `CustOrders`, with two customers and three orders, all
/// accepted.
fn orders() -> Orders {
    let mut ds = DataSet::new("shop");
    let customers = TableBuilder::new("customers")
        .unwrap()
        .add_column("id", DataType::Int32)
        .unwrap()
        .add_column("name", DataType::String)
        .unwrap()
        .add_primary_key(&["id"])
        .unwrap()
        .build()
        .unwrap();
    let orders = TableBuilder::new("orders")
        .unwrap()
        .add_column("id", DataType::Int32)
        .unwrap()
        .add_column("customer", DataType::Int32)
        .unwrap()
        .add_column("qty", DataType::Int32)
        .unwrap()
        .add_primary_key(&["id"])
        .unwrap()
        .build()
        .unwrap();
    let c = ds.add_table(Table::new(customers).unwrap()).unwrap();
    let o = ds.add_table(Table::new(orders).unwrap()).unwrap();
    ds.add_relation(
        RelationDef::new("CustOrders", "customers", &["id"], "orders", &["customer"]),
        true,
    )
    .unwrap();
    ds.add_row(c, vec![Value::Int32(1), Value::from("Alice")]).unwrap();
    ds.add_row(c, vec![Value::Int32(2), Value::from("Bob")]).unwrap();
    for (id, customer, qty) in [(10, 1, 5), (11, 2, 1), (12, 1, 7)] {
        ds.add_row(o, vec![Value::Int32(id), Value::Int32(customer), Value::Int32(qty)])
            .unwrap();
    }
    ds.accept_changes().unwrap();
    Orders {
        ds,
        customers: c,
        orders: o,
    }
}

fn key(ds: &DataSet, t: TableId, id: i32) -> tabula_core::RowId {
    ds.find_row(t, &[Value::Int32(id)]).unwrap().unwrap()
}

#[test]
fn test_get_changes_brings_referenced_parents() {
    let mut s = orders();
    let order = key(&s.ds, s.orders, 11);
    s.ds.set_value(s.orders, order, 2, Value::Int32(3)).unwrap();

    let changes = s.ds.get_changes(None).unwrap().unwrap();
    let customers = changes.table(s.customers).unwrap();
    assert_eq!(customers.len(), 1);
    let bob = changes.rows(s.customers).unwrap().remove(0);
    assert_eq!(bob.get("name").unwrap(), Value::from("Bob"));
    assert_eq!(bob.state(), RowState::Unchanged);
    let changed = changes.rows(s.orders).unwrap().remove(0);
    assert_eq!(changed.state(), RowState::Modified);
    assert_eq!(changed.get_version("qty", RowVersion::Original).unwrap(), Value::Int32(1));

    let added_only = s.ds.get_changes(Some(RowStateFilter::ADDED)).unwrap();
    assert!(added_only.is_none());
}

#[test]
fn test_has_changes_by_state() {
    let mut s = orders();
    assert!(!s.ds.has_changes(None));
    let order = key(&s.ds, s.orders, 10);
    s.ds.delete_row(s.orders, order).unwrap();
    assert!(s.ds.has_changes(None));
    assert!(s.ds.has_changes(Some(RowStateFilter::DELETED)));
    assert!(!s.ds.has_changes(Some(RowStateFilter::ADDED)));
}

#[test]
fn test_clone_schema_and_copy() {
    let mut s = orders();
    let order = key(&s.ds, s.orders, 12);
    s.ds.delete_row(s.orders, order).unwrap();

    let empty = s.ds.clone_schema();
    assert!(empty.table(s.orders).unwrap().is_empty());
    assert!(empty.relation("CustOrders").is_ok());

    let mut copy = s.ds.copy();
    assert_eq!(copy.row(s.orders, order).unwrap().state(), RowState::Deleted);
    copy.reject_changes().unwrap();
    assert_eq!(copy.row(s.orders, order).unwrap().state(), RowState::Unchanged);
    // the source is untouched
    assert_eq!(s.ds.row(s.orders, order).unwrap().state(), RowState::Deleted);
}

#[test]
fn test_merge_changes_back() {
    let mut s = orders();
    let mut changes = s.ds.clone_schema();
    let order = key(&s.ds, s.orders, 10);
    s.ds.set_value(s.orders, order, 2, Value::Int32(50)).unwrap();
    changes.merge(&s.ds.get_changes(None).unwrap().unwrap(), false, MissingSchemaAction::Add)
        .unwrap();
    changes.accept_changes().unwrap();

    s.ds.merge(&changes, false, MissingSchemaAction::Add).unwrap();
    let row = s.ds.row(s.orders, order).unwrap();
    assert_eq!(row.get("qty").unwrap(), Value::Int32(50));
    assert_eq!(row.state(), RowState::Unchanged);
    assert_eq!(s.ds.table(s.orders).unwrap().len(), 3);
}

#[test]
fn test_merge_adds_missing_columns() {
    let mut s = orders();
    let mut source = s.ds.clone_schema();
    source
        .add_column(s.customers, Column::new("city", DataType::String))
        .unwrap();
    source
        .add_row(s.customers, vec![Value::Int32(1), Value::from("Alice"), Value::from("Oslo")])
        .unwrap();

    let err = s.ds.merge(&source, false, MissingSchemaAction::Error).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert_eq!(s.ds.table(s.customers).unwrap().schema().width(), 2);

    s.ds.merge(&source, false, MissingSchemaAction::Ignore).unwrap();
    assert_eq!(s.ds.table(s.customers).unwrap().schema().width(), 2);

    s.ds.merge(&source, false, MissingSchemaAction::Add).unwrap();
    let alice = key(&s.ds, s.customers, 1);
    assert_eq!(s.ds.row(s.customers, alice).unwrap().get("city").unwrap(), Value::from("Oslo"));
}

#[test]
fn test_merge_violation_changes_nothing() {
    let mut s = orders();
    let mut source = s.ds.clone_schema();
    source.set_enforce_constraints(false).unwrap();
    source
        .add_row(s.orders, vec![Value::Int32(20), Value::Int32(9), Value::Int32(1)])
        .unwrap();

    let err = s.ds.merge(&source, false, MissingSchemaAction::Add).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert_eq!(s.ds.table(s.orders).unwrap().len(), 3);
    assert!(s.ds.enforce_constraints());
}

#[test]
fn test_import_row_between_tables() {
    let mut s = orders();
    let mut archive = DataSet::with_options("archive", DataSetOptions::default());
    let t = archive
        .add_table(
            Table::new(
                TableBuilder::new("orders")
                    .unwrap()
                    .add_column("id", DataType::Int32)
                    .unwrap()
                    .add_column("note", DataType::String)
                    .unwrap()
                    .build()
                    .unwrap(),
            )
            .unwrap(),
        )
        .unwrap();
    let order = key(&s.ds, s.orders, 11);
    s.ds.set_value(s.orders, order, 2, Value::Int32(8)).unwrap();

    let imported = archive.import_row(t, &s.ds.row(s.orders, order).unwrap()).unwrap();
    let row = archive.row(t, imported).unwrap();
    assert_eq!(row.state(), RowState::Modified);
    assert_eq!(row.get("id").unwrap(), Value::Int32(11));
    assert!(row.get("note").unwrap().is_null());
}

#[test]
fn test_clear_respects_foreign_keys() {
    let mut s = orders();
    let err = s.ds.clear_table(s.customers).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    s.ds.clear_table(s.orders).unwrap();
    s.ds.clear_table(s.customers).unwrap();
    assert!(s.ds.table(s.customers).unwrap().is_empty());

    let mut t = orders();
    t.ds.clear().unwrap();
    assert!(t.ds.table(t.orders).unwrap().is_empty());
    t.ds.reset();
    assert!(t.ds.table_names().is_empty());
    assert!(t.ds.relation("CustOrders").is_err());
}

#[test]
fn test_remove_table_in_relation_fails() {
    let mut s = orders();
    assert!(s.ds.remove_table("orders").is_err());
    s.ds.remove_relation("CustOrders").unwrap();
    s.ds.remove_table("orders").unwrap();
    assert!(s.ds.table(s.orders).is_err());
}

#[test]
fn test_schema_changes_keep_data() {
    let mut s = orders();
    s.ds.rename_column(s.orders, "qty", "quantity").unwrap();
    s.ds.set_column_type(s.orders, "quantity", DataType::Float64).unwrap();
    let order = key(&s.ds, s.orders, 12);
    assert_eq!(
        s.ds.row(s.orders, order).unwrap().get("quantity").unwrap(),
        Value::Float64(7.0)
    );
    assert!(s.ds.set_column_type(s.orders, "customer", DataType::Int64).is_err());

    s.ds.set_primary_key(s.orders, &[]).unwrap();
    s.ds.row_mut(s.orders, order).unwrap().set("id", 13).unwrap();
    s.ds.remove_column(s.orders, "quantity").unwrap();
    assert_eq!(s.ds.table(s.orders).unwrap().schema().width(), 2);
}

#[test]
fn test_table_notifications() {
    let mut s = orders();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    s.ds.subscribe_table(s.customers, move |e| sink.borrow_mut().push(*e))
        .unwrap();

    let carol = s.ds.add_row(s.customers, vec![Value::Int32(3), Value::from("Carol")]).unwrap();
    s.ds.set_value(s.customers, carol, 1, Value::from("Caro")).unwrap();
    s.ds.add_column(s.customers, Column::new("city", DataType::String)).unwrap();
    s.ds.delete_row(s.customers, carol).unwrap();

    let kinds: Vec<ListChangedKind> = events.borrow().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ListChangedKind::ItemAdded,
            ListChangedKind::ItemChanged,
            ListChangedKind::ColumnAdded,
            ListChangedKind::ItemDeleted
        ]
    );
    assert_eq!(events.borrow()[0], ListChanged::added(2));
}

//! Tabula Storage - tables, relations, constraints and views.
//!
//! This crate holds the in-memory relational model:
//!
//! - `DataSet`: a named group of tables and the relations between them
//! - `Table`: rows with their change state and key indexes
//! - `ConstraintChecker`: unique, not null and foreign key validation
//! - `Journal`: row images for rolling back a failed operation
//! - `DataView`: a sorted, filtered and live-maintained window on a table
//!
//! # Example
//!
//! ```rust
//! use tabula_core::schema::TableBuilder;
//! use tabula_core::{DataType, RowState, Value};
//! use tabula_storage::{DataSet, RelationDef, Table};
//!
//! let mut ds = DataSet::new("shop");
//! let customers = TableBuilder::new("customers")
//!     .unwrap()
//!     .add_column("id", DataType::Int32)
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .add_primary_key(&["id"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let orders = TableBuilder::new("orders")
//!     .unwrap()
//!     .add_column("id", DataType::Int32)
//!     .unwrap()
//!     .add_column("customer", DataType::Int32)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let c = ds.add_table(Table::new(customers).unwrap()).unwrap();
//! let o = ds.add_table(Table::new(orders).unwrap()).unwrap();
//! ds.add_relation(
//!     RelationDef::new("customer_orders", "customers", &["id"], "orders", &["customer"]),
//!     true,
//! )
//! .unwrap();
//!
//! let alice = ds.add_row(c, vec![Value::Int32(1), Value::from("Alice")]).unwrap();
//! ds.add_row(o, vec![Value::Int32(10), Value::Int32(1)]).unwrap();
//! assert!(ds.add_row(o, vec![Value::Int32(11), Value::Int32(2)]).is_err());
//!
//! let children = ds.row(c, alice).unwrap().child_rows("customer_orders").unwrap();
//! assert_eq!(children.len(), 1);
//!
//! ds.accept_changes().unwrap();
//! assert_eq!(ds.row(c, alice).unwrap().state(), RowState::Unchanged);
//! ```

#![no_std]

extern crate alloc;

pub mod alter;
pub mod constraint;
pub(crate) mod context;
pub mod dataset;
pub mod handle;
pub mod journal;
pub mod merge;
pub mod mutation;
pub mod relation;
pub mod select;
pub mod settings;
pub mod state_filter;
pub mod table;
pub mod view;

pub use constraint::ConstraintChecker;
pub use dataset::DataSet;
pub use handle::{ColumnSelector, RowMut, RowRef, ViewMut, ViewRef};
pub use journal::Journal;
pub use merge::MissingSchemaAction;
pub use relation::{ForeignKeyDef, Relation, RelationDef};
pub use settings::{DataSetOptions, TableSettings};
pub use state_filter::RowStateFilter;
pub use table::Table;
pub use view::{DataView, ViewId};

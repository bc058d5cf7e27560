//! Tabula Core - Core types and schema definitions for the Tabula data engine.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - `DataType`: Declared column types
//! - `Value`: Runtime values, with type coercion and case-aware comparison
//! - `Row`: A versioned row (Original / Current / Proposed) with a lifecycle state
//! - `schema`: Columns, table schemas and constraint definitions
//! - `Error`: Error types for every operation, grouped by `ErrorKind`
//!
//! # Example
//!
//! ```rust
//! use tabula_core::{DataType, Row, RowEvent, RowState, RowVersion, Value};
//! use tabula_core::schema::{Column, TableBuilder};
//!
//! let schema = TableBuilder::new("users")
//!     .unwrap()
//!     .column(Column::new("id", DataType::Int64).auto_increment(1, 1))
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .add_primary_key(&["id"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! assert_eq!(schema.primary_key(), &[0]);
//!
//! let mut row = Row::detached(1, vec![Value::Int64(1), Value::from("Alice")]);
//! row.apply(RowEvent::Insert).unwrap();
//! assert_eq!(row.state(), RowState::Added);
//! assert_eq!(row.value(1, RowVersion::Current).unwrap(), &Value::from("Alice"));
//! ```

#![no_std]

extern crate alloc;

pub mod datetime;
mod error;
pub mod pattern_match;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{Error, ErrorKind, Result};
pub use row::{next_row_id, Cell, Row, RowEvent, RowId, RowState, RowVersion};
pub use types::DataType;
pub use value::Value;

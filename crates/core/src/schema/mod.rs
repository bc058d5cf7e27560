//! Schema module for Tabula.
//!
//! This module contains the schema-related definitions: columns, table
//! schemas and the unique/foreign key constraints a table owns.

mod column;
mod constraint;
mod table;

pub use column::{AutoIncrement, Column};
pub use constraint::{
    next_constraint_id, same_columns, AcceptRejectRule, Constraint, ConstraintId, ConstraintKind,
    ForeignKeyConstraint, RelationId, Rule, TableId, UniqueConstraint,
};
pub use table::{names_match, TableBuilder, TableSchema};

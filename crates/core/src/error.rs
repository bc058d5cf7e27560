//! Error types for Tabula.
//!
//! Every variant names the table, column, constraint, relation, row or
//! identifier involved so that callers can render a precise diagnostic.
//! [`Error::kind`] groups the variants into the broad families callers
//! usually branch on.

use crate::row::{RowId, RowVersion};
use crate::types::DataType;
use alloc::string::String;
use thiserror::Error;

/// Result type alias for Tabula operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The family an [`Error`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Duplicate or missing names, invalid schema changes, expression syntax.
    Schema,
    /// Uniqueness, referential integrity, not-null, max-length, read-only.
    Constraint,
    /// Unknown identifiers, operand type mismatches, arity mismatches, cycles.
    Evaluate,
    /// A row version that does not exist for the row's state was requested.
    VersionNotFound,
    /// The operation is invalid for the current lifecycle state.
    State,
    /// An argument was rejected (bad index, bad key arity, failed conversion).
    Argument,
}

/// Error types for Tabula operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Adding a column whose name is taken in its table.
    #[error("A column named '{column}' already belongs to table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// A column name or ordinal that does not resolve.
    #[error("Column '{column}' does not belong to table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Adding a table whose name is taken in the data set.
    #[error("A table named '{0}' already belongs to this data set")]
    DuplicateTable(String),

    /// A table name or id that does not resolve.
    #[error("Table '{0}' does not belong to this data set")]
    TableNotFound(String),

    /// Adding a constraint whose name is taken in its table.
    #[error("A constraint named '{constraint}' already belongs to table '{table}'")]
    DuplicateConstraint { table: String, constraint: String },

    /// A constraint name or id that does not resolve.
    #[error("Constraint '{constraint}' does not belong to table '{table}'")]
    ConstraintNotFound { table: String, constraint: String },

    /// Adding a relation whose name is taken in the data set.
    #[error("A relation named '{0}' already belongs to this data set")]
    DuplicateRelation(String),

    /// A relation name that does not resolve, or resolves ambiguously.
    #[error("Relation '{0}' does not belong to this data set")]
    RelationNotFound(String),

    /// A schema change that would leave the schema inconsistent.
    #[error("Invalid schema: {message}")]
    InvalidSchema { message: String },

    /// Malformed expression, filter or sort text.
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// Two live rows would share a key under a unique constraint.
    #[error("Column(s) '{columns}' of table '{table}' are constrained to be unique by '{constraint}'. Value '{value}' is already present")]
    UniqueViolation {
        table: String,
        constraint: String,
        columns: String,
        value: String,
    },

    /// A child row without a parent, or a parent change blocked by children.
    #[error("Foreign key constraint '{constraint}' violated: {message}")]
    ForeignKeyViolation { constraint: String, message: String },

    /// A null stored in a column that disallows nulls.
    #[error("Column '{column}' of table '{table}' does not allow nulls")]
    NullViolation { table: String, column: String },

    /// A string longer than its column allows.
    #[error("Value of length {length} exceeds MaxLength {max_length} of column '{column}' in table '{table}'")]
    MaxLengthExceeded {
        table: String,
        column: String,
        max_length: usize,
        length: usize,
    },

    /// A write to a read-only or computed column.
    #[error("Column '{column}' of table '{table}' is read only")]
    ReadOnly { table: String, column: String },

    /// A value that does not convert to its column type.
    #[error("Cannot store '{value}' in column '{column}'; expected type is {expected}")]
    InvalidCast {
        column: String,
        value: String,
        expected: DataType,
    },

    /// An expression failed at evaluation time.
    #[error("Evaluation error: {message}")]
    Evaluate { message: String },

    /// Computed columns that depend on each other.
    #[error("Cyclic reference while evaluating column '{column}' of table '{table}'")]
    CyclicEvaluation { table: String, column: String },

    /// A row version the row does not currently hold.
    #[error("There is no {version:?} data to access for row {row}")]
    VersionNotFound { row: RowId, version: RowVersion },

    /// Reading current values of a deleted row.
    #[error("Deleted row {row} information cannot be accessed through the row")]
    DeletedRowInaccessible { row: RowId },

    /// A row id that is neither attached nor detached in the table.
    #[error("Row {row} does not belong to table '{table}'")]
    RowNotFound { table: String, row: RowId },

    /// An operation not allowed in the current lifecycle state.
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Removing a constraint that something else depends on.
    #[error("Cannot remove constraint '{constraint}': {message}")]
    ConstraintInUse { constraint: String, message: String },

    /// An argument outside the accepted range or shape.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl Error {
    /// Returns the family this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateColumn { .. }
            | Error::ColumnNotFound { .. }
            | Error::DuplicateTable(_)
            | Error::TableNotFound(_)
            | Error::DuplicateConstraint { .. }
            | Error::ConstraintNotFound { .. }
            | Error::DuplicateRelation(_)
            | Error::RelationNotFound(_)
            | Error::InvalidSchema { .. }
            | Error::Syntax { .. } => ErrorKind::Schema,
            Error::UniqueViolation { .. }
            | Error::ForeignKeyViolation { .. }
            | Error::NullViolation { .. }
            | Error::MaxLengthExceeded { .. }
            | Error::ReadOnly { .. } => ErrorKind::Constraint,
            Error::Evaluate { .. } | Error::CyclicEvaluation { .. } => ErrorKind::Evaluate,
            Error::VersionNotFound { .. } => ErrorKind::VersionNotFound,
            Error::DeletedRowInaccessible { .. }
            | Error::InvalidState { .. }
            | Error::ConstraintInUse { .. } => ErrorKind::State,
            Error::InvalidCast { .. } | Error::RowNotFound { .. } | Error::InvalidArgument { .. } => {
                ErrorKind::Argument
            }
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound(name.into())
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a syntax error at the given character offset.
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Creates an evaluation error.
    pub fn evaluate(message: impl Into<String>) -> Self {
        Error::Evaluate {
            message: message.into(),
        }
    }

    /// Creates a not-null violation.
    pub fn null_violation(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::NullViolation {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a read-only violation.
    pub fn read_only(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ReadOnly {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a foreign key violation.
    pub fn foreign_key(constraint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ForeignKeyViolation {
            constraint: constraint.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = Error::null_violation("orders", "customer");
        assert!(err.to_string().contains("customer"));
        assert!(err.to_string().contains("orders"));

        let err = Error::table_not_found("users");
        assert!(err.to_string().contains("users"));

        let err = Error::VersionNotFound {
            row: 7,
            version: RowVersion::Original,
        };
        assert!(err.to_string().contains("Original"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::syntax(3, "unexpected token").kind(), ErrorKind::Schema);
        assert_eq!(Error::foreign_key("fk", "missing parent").kind(), ErrorKind::Constraint);
        assert_eq!(Error::evaluate("unknown column").kind(), ErrorKind::Evaluate);
        assert_eq!(Error::DeletedRowInaccessible { row: 1 }.kind(), ErrorKind::State);
        assert_eq!(
            Error::ConstraintInUse {
                constraint: "pk".into(),
                message: "primary key".into()
            }
            .kind(),
            ErrorKind::State
        );
        assert_eq!(Error::invalid_argument("bad index").kind(), ErrorKind::Argument);
    }
}

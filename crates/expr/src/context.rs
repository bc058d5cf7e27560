//! The seam between the evaluator and row storage.

use crate::ast::AggregateScope;
use alloc::vec::Vec;
use tabula_core::{Result, Value};

/// Supplies the values an expression reads.
///
/// Storage implements this for a (table, row, version) triple. Lookups of
/// unknown columns or relations must fail with an `Evaluate` error naming
/// the missing identifier.
pub trait EvalContext {
    /// Value of a column of the evaluating row.
    fn column_value(&self, column: &str) -> Result<Value>;

    /// Value of a column of the evaluating row's parent. Null when the row
    /// has no parent.
    fn parent_value(&self, relation: Option<&str>, column: &str) -> Result<Value>;

    /// Values of `column` across the rows the scope selects.
    fn aggregate_values(&self, scope: &AggregateScope, column: &str) -> Result<Vec<Value>>;

    /// Whether string comparisons honour case.
    fn case_sensitive(&self) -> bool {
        false
    }
}

/// A context with no row. Any column reference fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyContext {
    pub case_sensitive: bool,
}

impl EvalContext for EmptyContext {
    fn column_value(&self, column: &str) -> Result<Value> {
        Err(tabula_core::Error::evaluate(alloc::format!(
            "Cannot find column [{}]",
            column
        )))
    }

    fn parent_value(&self, _relation: Option<&str>, column: &str) -> Result<Value> {
        self.column_value(column)
    }

    fn aggregate_values(&self, _scope: &AggregateScope, column: &str) -> Result<Vec<Value>> {
        self.column_value(column).map(|_| Vec::new())
    }

    fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

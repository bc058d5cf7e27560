//! Expression evaluation against stored rows, and relation navigation.
//!
//! Computed cells are evaluated on every read, so a value never lags
//! behind its inputs. An evaluation stack of (table, row, column) triples
//! in flight turns a dependency cycle into a `CyclicEvaluation` error
//! instead of unbounded recursion.

use crate::dataset::DataSet;
use crate::relation::Relation;
use crate::table::Table;
use alloc::format;
use alloc::vec::Vec;
use core::cell::RefCell;
use tabula_core::schema::TableId;
use tabula_core::{Error, Result, Row, RowId, RowState, RowVersion, Value};
use tabula_expr::{AggregateScope, EvalContext, Expr, Expression};
use tabula_index::tuple_key;

/// Cells currently being evaluated.
pub(crate) type EvalStack = RefCell<Vec<(TableId, RowId, usize)>>;

fn missing_column(name: &str) -> Error {
    Error::evaluate(format!("Cannot find column [{}]", name))
}

/// Evaluation context of one row at one version.
pub(crate) struct RowContext<'a> {
    pub ds: &'a DataSet,
    pub table: &'a Table,
    pub row: &'a Row,
    pub version: RowVersion,
    pub stack: &'a EvalStack,
}

impl<'a> RowContext<'a> {
    /// Version used to read rows reached through a relation.
    fn related_version(&self) -> RowVersion {
        if self.version == RowVersion::Original {
            RowVersion::Original
        } else {
            RowVersion::Current
        }
    }
}

impl<'a> EvalContext for RowContext<'a> {
    fn column_value(&self, column: &str) -> Result<Value> {
        let col = self
            .table
            .schema()
            .find_column(column)
            .ok_or_else(|| missing_column(column))?;
        self.ds
            .cell_value(self.table, self.row, col, self.version, self.stack)
    }

    fn parent_value(&self, relation: Option<&str>, column: &str) -> Result<Value> {
        let rel = self.ds.navigation_relation(self.table, relation, false)?;
        let parent_table = self.ds.table(rel.parent_table)?;
        let col = parent_table
            .schema()
            .find_column(column)
            .ok_or_else(|| missing_column(column))?;
        let version = self.related_version();
        match self.ds.parent_of(rel, self.row, self.version)? {
            Some(parent) => self
                .ds
                .cell_value(parent_table, parent, col, version, self.stack),
            None => Ok(Value::Null),
        }
    }

    fn aggregate_values(&self, scope: &AggregateScope, column: &str) -> Result<Vec<Value>> {
        match scope {
            AggregateScope::Local => {
                let col = self
                    .table
                    .schema()
                    .find_column(column)
                    .ok_or_else(|| missing_column(column))?;
                let version = self.related_version();
                self.table
                    .rows()
                    .filter(|r| r.has_version(version))
                    .map(|r| self.ds.cell_value(self.table, r, col, version, self.stack))
                    .collect()
            }
            AggregateScope::Child(name) => {
                let rel = self.ds.navigation_relation(self.table, name.as_deref(), true)?;
                let child_table = self.ds.table(rel.child_table)?;
                let col = child_table
                    .schema()
                    .find_column(column)
                    .ok_or_else(|| missing_column(column))?;
                let version = self.related_version();
                self.ds
                    .children_of(rel, self.row, self.version)?
                    .into_iter()
                    .map(|r| self.ds.cell_value(child_table, r, col, version, self.stack))
                    .collect()
            }
        }
    }

    fn case_sensitive(&self) -> bool {
        self.table.case_sensitive()
    }
}

/// Context for `compute`: only aggregates over the selected rows resolve.
pub(crate) struct ComputeContext<'a> {
    pub ds: &'a DataSet,
    pub table: &'a Table,
    pub rows: Vec<&'a Row>,
    pub stack: &'a EvalStack,
}

impl<'a> EvalContext for ComputeContext<'a> {
    fn column_value(&self, column: &str) -> Result<Value> {
        Err(Error::evaluate(format!(
            "Column [{}] must be used inside an aggregate function",
            column
        )))
    }

    fn parent_value(&self, _relation: Option<&str>, column: &str) -> Result<Value> {
        self.column_value(column)
    }

    fn aggregate_values(&self, scope: &AggregateScope, column: &str) -> Result<Vec<Value>> {
        if let AggregateScope::Child(_) = scope {
            return Err(Error::evaluate(format!(
                "Child aggregate of [{}] needs a row to start from",
                column
            )));
        }
        let col = self
            .table
            .schema()
            .find_column(column)
            .ok_or_else(|| missing_column(column))?;
        self.rows
            .iter()
            .map(|r| {
                self.ds
                    .cell_value(self.table, r, col, RowVersion::Current, self.stack)
            })
            .collect()
    }

    fn case_sensitive(&self) -> bool {
        self.table.case_sensitive()
    }
}

impl DataSet {
    /// Reads one cell, evaluating computed columns.
    pub(crate) fn cell_value(
        &self,
        table: &Table,
        row: &Row,
        column: usize,
        version: RowVersion,
        stack: &EvalStack,
    ) -> Result<Value> {
        let version = row.resolve(version)?;
        let Some(expr) = table.expression(column) else {
            return row.value(column, version).cloned();
        };
        let frame = (table.id(), row.id(), column);
        if stack.borrow().contains(&frame) {
            let name = table.schema().column(column).map_or("", |c| c.name());
            return Err(Error::CyclicEvaluation {
                table: table.name().into(),
                column: name.into(),
            });
        }
        stack.borrow_mut().push(frame);
        let ctx = RowContext {
            ds: self,
            table,
            row,
            version,
            stack,
        };
        let result = expr.evaluate(&ctx);
        stack.borrow_mut().pop();
        let value = result?;
        let col = &table.schema().columns()[column];
        value.coerce_to(col.data_type()).ok_or_else(|| Error::InvalidCast {
            column: col.name().into(),
            value: format!("{}", value),
            expected: col.data_type(),
        })
    }

    /// Reads one cell with a fresh evaluation stack.
    pub(crate) fn read_cell(
        &self,
        table: &Table,
        row: &Row,
        column: usize,
        version: RowVersion,
    ) -> Result<Value> {
        let stack = EvalStack::default();
        self.cell_value(table, row, column, version, &stack)
    }

    /// Reads every cell of a row at one version.
    pub(crate) fn read_row(&self, table: &Table, row: &Row, version: RowVersion) -> Result<Vec<Value>> {
        let stack = EvalStack::default();
        (0..table.schema().width())
            .map(|c| self.cell_value(table, row, c, version, &stack))
            .collect()
    }

    /// Evaluates a filter against a row at one version.
    pub(crate) fn row_matches(
        &self,
        table: &Table,
        row: &Row,
        version: RowVersion,
        filter: &Expression,
    ) -> Result<bool> {
        let stack = EvalStack::default();
        let ctx = RowContext {
            ds: self,
            table,
            row,
            version,
            stack: &stack,
        };
        filter.matches(&ctx)
    }

    /// Resolves the relation an expression navigates from `table`.
    ///
    /// Without a name, the table must have exactly one relation on the
    /// requested side.
    pub(crate) fn navigation_relation(
        &self,
        table: &Table,
        name: Option<&str>,
        to_child: bool,
    ) -> Result<&Relation> {
        let side = |r: &Relation| {
            if to_child {
                r.parent_table == table.id()
            } else {
                r.child_table == table.id()
            }
        };
        let kind = if to_child { "child" } else { "parent" };
        match name {
            Some(name) => {
                let rel = self
                    .relation(name)
                    .map_err(|_| Error::evaluate(format!("Cannot find relation [{}]", name)))?;
                if side(rel) {
                    Ok(rel)
                } else {
                    Err(Error::evaluate(format!(
                        "Relation [{}] is not a {} relation of table [{}]",
                        name,
                        kind,
                        table.name()
                    )))
                }
            }
            None => {
                let mut found = self.relations.iter().filter(|r| side(r));
                match (found.next(), found.next()) {
                    (Some(r), None) => Ok(r),
                    (Some(_), Some(_)) => Err(Error::evaluate(format!(
                        "Table [{}] has more than one {} relation; name one",
                        table.name(),
                        kind
                    ))),
                    _ => Err(Error::evaluate(format!(
                        "Table [{}] has no {} relation",
                        table.name(),
                        kind
                    ))),
                }
            }
        }
    }

    /// Rows of the child table whose child key equals `row`'s parent key.
    ///
    /// At the Original version, children are matched on their Original
    /// values, deleted children included. Otherwise live children are
    /// matched on their Current values. A null in the parent key matches
    /// nothing.
    pub(crate) fn children_of<'a>(
        &'a self,
        rel: &Relation,
        row: &Row,
        version: RowVersion,
    ) -> Result<Vec<&'a Row>> {
        let parent = self.table(rel.parent_table)?;
        let child = self.table(rel.child_table)?;
        let cs = parent.case_sensitive();
        let values = key_values(row, &rel.parent_columns, version)?;
        let Some(key) = tuple_key(&values, cs) else {
            return Ok(Vec::new());
        };
        let related = if version == RowVersion::Original {
            RowVersion::Original
        } else {
            RowVersion::Current
        };
        Ok(child
            .rows()
            .filter(|r| r.has_version(related))
            .filter(|r| {
                key_values(r, &rel.child_columns, related)
                    .ok()
                    .and_then(|v| tuple_key(&v, cs))
                    .map_or(false, |k| k == key)
            })
            .collect())
    }

    /// The parent row `row` refers to under `rel`, if any.
    pub(crate) fn parent_of<'a>(
        &'a self,
        rel: &Relation,
        row: &Row,
        version: RowVersion,
    ) -> Result<Option<&'a Row>> {
        let parent = self.table(rel.parent_table)?;
        let cs = parent.case_sensitive();
        let values = key_values(row, &rel.child_columns, version)?;
        let Some(key) = tuple_key(&values, cs) else {
            return Ok(None);
        };
        if version == RowVersion::Original {
            return Ok(parent.rows().find(|r| {
                r.has_version(RowVersion::Original)
                    && key_values(r, &rel.parent_columns, RowVersion::Original)
                        .ok()
                        .and_then(|v| tuple_key(&v, cs))
                        .map_or(false, |k| k == key)
            }));
        }
        Ok(self
            .find_by_key(parent, &rel.parent_columns, &key)
            .and_then(|id| parent.row(id)))
    }

    /// Finds a live row holding `key` on `columns`, through the unique
    /// index when one covers the columns.
    pub(crate) fn find_by_key(&self, table: &Table, columns: &[usize], key: &[Value]) -> Option<RowId> {
        let key: Vec<Value> = key.to_vec();
        if let Some(uc) = table.schema().find_unique(columns) {
            let unique = table.schema().constraint(uc).and_then(|c| c.as_unique())?;
            // index order may differ from `columns`
            let reordered: Vec<Value> = unique
                .columns
                .iter()
                .filter_map(|c| columns.iter().position(|x| x == c).map(|i| key[i].clone()))
                .collect();
            return table.rows_with_key(uc, &reordered).first().copied();
        }
        let cs = table.case_sensitive();
        table
            .live_rows()
            .find(|r| {
                key_values(r, columns, RowVersion::Current)
                    .ok()
                    .and_then(|v| tuple_key(&v, cs))
                    .map_or(false, |k| k == key)
            })
            .map(Row::id)
    }
}

/// Raw key values of a row. Keyed columns are never computed.
pub(crate) fn key_values(row: &Row, columns: &[usize], version: RowVersion) -> Result<Vec<Value>> {
    columns
        .iter()
        .map(|&c| row.value(c, version).cloned())
        .collect()
}

/// True if the value of `column` depends only on its own row, following
/// computed columns through the same table.
pub(crate) fn column_is_row_local(table: &Table, column: usize) -> bool {
    let mut seen = Vec::new();
    local_closure(table, column, &mut seen)
}

fn local_closure(table: &Table, column: usize, seen: &mut Vec<usize>) -> bool {
    if seen.contains(&column) {
        return true;
    }
    seen.push(column);
    match table.expression(column) {
        None => true,
        Some(expr) => expr_is_row_local(table, expr.ast(), seen),
    }
}

fn expr_is_row_local(table: &Table, expr: &Expr, seen: &mut Vec<usize>) -> bool {
    expr.is_row_local()
        && expr.local_columns().iter().all(|name| {
            table
                .schema()
                .find_column(name)
                .map_or(true, |c| local_closure(table, c, seen))
        })
}

/// True if a filter depends only on the row it is evaluated against.
pub(crate) fn filter_is_row_local(table: &Table, expr: &Expression) -> bool {
    let mut seen = Vec::new();
    expr_is_row_local(table, expr.ast(), &mut seen)
}

/// Returns true for rows that default reads can see.
#[inline]
pub(crate) fn is_live(row: &Row) -> bool {
    !matches!(row.state(), RowState::Deleted | RowState::Detached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use tabula_core::schema::{Column, TableBuilder};
    use tabula_core::DataType;

    #[test]
    fn test_computed_cell_follows_inputs() {
        let mut ds = DataSet::new("ds");
        let schema = TableBuilder::new("items")
            .unwrap()
            .add_column("price", DataType::Float64)
            .unwrap()
            .add_column("qty", DataType::Int32)
            .unwrap()
            .column(Column::new("total", DataType::Float64).expression("price * qty"))
            .unwrap()
            .build()
            .unwrap();
        let t = ds.add_table(Table::new(schema).unwrap()).unwrap();
        let r = ds
            .add_row(t, vec![Value::Float64(2.5), Value::Int32(4)])
            .unwrap();
        let table = ds.table(t).unwrap();
        let row = table.row(r).unwrap();
        assert_eq!(
            ds.read_cell(table, row, 2, RowVersion::Current).unwrap(),
            Value::Float64(10.0)
        );
    }

    #[test]
    fn test_self_reference_is_cyclic() {
        let mut ds = DataSet::new("ds");
        let schema = TableBuilder::new("t")
            .unwrap()
            .column(Column::new("a", DataType::Int32).expression("b + 1"))
            .unwrap()
            .column(Column::new("b", DataType::Int32).expression("a + 1"))
            .unwrap()
            .build()
            .unwrap();
        let table = Table::new(schema).unwrap();
        let t = ds.add_table(table).unwrap();
        let r = ds.add_row(t, vec![]).unwrap();
        let table = ds.table(t).unwrap();
        let row = table.row(r).unwrap();
        assert!(matches!(
            ds.read_cell(table, row, 0, RowVersion::Current),
            Err(Error::CyclicEvaluation { .. })
        ));
    }

    #[test]
    fn test_row_local_closure() {
        let schema = TableBuilder::new("t")
            .unwrap()
            .add_column("x", DataType::Int32)
            .unwrap()
            .column(Column::new("y", DataType::Int32).expression("x * 2"))
            .unwrap()
            .column(Column::new("z", DataType::Int32).expression("Sum(x)"))
            .unwrap()
            .column(Column::new("w", DataType::Int32).expression("z + y"))
            .unwrap()
            .build()
            .unwrap();
        let table = Table::new(schema).unwrap();
        assert!(column_is_row_local(&table, 0));
        assert!(column_is_row_local(&table, 1));
        assert!(!column_is_row_local(&table, 2));
        assert!(!column_is_row_local(&table, 3));
    }
}

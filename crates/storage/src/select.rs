//! One-shot queries: `select`, `compute` and primary key lookup.

use crate::context::{ComputeContext, EvalStack};
use crate::dataset::DataSet;
use crate::view::{DataView, ViewId};
use crate::RowStateFilter;
use alloc::format;
use alloc::vec::Vec;
use tabula_core::schema::TableId;
use tabula_core::{Error, Result, RowId, RowVersion, Value};
use tabula_expr::{parse_sort, Expression};
use tabula_index::tuple_key;

impl DataSet {
    /// Rows of `t` in the given states that match `filter`, ordered by
    /// `sort` and then by table order.
    ///
    /// Unlike a view, an evaluation error in the filter fails the call.
    pub fn select(
        &self,
        t: TableId,
        filter: Option<&str>,
        sort: Option<&str>,
        states: RowStateFilter,
    ) -> Result<Vec<RowId>> {
        let mut view = DataView::new(ViewId(0), t);
        if let Some(text) = filter.filter(|f| !f.trim().is_empty()) {
            view.replace_filter(Some(Expression::parse(text)?));
        }
        if let Some(text) = sort {
            view.replace_sort(parse_sort(text)?);
        }
        view.replace_states(states);
        let entries = view.build(self, true)?;
        Ok(entries.into_iter().map(|e| e.row).collect())
    }

    /// Evaluates an aggregate expression over the current rows of `t` that
    /// match `filter`. Column references must sit inside an aggregate.
    pub fn compute(&self, t: TableId, expression: &str, filter: Option<&str>) -> Result<Value> {
        let expr = Expression::parse(expression)?;
        let table = self.table(t)?;
        let ids = self.select(t, filter, None, RowStateFilter::CURRENT_ROWS)?;
        let rows = ids.iter().filter_map(|&id| table.row(id)).collect();
        let stack = EvalStack::default();
        let ctx = ComputeContext {
            ds: self,
            table,
            rows,
            stack: &stack,
        };
        expr.evaluate(&ctx)
    }

    /// The live row whose primary key equals `key`.
    pub fn find_row(&self, t: TableId, key: &[Value]) -> Result<Option<RowId>> {
        let table = self.table(t)?;
        let pk = table.schema().primary_key();
        if pk.is_empty() {
            return Err(Error::invalid_argument(format!(
                "Table '{}' has no primary key",
                table.name()
            )));
        }
        if key.len() != pk.len() {
            return Err(Error::invalid_argument(format!(
                "Expecting {} value(s) for the primary key of table '{}', got {}",
                pk.len(),
                table.name(),
                key.len()
            )));
        }
        let coerced = key
            .iter()
            .zip(pk)
            .map(|(v, &c)| crate::mutation::coerce_value(table, c, v.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(tuple_key(&coerced, table.case_sensitive()).and_then(|k| self.find_by_key(table, pk, &k)))
    }

    /// Values of the primary key of a row, at its Current version.
    pub fn primary_key_of(&self, t: TableId, row: RowId) -> Result<Vec<Value>> {
        let table = self.table(t)?;
        let r = table.get_row(row)?;
        table
            .schema()
            .primary_key()
            .iter()
            .map(|&c| r.value(c, RowVersion::Current).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use alloc::vec;
    use tabula_core::schema::TableBuilder;
    use tabula_core::DataType;

    fn scores() -> (DataSet, TableId) {
        let mut ds = DataSet::new("ds");
        let schema = TableBuilder::new("scores")
            .unwrap()
            .add_column("id", DataType::Int32)
            .unwrap()
            .add_column("points", DataType::Int32)
            .unwrap()
            .add_primary_key(&["id"])
            .unwrap()
            .build()
            .unwrap();
        let t = ds.add_table(Table::new(schema).unwrap()).unwrap();
        for (id, points) in [(1, 30), (2, 10), (3, 20)] {
            ds.add_row(t, vec![Value::Int32(id), Value::Int32(points)]).unwrap();
        }
        (ds, t)
    }

    #[test]
    fn test_select_sorts_and_filters() {
        let (ds, t) = scores();
        let rows = ds
            .select(t, Some("points >= 20"), Some("points DESC"), RowStateFilter::CURRENT_ROWS)
            .unwrap();
        let ids: Vec<Value> = rows
            .iter()
            .map(|&r| ds.primary_key_of(t, r).unwrap().remove(0))
            .collect();
        assert_eq!(ids, vec![Value::Int32(1), Value::Int32(3)]);
    }

    #[test]
    fn test_compute_aggregates() {
        let (ds, t) = scores();
        assert_eq!(ds.compute(t, "Sum(points)", None).unwrap(), Value::Int64(60));
        assert_eq!(
            ds.compute(t, "Count(id)", Some("points > 15")).unwrap(),
            Value::Int32(2)
        );
        assert!(matches!(
            ds.compute(t, "points + 1", None),
            Err(Error::Evaluate { .. })
        ));
    }

    #[test]
    fn test_find_row_by_key() {
        let (ds, t) = scores();
        let row = ds.find_row(t, &[Value::Int64(2)]).unwrap().unwrap();
        assert_eq!(
            ds.table(t).unwrap().row(row).unwrap().value(1, RowVersion::Current).unwrap(),
            &Value::Int32(10)
        );
        assert_eq!(ds.find_row(t, &[Value::Int32(9)]).unwrap(), None);
    }
}

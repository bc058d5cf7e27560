//! Row storage for one table.
//!
//! A [`Table`] owns its schema, the parsed expressions of its computed
//! columns, its attached rows in insertion order, rows created but not yet
//! inserted, and one key index per unique constraint. Key indexes cover the
//! Current values of live (non-deleted) rows and keep every row under its
//! key, so duplicates admitted while constraints are suspended are still
//! visible.
//!
//! Every change to an attached row goes through [`Table::update_row`],
//! [`Table::attach`] or [`Table::detach`] so the key indexes stay in step.

use crate::settings::TableSettings;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use tabula_core::schema::{Column, ConstraintId, TableId, TableSchema};
use tabula_core::{DataType, Error, Result, Row, RowId, RowState, RowVersion, Value};
use tabula_expr::Expression;
use tabula_index::{tuple_key, HashIndex, Index, TupleKey};
use tabula_reactive::{ListChanged, SubscriptionId, SubscriptionManager};

/// A table of versioned rows.
pub struct Table {
    id: TableId,
    schema: TableSchema,
    /// Parsed expressions, parallel to the schema's columns.
    expressions: Vec<Option<Expression>>,
    rows: Vec<Row>,
    positions: HashMap<RowId, usize>,
    detached: HashMap<RowId, Row>,
    keys: HashMap<ConstraintId, HashIndex<TupleKey>>,
    settings: TableSettings,
    /// Number of values generated so far, per column.
    generated: Vec<i64>,
    next_order: u64,
    events: SubscriptionManager<ListChanged>,
}

impl core::fmt::Debug for Table {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("name", &self.schema.name())
            .field("rows", &self.rows.len())
            .field("detached", &self.detached.len())
            .finish()
    }
}

impl Table {
    /// Creates a table from a schema, parsing every column expression.
    pub fn new(schema: TableSchema) -> Result<Self> {
        Self::with_settings(schema, TableSettings::default())
    }

    /// Creates a table with explicit settings.
    pub fn with_settings(schema: TableSchema, settings: TableSettings) -> Result<Self> {
        let expressions = schema
            .columns()
            .iter()
            .map(|c| c.expression_text().map(Expression::parse).transpose())
            .collect::<Result<Vec<_>>>()?;
        let width = schema.width();
        let mut table = Self {
            id: TableId(0),
            schema,
            expressions,
            rows: Vec::new(),
            positions: HashMap::new(),
            detached: HashMap::new(),
            keys: HashMap::new(),
            settings,
            generated: alloc::vec![0; width],
            next_order: 0,
            events: SubscriptionManager::new(),
        };
        table.rebuild_keys();
        Ok(table)
    }

    /// Creates an empty table with the same schema and settings.
    pub fn clone_schema(&self) -> Self {
        let mut table = Self {
            id: self.id,
            schema: self.schema.clone(),
            expressions: self.expressions.clone(),
            rows: Vec::new(),
            positions: HashMap::new(),
            detached: HashMap::new(),
            keys: HashMap::new(),
            settings: self.settings.clone(),
            generated: alloc::vec![0; self.generated.len()],
            next_order: 0,
            events: SubscriptionManager::new(),
        };
        table.rebuild_keys();
        table
    }

    /// Copies schema, settings and attached rows, keeping row ids and
    /// states. Subscriptions are not copied.
    pub fn copy(&self) -> Self {
        let mut table = self.clone_schema();
        for row in &self.rows {
            table.attach(row.clone());
        }
        table.next_order = self.next_order;
        table.generated = self.generated.clone();
        table
    }

    #[inline]
    pub fn id(&self) -> TableId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: TableId) {
        self.id = id;
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    #[inline]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub(crate) fn schema_mut(&mut self) -> &mut TableSchema {
        &mut self.schema
    }

    #[inline]
    pub fn settings(&self) -> &TableSettings {
        &self.settings
    }

    pub(crate) fn set_settings(&mut self, settings: TableSettings) {
        let rekey = settings.case_sensitive() != self.settings.case_sensitive();
        self.settings = settings;
        if rekey {
            self.rebuild_keys();
        }
    }

    #[inline]
    pub fn case_sensitive(&self) -> bool {
        self.settings.case_sensitive()
    }

    #[inline]
    pub fn enforce_constraints(&self) -> bool {
        self.settings.enforce_constraints()
    }

    /// Returns the parsed expression of a computed column.
    #[inline]
    pub fn expression(&self, column: usize) -> Option<&Expression> {
        self.expressions.get(column).and_then(Option::as_ref)
    }

    pub(crate) fn set_expression(&mut self, column: usize, expr: Option<Expression>) {
        if let Some(slot) = self.expressions.get_mut(column) {
            *slot = expr;
        }
    }

    /// Resolves a column name or fails with `ColumnNotFound`.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.schema.column_index(name)
    }

    /// Number of attached rows, deleted ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Attached rows in insertion order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Attached rows that are not deleted.
    pub fn live_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|r| r.state() != RowState::Deleted)
    }

    /// Ids of attached rows in insertion order.
    pub fn row_ids(&self) -> Vec<RowId> {
        self.rows.iter().map(Row::id).collect()
    }

    /// Looks up an attached or detached row.
    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.positions
            .get(&id)
            .map(|&p| &self.rows[p])
            .or_else(|| self.detached.get(&id))
    }

    /// Looks up a row or fails with `RowNotFound`.
    pub fn get_row(&self, id: RowId) -> Result<&Row> {
        self.row(id).ok_or_else(|| Error::RowNotFound {
            table: self.name().into(),
            row: id,
        })
    }

    /// Position of an attached row.
    #[inline]
    pub fn position(&self, id: RowId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    #[inline]
    pub fn is_attached(&self, id: RowId) -> bool {
        self.positions.contains_key(&id)
    }

    pub(crate) fn is_detached(&self, id: RowId) -> bool {
        self.detached.contains_key(&id)
    }

    /// Subscribes to row and column notifications of this table.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&ListChanged) + 'static,
    {
        self.events.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub(crate) fn notify(&self, event: &ListChanged) {
        self.events.notify_all(event);
    }

    // ---- key indexes -------------------------------------------------

    fn key_of(&self, row: &Row, columns: &[usize]) -> Option<TupleKey> {
        if row.state() == RowState::Deleted || row.state() == RowState::Detached {
            return None;
        }
        let values: Vec<&Value> = columns
            .iter()
            .map(|&c| row.value(c, RowVersion::Current))
            .collect::<Result<Vec<_>>>()
            .ok()?;
        tuple_key(values, self.case_sensitive())
    }

    fn index_row(&mut self, pos: usize) {
        let row = &self.rows[pos];
        let entries: Vec<(ConstraintId, TupleKey)> = self
            .schema
            .unique_constraints()
            .filter_map(|(id, u)| self.key_of(row, &u.columns).map(|k| (id, k)))
            .collect();
        let row_id = row.id();
        for (id, key) in entries {
            if let Some(index) = self.keys.get_mut(&id) {
                let _ = index.add(key, row_id);
            }
        }
    }

    fn unindex_row(&mut self, pos: usize) {
        let row = &self.rows[pos];
        let entries: Vec<(ConstraintId, TupleKey)> = self
            .schema
            .unique_constraints()
            .filter_map(|(id, u)| self.key_of(row, &u.columns).map(|k| (id, k)))
            .collect();
        let row_id = row.id();
        for (id, key) in entries {
            if let Some(index) = self.keys.get_mut(&id) {
                index.remove(&key, Some(row_id));
            }
        }
    }

    /// Rebuilds every key index from the rows.
    pub(crate) fn rebuild_keys(&mut self) {
        self.keys = self
            .schema
            .unique_constraints()
            .map(|(id, _)| (id, HashIndex::new(false)))
            .collect();
        for pos in 0..self.rows.len() {
            self.index_row(pos);
        }
    }

    /// Rows other than `except` holding `key` under a unique constraint.
    pub(crate) fn key_conflict(&self, constraint: ConstraintId, key: &TupleKey, except: RowId) -> bool {
        self.keys
            .get(&constraint)
            .map_or(false, |index| index.contains_other(key, except))
    }

    /// Live rows holding `key` under a unique constraint.
    pub(crate) fn rows_with_key(&self, constraint: ConstraintId, key: &TupleKey) -> Vec<RowId> {
        self.keys
            .get(&constraint)
            .map(|index| index.get(key))
            .unwrap_or_default()
    }

    /// Keys held by more than one live row, per constraint.
    pub(crate) fn duplicate_keys(&self) -> Vec<(ConstraintId, Vec<RowId>)> {
        let mut out = Vec::new();
        for (id, index) in &self.keys {
            for (_, rows) in index.duplicates() {
                out.push((*id, rows.to_vec()));
            }
        }
        out
    }

    // ---- row primitives ----------------------------------------------

    /// Inserts an attached row at its order position.
    pub(crate) fn attach(&mut self, row: Row) {
        let pos = self.rows.partition_point(|r| r.order() < row.order());
        self.next_order = self.next_order.max(row.order() + 1);
        self.rows.insert(pos, row);
        self.reposition(pos);
        self.index_row(pos);
    }

    /// Removes an attached row.
    pub(crate) fn detach(&mut self, id: RowId) -> Option<Row> {
        let pos = self.positions.get(&id).copied()?;
        self.unindex_row(pos);
        let row = self.rows.remove(pos);
        self.positions.remove(&id);
        self.reposition(pos);
        Some(row)
    }

    fn reposition(&mut self, from: usize) {
        for (i, r) in self.rows.iter().enumerate().skip(from) {
            self.positions.insert(r.id(), i);
        }
    }

    /// Applies `f` to an attached row, keeping key indexes current.
    pub(crate) fn update_row<R>(&mut self, id: RowId, f: impl FnOnce(&mut Row) -> R) -> Option<R> {
        let pos = self.positions.get(&id).copied()?;
        self.unindex_row(pos);
        let out = f(&mut self.rows[pos]);
        self.index_row(pos);
        Some(out)
    }

    pub(crate) fn insert_detached(&mut self, row: Row) {
        self.detached.insert(row.id(), row);
    }

    pub(crate) fn take_detached(&mut self, id: RowId) -> Option<Row> {
        self.detached.remove(&id)
    }

    /// Applies `f` to a row wherever it lives.
    pub(crate) fn with_row<R>(&mut self, id: RowId, f: impl FnOnce(&mut Row) -> R) -> Result<R> {
        if self.is_attached(id) {
            return self.update_row(id, f).ok_or_else(|| self.missing(id));
        }
        match self.detached.get_mut(&id) {
            Some(row) => Ok(f(row)),
            None => Err(self.missing(id)),
        }
    }

    pub(crate) fn missing(&self, id: RowId) -> Error {
        Error::RowNotFound {
            table: self.name().into(),
            row: id,
        }
    }

    /// Removes every attached row. Rows not yet inserted survive.
    pub(crate) fn clear_rows(&mut self) {
        self.rows.clear();
        self.positions.clear();
        for index in self.keys.values_mut() {
            index.clear();
        }
    }

    // ---- counters ----------------------------------------------------

    pub(crate) fn take_order(&mut self) -> u64 {
        let order = self.next_order;
        self.next_order += 1;
        order
    }

    pub(crate) fn counters(&self) -> (Vec<i64>, u64) {
        (self.generated.clone(), self.next_order)
    }

    pub(crate) fn restore_counters(&mut self, generated: Vec<i64>, next_order: u64) {
        self.generated = generated;
        self.next_order = next_order;
    }

    /// Produces the next auto-increment value of `column`.
    pub(crate) fn generate(&mut self, column: usize) -> Result<Option<Value>> {
        let col = match self.schema.column(column) {
            Some(c) => c,
            None => return Ok(None),
        };
        let Some(rule) = col.auto_increment_rule() else {
            return Ok(None);
        };
        let n = self.generated[column];
        let raw = rule
            .step
            .checked_mul(n)
            .and_then(|v| v.checked_add(rule.seed))
            .ok_or_else(|| {
                Error::evaluate(format!("Auto-increment overflow in column '{}'", col.name()))
            })?;
        let value = Value::Int64(raw)
            .coerce_to(col.data_type())
            .ok_or_else(|| Error::InvalidCast {
                column: col.name().into(),
                value: format!("{}", raw),
                expected: col.data_type(),
            })?;
        self.generated[column] = n + 1;
        Ok(Some(value))
    }

    /// Moves the sequence of `column` past an explicitly stored value, so
    /// later generated values do not collide with it.
    pub(crate) fn advance_generated(&mut self, column: usize, value: &Value) {
        let Some(rule) = self.schema.column(column).and_then(|c| c.auto_increment_rule()) else {
            return;
        };
        let Some(v) = value.coerce_to(DataType::Int64).and_then(|v| match v {
            Value::Int64(v) => Some(v),
            _ => None,
        }) else {
            return;
        };
        if rule.step == 0 {
            return;
        }
        let past = (i128::from(v) - i128::from(rule.seed)).div_euclid(i128::from(rule.step)) + 1;
        let n = i64::try_from(past.max(0)).unwrap_or(i64::MAX);
        if let Some(current) = self.generated.get_mut(column) {
            if n > *current {
                tracing::trace!(column, from = *current, to = n, "advance auto-increment");
                *current = n;
            }
        }
    }

    /// Values a new row starts with: generated, default or null.
    pub(crate) fn initial_values(&mut self) -> Result<Vec<Value>> {
        (0..self.schema.width())
            .map(|c| match self.generate(c)? {
                Some(v) => Ok(v),
                None => Ok(self.schema.columns()[c].initial_value()),
            })
            .collect()
    }

    // ---- column plumbing ---------------------------------------------

    fn push_column_state(&mut self, expr: Option<Expression>) {
        self.expressions.push(expr);
        self.generated.push(0);
    }

    fn remove_column_state(&mut self, ordinal: usize) {
        if ordinal < self.expressions.len() {
            self.expressions.remove(ordinal);
            self.generated.remove(ordinal);
        }
    }

    /// Appends a column and gives every row its generated, default or
    /// null value.
    pub(crate) fn append_column(&mut self, column: Column, expr: Option<Expression>) -> Result<usize> {
        let ordinal = self.schema.push_column(column);
        self.push_column_state(expr);
        let count = self.rows.len() + self.detached.len();
        let fill: Result<Vec<Value>> = (0..count)
            .map(|_| {
                Ok(match self.generate(ordinal)? {
                    Some(v) => v,
                    None => self.schema.columns()[ordinal].initial_value(),
                })
            })
            .collect();
        let fill = match fill {
            Ok(fill) => fill,
            Err(e) => {
                self.schema.remove_column(ordinal);
                self.remove_column_state(ordinal);
                return Err(e);
            }
        };
        let mut fill = fill.into_iter();
        for row in self.rows.iter_mut().chain(self.detached.values_mut()) {
            row.push_cell(fill.next().unwrap_or(Value::Null));
        }
        Ok(ordinal)
    }

    /// Converts every stored value of a column, failing without change if
    /// any value does not convert.
    pub(crate) fn convert_column(&mut self, ordinal: usize, data_type: DataType) -> Result<()> {
        let name = self.schema.column(ordinal).map_or_else(String::new, |c| c.name().into());
        let convert = |v: &Value| {
            v.coerce_to(data_type).ok_or_else(|| Error::InvalidCast {
                column: name.clone(),
                value: format!("{}", v),
                expected: data_type,
            })
        };
        for row in self.rows.iter().chain(self.detached.values()) {
            row.clone().map_cell(ordinal, convert)?;
        }
        for row in self.rows.iter_mut().chain(self.detached.values_mut()) {
            row.map_cell(ordinal, convert)?;
        }
        self.rebuild_keys();
        Ok(())
    }

    /// Ids of attached and detached rows.
    pub(crate) fn all_row_ids(&self) -> Vec<RowId> {
        self.rows
            .iter()
            .map(Row::id)
            .chain(self.detached.keys().copied())
            .collect()
    }

    /// Drops a column from the schema and from every row.
    pub(crate) fn drop_column(&mut self, ordinal: usize) -> Option<Column> {
        let column = self.schema.remove_column(ordinal)?;
        self.remove_column_state(ordinal);
        for row in self.rows.iter_mut().chain(self.detached.values_mut()) {
            row.remove_cell(ordinal);
        }
        self.rebuild_keys();
        Some(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use tabula_core::schema::{Column, TableBuilder};
    use tabula_core::{next_row_id, DataType, RowEvent};

    fn table() -> Table {
        let schema = TableBuilder::new("t")
            .unwrap()
            .column(Column::new("id", DataType::Int32).auto_increment(10, 5))
            .unwrap()
            .column(Column::new("code", DataType::String).unique(true))
            .unwrap()
            .build()
            .unwrap();
        Table::new(schema).unwrap()
    }

    fn attached(t: &mut Table, values: Vec<Value>) -> RowId {
        let mut row = Row::detached(next_row_id(), values);
        row.apply(RowEvent::Insert).unwrap();
        row.set_order(t.take_order());
        let id = row.id();
        t.attach(row);
        id
    }

    #[test]
    fn test_generate_sequence() {
        let mut t = table();
        assert_eq!(t.generate(0).unwrap(), Some(Value::Int32(10)));
        assert_eq!(t.generate(0).unwrap(), Some(Value::Int32(15)));
        assert_eq!(t.generate(1).unwrap(), None);
        let init = t.initial_values().unwrap();
        assert_eq!(init, vec![Value::Int32(20), Value::Null]);
    }

    #[test]
    fn test_key_index_tracks_rows() {
        let mut t = table();
        let a = attached(&mut t, vec![Value::Int32(1), Value::from("X")]);
        let (uq, _) = t.schema().unique_constraints().next().unwrap();
        let key = tuple_key(&[Value::from("x")], false).unwrap();
        assert!(t.key_conflict(uq, &key, 999));
        assert!(!t.key_conflict(uq, &key, a));

        t.update_row(a, |r| r.apply(RowEvent::Delete)).unwrap().unwrap();
        assert!(!t.key_conflict(uq, &key, 999));

        t.detach(a).unwrap();
        assert!(t.is_empty());
        assert!(t.row(a).is_none());
    }

    #[test]
    fn test_attach_keeps_order() {
        let mut t = table();
        let a = attached(&mut t, vec![Value::Int32(1), Value::Null]);
        let b = attached(&mut t, vec![Value::Int32(2), Value::Null]);
        let row_a = t.detach(a).unwrap();
        assert_eq!(t.position(b), Some(0));
        t.attach(row_a);
        assert_eq!(t.row_ids(), vec![a, b]);
        assert_eq!(t.position(b), Some(1));
    }

    #[test]
    fn test_case_change_rekeys() {
        let mut t = table();
        attached(&mut t, vec![Value::Int32(1), Value::from("a")]);
        attached(&mut t, vec![Value::Int32(2), Value::from("A")]);
        assert_eq!(t.duplicate_keys().len(), 1);
        t.set_settings(TableSettings::default().with_case_sensitive(true));
        assert!(t.duplicate_keys().is_empty());
    }
}

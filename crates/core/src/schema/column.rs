//! Column definition for Tabula table schemas.

use crate::error::{Error, Result};
use crate::types::DataType;
use crate::value::Value;
use alloc::format;
use alloc::string::String;

/// Generation rule for auto-increment columns: the n-th generated value is
/// `seed + step * n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AutoIncrement {
    pub seed: i64,
    pub step: i64,
}

impl AutoIncrement {
    /// Creates a rule with the given seed and step.
    pub fn new(seed: i64, step: i64) -> Self {
        Self { seed, step }
    }
}

impl Default for AutoIncrement {
    fn default() -> Self {
        Self { seed: 0, step: 1 }
    }
}

/// A column definition in a table schema.
#[derive(Clone, Debug)]
pub struct Column {
    /// Column name.
    name: String,
    /// Data type of the column.
    data_type: DataType,
    /// Whether this column allows null values.
    allow_null: bool,
    /// Whether values in this column must be unique.
    unique: bool,
    /// Whether committed values may be overwritten.
    read_only: bool,
    /// Value generation rule.
    auto_increment: Option<AutoIncrement>,
    /// Default value for new rows.
    default_value: Option<Value>,
    /// Computed-value expression text.
    expression: Option<String>,
    /// Maximum string length in characters.
    max_length: Option<usize>,
    /// Column position in the table (0-based).
    ordinal: usize,
}

impl Column {
    /// Creates a new nullable, writable column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            allow_null: true,
            unique: false,
            read_only: false,
            auto_increment: None,
            default_value: None,
            expression: None,
            max_length: None,
            ordinal: 0,
        }
    }

    /// Sets whether this column allows nulls.
    pub fn allow_null(mut self, allow_null: bool) -> Self {
        self.allow_null = allow_null;
        self
    }

    /// Sets whether this column has unique values.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Sets whether this column is read only.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Makes this an auto-increment column.
    pub fn auto_increment(mut self, seed: i64, step: i64) -> Self {
        self.auto_increment = Some(AutoIncrement::new(seed, step));
        self
    }

    /// Sets the default value for this column.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Makes this a computed column.
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Sets the maximum string length.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Checks the definition for contradictory settings and normalizes the
    /// default value to the declared type.
    pub fn validate(&mut self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_schema("Column name cannot be empty"));
        }
        if self.auto_increment.is_some() && self.expression.is_some() {
            return Err(Error::invalid_schema(format!(
                "Column '{}' cannot be both auto-increment and computed",
                self.name
            )));
        }
        if let Some(rule) = self.auto_increment {
            if !self.data_type.is_integral() {
                return Err(Error::invalid_schema(format!(
                    "Auto-increment column '{}' requires an integer type, found {}",
                    self.name, self.data_type
                )));
            }
            if rule.step == 0 {
                return Err(Error::invalid_schema(format!(
                    "Auto-increment step of column '{}' cannot be zero",
                    self.name
                )));
            }
        }
        if self.max_length.is_some() && self.data_type != DataType::String {
            return Err(Error::invalid_schema(format!(
                "MaxLength applies only to string columns; '{}' is {}",
                self.name, self.data_type
            )));
        }
        if let Some(default) = &self.default_value {
            let coerced = default
                .coerce_to(self.data_type)
                .ok_or_else(|| Error::InvalidCast {
                    column: self.name.clone(),
                    value: format!("{}", default),
                    expected: self.data_type,
                })?;
            self.default_value = Some(coerced).filter(|v| !v.is_null());
        }
        Ok(())
    }

    /// Returns the column name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns whether this column allows nulls.
    #[inline]
    pub fn allows_null(&self) -> bool {
        self.allow_null
    }

    /// Returns whether this column has unique values.
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns whether direct writes are rejected. Computed columns are
    /// always read only.
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only || self.expression.is_some()
    }

    /// Returns the generation rule, if any.
    #[inline]
    pub fn auto_increment_rule(&self) -> Option<AutoIncrement> {
        self.auto_increment
    }

    /// Returns the configured default, if any.
    #[inline]
    pub fn default(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Returns the value a new row starts with.
    pub fn initial_value(&self) -> Value {
        self.default_value.clone().unwrap_or(Value::Null)
    }

    /// Returns the expression text of a computed column.
    #[inline]
    pub fn expression_text(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    /// Returns the maximum string length.
    #[inline]
    pub fn max_len(&self) -> Option<usize> {
        self.max_length
    }

    /// Returns the column position.
    #[inline]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_data_type(&mut self, data_type: DataType) {
        self.data_type = data_type;
    }

    pub fn set_allow_null(&mut self, allow_null: bool) {
        self.allow_null = allow_null;
    }

    pub fn set_unique(&mut self, unique: bool) {
        self.unique = unique;
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn set_auto_increment(&mut self, rule: Option<AutoIncrement>) {
        self.auto_increment = rule;
    }

    pub fn set_default(&mut self, value: Option<Value>) {
        self.default_value = value;
    }

    pub fn set_expression(&mut self, expression: Option<String>) {
        self.expression = expression.filter(|e| !e.trim().is_empty());
    }

    pub fn set_max_length(&mut self, max_length: Option<usize>) {
        self.max_length = max_length;
    }

    pub fn set_ordinal(&mut self, ordinal: usize) {
        self.ordinal = ordinal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_builder() {
        let col = Column::new("id", DataType::Int64)
            .allow_null(false)
            .unique(true)
            .auto_increment(1, 1);
        assert_eq!(col.name(), "id");
        assert!(!col.allows_null());
        assert!(col.is_unique());
        assert_eq!(col.auto_increment_rule(), Some(AutoIncrement::new(1, 1)));
    }

    #[test]
    fn test_expression_column_is_read_only() {
        let col = Column::new("total", DataType::Float64).expression("price * qty");
        assert!(col.is_read_only());
        assert_eq!(col.expression_text(), Some("price * qty"));
    }

    #[test]
    fn test_validate_rejects_auto_increment_expression() {
        let mut col = Column::new("x", DataType::Int32)
            .auto_increment(1, 1)
            .expression("1 + 1");
        assert!(matches!(col.validate(), Err(Error::InvalidSchema { .. })));
    }

    #[test]
    fn test_validate_rejects_non_integer_auto_increment() {
        let mut col = Column::new("x", DataType::String).auto_increment(1, 1);
        assert!(col.validate().is_err());
    }

    #[test]
    fn test_validate_coerces_default() {
        let mut col = Column::new("qty", DataType::Int32).default_value("5");
        col.validate().unwrap();
        assert_eq!(col.default(), Some(&Value::Int32(5)));

        let mut bad = Column::new("qty", DataType::Int32).default_value("five");
        assert!(matches!(bad.validate(), Err(Error::InvalidCast { .. })));
    }
}

//! Value type definitions for Tabula.
//!
//! This module defines the `Value` enum which represents any value that can be stored
//! in a cell, together with the conversions used when a value is written to a
//! typed column and the case-aware comparisons used by constraints and sorting.

use crate::datetime::{format_datetime, parse_datetime};
use crate::types::DataType;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

/// A value that can be stored in a cell.
#[derive(Clone, Debug)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 string
    String(String),
    /// DateTime stored as Unix timestamp in milliseconds
    DateTime(i64),
    /// Binary data
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the data type of this value, or None if it's Null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int32(_) => Some(DataType::Int32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::String(_) => Some(DataType::String),
            Value::DateTime(_) => Some(DataType::DateTime),
            Value::Bytes(_) => Some(DataType::Bytes),
        }
    }

    /// Returns the type name used in diagnostics (`DBNull` for null).
    pub fn type_name(&self) -> &'static str {
        self.data_type().map(|t| t.name()).unwrap_or("DBNull")
    }

    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the i32 value if this is an Int32, None otherwise.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the i64 value if this is an Int64, None otherwise.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the f64 value if this is a Float64, None otherwise.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the datetime timestamp if this is a DateTime, None otherwise.
    pub fn as_datetime(&self) -> Option<i64> {
        match self {
            Value::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the bytes if this is Bytes, None otherwise.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Widens any numeric value to `f64`.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Widens an integral value to `i64`.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns true for Int32, Int64 and Float64 values.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Int64(_) | Value::Float64(_))
    }

    /// Converts this value to the given declared type.
    ///
    /// Returns `None` when no conversion exists or the value does not fit
    /// (for example `"abc"` to `Int32`, or `3e12` to `Int32`). Null converts
    /// to Null for every type. Floats are rounded half-to-even when written
    /// to an integral type.
    pub fn coerce_to(&self, target: DataType) -> Option<Value> {
        if self.data_type() == Some(target) {
            return Some(self.clone());
        }
        match (self, target) {
            (Value::Null, _) => Some(Value::Null),

            (Value::Boolean(b), DataType::Int32) => Some(Value::Int32(*b as i32)),
            (Value::Boolean(b), DataType::Int64) => Some(Value::Int64(*b as i64)),
            (Value::Boolean(b), DataType::Float64) => Some(Value::Float64(*b as i32 as f64)),

            (Value::Int32(_) | Value::Int64(_), DataType::Boolean) => {
                self.to_i64().map(|i| Value::Boolean(i != 0))
            }
            (Value::Int32(v), DataType::Int64) => Some(Value::Int64(*v as i64)),
            (Value::Int64(v), DataType::Int32) => i32::try_from(*v).ok().map(Value::Int32),
            (Value::Int32(_) | Value::Int64(_), DataType::Float64) => {
                self.to_f64().map(Value::Float64)
            }

            (Value::Float64(f), DataType::Boolean) => Some(Value::Boolean(*f != 0.0)),
            (Value::Float64(f), DataType::Int32) => {
                round_integral(*f, i32::MIN as f64, i32::MAX as f64).map(|i| Value::Int32(i as i32))
            }
            (Value::Float64(f), DataType::Int64) => {
                round_integral(*f, i64::MIN as f64, i64::MAX as f64).map(Value::Int64)
            }

            (Value::String(s), _) => parse_as(s.trim(), target),

            (
                Value::Boolean(_) | Value::Int32(_) | Value::Int64(_) | Value::Float64(_)
                | Value::DateTime(_),
                DataType::String,
            ) => Some(Value::String(self.to_string())),

            _ => None,
        }
    }

    /// Compares two values, folding string case unless `case_sensitive`.
    ///
    /// Nulls sort first. Numeric values compare across widths.
    pub fn compare_with(&self, other: &Value, case_sensitive: bool) -> Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) if !case_sensitive => a
                .chars()
                .flat_map(char::to_lowercase)
                .cmp(b.chars().flat_map(char::to_lowercase)),
            _ => self.cmp(other),
        }
    }

    /// Returns true if both values are equal under the given case rule.
    ///
    /// Numeric values compare by magnitude, so `Int32(1)` equals `Float64(1.0)`.
    pub fn eq_with(&self, other: &Value, case_sensitive: bool) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ if self.is_numeric() && other.is_numeric() => {
                self.compare_with(other, case_sensitive) == Ordering::Equal
            }
            _ if self.data_type() != other.data_type() => false,
            _ => self.compare_with(other, case_sensitive) == Ordering::Equal,
        }
    }

    /// Returns the canonical form used for hashed key lookup.
    ///
    /// Integral numbers and integral floats collapse to `Int64` so that keys
    /// declared with different widths still meet; strings are lower-cased
    /// when the comparison is case-insensitive.
    pub fn key_form(&self, case_sensitive: bool) -> Value {
        match self {
            Value::Int32(v) => Value::Int64(*v as i64),
            Value::Float64(f) if is_integral_float(*f) => Value::Int64(*f as i64),
            Value::String(s) if !case_sensitive => Value::String(s.to_lowercase()),
            other => other.clone(),
        }
    }
}

fn is_integral_float(f: f64) -> bool {
    f.is_finite() && libm::trunc(f) == f && f >= i64::MIN as f64 && f < i64::MAX as f64
}

fn round_integral(f: f64, min: f64, max: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let r = libm::rint(f);
    if r < min || r > max {
        return None;
    }
    Some(r as i64)
}

fn parse_as(s: &str, target: DataType) -> Option<Value> {
    match target {
        DataType::Boolean => {
            if s.eq_ignore_ascii_case("true") {
                Some(Value::Boolean(true))
            } else if s.eq_ignore_ascii_case("false") {
                Some(Value::Boolean(false))
            } else {
                None
            }
        }
        DataType::Int32 => s.parse().ok().map(Value::Int32),
        DataType::Int64 => s.parse().ok().map(Value::Int64),
        DataType::Float64 => s.parse().ok().map(Value::Float64),
        DataType::String => Some(Value::String(s.into())),
        DataType::DateTime => parse_datetime(s).map(Value::DateTime),
        DataType::Bytes => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(true) => f.write_str("True"),
            Value::Boolean(false) => f.write_str("False"),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
            Value::DateTime(ms) => f.write_str(&format_datetime(*ms)),
            Value::Bytes(_) => f.write_str("System.Byte[]"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => {
                // Handle NaN comparison
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int32(i) => i.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Float64(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::DateTime(d) => d.hash(state),
            Value::Bytes(b) => b.hash(state),
        }
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    // NaN sorts after every number
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Int32(a), Value::Int64(b)) => (*a as i64).cmp(b),
            (Value::Int64(a), Value::Int32(b)) => a.cmp(&(*b as i64)),
            (Value::Float64(a), Value::Float64(b)) => cmp_f64(*a, *b),
            (Value::Float64(a), _) if other.is_numeric() => {
                cmp_f64(*a, other.to_f64().unwrap_or(f64::NAN))
            }
            (_, Value::Float64(b)) if self.is_numeric() => {
                cmp_f64(self.to_f64().unwrap_or(f64::NAN), *b)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            // Different types: order by type discriminant
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Value {
    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int32(_) | Value::Int64(_) | Value::Float64(_) => 2,
            Value::String(_) => 5,
            Value::DateTime(_) => 6,
            Value::Bytes(_) => 7,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::Int32(42).as_i32(), Some(42));
        assert_eq!(Value::Int64(100).as_i64(), Some(100));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Bytes(vec![1, 2, 3]).as_bytes(), Some(&[1, 2, 3][..]));
        assert_eq!(Value::Null.type_name(), "DBNull");
    }

    #[test]
    fn test_value_ordering() {
        assert!(Value::Int32(1) < Value::Int32(2));
        assert!(Value::Int32(2) < Value::Float64(2.5));
        assert!(Value::Null < Value::Int32(0));
        assert_eq!(Value::Int64(3).cmp(&Value::Float64(3.0)), Ordering::Equal);
    }

    #[test]
    fn test_coerce_numeric() {
        assert_eq!(Value::Int32(7).coerce_to(DataType::Int64), Some(Value::Int64(7)));
        assert_eq!(Value::Float64(2.5).coerce_to(DataType::Int32), Some(Value::Int32(2)));
        assert_eq!(Value::Float64(3.5).coerce_to(DataType::Int32), Some(Value::Int32(4)));
        assert_eq!(Value::Int64(1 << 40).coerce_to(DataType::Int32), None);
        assert_eq!(Value::Null.coerce_to(DataType::Int32), Some(Value::Null));
    }

    #[test]
    fn test_coerce_strings() {
        assert_eq!(Value::from(" 12 ").coerce_to(DataType::Int32), Some(Value::Int32(12)));
        assert_eq!(Value::from("abc").coerce_to(DataType::Int32), None);
        assert_eq!(Value::from("TRUE").coerce_to(DataType::Boolean), Some(Value::Boolean(true)));
        assert_eq!(Value::Int32(5).coerce_to(DataType::String), Some(Value::from("5")));
        assert_eq!(Value::Boolean(false).coerce_to(DataType::String), Some(Value::from("False")));
        assert_eq!(
            Value::from("1970-01-02").coerce_to(DataType::DateTime),
            Some(Value::DateTime(86_400_000))
        );
        assert_eq!(Value::Bytes(vec![1]).coerce_to(DataType::String), None);
    }

    #[test]
    fn test_case_folding() {
        let a = Value::from("Apple");
        let b = Value::from("apple");
        assert_eq!(a.compare_with(&b, false), Ordering::Equal);
        assert_ne!(a.compare_with(&b, true), Ordering::Equal);
        assert!(a.eq_with(&b, false));
        assert_eq!(a.key_form(false), b.key_form(false));
        assert_ne!(a.key_form(true), b.key_form(true));
    }

    #[test]
    fn test_key_form_widens_numbers() {
        assert_eq!(Value::Int32(4).key_form(true), Value::Int64(4));
        assert_eq!(Value::Float64(4.0).key_form(true), Value::Int64(4));
        assert_eq!(Value::Float64(4.5).key_form(true), Value::Float64(4.5));
        assert!(Value::Int32(4).eq_with(&Value::Float64(4.0), true));
        assert!(!Value::Int32(1).eq_with(&Value::from("1"), true));
    }
}

//! Data type definitions for Tabula.
//!
//! This module defines the declared types a column can hold.

use core::fmt;

/// Supported column data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string
    String,
    /// Date and time stored as Unix timestamp (milliseconds)
    DateTime,
    /// Binary data
    Bytes,
}

impl DataType {
    /// Returns the canonical type name used in diagnostics and `CONVERT`.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "Boolean",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::Float64 => "Double",
            DataType::String => "String",
            DataType::DateTime => "DateTime",
            DataType::Bytes => "Byte[]",
        }
    }

    /// Resolves a type name as written in a `CONVERT` call.
    ///
    /// Accepts the canonical names, their `System.` qualified forms and a
    /// few common aliases. Matching is case-insensitive.
    pub fn from_name(name: &str) -> Option<DataType> {
        let trimmed = name.trim();
        let bare = match trimmed.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("system.") => &trimmed[7..],
            _ => trimmed,
        };
        const NAMES: &[(&str, DataType)] = &[
            ("boolean", DataType::Boolean),
            ("bool", DataType::Boolean),
            ("int32", DataType::Int32),
            ("int", DataType::Int32),
            ("int16", DataType::Int32),
            ("int64", DataType::Int64),
            ("long", DataType::Int64),
            ("double", DataType::Float64),
            ("float64", DataType::Float64),
            ("single", DataType::Float64),
            ("decimal", DataType::Float64),
            ("string", DataType::String),
            ("datetime", DataType::DateTime),
            ("byte[]", DataType::Bytes),
            ("bytes", DataType::Bytes),
        ];
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(bare))
            .map(|(_, t)| *t)
    }

    /// Returns true for the integral and floating point types.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Float64)
    }

    /// Returns true for the types allowed on auto-increment columns.
    #[inline]
    pub fn is_integral(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

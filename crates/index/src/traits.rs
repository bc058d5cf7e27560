//! Index trait definitions for Tabula.
//!
//! This module defines the `Index` trait that key indexes implement.

use alloc::vec::Vec;
use tabula_core::RowId;

/// Errors raised by index maintenance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexError {
    /// The key is already present in a unique index.
    DuplicateKey,
}

impl core::fmt::Display for IndexError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IndexError::DuplicateKey => write!(f, "Duplicate key in unique index"),
        }
    }
}

/// A point-lookup index from keys to row IDs.
pub trait Index<K> {
    /// Adds a key-row pair.
    fn add(&mut self, key: K, row: RowId) -> Result<(), IndexError>;

    /// Returns every row stored under `key`.
    fn get(&self, key: &K) -> Vec<RowId>;

    /// Removes one row under `key`, or every row when `row` is `None`.
    fn remove(&mut self, key: &K, row: Option<RowId>);

    /// Returns true if `key` has at least one row.
    fn contains_key(&self, key: &K) -> bool;

    /// Returns the number of key-row pairs.
    fn len(&self) -> usize;

    /// Returns true if the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    fn clear(&mut self);
}

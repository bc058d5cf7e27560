//! Hash index implementation for Tabula.
//!
//! This module provides a hash-based index for O(1) point queries.

use crate::traits::{Index, IndexError};
use alloc::vec::Vec;
use hashbrown::HashMap;
use tabula_core::RowId;

/// A hash-based index for O(1) point queries.
///
/// Supports both unique and non-unique indexes. A non-unique index keeps
/// every row under its key, which lets callers find collisions after the
/// fact (see [`HashIndex::duplicates`]).
#[derive(Clone, Debug)]
pub struct HashIndex<K> {
    /// The underlying map from keys to row IDs.
    map: HashMap<K, Vec<RowId>>,
    /// Whether this is a unique index.
    unique: bool,
    /// Number of key-row pairs.
    len: usize,
}

impl<K: Eq + core::hash::Hash + Clone> HashIndex<K> {
    /// Creates a new hash index.
    pub fn new(unique: bool) -> Self {
        Self {
            map: HashMap::new(),
            unique,
            len: 0,
        }
    }

    /// Returns whether this is a unique index.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns all row IDs in the index.
    pub fn get_all_row_ids(&self) -> Vec<RowId> {
        self.map.values().flatten().copied().collect()
    }

    /// Iterates over keys held by more than one row.
    pub fn duplicates(&self) -> impl Iterator<Item = (&K, &[RowId])> {
        self.map
            .iter()
            .filter(|(_, rows)| rows.len() > 1)
            .map(|(k, rows)| (k, rows.as_slice()))
    }

    /// Returns true if `key` is held by some row other than `except`.
    pub fn contains_other(&self, key: &K, except: RowId) -> bool {
        self.map
            .get(key)
            .map_or(false, |rows| rows.iter().any(|&r| r != except))
    }
}

impl<K: Eq + core::hash::Hash + Clone> Index<K> for HashIndex<K> {
    fn add(&mut self, key: K, row: RowId) -> Result<(), IndexError> {
        if self.unique && self.map.contains_key(&key) {
            return Err(IndexError::DuplicateKey);
        }
        self.map.entry(key).or_insert_with(Vec::new).push(row);
        self.len += 1;
        Ok(())
    }

    fn get(&self, key: &K) -> Vec<RowId> {
        self.map.get(key).cloned().unwrap_or_default()
    }

    fn remove(&mut self, key: &K, row: Option<RowId>) {
        match row {
            Some(r) => {
                if let Some(rows) = self.map.get_mut(key) {
                    let before = rows.len();
                    rows.retain(|&x| x != r);
                    self.len -= before - rows.len();
                    if rows.is_empty() {
                        self.map.remove(key);
                    }
                }
            }
            None => {
                if let Some(rows) = self.map.remove(key) {
                    self.len -= rows.len();
                }
            }
        }
    }

    fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.map.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_hash_index_unique() {
        let mut index: HashIndex<i32> = HashIndex::new(true);

        assert!(index.add(1, 100).is_ok());
        assert!(index.add(2, 200).is_ok());
        assert_eq!(index.add(1, 300), Err(IndexError::DuplicateKey));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&1), vec![100]);
    }

    #[test]
    fn test_hash_index_non_unique() {
        let mut index: HashIndex<i32> = HashIndex::new(false);
        index.add(1, 100).unwrap();
        index.add(1, 101).unwrap();
        index.add(2, 200).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.duplicates().count(), 1);
        assert!(index.contains_other(&1, 100));
        assert!(!index.contains_other(&2, 200));
    }

    #[test]
    fn test_hash_index_remove() {
        let mut index: HashIndex<i32> = HashIndex::new(false);
        index.add(1, 100).unwrap();
        index.add(1, 101).unwrap();

        index.remove(&1, Some(100));
        assert_eq!(index.get(&1), vec![101]);
        assert_eq!(index.len(), 1);

        index.remove(&1, None);
        assert!(index.is_empty());
        assert!(!index.contains_key(&1));
    }

    #[test]
    fn test_hash_index_clear() {
        let mut index: HashIndex<i32> = HashIndex::new(false);
        index.add(1, 100).unwrap();
        index.clear();
        assert!(index.is_empty());
        assert!(index.get_all_row_ids().is_empty());
    }
}

//! Tuple keys for unique and relation lookups.

use alloc::vec::Vec;
use tabula_core::Value;

/// A normalized column tuple.
pub type TupleKey = Vec<Value>;

/// Builds the lookup key for a tuple of cell values.
///
/// Returns `None` when any value is null: a tuple with a null never
/// collides with another tuple and never matches a parent key.
pub fn tuple_key<'a, I>(values: I, case_sensitive: bool) -> Option<TupleKey>
where
    I: IntoIterator<Item = &'a Value>,
{
    values
        .into_iter()
        .map(|v| {
            if v.is_null() {
                None
            } else {
                Some(v.key_form(case_sensitive))
            }
        })
        .collect()
}

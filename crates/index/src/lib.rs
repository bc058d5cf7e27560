//! Tabula Index - Key indexes for the Tabula data engine.
//!
//! Unique constraints and relation lookups resolve column tuples to rows
//! through a [`HashIndex`] keyed by normalized tuples ([`tuple_key`]).
//!
//! # Example
//!
//! ```rust
//! use tabula_core::Value;
//! use tabula_index::{tuple_key, HashIndex, Index};
//!
//! let mut index = HashIndex::new(false);
//! let key = tuple_key(&[Value::from("Ada")], false).unwrap();
//! index.add(key, 1).unwrap();
//!
//! let lookup = tuple_key(&[Value::from("ADA")], false).unwrap();
//! assert_eq!(index.get(&lookup), vec![1]);
//! ```

#![no_std]

extern crate alloc;

pub mod hash;
pub mod key;
pub mod traits;

pub use hash::HashIndex;
pub use key::{tuple_key, TupleKey};
pub use traits::{Index, IndexError};

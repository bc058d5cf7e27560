//! Tabula Expr - the filter and computed-column expression language.
//!
//! This crate provides:
//!
//! - `lexer` / `parser`: text to [`Expr`] AST; malformed text fails with a
//!   `Syntax` error before any row is read
//! - `eval`: evaluation against an [`EvalContext`], with null propagation
//!   and three-valued logic
//! - `functions`: `SUBSTRING`, `LEN`, `TRIM`, `ISNULL`, `IIF`, `CONVERT`
//! - `aggregate`: `SUM`, `COUNT`, `AVG`, `MIN`, `MAX`, `STDEV`, `VAR`
//! - `sort`: `col [ASC|DESC], ...` sort specifications
//!
//! # Example
//!
//! ```rust
//! use tabula_expr::{EmptyContext, Expression};
//! use tabula_core::Value;
//!
//! let expr = Expression::parse("IIF(LEN('abc') > 2, 'long', 'short')").unwrap();
//! assert_eq!(expr.evaluate(&EmptyContext::default()).unwrap(), Value::from("long"));
//! ```

#![no_std]

extern crate alloc;

pub mod aggregate;
pub mod ast;
pub mod context;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod sort;

pub use ast::{AggregateFunc, AggregateScope, BinaryOp, Expr, Function, UnaryOp};
pub use context::{EmptyContext, EvalContext};
pub use eval::{evaluate, evaluate_predicate, Expression};
pub use parser::parse;
pub use sort::{format_sort, parse_sort, SortKey};

//! Expression evaluator.
//!
//! Nulls propagate through arithmetic and comparisons; `AND`/`OR`/`NOT`
//! use three-valued logic. A string meeting a number is parsed as a
//! number, and a failed parse is a type mismatch.

use crate::aggregate::reduce;
use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::context::EvalContext;
use crate::functions::call;
use crate::parser::parse;
use alloc::format;
use alloc::string::{String, ToString};
use core::cmp::Ordering;
use tabula_core::datetime::parse_datetime;
use tabula_core::pattern_match::like;
use tabula_core::{DataType, Error, Result, Value};

/// A parsed expression together with its source text.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    text: String,
    ast: Expr,
}

impl Expression {
    /// Parses `text`. Syntax errors surface here, before any row is read.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self {
            text: text.to_string(),
            ast: parse(text)?,
        })
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    pub fn evaluate(&self, ctx: &dyn EvalContext) -> Result<Value> {
        evaluate(&self.ast, ctx)
    }

    pub fn matches(&self, ctx: &dyn EvalContext) -> Result<bool> {
        evaluate_predicate(&self.ast, ctx)
    }
}

/// Evaluates `expr` against `ctx`.
pub fn evaluate(expr: &Expr, ctx: &dyn EvalContext) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Column(name) => ctx.column_value(name),
        Expr::Parent { relation, column } => ctx.parent_value(relation.as_deref(), column),
        Expr::Aggregate {
            func,
            scope,
            column,
        } => reduce(*func, ctx.aggregate_values(scope, column)?, ctx.case_sensitive()),
        Expr::Unary { op, expr } => unary(*op, evaluate(expr, ctx)?),
        Expr::Binary { op, left, right } => match op {
            BinaryOp::And | BinaryOp::Or => logical(*op, left, right, ctx),
            _ => {
                let l = evaluate(left, ctx)?;
                let r = evaluate(right, ctx)?;
                binary(*op, l, r, ctx.case_sensitive())
            }
        },
        Expr::In {
            expr,
            list,
            negated,
        } => {
            let v = evaluate(expr, ctx)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            let mut found = false;
            for item in list {
                let candidate = evaluate(item, ctx)?;
                if candidate.is_null() {
                    continue;
                }
                if compare(BinaryOp::Eq, &v, &candidate, ctx.case_sensitive())? == Ordering::Equal {
                    found = true;
                    break;
                }
            }
            Ok(Value::Boolean(found != *negated))
        }
        Expr::Like {
            expr,
            pattern,
            negated,
        } => {
            let v = evaluate(expr, ctx)?;
            let p = evaluate(pattern, ctx)?;
            if v.is_null() || p.is_null() {
                return Ok(Value::Null);
            }
            let pattern = p.as_str().ok_or_else(|| mismatch("LIKE", &v, &p))?;
            let text = match &v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(Value::Boolean(like(&text, pattern, ctx.case_sensitive()) != *negated))
        }
        Expr::IsNull { expr, negated } => {
            let v = evaluate(expr, ctx)?;
            Ok(Value::Boolean(v.is_null() != *negated))
        }
        Expr::Function { func, args } => call(*func, args, ctx),
    }
}

/// Evaluates `expr` as a row predicate. Null is false; any other
/// non-boolean result is an error.
pub fn evaluate_predicate(expr: &Expr, ctx: &dyn EvalContext) -> Result<bool> {
    match evaluate(expr, ctx)? {
        Value::Boolean(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(Error::evaluate(format!(
            "Filter expression does not evaluate to a Boolean term, found {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn mismatch(op: &str, left: &Value, right: &Value) -> Error {
    Error::evaluate(format!(
        "Cannot perform '{}' operation on {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn logical(op: BinaryOp, left: &Expr, right: &Expr, ctx: &dyn EvalContext) -> Result<Value> {
    let as_logic = |v: &Value, other: &Value| -> Result<Option<bool>> {
        match v {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(*b)),
            _ => Err(mismatch(op.symbol(), v, other)),
        }
    };
    let l = evaluate(left, ctx)?;
    let lb = as_logic(&l, &Value::Boolean(true))?;
    // short-circuit on the dominant value
    match (op, lb) {
        (BinaryOp::And, Some(false)) => return Ok(Value::Boolean(false)),
        (BinaryOp::Or, Some(true)) => return Ok(Value::Boolean(true)),
        _ => {}
    }
    let r = evaluate(right, ctx)?;
    let rb = as_logic(&r, &l)?;
    let out = match (op, lb, rb) {
        (BinaryOp::And, _, Some(false)) => Some(false),
        (BinaryOp::And, Some(true), Some(true)) => Some(true),
        (BinaryOp::Or, _, Some(true)) => Some(true),
        (BinaryOp::Or, Some(false), Some(false)) => Some(false),
        _ => None,
    };
    Ok(out.map(Value::Boolean).unwrap_or(Value::Null))
}

fn unary(op: UnaryOp, v: Value) -> Result<Value> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    match (op, &v) {
        (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (UnaryOp::Neg, Value::Int32(i)) => Ok(i
            .checked_neg()
            .map(Value::Int32)
            .unwrap_or(Value::Int64(-(*i as i64)))),
        (UnaryOp::Neg, Value::Int64(i)) => i
            .checked_neg()
            .map(Value::Int64)
            .ok_or_else(|| Error::evaluate("Arithmetic overflow in negation")),
        (UnaryOp::Neg, Value::Float64(f)) => Ok(Value::Float64(-f)),
        (UnaryOp::Plus, Value::Int32(_) | Value::Int64(_) | Value::Float64(_)) => Ok(v.clone()),
        (UnaryOp::Neg | UnaryOp::Plus, Value::String(s)) => match parse_number(s) {
            Some(n) => unary(op, n),
            None => Err(unary_mismatch(op, &v)),
        },
        _ => Err(unary_mismatch(op, &v)),
    }
}

fn unary_mismatch(op: UnaryOp, v: &Value) -> Error {
    let symbol = match op {
        UnaryOp::Not => "NOT",
        UnaryOp::Neg => "-",
        UnaryOp::Plus => "+",
    };
    Error::evaluate(format!(
        "Cannot perform '{}' operation on {}",
        symbol,
        v.type_name()
    ))
}

/// Parses a string operand as a number: integral text becomes an integer,
/// anything else a float.
pub(crate) fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(match i32::try_from(i) {
            Ok(v) => Value::Int32(v),
            Err(_) => Value::Int64(i),
        });
    }
    s.parse::<f64>().ok().map(Value::Float64)
}

/// Brings a (string, number) pair onto the numeric side.
fn numeric_pair(op: &str, l: &Value, r: &Value) -> Result<(Value, Value)> {
    let conv = |v: &Value| -> Option<Value> {
        match v {
            Value::String(s) => parse_number(s),
            v if v.is_numeric() => Some(v.clone()),
            _ => None,
        }
    };
    match (conv(l), conv(r)) {
        (Some(a), Some(b)) if l.is_numeric() || r.is_numeric() => Ok((a, b)),
        _ => Err(mismatch(op, l, r)),
    }
}

fn binary(op: BinaryOp, l: Value, r: Value, case_sensitive: bool) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if op.is_comparison() {
        let ord = compare(op, &l, &r, case_sensitive)?;
        let b = match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::NotEq => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::LtEq => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            _ => ord != Ordering::Less,
        };
        return Ok(Value::Boolean(b));
    }
    if op == BinaryOp::Add && (l.as_str().is_some() || r.as_str().is_some()) {
        return concat(&l, &r).ok_or_else(|| mismatch("+", &l, &r));
    }
    let (a, b) = if l.is_numeric() && r.is_numeric() {
        (l, r)
    } else {
        numeric_pair(op.symbol(), &l, &r)?
    };
    arithmetic(op, &a, &b)
}

fn concat(l: &Value, r: &Value) -> Option<Value> {
    let part = |v: &Value| -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Bytes(_) => None,
            other => Some(other.to_string()),
        }
    };
    let mut out = part(l)?;
    out.push_str(&part(r)?);
    Some(Value::String(out))
}

fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    let overflow = || Error::evaluate(format!("Arithmetic overflow in '{}' operation", op.symbol()));
    if let (Some(x), Some(y)) = (a.to_i64(), b.to_i64()) {
        let narrow = matches!((a, b), (Value::Int32(_), Value::Int32(_)));
        let result = match op {
            BinaryOp::Add => x.checked_add(y).ok_or_else(overflow)?,
            BinaryOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
            BinaryOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
            BinaryOp::Mod => {
                if y == 0 {
                    return Err(Error::evaluate("Attempted to divide by zero"));
                }
                x.checked_rem(y).ok_or_else(overflow)?
            }
            BinaryOp::Div => {
                if y == 0 {
                    return Err(Error::evaluate("Attempted to divide by zero"));
                }
                return Ok(Value::Float64(x as f64 / y as f64));
            }
            _ => return Err(mismatch(op.symbol(), a, b)),
        };
        return Ok(match i32::try_from(result) {
            Ok(v) if narrow => Value::Int32(v),
            _ => Value::Int64(result),
        });
    }
    let (x, y) = match (a.to_f64(), b.to_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(mismatch(op.symbol(), a, b)),
    };
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::Mod => x % y,
        _ => return Err(mismatch(op.symbol(), a, b)),
    };
    Ok(Value::Float64(result))
}

/// Orders two non-null operands of a comparison, converting strings to the
/// other operand's type where needed.
pub(crate) fn compare(op: BinaryOp, l: &Value, r: &Value, case_sensitive: bool) -> Result<Ordering> {
    let symbol = op.symbol();
    match (l, r) {
        (Value::String(_), Value::String(_)) => Ok(l.compare_with(r, case_sensitive)),
        (a, b) if a.is_numeric() && b.is_numeric() => Ok(a.cmp(b)),
        (Value::String(_), b) if b.is_numeric() => {
            let (a, b) = numeric_pair(symbol, l, b)?;
            Ok(a.cmp(&b))
        }
        (a, Value::String(_)) if a.is_numeric() => {
            let (a, b) = numeric_pair(symbol, a, r)?;
            Ok(a.cmp(&b))
        }
        (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
        (Value::Boolean(a), Value::String(s)) => parse_as(s, DataType::Boolean)
            .and_then(|v| v.as_bool())
            .map(|b| a.cmp(&b))
            .ok_or_else(|| mismatch(symbol, l, r)),
        (Value::String(s), Value::Boolean(b)) => parse_as(s, DataType::Boolean)
            .and_then(|v| v.as_bool())
            .map(|a| a.cmp(b))
            .ok_or_else(|| mismatch(symbol, l, r)),
        (Value::DateTime(a), Value::DateTime(b)) => Ok(a.cmp(b)),
        (Value::DateTime(a), Value::String(s)) => parse_datetime(s)
            .map(|b| a.cmp(&b))
            .ok_or_else(|| mismatch(symbol, l, r)),
        (Value::String(s), Value::DateTime(b)) => parse_datetime(s)
            .map(|a| a.cmp(b))
            .ok_or_else(|| mismatch(symbol, l, r)),
        (Value::Bytes(a), Value::Bytes(b)) if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) => {
            Ok(a.cmp(b))
        }
        _ => Err(mismatch(symbol, l, r)),
    }
}

fn parse_as(s: &str, target: DataType) -> Option<Value> {
    Value::String(s.into()).coerce_to(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AggregateScope;
    use alloc::vec;
    use alloc::vec::Vec;

    struct Row {
        cols: Vec<(&'static str, Value)>,
        children: Vec<Value>,
    }

    impl EvalContext for Row {
        fn column_value(&self, column: &str) -> Result<Value> {
            self.cols
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(column))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Error::evaluate(format!("Cannot find column [{}]", column)))
        }

        fn parent_value(&self, _relation: Option<&str>, _column: &str) -> Result<Value> {
            Ok(Value::Null)
        }

        fn aggregate_values(&self, scope: &AggregateScope, _column: &str) -> Result<Vec<Value>> {
            match scope {
                AggregateScope::Child(_) => Ok(self.children.clone()),
                AggregateScope::Local => Ok(vec![]),
            }
        }
    }

    fn row() -> Row {
        Row {
            cols: vec![
                ("age", Value::Int32(40)),
                ("name", Value::from("Bob")),
                ("price", Value::Float64(2.5)),
                ("qty", Value::Int32(4)),
                ("note", Value::Null),
                ("flag", Value::Boolean(true)),
            ],
            children: vec![Value::Int32(10), Value::Int32(20)],
        }
    }

    fn eval(text: &str) -> Result<Value> {
        Expression::parse(text)?.evaluate(&row())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("price * qty").unwrap(), Value::Float64(10.0));
        assert_eq!(eval("qty + 1").unwrap(), Value::Int32(5));
        assert_eq!(eval("qty / 8").unwrap(), Value::Float64(0.5));
        assert_eq!(eval("7 % 3").unwrap(), Value::Int32(1));
        assert_eq!(eval("2147483647 + 1").unwrap(), Value::Int64(2_147_483_648));
        assert_eq!(eval("-qty").unwrap(), Value::Int32(-4));
    }

    #[test]
    fn test_divide_by_zero() {
        assert!(matches!(eval("qty / 0"), Err(Error::Evaluate { .. })));
        assert!(matches!(eval("qty % 0"), Err(Error::Evaluate { .. })));
    }

    #[test]
    fn test_string_concat_and_coercion() {
        assert_eq!(eval("name + '!'").unwrap(), Value::from("Bob!"));
        assert_eq!(eval("'5' * 2").unwrap(), Value::Int32(10));
        assert_eq!(eval("age = '40'").unwrap(), Value::Boolean(true));
        assert_eq!(eval("'n' + 1").unwrap(), Value::from("n1"));
    }

    #[test]
    fn test_type_mismatch_names_operands() {
        match eval("flag + 1") {
            Err(Error::Evaluate { message }) => {
                assert!(message.contains("Boolean"), "{}", message);
                assert!(message.contains("Int32"), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(eval("name > 3").is_err());
    }

    #[test]
    fn test_null_propagation() {
        assert_eq!(eval("note + 1").unwrap(), Value::Null);
        assert_eq!(eval("note = 1").unwrap(), Value::Null);
        assert_eq!(eval("note IS NULL").unwrap(), Value::Boolean(true));
        assert_eq!(eval("note IN (1, 2)").unwrap(), Value::Null);
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(eval("note = 1 AND false").unwrap(), Value::Boolean(false));
        assert_eq!(eval("note = 1 OR true").unwrap(), Value::Boolean(true));
        assert_eq!(eval("note = 1 AND true").unwrap(), Value::Null);
        assert_eq!(eval("NOT (note = 1)").unwrap(), Value::Null);
        assert!(eval("age AND true").is_err());
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        assert_eq!(eval("false AND missing = 1").unwrap(), Value::Boolean(false));
        assert!(matches!(eval("true AND missing = 1"), Err(Error::Evaluate { .. })));
    }

    #[test]
    fn test_in_and_like() {
        assert_eq!(eval("age IN (10, 40)").unwrap(), Value::Boolean(true));
        assert_eq!(eval("age NOT IN (10, 40)").unwrap(), Value::Boolean(false));
        assert_eq!(eval("name LIKE 'b%'").unwrap(), Value::Boolean(true));
        assert_eq!(eval("name NOT LIKE 'B_b'").unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_case_sensitivity() {
        assert_eq!(eval("name = 'BOB'").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_child_aggregate() {
        assert_eq!(eval("Sum(Child.amount)").unwrap(), Value::Int64(30));
        assert_eq!(eval("Count(Child.amount) * 2").unwrap(), Value::Int32(4));
    }

    #[test]
    fn test_predicate() {
        let e = Expression::parse("age > 30").unwrap();
        assert!(e.matches(&row()).unwrap());
        let null = Expression::parse("note > 30").unwrap();
        assert!(!null.matches(&row()).unwrap());
        let bad = Expression::parse("age + 1").unwrap();
        assert!(bad.matches(&row()).is_err());
    }

    #[test]
    fn test_unknown_column() {
        match eval("missing + 1") {
            Err(Error::Evaluate { message }) => assert!(message.contains("missing")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_date_comparison() {
        let ctx = Row {
            cols: vec![("d", Value::DateTime(1_577_923_200_000))],
            children: vec![],
        };
        let e = Expression::parse("d = #2020-01-02# AND d > '2019-12-31'").unwrap();
        assert_eq!(e.evaluate(&ctx).unwrap(), Value::Boolean(true));
    }
}

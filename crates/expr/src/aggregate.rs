//! Aggregate reducers.
//!
//! Nulls are skipped. `Count` of an empty set is 0; every other aggregate
//! of an empty set is null. `Var` and `StDev` are sample statistics and
//! need at least two values.

use crate::ast::AggregateFunc;
use alloc::format;
use alloc::vec::Vec;
use core::cmp::Ordering;
use tabula_core::{Error, Result, Value};

/// Reduces `values` with `func`.
pub fn reduce(func: AggregateFunc, values: Vec<Value>, case_sensitive: bool) -> Result<Value> {
    let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    match func {
        AggregateFunc::Count => Ok(Value::Int32(values.len().min(i32::MAX as usize) as i32)),
        AggregateFunc::Min => Ok(extreme(values, case_sensitive, Ordering::Less)),
        AggregateFunc::Max => Ok(extreme(values, case_sensitive, Ordering::Greater)),
        AggregateFunc::Sum => sum(&values),
        AggregateFunc::Avg => {
            let nums = numbers(func, &values)?;
            if nums.is_empty() {
                return Ok(Value::Null);
            }
            Ok(Value::Float64(nums.iter().sum::<f64>() / nums.len() as f64))
        }
        AggregateFunc::Var => Ok(variance(&numbers(func, &values)?)
            .map(Value::Float64)
            .unwrap_or(Value::Null)),
        AggregateFunc::StDev => Ok(variance(&numbers(func, &values)?)
            .map(|v| Value::Float64(libm::sqrt(v)))
            .unwrap_or(Value::Null)),
    }
}

fn extreme(values: Vec<Value>, case_sensitive: bool, keep: Ordering) -> Value {
    values
        .into_iter()
        .reduce(|best, v| {
            if v.compare_with(&best, case_sensitive) == keep {
                v
            } else {
                best
            }
        })
        .unwrap_or(Value::Null)
}

fn sum(values: &[Value]) -> Result<Value> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    if values.iter().all(|v| v.to_i64().is_some()) {
        let mut total: i64 = 0;
        for v in values {
            let i = v.to_i64().unwrap_or(0);
            total = total
                .checked_add(i)
                .ok_or_else(|| Error::evaluate("Arithmetic overflow in Sum"))?;
        }
        return Ok(Value::Int64(total));
    }
    let nums = numbers(AggregateFunc::Sum, values)?;
    Ok(Value::Float64(nums.iter().sum()))
}

fn numbers(func: AggregateFunc, values: &[Value]) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.to_f64().ok_or_else(|| {
                Error::evaluate(format!(
                    "Invalid usage of aggregate function {}() and Type: {}",
                    func.name(),
                    v.type_name()
                ))
            })
        })
        .collect()
}

fn variance(nums: &[f64]) -> Option<f64> {
    if nums.len() < 2 {
        return None;
    }
    let n = nums.len() as f64;
    let mean = nums.iter().sum::<f64>() / n;
    let squares: f64 = nums.iter().map(|x| (x - mean) * (x - mean)).sum();
    Some(squares / (n - 1.0))
}

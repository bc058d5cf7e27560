//! Built-in scalar functions.

use crate::ast::{Expr, Function};
use crate::context::EvalContext;
use crate::eval::{evaluate, evaluate_predicate};
use alloc::format;
use alloc::string::String;
use tabula_core::{DataType, Error, Result, Value};

/// Calls `func`. Arguments are evaluated lazily so that `ISNULL` and `IIF`
/// only touch the branch they return.
pub fn call(func: Function, args: &[Expr], ctx: &dyn EvalContext) -> Result<Value> {
    if args.len() != func.arity() {
        return Err(Error::evaluate(format!(
            "Invalid number of arguments: function {}() expects {}, got {}",
            func.name(),
            func.arity(),
            args.len()
        )));
    }
    match func {
        Function::Len => match evaluate(&args[0], ctx)? {
            Value::Null => Ok(Value::Int32(0)),
            Value::String(s) => Ok(Value::Int32(s.chars().count() as i32)),
            other => Err(argument_type(func, &other)),
        },
        Function::Trim => match evaluate(&args[0], ctx)? {
            Value::Null => Ok(Value::Null),
            Value::String(s) => Ok(Value::String(String::from(s.trim()))),
            other => Err(argument_type(func, &other)),
        },
        Function::Substring => substring(args, ctx),
        Function::IsNull => {
            let v = evaluate(&args[0], ctx)?;
            if v.is_null() {
                evaluate(&args[1], ctx)
            } else {
                Ok(v)
            }
        }
        Function::Iif => {
            if evaluate_predicate(&args[0], ctx)? {
                evaluate(&args[1], ctx)
            } else {
                evaluate(&args[2], ctx)
            }
        }
        Function::Convert => {
            let type_name = evaluate(&args[1], ctx)?;
            let target = type_name
                .as_str()
                .and_then(DataType::from_name)
                .ok_or_else(|| {
                    Error::evaluate(format!("Invalid type name '{}' in CONVERT()", type_name))
                })?;
            let v = evaluate(&args[0], ctx)?;
            v.coerce_to(target).ok_or_else(|| {
                Error::evaluate(format!(
                    "Cannot convert value '{}' of type {} to {}",
                    v,
                    v.type_name(),
                    target
                ))
            })
        }
    }
}

fn substring(args: &[Expr], ctx: &dyn EvalContext) -> Result<Value> {
    let s = match evaluate(&args[0], ctx)? {
        Value::Null => return Ok(Value::String(String::new())),
        Value::String(s) => s,
        other => return Err(argument_type(Function::Substring, &other)),
    };
    let start = integer_arg(&args[1], ctx, "start")?;
    let length = integer_arg(&args[2], ctx, "length")?;
    if start < 1 {
        return Err(Error::evaluate(format!(
            "SUBSTRING() start position {} must be 1 or greater",
            start
        )));
    }
    if length < 0 {
        return Err(Error::evaluate(format!(
            "SUBSTRING() length {} cannot be negative",
            length
        )));
    }
    let out: String = s
        .chars()
        .skip((start - 1) as usize)
        .take(length as usize)
        .collect();
    Ok(Value::String(out))
}

fn integer_arg(arg: &Expr, ctx: &dyn EvalContext, what: &str) -> Result<i64> {
    let v = evaluate(arg, ctx)?;
    v.coerce_to(DataType::Int64)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| {
            Error::evaluate(format!(
                "SUBSTRING() {} must be an integer, found {}",
                what,
                v.type_name()
            ))
        })
}

fn argument_type(func: Function, v: &Value) -> Error {
    Error::evaluate(format!(
        "Type mismatch in function argument: {}() does not accept {}",
        func.name(),
        v.type_name()
    ))
}

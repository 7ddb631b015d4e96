//! Recursive runtime type checker over the closed value universe.
//!
//! `check_type` either succeeds or fails with a specific
//! [`DataValidationError`] kind. Owned `Value` trees cannot contain cycles,
//! so the identity tracking a reference-graph validator would need reduces
//! to a depth guard: validation is total over finite values and reports
//! `Recursive` instead of overflowing the stack on pathological nesting.
//! Union branches are tried independently; a failed branch never poisons
//! its siblings.

use crate::errors::DataValidationError;
use crate::schema::types::{Meta, TypeExpr, Validator};
use crate::schema::value::Value;

/// Nesting depth past which validation reports a recursive value.
pub const MAX_VALIDATION_DEPTH: usize = 256;

/// Checks `value` against `expr`, failing with the first violation found.
pub fn check_type(value: &Value, expr: &TypeExpr) -> Result<(), DataValidationError> {
    check_at_depth(value, expr, 0)
}

fn check_at_depth(
    value: &Value,
    expr: &TypeExpr,
    depth: usize,
) -> Result<(), DataValidationError> {
    if depth > MAX_VALIDATION_DEPTH {
        return Err(DataValidationError::Recursive(value.to_string()));
    }

    match expr {
        TypeExpr::Null => match value {
            Value::Null => Ok(()),
            other => Err(DataValidationError::NoneRequired(other.to_string())),
        },
        TypeExpr::Int(validators) => {
            if !matches!(value, Value::Int(_) | Value::Uint(_)) {
                return Err(mismatch(expr, value));
            }
            check_validators(value, validators)
        }
        // No wire value is a float; the tag exists so peer marshals using it
        // still parse.
        TypeExpr::Float(_) => Err(mismatch(expr, value)),
        TypeExpr::Str(validators) => {
            if !matches!(value, Value::Str(_)) {
                return Err(mismatch(expr, value));
            }
            check_validators(value, validators)
        }
        TypeExpr::Bytes(validators) => {
            if !matches!(value, Value::Bytes(_)) {
                return Err(mismatch(expr, value));
            }
            check_validators(value, validators)
        }
        TypeExpr::List { item, validators } => {
            let Value::List(items) = value else {
                return Err(mismatch(expr, value));
            };
            if let Some(item_expr) = item {
                for it in items {
                    check_at_depth(it, item_expr, depth + 1)?;
                }
            }
            check_validators(value, validators)
        }
        TypeExpr::Dict { entry, validators } => {
            let Value::Dict(entries) = value else {
                return Err(mismatch(expr, value));
            };
            if let Some(kv) = entry {
                for (k, v) in entries {
                    check_at_depth(k, &kv.0, depth + 1)?;
                    check_at_depth(v, &kv.1, depth + 1)?;
                }
            }
            check_validators(value, validators)
        }
        TypeExpr::Tuple { items, validators } => {
            let Value::List(elements) = value else {
                return Err(mismatch(expr, value));
            };
            if let Some(items) = items {
                check_tuple(elements, items, value, depth)?;
            }
            check_validators(value, validators)
        }
        TypeExpr::Ellipsis => Err(mismatch(expr, value)),
        TypeExpr::Union(members) => {
            for member in members {
                if check_at_depth(value, member, depth).is_ok() {
                    return Ok(());
                }
            }
            Err(DataValidationError::UnionExhausted(value.to_string()))
        }
        TypeExpr::Hashable => check_hashable(value, depth),
        TypeExpr::Any(metas) => {
            for meta in metas {
                if let Meta::Validator(validator) = meta {
                    if !validator.check(value) {
                        return Err(predicate_failed(value, validator));
                    }
                }
            }
            Ok(())
        }
        TypeExpr::Struct(schema) => {
            let Value::List(elements) = value else {
                return Err(mismatch(expr, value));
            };
            if elements.len() != schema.fields.len() {
                return Err(DataValidationError::WrongTupleLength {
                    expected: schema.fields.len(),
                    value: value.to_string(),
                });
            }
            for (element, field) in elements.iter().zip(&schema.fields) {
                check_at_depth(element, &field.expr, depth + 1)?;
            }
            Ok(())
        }
    }
}

fn check_tuple(
    elements: &[Value],
    items: &[TypeExpr],
    whole: &Value,
    depth: usize,
) -> Result<(), DataValidationError> {
    if matches!(items.last(), Some(TypeExpr::Ellipsis)) {
        // (T1, ..., Tk, Trest, ...): fixed prefix, then the repeating tail.
        let rest = &items[..items.len() - 1];
        let (variadic, prefix) = match rest.split_last() {
            Some((variadic, prefix)) => (variadic, prefix),
            None => return Ok(()),
        };
        if elements.len() < prefix.len() {
            return Err(DataValidationError::WrongTupleLength {
                expected: prefix.len(),
                value: whole.to_string(),
            });
        }
        for (element, item) in elements.iter().zip(prefix) {
            check_at_depth(element, item, depth + 1)?;
        }
        for element in &elements[prefix.len()..] {
            check_at_depth(element, variadic, depth + 1)?;
        }
        return Ok(());
    }

    if elements.len() != items.len() {
        return Err(DataValidationError::WrongTupleLength {
            expected: items.len(),
            value: whole.to_string(),
        });
    }
    for (element, item) in elements.iter().zip(items) {
        check_at_depth(element, item, depth + 1)?;
    }
    Ok(())
}

fn check_hashable(value: &Value, depth: usize) -> Result<(), DataValidationError> {
    if depth > MAX_VALIDATION_DEPTH {
        return Err(DataValidationError::Recursive(value.to_string()));
    }
    match value {
        Value::Int(_) | Value::Uint(_) | Value::Str(_) | Value::Bytes(_) => Ok(()),
        Value::List(items) => {
            for item in items {
                check_hashable(item, depth + 1)?;
            }
            Ok(())
        }
        Value::Dict(entries) => {
            for (k, v) in entries {
                if !k.is_primitive() {
                    return Err(DataValidationError::NonPrimitiveKey(k.to_string()));
                }
                check_hashable(v, depth + 1)?;
            }
            Ok(())
        }
        Value::Null => Err(DataValidationError::TypeMismatch {
            expected: "hashable",
            got: value.type_name(),
            value: value.to_string(),
        }),
    }
}

fn check_validators(
    value: &Value,
    validators: &[Validator],
) -> Result<(), DataValidationError> {
    for validator in validators {
        if !validator.check(value) {
            return Err(predicate_failed(value, validator));
        }
    }
    Ok(())
}

fn predicate_failed(value: &Value, validator: &Validator) -> DataValidationError {
    DataValidationError::PredicateFailed {
        value: value.to_string(),
        predicate: validator.to_string(),
    }
}

fn mismatch(expr: &TypeExpr, value: &Value) -> DataValidationError {
    DataValidationError::TypeMismatch {
        expected: expr.describe(),
        got: value.type_name(),
        value: value.to_string(),
    }
}

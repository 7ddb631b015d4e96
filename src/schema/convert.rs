//! Best-effort value coercion ahead of validation.
//!
//! `convert_object` reshapes a value toward a type expression without ever
//! inventing data: struct expressions map a positional list onto named
//! fields with default fill-in, containers coerce elementwise, and integers
//! normalize between the signed and unsigned representations. Anything the
//! coercion does not understand passes through unchanged and is left for
//! [`check_type`](crate::schema::check_type) to reject.

use crate::errors::DataValidationError;
use crate::schema::check::check_type;
use crate::schema::types::{StructSchema, TypeExpr};
use crate::schema::value::Value;

/// Coerces `value` toward `expr`. Whenever this returns `Ok(w)`,
/// `check_type(&w, expr)` reports the real verdict without panicking.
pub fn convert_object(expr: &TypeExpr, value: &Value) -> Result<Value, DataValidationError> {
    match (expr, value) {
        (TypeExpr::Struct(schema), Value::List(elements)) => {
            convert_struct(schema, elements)
        }
        (TypeExpr::Struct(_), other) => Err(DataValidationError::TupleOrListRequired(
            other.to_string(),
        )),
        (TypeExpr::List { item: Some(item), .. }, Value::List(elements)) => {
            let converted = elements
                .iter()
                .map(|element| convert_object(item, element))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(converted))
        }
        (TypeExpr::Tuple { items: Some(items), .. }, Value::List(elements)) => {
            convert_tuple(items, elements)
        }
        (TypeExpr::Dict { entry: Some(entry), .. }, Value::Dict(entries)) => {
            let mut converted = std::collections::BTreeMap::new();
            for (k, v) in entries {
                converted.insert(k.clone(), convert_object(&entry.1, v)?);
            }
            Ok(Value::Dict(converted))
        }
        (_, Value::Int(n)) => Ok(Value::int(*n)),
        _ => Ok(value.clone()),
    }
}

fn convert_tuple(
    items: &[TypeExpr],
    elements: &[Value],
) -> Result<Value, DataValidationError> {
    // (T, ...) is homogeneous: coerce every element toward T.
    if let [item, TypeExpr::Ellipsis] = items {
        let converted = elements
            .iter()
            .map(|element| convert_object(item, element))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::List(converted));
    }
    // Fixed shape with matching arity: coerce positionally. Anything else
    // passes through for the checker to diagnose.
    if !items.iter().any(|i| matches!(i, TypeExpr::Ellipsis))
        && items.len() == elements.len()
    {
        let converted = elements
            .iter()
            .zip(items)
            .map(|(element, item)| convert_object(item, element))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::List(converted));
    }
    Ok(Value::List(elements.to_vec()))
}

fn convert_struct(
    schema: &StructSchema,
    elements: &[Value],
) -> Result<Value, DataValidationError> {
    if elements.len() > schema.fields.len() {
        return Err(DataValidationError::ExcessStructValue(
            Value::List(elements[schema.fields.len()..].to_vec()).to_string(),
        ));
    }

    let mut output = Vec::with_capacity(schema.fields.len());
    for (index, field) in schema.fields.iter().enumerate() {
        let raw = match elements.get(index) {
            Some(element) => element.clone(),
            None => match &field.default {
                Some(default) => default.clone(),
                None => {
                    return Err(DataValidationError::NoValueProvided(field.name.clone()))
                }
            },
        };
        let converted = convert_object(&field.expr, &raw)?;
        check_type(&converted, &field.expr)?;
        output.push(converted);
    }
    Ok(Value::List(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::net_types::*;
    use crate::schema::types::StructSchema;

    fn abc_struct() -> TypeExpr {
        TypeExpr::Struct(
            StructSchema::new("A")
                .field("normal_field", TypeExpr::Int(vec![]))
                .field_default("default_field", TypeExpr::Int(vec![]), Value::Uint(0))
                .field_default(
                    "mutable_field",
                    list_of(TypeExpr::Int(vec![])),
                    Value::list([]),
                ),
        )
    }

    #[test]
    fn struct_positional_fill() {
        let expr = abc_struct();
        let converted = convert_object(&expr, &Value::list([Value::Uint(1)])).unwrap();
        assert_eq!(
            converted,
            Value::list([Value::Uint(1), Value::Uint(0), Value::list([])])
        );
        check_type(&converted, &expr).unwrap();

        let converted =
            convert_object(&expr, &Value::list([Value::Uint(1), Value::Uint(2)])).unwrap();
        assert_eq!(
            converted,
            Value::list([Value::Uint(1), Value::Uint(2), Value::list([])])
        );
    }

    #[test]
    fn struct_shape_violations() {
        let expr = abc_struct();
        let bad = [
            Value::list([]),
            Value::list([Value::str("")]),
            Value::list([
                Value::Uint(1),
                Value::Uint(2),
                Value::list([Value::Uint(1)]),
                Value::Uint(4),
            ]),
        ];
        for value in bad {
            assert!(
                convert_object(&expr, &value).is_err(),
                "conversion passed but should have failed for {}",
                value
            );
        }
    }

    #[test]
    fn nested_struct_conversion() {
        let inner = TypeExpr::Struct(StructSchema::new("A").field("value", TypeExpr::Int(vec![])));
        let outer = TypeExpr::Struct(StructSchema::new("B").field("a", inner.clone()));

        assert_eq!(
            convert_object(&inner, &Value::list([Value::Uint(1)])).unwrap(),
            Value::list([Value::Uint(1)])
        );
        assert_eq!(
            convert_object(&list_of(inner.clone()), &Value::list([
                Value::list([Value::Uint(1)]),
                Value::list([Value::Uint(2)]),
            ]))
            .unwrap(),
            Value::list([
                Value::list([Value::Uint(1)]),
                Value::list([Value::Uint(2)]),
            ])
        );
        assert!(convert_object(
            &list_of(inner),
            &Value::list([Value::list([Value::Uint(1), Value::Uint(2)])]),
        )
        .is_err());

        assert_eq!(
            convert_object(&outer, &Value::list([Value::list([Value::Uint(1)])])).unwrap(),
            Value::list([Value::list([Value::Uint(1)])])
        );
    }

    #[test]
    fn bare_tuple_passes_through() {
        let expr = TypeExpr::Tuple {
            items: None,
            validators: Vec::new(),
        };
        let value = Value::list([Value::Uint(1), Value::Uint(2)]);
        assert_eq!(convert_object(&expr, &value).unwrap(), value);
    }

    #[test]
    fn integer_normalization() {
        assert_eq!(
            convert_object(&TypeExpr::Int(vec![]), &Value::Int(5)).unwrap(),
            Value::Uint(5)
        );
        assert_eq!(
            convert_object(&TypeExpr::Int(vec![]), &Value::Int(-5)).unwrap(),
            Value::Int(-5)
        );
    }

    #[test]
    fn converted_values_validate() {
        // check_type(convert_object(T, v), T) never panics; for convertible
        // values it succeeds.
        let expr = dict_of(s16(), list_of(uint8()));
        let mut dict = std::collections::BTreeMap::new();
        dict.insert(Value::str("a"), Value::list([Value::Uint(1)]));
        let value = Value::Dict(dict);
        let converted = convert_object(&expr, &value).unwrap();
        check_type(&converted, &expr).unwrap();
    }
}

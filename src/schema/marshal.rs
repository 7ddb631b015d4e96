//! Bidirectional serialization of field signatures to a schema-stable tree
//! of primitives.
//!
//! The tree is carried as `serde_json::Value`, which is also how it lands in
//! the persisted registry file. The tag set is closed; peers built
//! independently agree on it. There is no backward compatibility between
//! marshal revisions; regenerating the signature files is the norm.

use std::collections::HashMap;

use serde_json::{json, Map, Value as Json};

use crate::errors::MarshalError;
use crate::schema::signature::{FieldSignature, SignatureFlags, SignatureItem};
use crate::schema::types::{Meta, TypeExpr, Validator};
use crate::schema::value::Value;

/// Parses and caches annotated validators by display name. The set of
/// validator kinds is fixed; only their arguments vary.
#[derive(Debug, Default)]
pub struct ValidatorRegistry {
    cache: HashMap<String, Validator>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a display name such as `Ge(128)` to a validator instance.
    pub fn get(&mut self, display: &str) -> Result<Validator, MarshalError> {
        if let Some(validator) = self.cache.get(display) {
            return Ok(validator.clone());
        }

        let (name, rest) = display
            .split_once('(')
            .ok_or_else(|| MarshalError::UnknownValidator(display.to_string()))?;
        let arg = rest
            .strip_suffix(')')
            .ok_or_else(|| MarshalError::BadValidatorArgument(display.to_string()))?;

        let validator = match name {
            "Ge" => Validator::Ge(parse_int(display, arg)?),
            "Lt" => Validator::Lt(parse_int(display, arg)?),
            "MaxLen" => Validator::MaxLen(
                parse_int(display, arg)?
                    .try_into()
                    .map_err(|_| MarshalError::BadValidatorArgument(display.to_string()))?,
            ),
            _ => return Err(MarshalError::UnknownValidator(display.to_string())),
        };
        self.cache.insert(display.to_string(), validator.clone());
        Ok(validator)
    }
}

fn parse_int(display: &str, arg: &str) -> Result<i128, MarshalError> {
    arg.trim()
        .parse()
        .map_err(|_| MarshalError::BadValidatorArgument(display.to_string()))
}

fn validators_to_meta(validators: &[Validator]) -> Option<Json> {
    if validators.is_empty() {
        return None;
    }
    Some(Json::Array(
        validators
            .iter()
            .map(|v| json!({"t": "av", "d": v.to_string()}))
            .collect(),
    ))
}

fn metas_to_meta(metas: &[Meta]) -> Result<Option<Json>, MarshalError> {
    if metas.is_empty() {
        return Ok(None);
    }
    let mut output = Vec::with_capacity(metas.len());
    for meta in metas {
        match meta {
            Meta::Validator(v) => output.push(json!({"t": "av", "d": v.to_string()})),
            Meta::Marker(value) => {
                output.push(json!({"t": "pr", "d": value_to_json(value)?}))
            }
        }
    }
    Ok(Some(Json::Array(output)))
}

fn tagged(tag: &str, meta: Option<Json>, args: Option<Vec<Json>>) -> Json {
    let mut map = Map::new();
    map.insert("t".into(), Json::String(tag.into()));
    map.insert("m".into(), meta.unwrap_or(Json::Null));
    if let Some(args) = args {
        map.insert("a".into(), Json::Array(args));
    }
    Json::Object(map)
}

/// Marshals a type expression to its tagged tree form.
pub fn expr_to_marshal(expr: &TypeExpr) -> Result<Json, MarshalError> {
    match expr {
        TypeExpr::Null => Err(MarshalError::UnsupportedExpression("None")),
        TypeExpr::Struct(_) => Err(MarshalError::UnsupportedExpression("struct")),
        TypeExpr::Ellipsis => Ok(tagged("ell", None, None)),
        TypeExpr::Hashable => Ok(tagged("hashable", None, None)),
        TypeExpr::Any(metas) => Ok(tagged("any", metas_to_meta(metas)?, None)),
        TypeExpr::Int(v) => Ok(tagged("int", validators_to_meta(v), Some(vec![]))),
        TypeExpr::Float(v) => Ok(tagged("float", validators_to_meta(v), Some(vec![]))),
        TypeExpr::Str(v) => Ok(tagged("str", validators_to_meta(v), Some(vec![]))),
        TypeExpr::Bytes(v) => Ok(tagged("bytes", validators_to_meta(v), Some(vec![]))),
        TypeExpr::List { item, validators } => {
            let args = match item {
                Some(item) => vec![expr_to_marshal(item)?],
                None => vec![],
            };
            Ok(tagged("list", validators_to_meta(validators), Some(args)))
        }
        TypeExpr::Dict { entry, validators } => {
            let args = match entry {
                Some(kv) => vec![expr_to_marshal(&kv.0)?, expr_to_marshal(&kv.1)?],
                None => vec![],
            };
            Ok(tagged("dict", validators_to_meta(validators), Some(args)))
        }
        TypeExpr::Tuple { items, validators } => {
            let args = match items {
                Some(items) => items
                    .iter()
                    .map(expr_to_marshal)
                    .collect::<Result<Vec<_>, _>>()?,
                None => vec![],
            };
            Ok(tagged("tuple", validators_to_meta(validators), Some(args)))
        }
        TypeExpr::Union(members) => {
            let args = members
                .iter()
                .map(expr_to_marshal)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tagged("Union", None, Some(args)))
        }
    }
}

fn meta_validators(
    meta: &Json,
    registry: &mut ValidatorRegistry,
) -> Result<Vec<Validator>, MarshalError> {
    let entries = match meta {
        Json::Null => return Ok(Vec::new()),
        Json::Array(entries) => entries,
        other => return Err(MarshalError::UnsupportedMeta(other.to_string())),
    };
    let mut output = Vec::with_capacity(entries.len());
    for entry in entries {
        match (entry.get("t").and_then(Json::as_str), entry.get("d")) {
            (Some("av"), Some(Json::String(display))) => output.push(registry.get(display)?),
            _ => return Err(MarshalError::UnsupportedMeta(entry.to_string())),
        }
    }
    Ok(output)
}

fn meta_any(
    meta: &Json,
    registry: &mut ValidatorRegistry,
) -> Result<Vec<Meta>, MarshalError> {
    let entries = match meta {
        Json::Null => return Ok(Vec::new()),
        Json::Array(entries) => entries,
        other => return Err(MarshalError::UnsupportedMeta(other.to_string())),
    };
    let mut output = Vec::with_capacity(entries.len());
    for entry in entries {
        match (entry.get("t").and_then(Json::as_str), entry.get("d")) {
            (Some("av"), Some(Json::String(display))) => {
                output.push(Meta::Validator(registry.get(display)?))
            }
            (Some("pr"), Some(data)) => output.push(Meta::Marker(json_to_value(data)?)),
            _ => return Err(MarshalError::UnsupportedMeta(entry.to_string())),
        }
    }
    Ok(output)
}

/// Rebuilds a type expression from its tagged tree form.
pub fn marshal_to_expr(marshal: &Json) -> Result<TypeExpr, MarshalError> {
    let mut registry = ValidatorRegistry::new();
    marshal_to_expr_with(marshal, &mut registry)
}

fn marshal_to_expr_with(
    marshal: &Json,
    registry: &mut ValidatorRegistry,
) -> Result<TypeExpr, MarshalError> {
    let tag = marshal
        .get("t")
        .and_then(Json::as_str)
        .ok_or_else(|| MarshalError::MalformedMarshal(marshal.to_string()))?;
    let meta = marshal.get("m").unwrap_or(&Json::Null);
    let empty = Vec::new();
    let args = match marshal.get("a") {
        Some(Json::Array(args)) => args,
        Some(other) => return Err(MarshalError::MalformedMarshal(other.to_string())),
        None => &empty,
    };

    let sub = |args: &[Json], registry: &mut ValidatorRegistry| {
        args.iter()
            .map(|a| marshal_to_expr_with(a, registry))
            .collect::<Result<Vec<_>, _>>()
    };

    match tag {
        "ell" => Ok(TypeExpr::Ellipsis),
        "hashable" => Ok(TypeExpr::Hashable),
        "any" => Ok(TypeExpr::Any(meta_any(meta, registry)?)),
        "int" => Ok(TypeExpr::Int(meta_validators(meta, registry)?)),
        "float" => Ok(TypeExpr::Float(meta_validators(meta, registry)?)),
        "str" => Ok(TypeExpr::Str(meta_validators(meta, registry)?)),
        "bytes" => Ok(TypeExpr::Bytes(meta_validators(meta, registry)?)),
        "list" => {
            let item = match sub(args, registry)?.as_slice() {
                [] => None,
                [item] => Some(Box::new(item.clone())),
                _ => return Err(MarshalError::MalformedMarshal(marshal.to_string())),
            };
            Ok(TypeExpr::List {
                item,
                validators: meta_validators(meta, registry)?,
            })
        }
        "dict" => {
            let entry = match sub(args, registry)?.as_slice() {
                [] => None,
                [k, v] => Some(Box::new((k.clone(), v.clone()))),
                _ => return Err(MarshalError::MalformedMarshal(marshal.to_string())),
            };
            Ok(TypeExpr::Dict {
                entry,
                validators: meta_validators(meta, registry)?,
            })
        }
        "tuple" => {
            let items = sub(args, registry)?;
            Ok(TypeExpr::Tuple {
                items: if items.is_empty() { None } else { Some(items) },
                validators: meta_validators(meta, registry)?,
            })
        }
        "Union" => Ok(TypeExpr::Union(sub(args, registry)?)),
        other => Err(MarshalError::UnsupportedTypeName(other.to_string())),
    }
}

/// Converts a network value to its JSON carrier form. Byte strings and
/// non-string dictionary keys have no JSON representation.
pub fn value_to_json(value: &Value) -> Result<Json, MarshalError> {
    match value {
        Value::Null => Ok(Json::Null),
        Value::Int(v) => Ok(json!(v)),
        Value::Uint(v) => Ok(json!(v)),
        Value::Str(v) => Ok(Json::String(v.clone())),
        Value::Bytes(_) => Err(MarshalError::UnsupportedValue(value.to_string())),
        Value::List(items) => Ok(Json::Array(
            items.iter().map(value_to_json).collect::<Result<_, _>>()?,
        )),
        Value::Dict(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                let key = k
                    .as_str()
                    .ok_or_else(|| MarshalError::UnsupportedValue(k.to_string()))?;
                map.insert(key.to_string(), value_to_json(v)?);
            }
            Ok(Json::Object(map))
        }
    }
}

/// Converts a JSON carrier value back into a network value.
pub fn json_to_value(json: &Json) -> Result<Value, MarshalError> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(v) => Ok(Value::Uint(*v as u64)),
        Json::Number(n) => {
            if let Some(v) = n.as_u64() {
                Ok(Value::Uint(v))
            } else if let Some(v) = n.as_i64() {
                Ok(Value::int(v))
            } else {
                Err(MarshalError::UnsupportedValue(n.to_string()))
            }
        }
        Json::String(v) => Ok(Value::Str(v.clone())),
        Json::Array(items) => Ok(Value::List(
            items.iter().map(json_to_value).collect::<Result<_, _>>()?,
        )),
        Json::Object(map) => {
            let mut entries = std::collections::BTreeMap::new();
            for (k, v) in map {
                entries.insert(Value::Str(k.clone()), json_to_value(v)?);
            }
            Ok(Value::Dict(entries))
        }
    }
}

fn item_to_marshal(item: &SignatureItem) -> Result<Json, MarshalError> {
    let mut map = Map::new();
    map.insert("name".into(), Json::String(item.name.clone()));
    map.insert("typehint".into(), expr_to_marshal(&item.expr)?);
    map.insert("is_variadic".into(), Json::Bool(item.is_variadic));
    if let Some(default) = &item.default {
        map.insert("default_value".into(), value_to_json(default)?);
    }
    Ok(Json::Object(map))
}

fn marshal_to_item(marshal: &Json) -> Result<SignatureItem, MarshalError> {
    let name = marshal
        .get("name")
        .and_then(Json::as_str)
        .ok_or_else(|| MarshalError::MalformedMarshal(marshal.to_string()))?;
    let expr = marshal_to_expr(
        marshal
            .get("typehint")
            .ok_or_else(|| MarshalError::MalformedMarshal(marshal.to_string()))?,
    )?;
    let is_variadic = marshal
        .get("is_variadic")
        .and_then(Json::as_bool)
        .unwrap_or(false);
    let default = match marshal.get("default_value") {
        Some(default) => Some(json_to_value(default)?),
        None => None,
    };
    Ok(SignatureItem {
        name: name.to_string(),
        expr,
        is_variadic,
        default,
    })
}

/// Marshals a full field signature: `{"n": name, "a": flags, "f": items}`.
pub fn signature_to_marshal(signature: &FieldSignature) -> Result<Json, MarshalError> {
    Ok(json!({
        "n": signature.name,
        "a": signature.flags.bits(),
        "f": signature
            .items
            .iter()
            .map(item_to_marshal)
            .collect::<Result<Vec<_>, MarshalError>>()?,
    }))
}

/// Rebuilds a field signature from its marshalled form.
pub fn marshal_to_signature(marshal: &Json) -> Result<FieldSignature, MarshalError> {
    let name = marshal
        .get("n")
        .and_then(Json::as_str)
        .ok_or_else(|| MarshalError::MalformedMarshal(marshal.to_string()))?;
    let flags = marshal
        .get("a")
        .and_then(Json::as_u64)
        .ok_or_else(|| MarshalError::MalformedMarshal(marshal.to_string()))?;
    let items = marshal
        .get("f")
        .and_then(Json::as_array)
        .ok_or_else(|| MarshalError::MalformedMarshal(marshal.to_string()))?
        .iter()
        .map(marshal_to_item)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FieldSignature {
        name: name.to_string(),
        items,
        flags: SignatureFlags::from_bits_truncate(flags as u32),
    })
}

//! The closed type-expression universe and its annotated validators.
//!
//! Type expressions are explicit tagged variants rather than reflection over
//! host-language types: the application declares schemas as literals and the
//! validator interprets them at runtime. The universe is closed on purpose:
//! every expression (minus local-only `Struct` and `Null`) has a stable
//! marshalled form that independently developed peers agree on.

use std::fmt;

use crate::schema::value::Value;

/// A bound attached to a base type, displayed exactly as it is persisted
/// (`Ge(0)`, `Lt(65536)`, `MaxLen(64)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    /// value >= n
    Ge(i128),
    /// value < n
    Lt(i128),
    /// len(value) <= n
    MaxLen(u64),
}

impl Validator {
    pub fn check(&self, value: &Value) -> bool {
        match self {
            Validator::Ge(bound) => value.as_i128().map(|v| v >= *bound).unwrap_or(false),
            Validator::Lt(bound) => value.as_i128().map(|v| v < *bound).unwrap_or(false),
            Validator::MaxLen(bound) => value.len().map(|l| l as u64 <= *bound).unwrap_or(false),
        }
    }
}

impl fmt::Display for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Ge(n) => write!(f, "Ge({})", n),
            Validator::Lt(n) => write!(f, "Lt({})", n),
            Validator::MaxLen(n) => write!(f, "MaxLen({})", n),
        }
    }
}

/// Metadata attached to an `Any` expression: either a checked validator or
/// an inert hashable marker value that application hooks may interpret.
#[derive(Debug, Clone, PartialEq)]
pub enum Meta {
    Validator(Validator),
    Marker(Value),
}

/// One named positional field of a [`TypeExpr::Struct`] expression.
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub expr: TypeExpr,
    pub default: Option<Value>,
}

/// A struct-shaped expression: a list value maps positionally onto the
/// fields, with defaults filling the tail. Structs are a local declaration
/// convenience and have no marshalled form.
#[derive(Debug, Clone, PartialEq)]
pub struct StructSchema {
    pub name: String,
    pub fields: Vec<StructField>,
}

impl StructSchema {
    pub fn new(name: impl Into<String>) -> Self {
        StructSchema {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, expr: TypeExpr) -> Self {
        self.fields.push(StructField {
            name: name.into(),
            expr,
            default: None,
        });
        self
    }

    pub fn field_default(
        mut self,
        name: impl Into<String>,
        expr: TypeExpr,
        default: Value,
    ) -> Self {
        self.fields.push(StructField {
            name: name.into(),
            expr,
            default: Some(default),
        });
        self
    }
}

/// A runtime type expression from the closed universe.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// Matches only `Value::Null`.
    Null,
    /// Signed or unsigned integers, optionally bounded.
    Int(Vec<Validator>),
    /// Reserved tag for peers that emit it; no wire value satisfies it.
    Float(Vec<Validator>),
    Str(Vec<Validator>),
    Bytes(Vec<Validator>),
    /// `item == None` means an unchecked bare list.
    List {
        item: Option<Box<TypeExpr>>,
        validators: Vec<Validator>,
    },
    /// `entry == None` means an unchecked bare dict.
    Dict {
        entry: Option<Box<(TypeExpr, TypeExpr)>>,
        validators: Vec<Validator>,
    },
    /// `items == None` means an unchecked bare tuple. A trailing
    /// [`TypeExpr::Ellipsis`] makes the preceding item variadic.
    Tuple {
        items: Option<Vec<TypeExpr>>,
        validators: Vec<Validator>,
    },
    /// Only meaningful as the last element of a tuple item list.
    Ellipsis,
    /// Matches when any member matches.
    Union(Vec<TypeExpr>),
    /// The recursive alias over the whole hashable universe.
    Hashable,
    /// Matches anything; validator metadata is still applied.
    Any(Vec<Meta>),
    /// Local-only positional struct (not marshallable).
    Struct(StructSchema),
}

impl TypeExpr {
    /// Human-facing name used in type-comparison errors.
    pub fn describe(&self) -> &'static str {
        match self {
            TypeExpr::Null => "None",
            TypeExpr::Int(_) => "int",
            TypeExpr::Float(_) => "float",
            TypeExpr::Str(_) => "str",
            TypeExpr::Bytes(_) => "bytes",
            TypeExpr::List { .. } => "list",
            TypeExpr::Dict { .. } => "dict",
            TypeExpr::Tuple { .. } => "tuple",
            TypeExpr::Ellipsis => "ellipsis",
            TypeExpr::Union(_) => "union",
            TypeExpr::Hashable => "hashable",
            TypeExpr::Any(_) => "any",
            TypeExpr::Struct(_) => "struct",
        }
    }

    pub fn validators(&self) -> &[Validator] {
        match self {
            TypeExpr::Int(v)
            | TypeExpr::Float(v)
            | TypeExpr::Str(v)
            | TypeExpr::Bytes(v) => v,
            TypeExpr::List { validators, .. }
            | TypeExpr::Dict { validators, .. }
            | TypeExpr::Tuple { validators, .. } => validators,
            _ => &[],
        }
    }
}

/// Shorthand constructors for the standard bounded network types.
pub mod net_types {
    use super::{TypeExpr, Validator};

    fn bounded_int(lo: i128, hi: i128) -> TypeExpr {
        TypeExpr::Int(vec![Validator::Ge(lo), Validator::Lt(hi)])
    }

    pub fn uint8() -> TypeExpr {
        bounded_int(0, 1 << 8)
    }

    pub fn uint16() -> TypeExpr {
        bounded_int(0, 1 << 16)
    }

    pub fn uint32() -> TypeExpr {
        bounded_int(0, 1 << 32)
    }

    pub fn uint64() -> TypeExpr {
        bounded_int(0, 1 << 64)
    }

    pub fn int8() -> TypeExpr {
        bounded_int(-(1 << 7), 1 << 7)
    }

    pub fn int16() -> TypeExpr {
        bounded_int(-(1 << 15), 1 << 15)
    }

    pub fn int32() -> TypeExpr {
        bounded_int(-(1 << 31), 1 << 31)
    }

    pub fn int64() -> TypeExpr {
        bounded_int(-(1 << 63), 1 << 63)
    }

    fn bounded_str(max: u64) -> TypeExpr {
        TypeExpr::Str(vec![Validator::MaxLen(max)])
    }

    fn bounded_bytes(max: u64) -> TypeExpr {
        TypeExpr::Bytes(vec![Validator::MaxLen(max)])
    }

    pub fn s16() -> TypeExpr {
        bounded_str(1 << 4)
    }

    pub fn s64() -> TypeExpr {
        bounded_str(1 << 6)
    }

    pub fn s256() -> TypeExpr {
        bounded_str(1 << 8)
    }

    pub fn s4096() -> TypeExpr {
        bounded_str(1 << 12)
    }

    pub fn bs16() -> TypeExpr {
        bounded_bytes(1 << 4)
    }

    pub fn bs64() -> TypeExpr {
        bounded_bytes(1 << 6)
    }

    pub fn bs256() -> TypeExpr {
        bounded_bytes(1 << 8)
    }

    pub fn bs4096() -> TypeExpr {
        bounded_bytes(1 << 12)
    }

    pub fn hashable() -> TypeExpr {
        TypeExpr::Hashable
    }

    pub fn any() -> TypeExpr {
        TypeExpr::Any(Vec::new())
    }

    /// The types allowed as dictionary keys.
    pub fn primitive() -> TypeExpr {
        TypeExpr::Union(vec![
            uint64(),
            int64(),
            TypeExpr::Str(Vec::new()),
            TypeExpr::Bytes(Vec::new()),
        ])
    }

    pub fn list_of(item: TypeExpr) -> TypeExpr {
        TypeExpr::List {
            item: Some(Box::new(item)),
            validators: Vec::new(),
        }
    }

    pub fn dict_of(key: TypeExpr, value: TypeExpr) -> TypeExpr {
        TypeExpr::Dict {
            entry: Some(Box::new((key, value))),
            validators: Vec::new(),
        }
    }

    pub fn tuple_of(items: impl IntoIterator<Item = TypeExpr>) -> TypeExpr {
        TypeExpr::Tuple {
            items: Some(items.into_iter().collect()),
            validators: Vec::new(),
        }
    }

    /// A tuple whose trailing item repeats: `(T1, ..., Tk, Trest, ...)`.
    pub fn variadic_tuple(items: impl IntoIterator<Item = TypeExpr>) -> TypeExpr {
        let mut items: Vec<TypeExpr> = items.into_iter().collect();
        items.push(TypeExpr::Ellipsis);
        TypeExpr::Tuple {
            items: Some(items),
            validators: Vec::new(),
        }
    }

    pub fn optional(expr: TypeExpr) -> TypeExpr {
        TypeExpr::Union(vec![expr, TypeExpr::Null])
    }
}

#[cfg(test)]
mod tests {
    use super::net_types::*;
    use super::*;

    #[test]
    fn validator_display_is_stable() {
        assert_eq!(Validator::Ge(0).to_string(), "Ge(0)");
        assert_eq!(Validator::Lt(65536).to_string(), "Lt(65536)");
        assert_eq!(Validator::MaxLen(64).to_string(), "MaxLen(64)");
    }

    #[test]
    fn validator_checks() {
        assert!(Validator::Ge(0).check(&Value::Uint(0)));
        assert!(!Validator::Ge(0).check(&Value::Int(-1)));
        assert!(Validator::Lt(256).check(&Value::Uint(255)));
        assert!(!Validator::Lt(256).check(&Value::Uint(256)));
        assert!(Validator::MaxLen(2).check(&Value::str("ab")));
        assert!(!Validator::MaxLen(2).check(&Value::str("abc")));
    }

    #[test]
    fn uint64_upper_bound_exceeds_u64() {
        // Lt(2^64) must hold for every representable Uint.
        assert!(matches!(&uint64(), TypeExpr::Int(v)
            if v.contains(&Validator::Lt(1 << 64))));
        let TypeExpr::Int(validators) = uint64() else {
            unreachable!()
        };
        assert!(validators.iter().all(|v| v.check(&Value::Uint(u64::MAX))));
    }
}

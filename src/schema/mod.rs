//! Typed-value layer: the value universe, the closed type-expression
//! universe, the recursive validator, signature handling and the persisted
//! signature marshal.

pub mod check;
pub mod convert;
pub mod marshal;
pub mod signature;
pub mod types;
pub mod value;

pub use check::{check_type, MAX_VALIDATION_DEPTH};
pub use convert::convert_object;
pub use marshal::{
    expr_to_marshal, json_to_value, marshal_to_expr, marshal_to_signature,
    signature_to_marshal, value_to_json, ValidatorRegistry,
};
pub use signature::{FieldSignature, SignatureFlags, SignatureItem};
pub use types::{net_types, Meta, StructField, StructSchema, TypeExpr, Validator};
pub use value::Value;

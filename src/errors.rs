//! Unified Error Handling System
//!
//! This module provides the type-safe error taxonomy for all NetWeave
//! components, built on thiserror. The taxonomy mirrors how errors are
//! treated operationally: configuration errors abort startup, validation
//! errors are logged and the offending data dropped, marshal errors reject
//! a signature file, and encode errors drop a datagram.

use std::path::PathBuf;
use thiserror::Error;

/// Errors caused by an incorrectly configured node. These are raised
/// eagerly and terminate startup; they are never produced by peer input.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown network role: {0}")]
    UnknownRole(String),

    #[error("a required component was not provided: {0}")]
    ComponentNotProvided(&'static str),

    #[error("all extra processors must be registered outside the reserved range")]
    ExtraCallbacksProvided,

    #[error("client repository {0} is outside the static range 1..=127")]
    InvalidClientRepository(u32),

    #[error("{0} requires at least one set of connection parameters")]
    ConnectionParametersMissing(&'static str),

    #[error("the object registry was initialized more than once")]
    MultipleRegistryInitializations,

    #[error("class {0} was registered after registry initialization")]
    RegisterAfterInitialization(String),

    #[error("class {0} declares a field without a name")]
    UnnamedField(String),

    #[error("field {field} on class {class} has no callback")]
    FieldNotInitialized { class: String, field: String },

    #[error("class {0} declares no network name")]
    NoNetworkName(String),

    #[error("foreign object class {0} cannot be instantiated")]
    ForeignObjectUsed(String),

    #[error("class {class} has no field named {message}")]
    UnknownObjectMessage { class: String, message: String },

    #[error("node without a client repository tried to author object {0} directly")]
    RepolessClientCreatesObject(String),

    #[error("unknown object class: {0}")]
    UnknownObjectClass(String),

    #[error("signature file not readable: {0}")]
    SignatureFileMissing(PathBuf),
}

/// Errors produced by the recursive value validator. The `Display` output
/// of these errors is surfaced in warnings and `BAD_NETWORK_OBJECT_CALL`
/// events, so it carries the validator display names (e.g. `Lt(65536)`).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataValidationError {
    #[error("expected a length {expected} tuple, got {value}")]
    WrongTupleLength { expected: usize, value: String },

    #[error("expected None, got {0}")]
    NoneRequired(String),

    #[error("{value}: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
        value: String,
    },

    #[error("union checks exceeded for {0}")]
    UnionExhausted(String),

    #[error("{value}: expected {predicate} to hold")]
    PredicateFailed { value: String, predicate: String },

    #[error("{0}: recursion limit reached")]
    Recursive(String),

    #[error("dictionary key is not a primitive: {0}")]
    NonPrimitiveKey(String),

    #[error("no value provided for {0}")]
    NoValueProvided(String),

    #[error("too many arguments: expected {expected}, got {given}")]
    TooManyArguments { expected: usize, given: usize },

    #[error("excess value for a struct expression: {0}")]
    ExcessStructValue(String),

    #[error("expected a tuple or a list, got {0}")]
    TupleOrListRequired(String),
}

/// Errors produced while converting field signatures to or from their
/// persisted tree form.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarshalError {
    #[error("unsupported type tag: {0}")]
    UnsupportedTypeName(String),

    #[error("{0} is not a registered annotated validator")]
    UnknownValidator(String),

    #[error("invalid validator argument in {0}")]
    BadValidatorArgument(String),

    #[error("unsupported metadata entry: {0}")]
    UnsupportedMeta(String),

    #[error("{0} expressions cannot be marshalled")]
    UnsupportedExpression(&'static str),

    #[error("value cannot be marshalled: {0}")]
    UnsupportedValue(String),

    #[error("malformed signature marshal: {0}")]
    MalformedMarshal(String),
}

/// Errors produced by a wire encoder while packing or unpacking datagrams.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("failed to pack messages: {0}")]
    Pack(String),

    #[error("failed to unpack a datagram: {0}")]
    Unpack(String),
}

/// Main error type for NetWeave operations.
#[derive(Error, Debug)]
pub enum NetError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] DataValidationError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("object {0} does not exist")]
    NoSuchObject(u64),
}

/// Result type alias for NetWeave operations.
pub type NetResult<T> = Result<T, NetError>;

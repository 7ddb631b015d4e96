//! Protocol layer: reserved message codes, disconnect reasons, the
//! processor dispatch table and the standard processors.

pub mod handshake;
pub mod objects;
pub mod processor;

pub use processor::{DatagramProcessor, MessageProcessor};

use crate::errors::{DataValidationError, NetResult};
use crate::schema::Value;

/// Protocol version exchanged during HELLO; a mismatch disconnects.
pub const PROTO_VERSION: u16 = 1;

/// Repository numbers 1..=127 are reserved for statically configured
/// client repositories; dynamic assignment starts above the range.
pub const CLIENT_REPOSITORY_RANGE: std::ops::RangeInclusive<u32> = 1..=127;

/// Reserved message type codes.
pub mod codes {
    pub const MOTD: u16 = 1;
    pub const HELLO: u16 = 2;
    pub const DISCONNECT: u16 = 3;
    pub const SHUTDOWN: u16 = 4;
    pub const SHARED_PARAMETER: u16 = 5;
    pub const CREATE_OBJECT: u16 = 6;
    pub const GENERATE_OBJECT: u16 = 7;
    pub const SET_OBJECT_FIELD: u16 = 8;
    pub const OBJECT_GENERATE_DONE: u16 = 9;
    pub const REQUEST_DELETE_OBJECT: u16 = 10;
    pub const DESTROY_OBJECT: u16 = 11;
    pub const REQUEST_VISIBLE_OBJECTS: u16 = 12;
}

/// Reason codes carried by DISCONNECT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectReason {
    HelloMultiple = 1,
    HelloInvalidProtoVer = 2,
    HelloHashMismatch = 3,
    MessageBeforeHello = 4,
    BrokenInvariant = 5,
    InvalidObjectType = 6,
}

impl DisconnectReason {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human description of a peer-sent reason code.
    pub fn describe(code: u8) -> &'static str {
        match code {
            1 => "HELLO message sent multiple times!",
            2 => "The server version does not match!",
            3 => "The server hash does not match!",
            4 => "A different message sent before HELLO!",
            5 => "A connection invariant was broken!",
            6 => "An unknown object type was referenced!",
            _ => "Unknown disconnection reason",
        }
    }
}

/// Parameter-tuple types of the object-replication messages.
pub mod net_object_types {
    use crate::schema::net_types::*;
    use crate::schema::TypeExpr;

    pub fn create_object() -> TypeExpr {
        tuple_of([
            uint32(),
            uint16(),
            uint32(),
            uint32(),
            list_of(tuple_of([uint8(), uint8(), list_of(hashable())])),
        ])
    }

    pub fn generate_object() -> TypeExpr {
        tuple_of([uint64(), uint16(), uint32(), uint32()])
    }

    pub fn set_object_field() -> TypeExpr {
        tuple_of([uint64(), uint8(), uint8(), list_of(hashable())])
    }

    pub fn single_oid() -> TypeExpr {
        tuple_of([uint64()])
    }

    pub fn empty() -> TypeExpr {
        tuple_of([])
    }
}

/// Positional parameter extraction for processors. Failures surface as
/// validation errors and are contained at the dispatch boundary.
pub(crate) mod args {
    use super::*;

    fn get<'a>(params: &'a [Value], index: usize) -> Result<&'a Value, DataValidationError> {
        params
            .get(index)
            .ok_or_else(|| DataValidationError::NoValueProvided(format!("parameter {}", index)))
    }

    fn mismatch(expected: &'static str, value: &Value) -> DataValidationError {
        DataValidationError::TypeMismatch {
            expected,
            got: value.type_name(),
            value: value.to_string(),
        }
    }

    pub fn u64(params: &[Value], index: usize) -> NetResult<u64> {
        let value = get(params, index)?;
        Ok(value.as_u64().ok_or_else(|| mismatch("int", value))?)
    }

    pub fn u32(params: &[Value], index: usize) -> NetResult<u32> {
        let value = get(params, index)?;
        Ok(value.as_u32().ok_or_else(|| mismatch("int", value))?)
    }

    pub fn u8(params: &[Value], index: usize) -> NetResult<u8> {
        let value = get(params, index)?;
        Ok(value.as_u8().ok_or_else(|| mismatch("int", value))?)
    }

    pub fn string(params: &[Value], index: usize) -> NetResult<String> {
        let value = get(params, index)?;
        Ok(value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("str", value))?)
    }

    pub fn list(params: &[Value], index: usize) -> NetResult<Vec<Value>> {
        let value = get(params, index)?;
        Ok(value
            .as_list()
            .map(<[Value]>::to_vec)
            .ok_or_else(|| mismatch("list", value))?)
    }

    /// Optional trailing string (present, non-null), such as the disconnect detail.
    pub fn optional_string(params: &[Value], index: usize) -> Option<String> {
        params
            .get(index)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// The `[(role, field, args), ...]` parameter list of CREATE_OBJECT.
    pub fn field_triples(
        params: &[Value],
        index: usize,
    ) -> NetResult<Vec<(u8, u8, Vec<Value>)>> {
        let entries = list(params, index)?;
        let mut output = Vec::with_capacity(entries.len());
        for entry in &entries {
            let triple = entry
                .as_list()
                .ok_or_else(|| mismatch("tuple", entry))?;
            output.push((u8(triple, 0)?, u8(triple, 1)?, list(triple, 2)?));
        }
        Ok(output)
    }
}

//! Wire encoders: packing message sequences into datagram bodies.
//!
//! A datagram is the concatenation of encoded `(type, parameters)` pairs.
//! The encoder is pluggable per transport; both shipped backends are
//! symmetric, so a peer can decode exactly what it encodes.

use crate::errors::EncodeError;
use crate::schema::Value;
use crate::wire::message::NetMessage;

/// Packs and unpacks a sequence of messages to and from a datagram body.
///
/// An encoder must be able to carry the full hashable universe: 64-bit
/// integers, strings, byte strings, lists, and dictionaries with primitive
/// keys.
pub trait ProtocolEncoder {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// True when `unpack(pack(ms)) == ms` holds for every message list in
    /// the encoder's supported value range.
    fn known_symmetric(&self) -> bool {
        false
    }

    fn pack(&self, messages: &[NetMessage]) -> Result<Vec<u8>, EncodeError>;

    fn unpack(&self, datagram: &[u8]) -> Result<Vec<NetMessage>, EncodeError>;
}

/// MessagePack encoder: compact, carries byte strings natively. The
/// datagram is a plain concatenation of msgpack values, one per message.
#[cfg(feature = "messagepack")]
#[derive(Debug, Default)]
pub struct MsgpackEncoder;

#[cfg(feature = "messagepack")]
impl ProtocolEncoder for MsgpackEncoder {
    fn name(&self) -> &'static str {
        "MessagePack"
    }

    fn known_symmetric(&self) -> bool {
        true
    }

    fn pack(&self, messages: &[NetMessage]) -> Result<Vec<u8>, EncodeError> {
        let mut output = Vec::new();
        for message in messages {
            let encoded = rmp_serde::to_vec(&message.wire_value())
                .map_err(|e| EncodeError::Pack(e.to_string()))?;
            output.extend_from_slice(&encoded);
        }
        Ok(output)
    }

    fn unpack(&self, datagram: &[u8]) -> Result<Vec<NetMessage>, EncodeError> {
        // A reader over the slice advances as each value is decoded, which
        // is all the framing a msgpack concatenation needs.
        let mut reader: &[u8] = datagram;
        let mut messages = Vec::new();
        while !reader.is_empty() {
            let (message_type, parameters): (u16, Vec<Value>) =
                rmp_serde::from_read(&mut reader)
                    .map_err(|e| EncodeError::Unpack(e.to_string()))?;
            messages.push(NetMessage::from_wire(message_type, parameters));
        }
        Ok(messages)
    }
}

/// JSON encoder: the datagram is one JSON array of `[type, parameters]`
/// pairs. Symmetric over byte-string-free values (JSON has no binary type),
/// which makes it suitable for interop with peers that cannot speak
/// MessagePack.
#[derive(Debug, Default)]
pub struct JsonEncoder;

impl ProtocolEncoder for JsonEncoder {
    fn name(&self) -> &'static str {
        "JSON"
    }

    fn known_symmetric(&self) -> bool {
        true
    }

    fn pack(&self, messages: &[NetMessage]) -> Result<Vec<u8>, EncodeError> {
        let values: Vec<(u16, &[Value])> = messages.iter().map(|m| m.wire_value()).collect();
        serde_json::to_vec(&values).map_err(|e| EncodeError::Pack(e.to_string()))
    }

    fn unpack(&self, datagram: &[u8]) -> Result<Vec<NetMessage>, EncodeError> {
        let values: Vec<(u16, Vec<Value>)> =
            serde_json::from_slice(datagram).map_err(|e| EncodeError::Unpack(e.to_string()))?;
        Ok(values
            .into_iter()
            .map(|(message_type, parameters)| NetMessage::from_wire(message_type, parameters))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_messages(with_bytes: bool) -> Vec<NetMessage> {
        let mut dict = BTreeMap::new();
        dict.insert(Value::str("key"), Value::list([Value::Uint(1), Value::Int(-2)]));
        let mut params = vec![
            Value::Uint(42),
            Value::str("hello"),
            Value::Dict(dict),
            Value::Null,
        ];
        if with_bytes {
            params.push(Value::bytes(vec![0, 1, 2, 255]));
        }
        vec![
            NetMessage::new(2, params),
            NetMessage::new(64, vec![]),
            NetMessage::new(5, vec![Value::str("rp"), Value::Uint(128)]),
        ]
    }

    #[cfg(feature = "messagepack")]
    #[test]
    fn msgpack_round_trip() {
        let encoder = MsgpackEncoder;
        assert!(encoder.known_symmetric());
        let messages = sample_messages(true);
        let packed = encoder.pack(&messages).unwrap();
        let unpacked = encoder.unpack(&packed).unwrap();
        assert_eq!(unpacked, messages);
    }

    #[cfg(feature = "messagepack")]
    #[test]
    fn msgpack_rejects_truncated_datagrams() {
        let encoder = MsgpackEncoder;
        let packed = encoder.pack(&sample_messages(true)).unwrap();
        assert!(encoder.unpack(&packed[..packed.len() - 1]).is_err());
    }

    #[test]
    fn json_round_trip() {
        let encoder = JsonEncoder;
        assert!(encoder.known_symmetric());
        let messages = sample_messages(false);
        let packed = encoder.pack(&messages).unwrap();
        let unpacked = encoder.unpack(&packed).unwrap();
        assert_eq!(unpacked, messages);
    }

    #[test]
    fn json_rejects_garbage() {
        assert!(JsonEncoder.unpack(b"not json").is_err());
    }
}

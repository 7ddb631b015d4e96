//! The tagged-tuple message and its routing metadata.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

use crate::schema::Value;

/// Message type codes 1..=63 are reserved for the core protocol; everything
/// above is application-defined.
pub const STANDARD_RANGE_END: u16 = 63;

/// Whether a message code belongs to the reserved core range.
pub fn is_standard_code(code: u16) -> bool {
    code <= STANDARD_RANGE_END
}

/// A reference to a connection handle: the remote role it belongs to plus
/// its identity within that role's transport handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleRef {
    pub role: String,
    pub uuid: Uuid,
}

impl HandleRef {
    pub fn new(role: impl Into<String>, uuid: Uuid) -> Self {
        HandleRef {
            role: role.into(),
            uuid,
        }
    }
}

impl fmt::Display for HandleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.role, self.uuid)
    }
}

/// One network message: a type code and a parameter tuple, plus routing
/// metadata that never crosses the wire.
#[derive(Clone)]
pub struct NetMessage {
    pub message_type: u16,
    pub parameters: Vec<Value>,
    /// Populated on receive with the handle the message arrived through.
    pub sender: Option<HandleRef>,
    /// When set, transport routing delivers to exactly this handle and the
    /// handle filter is not consulted.
    pub destination: Option<HandleRef>,
    /// Opaque application-side hint for custom handle filters; never
    /// transmitted.
    pub routing_data: Option<Rc<dyn Any>>,
}

impl NetMessage {
    pub fn new(message_type: u16, parameters: impl Into<Vec<Value>>) -> Self {
        NetMessage {
            message_type,
            parameters: parameters.into(),
            sender: None,
            destination: None,
            routing_data: None,
        }
    }

    /// Builds a message addressed to one specific handle.
    pub fn to(
        message_type: u16,
        parameters: impl Into<Vec<Value>>,
        destination: HandleRef,
    ) -> Self {
        let mut message = NetMessage::new(message_type, parameters);
        message.destination = Some(destination);
        message
    }

    pub fn with_routing_data(mut self, data: Rc<dyn Any>) -> Self {
        self.routing_data = Some(data);
        self
    }

    /// The `(type, parameters)` pair as it crosses the wire.
    pub fn wire_value(&self) -> (u16, &[Value]) {
        (self.message_type, &self.parameters)
    }

    /// Rebuilds a message from its wire pair; the sender is stamped later
    /// by the receiving transport handler.
    pub fn from_wire(message_type: u16, parameters: Vec<Value>) -> Self {
        NetMessage::new(message_type, parameters)
    }
}

impl fmt::Debug for NetMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetMessage")
            .field("message_type", &self.message_type)
            .field("parameters", &self.parameters)
            .field("sender", &self.sender)
            .field("destination", &self.destination)
            .field("routing_data", &self.routing_data.as_ref().map(|_| ".."))
            .finish()
    }
}

impl PartialEq for NetMessage {
    /// Wire-level equality: metadata does not participate.
    fn eq(&self, other: &Self) -> bool {
        self.message_type == other.message_type && self.parameters == other.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_range_boundary() {
        assert!(is_standard_code(1));
        assert!(is_standard_code(63));
        assert!(!is_standard_code(64));
    }

    #[test]
    fn wire_equality_ignores_metadata() {
        let a = NetMessage::new(5, vec![Value::Uint(1)]);
        let mut b = NetMessage::new(5, vec![Value::Uint(1)]);
        b.sender = Some(HandleRef::new("server", Uuid::new_v4()));
        assert_eq!(a, b);
    }
}

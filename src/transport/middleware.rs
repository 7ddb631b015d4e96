//! Transport middleware: ordered operators over outgoing and incoming
//! messages and datagrams.

use std::collections::HashMap;

use crate::events::EventBus;
use crate::objects::manager::ObjectTable;
use crate::schema::TypeExpr;
use crate::transport::connection::ConnectionHandle;
use crate::wire::NetMessage;

/// State a middleware operator may consult while filtering.
pub struct MiddlewareContext<'a> {
    pub events: &'a mut EventBus,
    /// Expected parameter-tuple type per message code, collected from the
    /// processor set at launch.
    pub schemas: &'a HashMap<u16, TypeExpr>,
    /// Read view of the live network objects (for zone lookups).
    pub objects: &'a ObjectTable,
}

/// A middleware installs up to two operators per direction: one over
/// decoded messages and one over raw datagram bytes. Returning `None` from
/// a message operator drops that message; returning `None` from a byte
/// operator drops the whole datagram.
///
/// Ordering: a middleware registered earlier runs earlier on send and later
/// on receive.
pub trait Middleware {
    fn on_message_send(
        &mut self,
        message: NetMessage,
        _handle: &ConnectionHandle,
        _ctx: &mut MiddlewareContext<'_>,
    ) -> Option<NetMessage> {
        Some(message)
    }

    fn on_message_recv(
        &mut self,
        message: NetMessage,
        _handle: &ConnectionHandle,
        _ctx: &mut MiddlewareContext<'_>,
    ) -> Option<NetMessage> {
        Some(message)
    }

    fn on_bytes_send(
        &mut self,
        datagram: Vec<u8>,
        _handle: &ConnectionHandle,
        _ctx: &mut MiddlewareContext<'_>,
    ) -> Option<Vec<u8>> {
        Some(datagram)
    }

    fn on_bytes_recv(
        &mut self,
        datagram: Vec<u8>,
        _handle: &ConnectionHandle,
        _ctx: &mut MiddlewareContext<'_>,
    ) -> Option<Vec<u8>> {
        Some(datagram)
    }
}

/// The ordered middleware chain of one transport handler.
#[derive(Default)]
pub struct MiddlewareStack {
    entries: Vec<Box<dyn Middleware>>,
}

impl MiddlewareStack {
    pub fn new(entries: Vec<Box<dyn Middleware>>) -> Self {
        MiddlewareStack { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn message_send(
        &mut self,
        message: NetMessage,
        handle: &ConnectionHandle,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Option<NetMessage> {
        let mut current = message;
        for middleware in self.entries.iter_mut() {
            current = middleware.on_message_send(current, handle, ctx)?;
        }
        Some(current)
    }

    pub fn message_recv(
        &mut self,
        message: NetMessage,
        handle: &ConnectionHandle,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Option<NetMessage> {
        let mut current = message;
        for middleware in self.entries.iter_mut().rev() {
            current = middleware.on_message_recv(current, handle, ctx)?;
        }
        Some(current)
    }

    pub fn bytes_send(
        &mut self,
        datagram: Vec<u8>,
        handle: &ConnectionHandle,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Option<Vec<u8>> {
        let mut current = datagram;
        for middleware in self.entries.iter_mut() {
            current = middleware.on_bytes_send(current, handle, ctx)?;
        }
        Some(current)
    }

    pub fn bytes_recv(
        &mut self,
        datagram: Vec<u8>,
        handle: &ConnectionHandle,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Option<Vec<u8>> {
        let mut current = datagram;
        for middleware in self.entries.iter_mut().rev() {
            current = middleware.on_bytes_recv(current, handle, ctx)?;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Value;

    /// Appends its tag to the first string parameter, recording call order.
    struct Tagger(&'static str);

    impl Middleware for Tagger {
        fn on_message_send(
            &mut self,
            mut message: NetMessage,
            _handle: &ConnectionHandle,
            _ctx: &mut MiddlewareContext<'_>,
        ) -> Option<NetMessage> {
            if let Some(Value::Str(s)) = message.parameters.get_mut(0) {
                s.push_str(self.0);
            }
            Some(message)
        }

        fn on_message_recv(
            &mut self,
            mut message: NetMessage,
            _handle: &ConnectionHandle,
            _ctx: &mut MiddlewareContext<'_>,
        ) -> Option<NetMessage> {
            if let Some(Value::Str(s)) = message.parameters.get_mut(0) {
                s.push_str(self.0);
            }
            Some(message)
        }
    }

    struct DropAll;

    impl Middleware for DropAll {
        fn on_message_send(
            &mut self,
            _message: NetMessage,
            _handle: &ConnectionHandle,
            _ctx: &mut MiddlewareContext<'_>,
        ) -> Option<NetMessage> {
            None
        }
    }

    fn run(stack: &mut MiddlewareStack, send: bool) -> Option<NetMessage> {
        let handle = ConnectionHandle::new("client", 0);
        let mut events = EventBus::new();
        let schemas = HashMap::new();
        let objects = ObjectTable::new();
        let mut ctx = MiddlewareContext {
            events: &mut events,
            schemas: &schemas,
            objects: &objects,
        };
        let message = NetMessage::new(64, vec![Value::str("")]);
        if send {
            stack.message_send(message, &handle, &mut ctx)
        } else {
            stack.message_recv(message, &handle, &mut ctx)
        }
    }

    #[test]
    fn send_ascends_and_recv_descends() {
        let mut stack = MiddlewareStack::new(vec![Box::new(Tagger("a")), Box::new(Tagger("b"))]);
        let sent = run(&mut stack, true).unwrap();
        assert_eq!(sent.parameters[0], Value::str("ab"));
        let received = run(&mut stack, false).unwrap();
        assert_eq!(received.parameters[0], Value::str("ba"));
    }

    #[test]
    fn none_drops_the_message() {
        let mut stack = MiddlewareStack::new(vec![Box::new(DropAll), Box::new(Tagger("x"))]);
        assert!(run(&mut stack, true).is_none());
    }
}

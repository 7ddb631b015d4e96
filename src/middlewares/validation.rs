//! Schema validation middleware.
//!
//! Checks every message's parameter tuple against the expected type
//! collected from the processor set. Inbound violations are dropped with a
//! warning; outbound violations are a local bug, reported as an error and
//! dropped before they reach the wire.

use crate::schema::{check_type, Value};
use crate::transport::{ConnectionHandle, Middleware, MiddlewareContext};
use crate::wire::NetMessage;

#[derive(Debug, Default)]
pub struct MessageValidator;

impl MessageValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn violation(
        message: &NetMessage,
        ctx: &MiddlewareContext<'_>,
    ) -> Option<String> {
        let expected = ctx.schemas.get(&message.message_type)?;
        let parameters = Value::List(message.parameters.clone());
        check_type(&parameters, expected).err().map(|e| e.to_string())
    }
}

impl Middleware for MessageValidator {
    fn on_message_send(
        &mut self,
        message: NetMessage,
        _handle: &ConnectionHandle,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Option<NetMessage> {
        match Self::violation(&message, ctx) {
            None => Some(message),
            Some(problem) => {
                ctx.events.error(format!(
                    "Invalid parameters in outgoing message {}: {}",
                    message.message_type, problem
                ));
                None
            }
        }
    }

    fn on_message_recv(
        &mut self,
        message: NetMessage,
        _handle: &ConnectionHandle,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Option<NetMessage> {
        match Self::violation(&message, ctx) {
            None => Some(message),
            Some(problem) => {
                ctx.events.warning(format!(
                    "Invalid parameters received in message {}: {}! Ignoring.",
                    message.message_type, problem
                ));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, EventKind};
    use crate::objects::ObjectTable;
    use crate::schema::net_types::*;
    use crate::schema::TypeExpr;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use uuid::Uuid;

    fn schemas() -> HashMap<u16, TypeExpr> {
        let mut schemas = HashMap::new();
        schemas.insert(64, tuple_of([uint16()]));
        schemas
    }

    fn check(message: NetMessage, send: bool) -> (Option<NetMessage>, Vec<String>) {
        let mut validator = MessageValidator::new();
        let handle = ConnectionHandle::new("client", 0);
        let mut events = EventBus::new();
        let reports = Rc::new(RefCell::new(Vec::new()));
        for kind in [EventKind::Warning, EventKind::Error] {
            let reports = reports.clone();
            events.listen(Uuid::new_v4(), kind, 0, move |event| {
                if let crate::events::NetEvent::Warning(m)
                | crate::events::NetEvent::Error(m) = event
                {
                    reports.borrow_mut().push(m.clone());
                }
            });
        }
        let schemas = schemas();
        let objects = ObjectTable::new();
        let mut ctx = MiddlewareContext {
            events: &mut events,
            schemas: &schemas,
            objects: &objects,
        };
        let result = if send {
            validator.on_message_send(message, &handle, &mut ctx)
        } else {
            validator.on_message_recv(message, &handle, &mut ctx)
        };
        let reports = reports.borrow().clone();
        (result, reports)
    }

    #[test]
    fn conforming_messages_pass() {
        let (result, reports) = check(NetMessage::new(64, vec![Value::Uint(100)]), false);
        assert!(result.is_some());
        assert!(reports.is_empty());
    }

    #[test]
    fn oversized_argument_is_dropped_with_the_bound_named() {
        let (result, reports) = check(NetMessage::new(64, vec![Value::Uint(100_000)]), false);
        assert!(result.is_none());
        assert!(reports.iter().any(|m| m.contains("Lt(65536)")), "{:?}", reports);
    }

    #[test]
    fn unknown_codes_are_left_alone() {
        let (result, reports) = check(NetMessage::new(99, vec![Value::Null]), false);
        assert!(result.is_some());
        assert!(reports.is_empty());
    }

    #[test]
    fn outbound_violations_error_and_drop() {
        let (result, reports) = check(NetMessage::new(64, vec![Value::str("x")]), true);
        assert!(result.is_none());
        assert_eq!(reports.len(), 1);
    }
}

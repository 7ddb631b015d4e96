//! Handshake and connection-lifecycle processors.
//!
//! Exactly two handshake variants exist, determined by which side sends
//! first: a serving node (one with a configured MOTD) greets new links
//! with MOTD and waits for HELLO; a connecting node waits for MOTD,
//! answers with HELLO and activates its own handle on the way out.

use crate::errors::NetResult;
use crate::events::NetEvent;
use crate::manager::NetworkManager;
use crate::protocol::{args, codes, DisconnectReason, PROTO_VERSION};
use crate::schema::net_types;
use crate::schema::{TypeExpr, Value};
use crate::wire::NetMessage;

use super::MessageProcessor;

/// MOTD: allowed pre-activation only; a connecting node replies HELLO and
/// activates.
pub struct MsgMotd;

impl MessageProcessor for MsgMotd {
    fn requires_hello(&self) -> bool {
        false
    }

    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_types::tuple_of([net_types::s64()]))
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        let Some(sender) = message.sender.clone() else {
            return Ok(());
        };
        if manager
            .handle(&sender)
            .map(|handle| handle.activated)
            .unwrap_or(false)
        {
            manager.events.warning("MOTD sent multiple times!");
            return Ok(());
        }
        if manager.motd().is_some() {
            // Two serving nodes greeted each other; not fatal, but worth
            // surfacing.
            manager
                .events
                .warning(format!("Unexpected MOTD message from {}!", sender));
            return Ok(());
        }

        let motd = args::string(&message.parameters, 0)?;
        manager.events.emit(NetEvent::MotdSet(motd));

        let reply = NetMessage::to(
            codes::HELLO,
            vec![
                Value::Uint(PROTO_VERSION as u64),
                Value::Bytes(manager.network_hash().to_vec()),
            ],
            sender.clone(),
        );
        manager.send_message(reply);
        manager.activate_handle(&sender);
        Ok(())
    }
}

/// HELLO: version and hash check; on success the handle activates and the
/// server assigns a repository number through the `rp` shared parameter.
pub struct MsgHello;

impl MessageProcessor for MsgHello {
    fn requires_hello(&self) -> bool {
        false
    }

    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_types::tuple_of([net_types::uint16(), net_types::bs64()]))
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        let Some(sender) = message.sender.clone() else {
            return Ok(());
        };
        if manager
            .handle(&sender)
            .map(|handle| handle.activated)
            .unwrap_or(false)
        {
            manager.send_disconnect(&sender, DisconnectReason::HelloMultiple, None);
            return Ok(());
        }
        if message.parameters.first() != Some(&Value::Uint(PROTO_VERSION as u64)) {
            manager.send_disconnect(&sender, DisconnectReason::HelloInvalidProtoVer, None);
            return Ok(());
        }
        let peer_hash = message.parameters.get(1).and_then(Value::as_bytes);
        if peer_hash != Some(manager.network_hash()) {
            manager.send_disconnect(&sender, DisconnectReason::HelloHashMismatch, None);
            return Ok(());
        }

        manager.activate_handle(&sender);
        let repository = manager.make_repository();
        manager.set_shared_parameter(&sender, "rp", Value::Uint(repository as u64));
        Ok(())
    }
}

/// DISCONNECT: maps the reason code to a description, reports it and
/// destroys the sending handle.
pub struct MsgDisconnect;

impl MessageProcessor for MsgDisconnect {
    fn requires_hello(&self) -> bool {
        false
    }

    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_types::tuple_of([
            net_types::uint8(),
            net_types::optional(net_types::s64()),
        ]))
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        let Some(sender) = message.sender.clone() else {
            return Ok(());
        };
        let reason = args::u8(&message.parameters, 0)?;
        let mut description = DisconnectReason::describe(reason).to_string();
        if let Some(detail) = args::optional_string(&message.parameters, 1) {
            description = format!("{}: {}", description, detail);
        }
        manager.events.emit(NetEvent::Disconnect(description));
        manager.destroy_handle(&sender);
        Ok(())
    }
}

/// SHUTDOWN: the peer is going away; drop its handle.
pub struct MsgShutdown;

impl MessageProcessor for MsgShutdown {
    fn requires_hello(&self) -> bool {
        false
    }

    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_types::tuple_of([]))
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        if let Some(sender) = message.sender.clone() {
            manager.destroy_handle(&sender);
        }
        Ok(())
    }
}

/// SHARED_PARAMETER: copies a name/value pair into the sender's table.
/// Allowed pre-activation so `rp` can be assigned during the handshake.
pub struct MsgSharedParameter;

impl MessageProcessor for MsgSharedParameter {
    fn requires_hello(&self) -> bool {
        false
    }

    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_types::tuple_of([
            net_types::s16(),
            net_types::hashable(),
        ]))
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        let Some(sender) = message.sender.clone() else {
            return Ok(());
        };
        let name = args::string(&message.parameters, 0)?;
        let value = message
            .parameters
            .get(1)
            .cloned()
            .ok_or(crate::errors::DataValidationError::NoValueProvided(
                "parameter 1".to_string(),
            ))?;
        if let Some(handle) = manager.handle_mut(&sender) {
            handle.shared_parameters.insert(name, value);
        }
        Ok(())
    }
}

//! Per-remote-role transport handler: framing, encoding, middleware and
//! handle bookkeeping for one endpoint group.

use std::collections::HashMap;

use uuid::Uuid;

use crate::transport::connection::ConnectionHandle;
use crate::transport::filter::{BaseHandleFilter, HandleFilter};
use crate::transport::middleware::{MiddlewareContext, MiddlewareStack};
use crate::transport::{LinkId, Transport};
use crate::wire::{NetMessage, ProtocolEncoder};

/// Owns the set of live handles of one remote role and runs the full
/// outbound/inbound pipeline: filter routing → middleware chain → encoding
/// → link delivery, and the reverse on receive.
pub struct TransportHandler {
    pub remote_role: String,
    pub encoder: Box<dyn ProtocolEncoder>,
    pub link: Box<dyn Transport>,
    pub filter: Box<dyn HandleFilter>,
    pub middlewares: MiddlewareStack,
    pub connections: HashMap<Uuid, ConnectionHandle>,
    link_index: HashMap<LinkId, Uuid>,
}

impl TransportHandler {
    pub fn new(
        remote_role: impl Into<String>,
        encoder: Box<dyn ProtocolEncoder>,
        link: Box<dyn Transport>,
        filter: Option<Box<dyn HandleFilter>>,
        middlewares: MiddlewareStack,
    ) -> Self {
        TransportHandler {
            remote_role: remote_role.into(),
            encoder,
            link,
            filter: filter.unwrap_or_else(|| Box::new(BaseHandleFilter)),
            middlewares,
            connections: HashMap::new(),
            link_index: HashMap::new(),
        }
    }

    /// Registers a handle in the connection map.
    pub fn manage(&mut self, handle: ConnectionHandle) -> Uuid {
        let uuid = handle.uuid;
        self.link_index.insert(handle.link, uuid);
        self.connections.insert(uuid, handle);
        uuid
    }

    /// Drops a handle from the maps and tears down its link.
    pub fn remove(&mut self, uuid: Uuid) {
        if let Some(handle) = self.connections.remove(&uuid) {
            self.link_index.remove(&handle.link);
            self.link.close(handle.link);
        }
    }

    pub fn uuid_for_link(&self, link: LinkId) -> Option<Uuid> {
        self.link_index.get(&link).copied()
    }

    pub fn handle(&self, uuid: Uuid) -> Option<&ConnectionHandle> {
        self.connections.get(&uuid)
    }

    pub fn handle_mut(&mut self, uuid: Uuid) -> Option<&mut ConnectionHandle> {
        self.connections.get_mut(&uuid)
    }

    /// Any currently connected handle, for setups that expect exactly one.
    pub fn any_handle(&self) -> Option<&ConnectionHandle> {
        self.connections.values().next()
    }

    /// Inbound entry point: runs the byte-receive chain, decodes, stamps
    /// the sender and runs the message-receive chain. Returns the surviving
    /// messages for dispatch.
    pub fn datagram_received(
        &mut self,
        uuid: Uuid,
        payload: Vec<u8>,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Vec<NetMessage> {
        let Some(handle) = self.connections.get(&uuid) else {
            ctx.events
                .warning(format!("Datagram from unknown handle: {}", uuid));
            return Vec::new();
        };

        let Some(payload) = self.middlewares.bytes_recv(payload, handle, ctx) else {
            return Vec::new();
        };
        if payload.is_empty() {
            return Vec::new();
        }

        let unpacked = match self.encoder.unpack(&payload) {
            Ok(messages) => messages,
            Err(e) => {
                ctx.events
                    .warning(format!("Dropping an undecodable datagram: {}", e));
                return Vec::new();
            }
        };

        let sender = handle.href();
        let mut output = Vec::with_capacity(unpacked.len());
        for mut message in unpacked {
            message.sender = Some(sender.clone());
            if let Some(message) = self.middlewares.message_recv(message, handle, ctx) {
                output.push(message);
            }
        }
        output
    }

    /// Outbound: groups messages by resolved destination (an explicit
    /// destination always wins over the filter), preserving the source
    /// order within each group, then encodes and emits one datagram per
    /// destination.
    pub fn deliver(&mut self, messages: Vec<NetMessage>, ctx: &mut MiddlewareContext<'_>) {
        let mut order: Vec<Uuid> = Vec::new();
        let mut groups: HashMap<Uuid, Vec<NetMessage>> = HashMap::new();

        for message in messages {
            let destinations = match &message.destination {
                Some(destination) => vec![destination.uuid],
                None => self.filter.resolve_destination(&message, &self.connections),
            };
            for destination in destinations {
                let group = groups.entry(destination).or_insert_with(|| {
                    order.push(destination);
                    Vec::new()
                });
                group.push(message.clone());
            }
        }

        for destination in order {
            let group = groups.remove(&destination).unwrap_or_default();
            if !self.connections.contains_key(&destination) {
                ctx.events
                    .warning(format!("Unknown handle: {}!", destination));
                continue;
            }
            self.deliver_to_handle(destination, group, ctx);
        }
    }

    fn deliver_to_handle(
        &mut self,
        uuid: Uuid,
        messages: Vec<NetMessage>,
        ctx: &mut MiddlewareContext<'_>,
    ) {
        let handle = &self.connections[&uuid];
        let link = handle.link;

        let mut converted = Vec::with_capacity(messages.len());
        for message in messages {
            if let Some(message) = self.middlewares.message_send(message, handle, ctx) {
                converted.push(message);
            }
        }
        if converted.is_empty() {
            return;
        }

        let datagram = match self.encoder.pack(&converted) {
            Ok(datagram) => datagram,
            Err(e) => {
                ctx.events
                    .warning(format!("Failed to encode a datagram: {}", e));
                return;
            }
        };
        let Some(datagram) = self.middlewares.bytes_send(datagram, handle, ctx) else {
            return;
        };
        if datagram.is_empty() {
            return;
        }
        self.link.send(link, &datagram);
    }
}

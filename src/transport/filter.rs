//! Transport-level destination resolution.

use std::collections::HashMap;

use uuid::Uuid;

use crate::transport::connection::ConnectionHandle;
use crate::wire::NetMessage;

/// Resolves a message to the set of handle ids it should reach within one
/// transport handler.
///
/// The filter is only consulted for messages without an explicit
/// destination; a set `message.destination` always forces delivery to
/// exactly that handle. Custom filters may inspect `routing_data` for
/// application hints (e.g. "everyone except the original sender").
pub trait HandleFilter {
    fn resolve_destination(
        &self,
        message: &NetMessage,
        connections: &HashMap<Uuid, ConnectionHandle>,
    ) -> Vec<Uuid>;
}

/// The default policy: deliver to every connected handle.
#[derive(Debug, Default)]
pub struct BaseHandleFilter;

impl HandleFilter for BaseHandleFilter {
    fn resolve_destination(
        &self,
        _message: &NetMessage,
        connections: &HashMap<Uuid, ConnectionHandle>,
    ) -> Vec<Uuid> {
        connections.keys().copied().collect()
    }
}

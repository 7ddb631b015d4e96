//! Zone-based visibility routing.
//!
//! Peers advertise the zones they can see through the `vz` shared
//! parameter. The router drops object-replication messages for objects
//! outside a destination's visible zones, and its companion visibility
//! filter restricts `get_visible_objects` the same way. Enable both on the
//! serving node: the middleware on the transport toward the peers, the
//! filter on the manager ([`zone_visibility_filter`]).

use std::collections::HashSet;

use crate::objects::VisibilityFilter;
use crate::protocol::codes;
use crate::schema::Value;
use crate::transport::{ConnectionHandle, Middleware, MiddlewareContext};
use crate::wire::NetMessage;

/// Shared parameter naming the zones a peer can see.
pub const VISIBLE_ZONES_PARAMETER: &str = "vz";

const ROUTED_TYPES: [u16; 4] = [
    codes::SET_OBJECT_FIELD,
    codes::GENERATE_OBJECT,
    codes::OBJECT_GENERATE_DONE,
    codes::DESTROY_OBJECT,
];

fn visible_zones(handle: &ConnectionHandle) -> Option<HashSet<u32>> {
    match handle.shared_parameter(VISIBLE_ZONES_PARAMETER) {
        Some(Value::List(zones)) => Some(zones.iter().filter_map(Value::as_u32).collect()),
        _ => None,
    }
}

/// Send-side middleware dropping replication messages the destination
/// cannot see.
#[derive(Debug, Default)]
pub struct ZoneBasedRouter;

impl ZoneBasedRouter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Middleware for ZoneBasedRouter {
    fn on_message_send(
        &mut self,
        message: NetMessage,
        handle: &ConnectionHandle,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Option<NetMessage> {
        if !ROUTED_TYPES.contains(&message.message_type) {
            return Some(message);
        }

        let oid = message.parameters.first().and_then(Value::as_u64)?;
        let Some(object) = ctx.objects.get(&oid) else {
            // The object may still be generating on this side.
            ctx.events
                .warning(format!("Message sent but the object is missing: {}", oid));
            return None;
        };

        let Some(zones) = visible_zones(handle) else {
            ctx.events.warning(format!(
                "{}: incorrectly set visible zones!",
                handle.uuid
            ));
            return None;
        };
        if zones.contains(&object.zone) {
            Some(message)
        } else {
            None
        }
    }
}

/// The matching visibility hook for `get_visible_objects`: only objects in
/// the peer's visible zones survive.
pub fn zone_visibility_filter() -> VisibilityFilter {
    Box::new(|visible, handle, objects, events| {
        let Some(zones) = visible_zones(handle) else {
            events.warning(format!(
                "{}: incorrectly set visible zones!",
                handle.uuid
            ));
            return Vec::new();
        };
        visible
            .into_iter()
            .filter(|oid| {
                objects
                    .get(oid)
                    .map(|object| zones.contains(&object.zone))
                    .unwrap_or(false)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zones_parse_from_the_shared_parameter() {
        let mut handle = ConnectionHandle::new("client", 0);
        assert!(visible_zones(&handle).is_none());

        handle.shared_parameters.insert(
            VISIBLE_ZONES_PARAMETER.to_string(),
            Value::list([Value::Uint(1), Value::Uint(7)]),
        );
        let zones = visible_zones(&handle).unwrap();
        assert!(zones.contains(&1));
        assert!(zones.contains(&7));
        assert!(!zones.contains(&2));
    }

    #[test]
    fn non_list_parameter_is_rejected() {
        let mut handle = ConnectionHandle::new("client", 0);
        handle
            .shared_parameters
            .insert(VISIBLE_ZONES_PARAMETER.to_string(), Value::Uint(1));
        assert!(visible_zones(&handle).is_none());
    }
}

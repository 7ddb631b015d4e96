//! Object-manager state: the live object store, partial objects awaiting
//! the authority, and oid allocation.
//!
//! The replication operations themselves (generate sequences, deletion
//! arbitration, field calls) live on the network manager, which owns both
//! this state and the transport.

use std::collections::HashMap;

use crate::events::EventBus;
use crate::objects::class::NetworkField;
use crate::objects::object::NetObject;
use crate::transport::ConnectionHandle;

/// Live objects keyed by full object id.
pub type ObjectTable = HashMap<u64, NetObject>;

/// A visibility hook: reduces the visible-object set for one handle.
/// Hooks run in ascending priority order, each seeing the running value.
pub type VisibilityFilter =
    Box<dyn Fn(Vec<u64>, &ConnectionHandle, &ObjectTable, &mut EventBus) -> Vec<u64>>;

/// A field-call guard: reduces the running authorization verdict for one
/// inbound field call. Any guard returning false denies the call.
pub type FieldCallGuard =
    Box<dyn Fn(bool, &NetworkField, Option<&ConnectionHandle>) -> bool>;

/// Replication-engine state owned by the network manager.
#[derive(Default)]
pub struct ObjectManager {
    /// Fully installed object views.
    pub objects: ObjectTable,
    /// Objects created locally but not yet acknowledged by the remote
    /// authority, keyed by the low half of their future oid.
    pub partial_objects: HashMap<u64, NetObject>,
    oid_allocator: u32,
}

impl ObjectManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the per-repository counter half of an object id.
    pub fn make_oid(&mut self) -> u32 {
        self.oid_allocator += 1;
        self.oid_allocator
    }

    pub fn get(&self, oid: u64) -> Option<&NetObject> {
        self.objects.get(&oid)
    }

    pub fn get_mut(&mut self, oid: u64) -> Option<&mut NetObject> {
        self.objects.get_mut(&oid)
    }

    /// Looks an object up in the live store first, then among partials.
    pub fn get_any(&self, oid: u64) -> Option<&NetObject> {
        self.objects.get(&oid).or_else(|| self.partial_objects.get(&oid))
    }

    pub fn get_any_mut(&mut self, oid: u64) -> Option<&mut NetObject> {
        self.objects
            .get_mut(&oid)
            .or_else(|| self.partial_objects.get_mut(&oid))
    }
}

//! Network object instances: per-object replicated state and the behavior
//! trait applications implement.

use std::any::Any;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::manager::NetworkManager;
use crate::objects::class::ObjectClass;
use crate::schema::Value;
use crate::wire::HandleRef;

/// Lifecycle of one object view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Not initialized yet, or destroyed.
    Invalid,
    /// The creation request was sent from this node and awaits the
    /// authority's generate.
    CreateRequested,
    /// Fields are being replayed during generation.
    Generating,
    /// `net_create` ran; the object is live.
    Generated,
}

/// Blanket downcast support for behavior objects.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a field callback or lifecycle hook may reach while running: the
/// manager (to send follow-up messages) plus the identity of the object and
/// the handle that triggered the call.
pub struct ObjectContext<'a> {
    pub manager: &'a mut NetworkManager,
    pub oid: u64,
    pub sender: Option<HandleRef>,
}

impl ObjectContext<'_> {
    /// Sends a field update on the object this context belongs to.
    pub fn send_field(&mut self, name: &str, args: Vec<Value>) {
        if let Err(e) = self.manager.send_object_message(self.oid, name, args) {
            self.manager
                .events
                .warning(format!("Field send from a callback failed: {}", e));
        }
    }

    /// Sends a field update to one specific handle only.
    pub fn send_field_to(&mut self, name: &str, args: Vec<Value>, receiver: HandleRef) {
        if let Err(e) =
            self.manager
                .send_object_message_to(self.oid, name, args, Some(receiver))
        {
            self.manager
                .events
                .warning(format!("Field send from a callback failed: {}", e));
        }
    }
}

/// Application-side state of one object view.
///
/// `net_create` runs once the generate sequence completes; `net_delete`
/// runs when the object is destroyed. Field callbacks mutate the behavior
/// through [`AsAny`] downcasts.
pub trait ObjectBehavior: AsAny + 'static {
    fn net_create(&mut self, ctx: &mut ObjectContext<'_>);
    fn net_delete(&mut self, ctx: &mut ObjectContext<'_>);
}

/// One replicated object view held by the object manager.
pub struct NetObject {
    pub oid: u64,
    pub otype: u16,
    /// Repository number of the owning node. Zero is never valid here; the
    /// authority resolves the "owned by creator" shorthand before install.
    pub owner: u32,
    pub zone: u32,
    pub state: ObjectState,
    pub class: Rc<ObjectClass>,
    /// Cached argument tuples per (role, field index), replayed on
    /// visibility queries. Only fields flagged PERSIST_IN_RAM land here.
    pub loaded_params: BTreeMap<(u8, u8), Vec<Value>>,
    pub(crate) behavior: Option<Box<dyn ObjectBehavior>>,
}

impl NetObject {
    pub fn new(class: Rc<ObjectClass>, behavior: Box<dyn ObjectBehavior>) -> Self {
        NetObject {
            oid: 0,
            otype: class.otype,
            owner: 0,
            zone: 0,
            state: ObjectState::Invalid,
            class,
            loaded_params: BTreeMap::new(),
            behavior: Some(behavior),
        }
    }

    /// The repository that authored this object.
    pub fn author_repository(&self) -> u32 {
        (self.oid >> 32) as u32
    }

    /// The cached parameters as replayed in a generate sequence.
    pub fn get_loaded_params(&self) -> Vec<(u8, u8, Vec<Value>)> {
        self.loaded_params
            .iter()
            .map(|((role, field), args)| (*role, *field, args.clone()))
            .collect()
    }

    /// Typed view of the behavior state.
    pub fn behavior<T: 'static>(&self) -> Option<&T> {
        self.behavior
            .as_deref()
            .and_then(|b| b.as_any().downcast_ref())
    }

    pub fn behavior_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.behavior
            .as_deref_mut()
            .and_then(|b| b.as_any_mut().downcast_mut())
    }
}

impl std::fmt::Debug for NetObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetObject")
            .field("oid", &self.oid)
            .field("otype", &self.otype)
            .field("owner", &self.owner)
            .field("zone", &self.zone)
            .field("state", &self.state)
            .field("class", &self.class.network_name)
            .finish()
    }
}

/// An object that exists locally but has not been generated yet. Field
/// sends are cached and replayed with the creation request.
pub struct StagedObject {
    pub(crate) class: Rc<ObjectClass>,
    pub(crate) behavior: Box<dyn ObjectBehavior>,
    pub(crate) loaded_params: BTreeMap<(u8, u8), Vec<Value>>,
}

impl StagedObject {
    /// Caches a field value for the generate sequence. Fields without
    /// PERSIST_IN_RAM are dropped here; they only travel as live updates.
    pub fn queue_field(
        &mut self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<(), crate::errors::NetError> {
        let (role, field) = self.class.resolve_field(name)?;
        if self.class.field_persists(role, field) {
            self.loaded_params.insert((role, field), args);
        }
        Ok(())
    }

    pub(crate) fn into_net_object(self) -> NetObject {
        let mut object = NetObject::new(self.class, self.behavior);
        object.loaded_params = self.loaded_params;
        object
    }
}

//! Notification event bus.
//!
//! Every major subsystem reports through one bus owned by the network
//! manager: diagnostics (DEBUG through EXCEPTION), handle lifecycle,
//! handshake milestones and object-call failures. Listeners register under
//! an owner id with a priority; dispatch is ascending priority, and an
//! owner can be mass-unregistered, which is how teardown detaches whole
//! components at once.

use std::collections::{BTreeMap, HashMap, HashSet};

use uuid::Uuid;

use crate::wire::HandleRef;

/// Discriminant used for listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Debug,
    Info,
    Warning,
    Error,
    Exception,
    HandleActivated,
    HandleDestroyed,
    MotdSet,
    Disconnect,
    BadObjectCall,
    BeforeLaunch,
    BeforeShutdown,
    DatagramReceived,
}

/// Why an inbound object-field call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallFailure {
    NoField,
    NoAuth,
    BadArgs,
}

impl CallFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallFailure::NoField => "no-field",
            CallFailure::NoAuth => "no-auth",
            CallFailure::BadArgs => "bad-args",
        }
    }
}

/// Details of a rejected object-field call.
#[derive(Debug, Clone)]
pub struct BadObjectCall {
    pub oid: u64,
    pub handle: Option<HandleRef>,
    pub field_id: u8,
    pub reason: CallFailure,
    pub detail: Option<String>,
}

/// An event together with its payload.
#[derive(Debug, Clone)]
pub enum NetEvent {
    Debug(String),
    Info(String),
    Warning(String),
    Error(String),
    Exception { context: String, detail: String },
    HandleActivated(HandleRef),
    HandleDestroyed(HandleRef),
    MotdSet(String),
    Disconnect(String),
    BadObjectCall(BadObjectCall),
    BeforeLaunch,
    BeforeShutdown,
    DatagramReceived { role: String, count: usize },
}

impl NetEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            NetEvent::Debug(_) => EventKind::Debug,
            NetEvent::Info(_) => EventKind::Info,
            NetEvent::Warning(_) => EventKind::Warning,
            NetEvent::Error(_) => EventKind::Error,
            NetEvent::Exception { .. } => EventKind::Exception,
            NetEvent::HandleActivated(_) => EventKind::HandleActivated,
            NetEvent::HandleDestroyed(_) => EventKind::HandleDestroyed,
            NetEvent::MotdSet(_) => EventKind::MotdSet,
            NetEvent::Disconnect(_) => EventKind::Disconnect,
            NetEvent::BadObjectCall(_) => EventKind::BadObjectCall,
            NetEvent::BeforeLaunch => EventKind::BeforeLaunch,
            NetEvent::BeforeShutdown => EventKind::BeforeShutdown,
            NetEvent::DatagramReceived { .. } => EventKind::DatagramReceived,
        }
    }
}

type EventCallback = Box<dyn FnMut(&NetEvent)>;

#[derive(Default)]
struct PriorityListeners {
    by_priority: BTreeMap<i32, Vec<(Uuid, EventCallback)>>,
}

impl PriorityListeners {
    fn add(&mut self, owner: Uuid, priority: i32, callback: EventCallback) {
        self.remove(owner);
        self.by_priority
            .entry(priority)
            .or_default()
            .push((owner, callback));
    }

    fn remove(&mut self, owner: Uuid) {
        for listeners in self.by_priority.values_mut() {
            listeners.retain(|(id, _)| *id != owner);
        }
        self.by_priority.retain(|_, listeners| !listeners.is_empty());
    }
}

/// The listener table. One bus serves a whole manager tree.
#[derive(Default)]
pub struct EventBus {
    events: HashMap<EventKind, PriorityListeners>,
    owners: HashMap<Uuid, HashSet<EventKind>>,
    disabled: HashSet<Uuid>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback under `owner` for one event kind. Re-listening
    /// with the same owner replaces the previous callback.
    pub fn listen(
        &mut self,
        owner: Uuid,
        kind: EventKind,
        priority: i32,
        callback: impl FnMut(&NetEvent) + 'static,
    ) {
        self.events
            .entry(kind)
            .or_default()
            .add(owner, priority, Box::new(callback));
        self.owners.entry(owner).or_default().insert(kind);
    }

    /// Removes every listener registered under `owner`.
    pub fn ignore_all(&mut self, owner: Uuid) {
        if let Some(kinds) = self.owners.remove(&owner) {
            for kind in kinds {
                if let Some(listeners) = self.events.get_mut(&kind) {
                    listeners.remove(owner);
                }
            }
        }
        self.disabled.remove(&owner);
    }

    /// Temporarily mutes an owner's listeners without unregistering them.
    pub fn disable(&mut self, owner: Uuid) {
        self.disabled.insert(owner);
    }

    pub fn enable(&mut self, owner: Uuid) {
        self.disabled.remove(&owner);
    }

    /// Fans the event out to listeners in ascending priority order.
    pub fn emit(&mut self, event: NetEvent) {
        tracing::trace!(kind = ?event.kind(), "event");
        let Some(listeners) = self.events.get_mut(&event.kind()) else {
            return;
        };
        for callbacks in listeners.by_priority.values_mut() {
            for (owner, callback) in callbacks.iter_mut() {
                if self.disabled.contains(owner) {
                    continue;
                }
                callback(&event);
            }
        }
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.emit(NetEvent::Debug(message.into()));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.emit(NetEvent::Info(message.into()));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.emit(NetEvent::Warning(message.into()));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.emit(NetEvent::Error(message.into()));
    }

    pub fn exception(&mut self, context: impl Into<String>, detail: impl Into<String>) {
        self.emit(NetEvent::Exception {
            context: context.into(),
            detail: detail.into(),
        });
    }
}

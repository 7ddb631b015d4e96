//! Shared fixtures: paired loopback managers, event recording and the
//! object classes the scenarios use.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use uuid::Uuid;

use netweave::events::{EventBus, EventKind, NetEvent};
use netweave::objects::{NetworkField, ObjectBehavior, ObjectClass, ObjectContext};
use netweave::prelude::*;
use netweave::schema::net_types;
use netweave::schema::FieldSignature;
use netweave::transport::LoopbackTransport;

/// Captures clones of selected events for later assertions.
#[derive(Clone)]
pub struct EventRecorder {
    log: Rc<RefCell<Vec<NetEvent>>>,
}

impl EventRecorder {
    pub fn attach(events: &mut EventBus, kinds: &[EventKind]) -> Self {
        let log = Rc::new(RefCell::new(Vec::new()));
        for kind in kinds {
            let log = log.clone();
            events.listen(Uuid::new_v4(), *kind, 0, move |event| {
                log.borrow_mut().push(event.clone());
            });
        }
        EventRecorder { log }
    }

    pub fn events(&self) -> Vec<NetEvent> {
        self.log.borrow().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.log.borrow().iter().map(NetEvent::kind).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .map(|event| match event {
                NetEvent::Debug(m)
                | NetEvent::Info(m)
                | NetEvent::Warning(m)
                | NetEvent::Error(m)
                | NetEvent::MotdSet(m)
                | NetEvent::Disconnect(m) => m.clone(),
                NetEvent::Exception { context, detail } => {
                    format!("{}: {}", context, detail)
                }
                NetEvent::BadObjectCall(call) => format!(
                    "{}: {}",
                    call.reason.as_str(),
                    call.detail.clone().unwrap_or_default()
                ),
                other => format!("{:?}", other),
            })
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.texts().iter().any(|text| text.contains(needle))
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }
}

/// Installs the fmt subscriber once per test binary so library `tracing`
/// output surfaces under `--nocapture`. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Drains every node's event queue until the whole network is idle.
pub fn pump(nodes: &mut [&mut NetworkManager]) {
    loop {
        let mut busy = false;
        for node in nodes.iter_mut() {
            busy |= node.poll();
        }
        if !busy {
            break;
        }
    }
}

fn loopback_params(validated: bool) -> TransportParameters {
    let mut params = TransportParameters::new(
        Box::new(MsgpackEncoder),
        Box::new(LoopbackTransport::new()),
    );
    if validated {
        params = params.with_middleware(Box::new(MessageValidator::new()));
    }
    params
}

/// A serving node: sends MOTD first, holds object authority.
pub fn server_manager() -> NetworkManager {
    init_tracing();
    NetworkManager::builder("server")
        .transport("client", loopback_params(true))
        .motd("An example native host")
        .client_repository(64)
        .build()
        .unwrap()
}

/// A serving node with the zone router in front of the validator.
pub fn zoned_server_manager() -> NetworkManager {
    init_tracing();
    let params = loopback_params(true).with_middleware(Box::new(ZoneBasedRouter::new()));
    let mut manager = NetworkManager::builder("server")
        .transport("client", params)
        .motd("An example native host")
        .client_repository(64)
        .build()
        .unwrap();
    manager.add_visibility_filter(0, netweave::middlewares::zone_visibility_filter());
    manager
}

/// A connecting node.
pub fn client_manager() -> NetworkManager {
    init_tracing();
    NetworkManager::builder("client")
        .transport("server", loopback_params(false))
        .build()
        .unwrap()
}

/// Opens the server on a fresh in-process port.
pub fn open(server: &mut NetworkManager) -> LoopbackPort {
    let port = LoopbackPort::new();
    server
        .open_server(vec![("client".to_string(), Endpoint::Local(port.clone()))])
        .unwrap();
    port
}

/// Connects a client through the port (without pumping).
pub fn connect(client: &mut NetworkManager, port: &LoopbackPort) {
    client
        .open_connection(vec![("server".to_string(), Endpoint::Local(port.clone()))])
        .unwrap();
}

/// Connects and completes the handshake.
pub fn join(server: &mut NetworkManager, client: &mut NetworkManager, port: &LoopbackPort) {
    connect(client, port);
    pump(&mut [server, client]);
}

// ---- test object classes --------------------------------------------

/// Behavior tracking lifecycle transitions through its value, with an
/// external log shared across views.
pub struct LifecycleObj {
    pub value: u64,
    log: Rc<RefCell<Vec<String>>>,
}

impl ObjectBehavior for LifecycleObj {
    fn net_create(&mut self, ctx: &mut ObjectContext<'_>) {
        self.value = 1;
        self.log.borrow_mut().push(format!("create:{}", ctx.oid));
    }

    fn net_delete(&mut self, ctx: &mut ObjectContext<'_>) {
        self.value = 2;
        self.log.borrow_mut().push(format!("delete:{}", ctx.oid));
    }
}

/// A fieldless class whose lifecycle hooks mutate `value` (1 on create, 2
/// on delete) and append to the shared log.
pub fn lifecycle_class(role: u8, log: Rc<RefCell<Vec<String>>>) -> Rc<ObjectClass> {
    ObjectClass::builder("test_obj", role)
        .constructor(move || {
            Box::new(LifecycleObj {
                value: 0,
                log: log.clone(),
            })
        })
        .build()
        .unwrap()
}

/// Behavior with one replicated value.
#[derive(Default)]
pub struct ValueObj {
    pub value: u64,
}

impl ObjectBehavior for ValueObj {
    fn net_create(&mut self, _ctx: &mut ObjectContext<'_>) {}
    fn net_delete(&mut self, _ctx: &mut ObjectContext<'_>) {}
}

fn set_value_field() -> NetworkField {
    NetworkField::new(
        FieldSignature::new("set_value").param_default(
            "value",
            net_types::uint16(),
            Value::Uint(256),
        ),
    )
    .callback(|behavior, _ctx, args| {
        if let (Some(this), Some(value)) = (
            behavior.as_any_mut().downcast_mut::<ValueObj>(),
            args.first().and_then(Value::as_u64),
        ) {
            this.value = value;
        }
    })
}

/// `set_value(value: u16 = 256)` storing into a [`ValueObj`].
pub fn value_class(role: u8) -> Rc<ObjectClass> {
    ObjectClass::builder("test_obj", role)
        .field(set_value_field())
        .constructor(|| Box::<ValueObj>::default())
        .build()
        .unwrap()
}

/// Like [`value_class`], plus `set_my_value` answering the caller only.
pub fn relay_class(role: u8) -> Rc<ObjectClass> {
    ObjectClass::builder("test_obj", role)
        .field(set_value_field())
        .field(
            NetworkField::new(FieldSignature::new("set_my_value").param_default(
                "value",
                net_types::uint16(),
                Value::Uint(256),
            ))
            .callback(|_behavior, ctx, args| {
                let Some(sender) = ctx.sender.clone() else {
                    return;
                };
                ctx.send_field_to("set_value", args.to_vec(), sender);
            }),
        )
        .constructor(|| Box::<ValueObj>::default())
        .build()
        .unwrap()
}

/// Behavior with two values fed by a transient and a persisted field.
#[derive(Default)]
pub struct PairObj {
    pub a: i64,
    pub b: i64,
}

impl ObjectBehavior for PairObj {
    fn net_create(&mut self, _ctx: &mut ObjectContext<'_>) {}
    fn net_delete(&mut self, _ctx: &mut ObjectContext<'_>) {}
}

/// `set_a` is transient (not replayed on visibility queries), `set_b`
/// persists.
pub fn pair_class(role: u8) -> Rc<ObjectClass> {
    ObjectClass::builder("test_obj", role)
        .field(
            NetworkField::new(FieldSignature::new("set_a").param("item", net_types::int16()))
                .transient()
                .callback(|behavior, _ctx, args| {
                    if let (Some(this), Some(item)) = (
                        behavior.as_any_mut().downcast_mut::<PairObj>(),
                        args.first().and_then(Value::as_i64),
                    ) {
                        this.a = item;
                    }
                }),
        )
        .field(
            NetworkField::new(FieldSignature::new("set_b").param("item", net_types::int16()))
                .callback(|behavior, _ctx, args| {
                    if let (Some(this), Some(item)) = (
                        behavior.as_any_mut().downcast_mut::<PairObj>(),
                        args.first().and_then(Value::as_i64),
                    ) {
                        this.b = item;
                    }
                }),
        )
        .constructor(|| Box::<PairObj>::default())
        .build()
        .unwrap()
}

/// A fieldless observing view (e.g. the serving role of an asymmetric
/// class).
pub fn observer_class(role: u8) -> Rc<ObjectClass> {
    ObjectClass::builder("test_obj", role)
        .constructor(|| Box::<ValueObj>::default())
        .build()
        .unwrap()
}

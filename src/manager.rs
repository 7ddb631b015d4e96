//! The network manager: root of one node.
//!
//! Owns the transport manager, the event bus, the processor table, the
//! object registry and the object store, and drives everything from link
//! events polled off one channel. The whole manager is single-threaded:
//! transports running background tasks report back exclusively through the
//! channel, and every piece of state is only ever touched on the thread
//! that polls it.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::errors::{ConfigError, NetError, NetResult};
use crate::events::{BadObjectCall, CallFailure, EventBus, NetEvent};
use crate::objects::{
    FieldCallGuard, NetObject, ObjectContext, ObjectManager, ObjectRegistry, ObjectState,
    StagedObject, VisibilityFilter,
};
use crate::protocol::{
    codes, DatagramProcessor, DisconnectReason, MessageProcessor, CLIENT_REPOSITORY_RANGE,
};
use crate::schema::{check_type, net_types, TypeExpr, Value};
use crate::transport::{
    ConnectionHandle, Endpoint, EverywhereResolver, LinkEvent, LinkEventSender, LinkId,
    MiddlewareContext, MiddlewareStack, RoleResolver, TransportHandler, TransportManager,
    TransportParameters,
};
use crate::wire::{HandleRef, NetMessage};

/// Dynamic repository assignment starts right above the static client
/// range.
const FIRST_DYNAMIC_REPOSITORY: u32 = 128;

/// Node-level configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// When set, this node greets new links with MOTD (it is the "server"
    /// side of the handshake).
    pub motd: Option<String>,
    /// Opaque bytes compared byte-wise during HELLO.
    pub network_hash: Vec<u8>,
    /// A repository number in 1..=127 grants this node authority to author
    /// objects directly.
    pub client_repository: Option<u32>,
    /// Shut the whole manager down when any handle is destroyed.
    pub shutdown_on_disconnect: bool,
    /// Emit a DEBUG event per received message.
    pub debug_mode: bool,
    pub signature_filenames: Vec<PathBuf>,
    /// When set, dump local signatures to this file at launch instead of
    /// loading.
    pub marshalling_mode: Option<PathBuf>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            motd: None,
            network_hash: vec![0x12, 0x34, 0x56, 0x78],
            client_repository: None,
            shutdown_on_disconnect: false,
            debug_mode: false,
            signature_filenames: Vec::new(),
            marshalling_mode: None,
        }
    }
}

/// Root node of one participant in the network.
pub struct NetworkManager {
    pub config: NetworkConfig,
    pub events: EventBus,
    transport: TransportManager,
    processors: DatagramProcessor,
    schemas: HashMap<u16, TypeExpr>,
    registry: ObjectRegistry,
    objects: ObjectManager,
    visibility_filters: Vec<(i32, VisibilityFilter)>,
    field_call_guards: Vec<(i32, FieldCallGuard)>,
    repository_allocator: u32,
    current_message: Option<NetMessage>,
    link_events: mpsc::UnboundedReceiver<(String, LinkEvent)>,
    launched: bool,
    shutting_down: bool,
}

impl NetworkManager {
    pub fn builder(role: impl Into<String>) -> NetworkManagerBuilder {
        NetworkManagerBuilder::new(role)
    }

    /// The local role of this node.
    pub fn role(&self) -> &str {
        &self.transport.role
    }

    pub fn motd(&self) -> Option<&str> {
        self.config.motd.as_deref()
    }

    pub fn network_hash(&self) -> &[u8] {
        &self.config.network_hash
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.registry
    }

    pub fn objects(&self) -> &ObjectManager {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectManager {
        &mut self.objects
    }

    pub fn object(&self, oid: u64) -> Option<&NetObject> {
        self.objects.get(oid)
    }

    /// The message currently being processed, if any.
    pub fn current_message(&self) -> Option<&NetMessage> {
        self.current_message.as_ref()
    }

    /// The sender of the message currently being processed.
    pub fn current_sender(&self) -> Option<HandleRef> {
        self.current_message
            .as_ref()
            .and_then(|message| message.sender.clone())
    }

    /// Registers a visibility hook, run in ascending priority order.
    pub fn add_visibility_filter(&mut self, priority: i32, filter: VisibilityFilter) {
        let position = self
            .visibility_filters
            .partition_point(|(p, _)| *p <= priority);
        self.visibility_filters.insert(position, (priority, filter));
    }

    /// Registers a field-call guard, run in ascending priority order.
    pub fn add_field_call_guard(&mut self, priority: i32, guard: FieldCallGuard) {
        let position = self
            .field_call_guards
            .partition_point(|(p, _)| *p <= priority);
        self.field_call_guards.insert(position, (priority, guard));
    }

    // ---- sending ----------------------------------------------------

    /// Splits the manager into the transport and the context its pipeline
    /// needs. The two borrow disjoint fields, which is what makes sending
    /// from deep inside processors possible.
    fn with_transport<R>(
        &mut self,
        f: impl FnOnce(&mut TransportManager, &mut MiddlewareContext<'_>) -> R,
    ) -> R {
        let mut ctx = MiddlewareContext {
            events: &mut self.events,
            schemas: &self.schemas,
            objects: &self.objects.objects,
        };
        f(&mut self.transport, &mut ctx)
    }

    /// Sends one message: queued while a datagram is being processed,
    /// immediate otherwise.
    pub fn send_message(&mut self, message: NetMessage) {
        self.with_transport(|transport, ctx| transport.send(message, ctx));
    }

    // ---- handle lifecycle -------------------------------------------

    pub fn handle(&self, href: &HandleRef) -> Option<&ConnectionHandle> {
        self.transport.handler(&href.role)?.handle(href.uuid)
    }

    pub fn handle_mut(&mut self, href: &HandleRef) -> Option<&mut ConnectionHandle> {
        self.transport.handler_mut(&href.role)?.handle_mut(href.uuid)
    }

    /// A handle of the given remote role, for setups that expect one.
    pub fn get_handle(&self, role: &str) -> Option<HandleRef> {
        self.transport.get_handle(role)
    }

    /// Idempotent; the first call fires HANDLE_ACTIVATED.
    pub fn activate_handle(&mut self, href: &HandleRef) {
        let Some(handle) = self.handle_mut(href) else {
            return;
        };
        if handle.activated {
            return;
        }
        handle.activated = true;
        self.events.emit(NetEvent::HandleActivated(href.clone()));
    }

    /// Idempotent; the first call fires HANDLE_DESTROYED, flushes pending
    /// sends and tears the link down.
    pub fn destroy_handle(&mut self, href: &HandleRef) {
        let Some(handle) = self.handle_mut(href) else {
            return;
        };
        if handle.destroyed {
            return;
        }
        handle.destroyed = true;
        self.events.emit(NetEvent::HandleDestroyed(href.clone()));
        // Farewell messages (DISCONNECT among them) must leave before the
        // link goes away.
        self.with_transport(|transport, ctx| transport.empty_queue(ctx));
        if let Some(handler) = self.transport.handler_mut(&href.role) {
            handler.remove(href.uuid);
        }
        if self.config.shutdown_on_disconnect && !self.shutting_down {
            self.shutdown();
        }
    }

    /// Sends a DISCONNECT targeted at this handle (bypassing filters),
    /// then destroys it.
    pub fn send_disconnect(
        &mut self,
        href: &HandleRef,
        reason: DisconnectReason,
        detail: Option<String>,
    ) {
        let detail_value = detail.map(Value::Str).unwrap_or(Value::Null);
        let message = NetMessage::to(
            codes::DISCONNECT,
            vec![Value::Uint(reason.code() as u64), detail_value],
            href.clone(),
        );
        self.send_message(message);
        self.destroy_handle(href);
    }

    /// Updates the local shared-parameter table and replicates the value
    /// to the peer.
    pub fn set_shared_parameter(&mut self, href: &HandleRef, name: &str, value: Value) {
        if let Some(handle) = self.handle_mut(href) {
            handle
                .shared_parameters
                .insert(name.to_string(), value.clone());
        }
        let message = NetMessage::to(
            codes::SHARED_PARAMETER,
            vec![Value::str(name), value],
            href.clone(),
        );
        self.send_message(message);
    }

    pub fn shared_parameter(&self, href: &HandleRef, name: &str) -> Option<Value> {
        self.handle(href)?.shared_parameter(name).cloned()
    }

    /// Reads and type-checks a shared parameter. On a missing or ill-typed
    /// value, either disconnects the peer (broken invariant) or warns,
    /// depending on `disconnect`.
    pub fn checked_shared_parameter(
        &mut self,
        href: &HandleRef,
        name: &str,
        expr: &TypeExpr,
        disconnect: bool,
    ) -> Option<Value> {
        let value = self.shared_parameter(href, name);
        let valid = value
            .as_ref()
            .map(|v| check_type(v, expr).is_ok())
            .unwrap_or(false);
        if valid {
            return value;
        }
        if disconnect {
            self.send_disconnect(
                href,
                DisconnectReason::BrokenInvariant,
                Some(name.to_string()),
            );
        } else {
            self.events
                .warning(format!("{}: incorrectly set {}!", href.uuid, name));
        }
        None
    }

    /// The sender's repository number, disconnecting on a broken `rp`.
    pub fn require_repository(&mut self, href: &HandleRef) -> Option<u32> {
        self.checked_shared_parameter(href, "rp", &net_types::uint32(), true)?
            .as_u32()
    }

    /// Allocates the next dynamic repository number (128 upward; 1..=127
    /// are reserved for static client repositories).
    pub fn make_repository(&mut self) -> u32 {
        self.repository_allocator += 1;
        self.repository_allocator
    }

    // ---- launch and shutdown ----------------------------------------

    fn before_launch(&mut self) -> NetResult<()> {
        self.events.emit(NetEvent::BeforeLaunch);
        if self.launched {
            return Ok(());
        }
        self.launched = true;
        self.schemas = self.processors.schemas();
        if let Some(path) = self.config.marshalling_mode.clone() {
            self.registry.marshal_to_file(&path)?;
        } else if !self.config.signature_filenames.is_empty() {
            let filenames = self.config.signature_filenames.clone();
            self.registry.load_from_files(&filenames)?;
        }
        Ok(())
    }

    /// Starts one or more servers, keyed by the remote role each endpoint
    /// serves.
    pub fn open_server(&mut self, bindings: Vec<(String, Endpoint)>) -> NetResult<()> {
        if bindings.is_empty() {
            return Err(ConfigError::ConnectionParametersMissing("open_server").into());
        }
        self.before_launch()?;
        self.events.info("Opening network servers!");
        self.transport.open_servers(bindings)
    }

    /// Connects to one or more servers, keyed by remote role.
    pub fn open_connection(&mut self, bindings: Vec<(String, Endpoint)>) -> NetResult<()> {
        if bindings.is_empty() {
            return Err(ConfigError::ConnectionParametersMissing("open_connection").into());
        }
        self.before_launch()?;
        self.events.info("Connecting to a server!");
        self.transport.make_connections(bindings)
    }

    /// Announces the shutdown to every peer, then destroys every handle.
    pub fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        self.events.info("Shutting down!");
        self.events.emit(NetEvent::BeforeShutdown);
        self.send_message(NetMessage::new(codes::SHUTDOWN, vec![]));
        for href in self.transport.all_handles() {
            self.destroy_handle(&href);
        }
        for handler in self.transport.handlers_mut() {
            handler.link.shutdown();
        }
    }

    // ---- event-loop driving -----------------------------------------

    /// Drains pending link events. Returns true when anything was
    /// processed; test pumps loop until every node reports idle.
    pub fn poll(&mut self) -> bool {
        let mut processed = false;
        loop {
            let Ok((role, event)) = self.link_events.try_recv() else {
                break;
            };
            processed = true;
            self.handle_link_event(role, event);
        }
        processed
    }

    /// Drives the manager from its link-event channel until every
    /// transport sender is gone. This is the async entry point for socket
    /// transports.
    pub async fn run(&mut self) {
        loop {
            let next = self.link_events.recv().await;
            match next {
                Some((role, event)) => self.handle_link_event(role, event),
                None => break,
            }
        }
    }

    fn handle_link_event(&mut self, role: String, event: LinkEvent) {
        match event {
            LinkEvent::Opened { link, inbound } => self.link_opened(role, link, inbound),
            LinkEvent::Datagram { link, payload } => self.link_datagram(role, link, payload),
            LinkEvent::Closed { link } => self.link_closed(role, link),
        }
    }

    fn link_opened(&mut self, role: String, link: LinkId, inbound: bool) {
        let Some(handler) = self.transport.handler_mut(&role) else {
            return;
        };
        let handle = ConnectionHandle::new(role.clone(), link);
        let href = handle.href();
        handler.manage(handle);
        self.events.info("Connection opened!");
        // The serving side speaks first, when it has something to say.
        if inbound && self.config.motd.is_some() {
            self.send_motd(&href);
        }
    }

    fn link_datagram(&mut self, role: String, link: LinkId, payload: Vec<u8>) {
        let messages = self.with_transport(|transport, ctx| {
            let handler = transport.handler_mut(&role)?;
            let uuid = handler.uuid_for_link(link)?;
            Some(handler.datagram_received(uuid, payload, ctx))
        });
        let Some(messages) = messages else {
            self.events
                .warning(format!("Datagram on an unknown link: {}/{}", role, link));
            return;
        };
        if messages.is_empty() {
            return;
        }
        self.events.emit(NetEvent::DatagramReceived {
            role,
            count: messages.len(),
        });
        self.process_datagram(messages);
    }

    fn link_closed(&mut self, role: String, link: LinkId) {
        let uuid = self
            .transport
            .handler(&role)
            .and_then(|handler| handler.uuid_for_link(link));
        if let Some(uuid) = uuid {
            self.events.info("Connection closed!");
            self.destroy_handle(&HandleRef::new(role, uuid));
        }
    }

    /// Processes one inbound batch inside a queue scope, so every message
    /// sent while handling it leaves in one datagram per destination.
    pub fn process_datagram(&mut self, messages: Vec<NetMessage>) {
        let activated = self.transport.begin_queue();
        let mut processors = std::mem::take(&mut self.processors);
        for message in messages {
            if self.config.debug_mode {
                self.events.debug(format!("Received message: {:?}", message));
            }
            self.current_message = Some(message.clone());
            processors.process_message(self, &message);
            self.current_message = None;
        }
        self.processors = processors;
        self.with_transport(|transport, ctx| transport.end_queue(activated, ctx));
    }

    /// Greets a new link with the configured MOTD.
    fn send_motd(&mut self, href: &HandleRef) {
        let Some(motd) = self.config.motd.clone() else {
            return;
        };
        let message = NetMessage::to(codes::MOTD, vec![Value::Str(motd)], href.clone());
        self.send_message(message);
    }

    // ---- object authoring -------------------------------------------

    /// Builds a staged (not yet generated) object of a registered class.
    pub fn new_object(&self, class_name: &str) -> NetResult<StagedObject> {
        let class = self
            .registry
            .class_by_name(class_name)
            .ok_or_else(|| ConfigError::UnknownObjectClass(class_name.to_string()))?;
        let behavior = class
            .construct()
            .ok_or_else(|| ConfigError::ForeignObjectUsed(class_name.to_string()))?;
        Ok(StagedObject {
            class,
            behavior,
            loaded_params: BTreeMap::new(),
        })
    }

    /// Requests generation of a staged object. With local authority the
    /// object is installed and broadcast immediately; without it, a
    /// CREATE_OBJECT round trip through the authority begins. Returns the
    /// object id (the low half only until the authority answers).
    pub fn request_generate(
        &mut self,
        staged: StagedObject,
        owner: u32,
        zone: u32,
    ) -> NetResult<u64> {
        if self.config.client_repository.is_some() {
            self.create_object(staged, owner, zone)
        } else {
            self.create_remote_object(staged, owner, zone)
        }
    }

    /// Authority-side creation: allocate the full oid, install, broadcast
    /// the generate sequence and initialize.
    pub fn create_object(
        &mut self,
        staged: StagedObject,
        owner: u32,
        zone: u32,
    ) -> NetResult<u64> {
        let repository = self.config.client_repository.ok_or_else(|| {
            NetError::from(ConfigError::RepolessClientCreatesObject(
                staged.class.network_name.clone(),
            ))
        })?;
        let oid = ((repository as u64) << 32) | self.objects.make_oid() as u64;

        let mut object = staged.into_net_object();
        object.oid = oid;
        object.owner = if owner == 0 { repository } else { owner };
        object.zone = zone;
        object.state = ObjectState::Generating;
        let loaded = object.get_loaded_params();
        self.objects.objects.insert(oid, object);
        self.send_object_generate(oid, loaded, None);
        self.initialize_object(oid);
        Ok(oid)
    }

    /// Remote creation: park the object as partial and ask the authority
    /// to complete it.
    fn create_remote_object(
        &mut self,
        staged: StagedObject,
        owner: u32,
        zone: u32,
    ) -> NetResult<u64> {
        let oid_low = self.objects.make_oid() as u64;
        let otype = staged.class.otype;

        let mut object = staged.into_net_object();
        object.oid = oid_low;
        object.owner = owner;
        object.zone = zone;
        object.state = ObjectState::CreateRequested;
        let loaded = object.get_loaded_params();
        self.objects.partial_objects.insert(oid_low, object);

        let params = Value::List(
            loaded
                .into_iter()
                .map(|(role, field, args)| {
                    Value::list([
                        Value::Uint(role as u64),
                        Value::Uint(field as u64),
                        Value::List(args),
                    ])
                })
                .collect(),
        );
        let message = NetMessage::new(
            codes::CREATE_OBJECT,
            vec![
                Value::Uint(oid_low),
                Value::Uint(otype as u64),
                Value::Uint(owner as u64),
                Value::Uint(zone as u64),
                params,
            ],
        );
        self.send_message(message);
        Ok(oid_low)
    }

    /// Emits the GENERATE + fields + DONE sequence for one object, either
    /// broadcast or targeted at one handle.
    pub fn send_object_generate(
        &mut self,
        oid: u64,
        params: Vec<(u8, u8, Vec<Value>)>,
        destination: Option<HandleRef>,
    ) {
        let Some((otype, owner, zone)) = self
            .objects
            .get(oid)
            .map(|object| (object.otype, object.owner, object.zone))
        else {
            return;
        };

        let mut messages = vec![NetMessage::new(
            codes::GENERATE_OBJECT,
            vec![
                Value::Uint(oid),
                Value::Uint(otype as u64),
                Value::Uint(owner as u64),
                Value::Uint(zone as u64),
            ],
        )];
        for (role, field, args) in params {
            messages.push(NetMessage::new(
                codes::SET_OBJECT_FIELD,
                vec![
                    Value::Uint(oid),
                    Value::Uint(role as u64),
                    Value::Uint(field as u64),
                    Value::List(args),
                ],
            ));
        }
        messages.push(NetMessage::new(
            codes::OBJECT_GENERATE_DONE,
            vec![Value::Uint(oid)],
        ));

        for mut message in messages {
            message.destination = destination.clone();
            self.send_message(message);
        }
    }

    /// Transitions a generating object to GENERATED, running `net_create`.
    pub fn initialize_object(&mut self, oid: u64) {
        match self.objects.get(oid).map(|object| object.state) {
            None => {
                self.events
                    .warning(format!("Unable to init the object {}!", oid));
                return;
            }
            Some(state) if state != ObjectState::Generating => {
                self.events
                    .warning(format!("The object {} is already initialized!", oid));
                return;
            }
            _ => {}
        }
        let Some(mut behavior) = self
            .objects
            .get_mut(oid)
            .and_then(|object| object.behavior.take())
        else {
            return;
        };
        {
            let mut ctx = ObjectContext {
                manager: self,
                oid,
                sender: None,
            };
            behavior.net_create(&mut ctx);
        }
        if let Some(object) = self.objects.get_mut(oid) {
            object.behavior = Some(behavior);
            object.state = ObjectState::Generated;
        }
    }

    /// Tears one object view down: INVALID, `net_delete`, removal.
    pub fn destroy_network_object(&mut self, oid: u64) {
        let Some(mut object) = self.objects.objects.remove(&oid) else {
            self.events
                .warning(format!("Unable to destroy the object {}!", oid));
            return;
        };
        object.state = ObjectState::Invalid;
        if let Some(mut behavior) = object.behavior.take() {
            let mut ctx = ObjectContext {
                manager: self,
                oid,
                sender: None,
            };
            behavior.net_delete(&mut ctx);
        }
    }

    /// Requests deletion: performed directly under local authority, routed
    /// to the authority otherwise.
    pub fn request_delete(&mut self, oid: u64) {
        if self.config.client_repository.is_some() {
            let Some(owner) = self.objects.get(oid).map(|object| object.owner) else {
                return;
            };
            self.perform_object_deletion(oid, owner);
        } else {
            self.send_message(NetMessage::new(
                codes::REQUEST_DELETE_OBJECT,
                vec![Value::Uint(oid)],
            ));
        }
    }

    /// Authority-side deletion arbitration. A requester that is not the
    /// owner is ignored with a warning; it may just be a race.
    pub fn perform_object_deletion(&mut self, oid: u64, requester_repository: u32) {
        let Some(owner) = self.objects.get(oid).map(|object| object.owner) else {
            return;
        };
        if owner != requester_repository {
            self.events.warning(format!(
                "Ignoring unauthorized delete for object {} (by {})",
                oid, requester_repository
            ));
            return;
        }
        self.send_message(NetMessage::new(
            codes::DESTROY_OBJECT,
            vec![Value::Uint(oid)],
        ));
        self.destroy_network_object(oid);
    }

    /// Sends a field update on an object, broadcast to everyone.
    pub fn send_object_message(
        &mut self,
        oid: u64,
        name: &str,
        arguments: Vec<Value>,
    ) -> NetResult<()> {
        self.send_object_message_to(oid, name, arguments, None)
    }

    /// Sends a field update, optionally targeted at one handle. Before the
    /// object is GENERATED the value is only cached for the generate
    /// sequence.
    pub fn send_object_message_to(
        &mut self,
        oid: u64,
        name: &str,
        arguments: Vec<Value>,
        receiver: Option<HandleRef>,
    ) -> NetResult<()> {
        let (class, state) = match self.objects.get_any(oid) {
            Some(object) => (object.class.clone(), object.state),
            None => return Err(NetError::NoSuchObject(oid)),
        };
        let (role, field) = class.resolve_field(name)?;

        if class.field_persists(role, field) {
            if let Some(object) = self.objects.get_any_mut(oid) {
                object
                    .loaded_params
                    .insert((role, field), arguments.clone());
            }
        }
        if state == ObjectState::Generated {
            let mut message = NetMessage::new(
                codes::SET_OBJECT_FIELD,
                vec![
                    Value::Uint(oid),
                    Value::Uint(role as u64),
                    Value::Uint(field as u64),
                    Value::List(arguments),
                ],
            );
            message.destination = receiver;
            self.send_message(message);
        }
        Ok(())
    }

    /// Invokes a field by index on a live object view. For foreign roles
    /// the value is only cached (when the field persists); for the local
    /// role the call runs the guard chain, validation and the callback.
    pub fn call_object_field(
        &mut self,
        oid: u64,
        role: u8,
        field_id: u8,
        arguments: Vec<Value>,
        sender: Option<HandleRef>,
    ) {
        let Some(class) = self.objects.get(oid).map(|object| object.class.clone()) else {
            self.events
                .warning(format!("Field call on a missing object: {}", oid));
            return;
        };

        if role != class.object_role {
            if class.field_persists(role, field_id) {
                if let Some(object) = self.objects.get_mut(oid) {
                    object.loaded_params.insert((role, field_id), arguments);
                }
            }
            return;
        }

        let Some(field) = class.field(field_id) else {
            self.events.warning(format!(
                "Attempt to call unknown field {} on class {}!",
                field_id, class.otype
            ));
            self.events.emit(NetEvent::BadObjectCall(BadObjectCall {
                oid,
                handle: sender,
                field_id,
                reason: CallFailure::NoField,
                detail: None,
            }));
            return;
        };

        let allowed = {
            let handle = sender.as_ref().and_then(|href| {
                self.transport
                    .handler(&href.role)
                    .and_then(|handler| handler.handle(href.uuid))
            });
            self.field_call_guards
                .iter()
                .fold(true, |value, (_, guard)| guard(value, field, handle))
        };
        if !allowed {
            self.events.warning(format!(
                "Unauthorized attempt to call field {}!",
                field.name()
            ));
            self.events.emit(NetEvent::BadObjectCall(BadObjectCall {
                oid,
                handle: sender,
                field_id,
                reason: CallFailure::NoAuth,
                detail: None,
            }));
            return;
        }

        let validated = match field.signature.validate_arguments(&arguments) {
            Ok(validated) => validated,
            Err(e) => {
                self.events.warning(format!(
                    "Arguments for {} do not match: {}",
                    field.name(),
                    e
                ));
                self.events.emit(NetEvent::BadObjectCall(BadObjectCall {
                    oid,
                    handle: sender,
                    field_id,
                    reason: CallFailure::BadArgs,
                    detail: Some(e.to_string()),
                }));
                return;
            }
        };

        if field.signature.persist_in_ram() {
            if let Some(object) = self.objects.get_mut(oid) {
                object
                    .loaded_params
                    .insert((role, field_id), validated.clone());
            }
        }

        let Some(callback) = field.callback.clone() else {
            return;
        };
        let Some(mut behavior) = self
            .objects
            .get_mut(oid)
            .and_then(|object| object.behavior.take())
        else {
            return;
        };
        {
            let mut ctx = ObjectContext {
                manager: self,
                oid,
                sender,
            };
            callback(behavior.as_mut(), &mut ctx, &validated);
        }
        if let Some(object) = self.objects.get_mut(oid) {
            object.behavior = Some(behavior);
        }
    }

    /// The objects a peer may currently see, after the visibility hooks.
    pub fn get_visible_objects(&mut self, href: &HandleRef) -> Vec<u64> {
        let Some(handle) = self
            .transport
            .handler(&href.role)
            .and_then(|handler| handler.handle(href.uuid))
        else {
            return Vec::new();
        };
        let mut visible: Vec<u64> = self.objects.objects.keys().copied().collect();
        visible.sort_unstable();
        for (_, filter) in &self.visibility_filters {
            visible = filter(visible, handle, &self.objects.objects, &mut self.events);
        }
        visible
    }

    /// Asks the peers for a bootstrap of everything visible to us.
    pub fn request_visible_objects(&mut self) {
        self.send_message(NetMessage::new(codes::REQUEST_VISIBLE_OBJECTS, vec![]));
    }
}

/// Builder for [`NetworkManager`]. Configuration errors surface from
/// `build`, before any endpoint is touched.
pub struct NetworkManagerBuilder {
    role: String,
    transports: Vec<(String, TransportParameters)>,
    resolver: Option<Box<dyn RoleResolver>>,
    config: NetworkConfig,
    extras: Vec<(u16, Box<dyn MessageProcessor>)>,
}

impl NetworkManagerBuilder {
    pub fn new(role: impl Into<String>) -> Self {
        NetworkManagerBuilder {
            role: role.into(),
            transports: Vec::new(),
            resolver: None,
            config: NetworkConfig::default(),
            extras: Vec::new(),
        }
    }

    /// Adds a transport toward one remote role.
    pub fn transport(mut self, remote_role: impl Into<String>, params: TransportParameters) -> Self {
        self.transports.push((remote_role.into(), params));
        self
    }

    pub fn resolver(mut self, resolver: Box<dyn RoleResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn motd(mut self, motd: impl Into<String>) -> Self {
        self.config.motd = Some(motd.into());
        self
    }

    pub fn network_hash(mut self, hash: impl Into<Vec<u8>>) -> Self {
        self.config.network_hash = hash.into();
        self
    }

    pub fn client_repository(mut self, repository: u32) -> Self {
        self.config.client_repository = Some(repository);
        self
    }

    pub fn shutdown_on_disconnect(mut self) -> Self {
        self.config.shutdown_on_disconnect = true;
        self
    }

    pub fn debug_mode(mut self) -> Self {
        self.config.debug_mode = true;
        self
    }

    /// Registers an application processor for a code outside the reserved
    /// range.
    pub fn extra(mut self, code: u16, processor: Box<dyn MessageProcessor>) -> Self {
        self.extras.push((code, processor));
        self
    }

    pub fn object_signature_filenames(mut self, filenames: Vec<PathBuf>) -> Self {
        self.config.signature_filenames = filenames;
        self
    }

    pub fn marshalling_mode(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.marshalling_mode = Some(path.into());
        self
    }

    pub fn build(self) -> NetResult<NetworkManager> {
        if self.transports.is_empty() {
            return Err(ConfigError::ComponentNotProvided("transport").into());
        }
        if let Some(repository) = self.config.client_repository {
            if !CLIENT_REPOSITORY_RANGE.contains(&repository) {
                return Err(ConfigError::InvalidClientRepository(repository).into());
            }
        }

        let processors = DatagramProcessor::standard(self.extras)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut handlers = BTreeMap::new();
        for (remote_role, mut params) in self.transports {
            params
                .link
                .attach(LinkEventSender::new(remote_role.clone(), tx.clone()));
            let handler = TransportHandler::new(
                remote_role.clone(),
                params.encoder,
                params.link,
                params.filter,
                MiddlewareStack::new(params.middlewares),
            );
            handlers.insert(remote_role, handler);
        }

        let transport = TransportManager::new(
            self.role,
            handlers,
            self.resolver.unwrap_or_else(|| Box::new(EverywhereResolver)),
        );

        Ok(NetworkManager {
            config: self.config,
            events: EventBus::new(),
            transport,
            processors,
            schemas: HashMap::new(),
            registry: ObjectRegistry::new(),
            objects: ObjectManager::new(),
            visibility_filters: Vec::new(),
            field_call_guards: Vec::new(),
            repository_allocator: FIRST_DYNAMIC_REPOSITORY - 1,
            current_message: None,
            link_events: rx,
            launched: false,
            shutting_down: false,
        })
    }
}

//! Transport manager: multiplexes per-role handlers and batches outbound
//! messages through a re-entrant queue.

use std::collections::BTreeMap;

use crate::errors::{ConfigError, NetResult};
use crate::transport::handler::TransportHandler;
use crate::transport::middleware::{Middleware, MiddlewareContext, MiddlewareStack};
use crate::transport::{Endpoint, HandleFilter, Transport};
use crate::wire::{HandleRef, NetMessage, ProtocolEncoder};

/// Everything needed to stand up one transport handler toward one remote
/// role.
pub struct TransportParameters {
    pub encoder: Box<dyn ProtocolEncoder>,
    pub link: Box<dyn Transport>,
    pub filter: Option<Box<dyn HandleFilter>>,
    /// Ordered middleware chain; earlier entries run earlier on send and
    /// later on receive.
    pub middlewares: Vec<Box<dyn Middleware>>,
}

impl TransportParameters {
    pub fn new(encoder: Box<dyn ProtocolEncoder>, link: Box<dyn Transport>) -> Self {
        TransportParameters {
            encoder,
            link,
            filter: None,
            middlewares: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: Box<dyn HandleFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_middleware(mut self, middleware: Box<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }
}

/// Resolves a message to the remote roles it should fan out to.
pub trait RoleResolver {
    fn resolve(&self, message: &NetMessage, roles: &[String]) -> Vec<String>;
}

/// The default resolver: every message goes to every known remote role.
/// Destination targeting happens one layer down, inside the handler, so a
/// handler of another role simply finds no matching handle. Choke-point
/// setups spanning many roles should supply a custom resolver instead.
#[derive(Debug, Default)]
pub struct EverywhereResolver;

impl RoleResolver for EverywhereResolver {
    fn resolve(&self, _message: &NetMessage, roles: &[String]) -> Vec<String> {
        roles.to_vec()
    }
}

/// Multiplexes one handler per remote role and owns the delivery queue.
///
/// While a queue scope is active, `send` accumulates; the scope exit
/// flushes everything in one batch. Scopes are re-entrant; only the
/// outermost exit flushes.
pub struct TransportManager {
    /// The local role of this node.
    pub role: String,
    handlers: BTreeMap<String, TransportHandler>,
    resolver: Box<dyn RoleResolver>,
    queue_active: bool,
    delivery_queue: Vec<NetMessage>,
}

impl TransportManager {
    pub fn new(
        role: impl Into<String>,
        handlers: BTreeMap<String, TransportHandler>,
        resolver: Box<dyn RoleResolver>,
    ) -> Self {
        TransportManager {
            role: role.into(),
            handlers,
            resolver,
            queue_active: false,
            delivery_queue: Vec::new(),
        }
    }

    pub fn remote_roles(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn handler(&self, role: &str) -> Option<&TransportHandler> {
        self.handlers.get(role)
    }

    pub fn handler_mut(&mut self, role: &str) -> Option<&mut TransportHandler> {
        self.handlers.get_mut(role)
    }

    pub fn handlers_mut(&mut self) -> impl Iterator<Item = &mut TransportHandler> {
        self.handlers.values_mut()
    }

    pub fn queue_active(&self) -> bool {
        self.queue_active
    }

    /// Queues the message if a queue scope is active, delivers immediately
    /// otherwise.
    pub fn send(&mut self, message: NetMessage, ctx: &mut MiddlewareContext<'_>) {
        if self.queue_active {
            self.delivery_queue.push(message);
        } else {
            self.deliver_now(vec![message], ctx);
        }
    }

    /// Enters a queue scope. Returns true when this call activated the
    /// queue; nested calls return false and their matching `end_queue` is a
    /// no-op, so nested scopes never flush twice.
    pub fn begin_queue(&mut self) -> bool {
        if self.queue_active {
            return false;
        }
        self.queue_active = true;
        true
    }

    /// Leaves a queue scope opened with `begin_queue`.
    pub fn end_queue(&mut self, activated: bool, ctx: &mut MiddlewareContext<'_>) {
        if !activated {
            return;
        }
        self.queue_active = false;
        self.empty_queue(ctx);
    }

    /// Flushes queued messages immediately, even inside an active scope.
    /// Used before a handle is torn down so farewell messages still leave.
    pub fn empty_queue(&mut self, ctx: &mut MiddlewareContext<'_>) {
        if self.delivery_queue.is_empty() {
            return;
        }
        let queued = std::mem::take(&mut self.delivery_queue);
        self.deliver_now(queued, ctx);
    }

    fn deliver_now(&mut self, messages: Vec<NetMessage>, ctx: &mut MiddlewareContext<'_>) {
        let roles = self.remote_roles();
        let mut order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, Vec<NetMessage>> = BTreeMap::new();

        for message in messages {
            for role in self.resolver.resolve(&message, &roles) {
                let group = groups.entry(role.clone()).or_insert_with(|| {
                    order.push(role);
                    Vec::new()
                });
                group.push(message.clone());
            }
        }

        for role in order {
            let group = groups.remove(&role).unwrap_or_default();
            match self.handlers.get_mut(&role) {
                Some(handler) => handler.deliver(group, ctx),
                None => ctx.events.error(format!("Unknown network role: {}!", role)),
            }
        }
    }

    /// Starts listening toward each given remote role. Roles are validated
    /// before any endpoint is opened.
    pub fn open_servers(&mut self, bindings: Vec<(String, Endpoint)>) -> NetResult<()> {
        for (role, _) in &bindings {
            if !self.handlers.contains_key(role) {
                return Err(ConfigError::UnknownRole(role.clone()).into());
            }
        }
        for (role, endpoint) in bindings {
            match self.handlers.get_mut(&role) {
                Some(handler) => handler.link.open_server(endpoint)?,
                None => return Err(ConfigError::UnknownRole(role).into()),
            }
        }
        Ok(())
    }

    /// Connects toward each given remote role.
    pub fn make_connections(&mut self, bindings: Vec<(String, Endpoint)>) -> NetResult<()> {
        for (role, _) in &bindings {
            if !self.handlers.contains_key(role) {
                return Err(ConfigError::UnknownRole(role.clone()).into());
            }
        }
        for (role, endpoint) in bindings {
            match self.handlers.get_mut(&role) {
                Some(handler) => handler.link.connect(endpoint)?,
                None => return Err(ConfigError::UnknownRole(role).into()),
            }
        }
        Ok(())
    }

    /// A handle of the given remote role, for setups that expect one.
    pub fn get_handle(&self, role: &str) -> Option<HandleRef> {
        self.handlers
            .get(role)?
            .any_handle()
            .map(|handle| handle.href())
    }

    /// Every live handle across all handlers.
    pub fn all_handles(&self) -> Vec<HandleRef> {
        self.handlers
            .values()
            .flat_map(|handler| handler.connections.values().map(|h| h.href()))
            .collect()
    }
}

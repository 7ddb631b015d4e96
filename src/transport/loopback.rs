//! In-process transport for local development and tests.
//!
//! Two managers in the same process connect through a [`LoopbackPort`]: the
//! serving side parks its acceptor on the port, the connecting side pairs
//! links through it. Datagrams are never handed over synchronously; each
//! side pushes into the peer's event channel and the peers drain their own
//! queues on their own turns, which mirrors how real socket transports
//! marshal bytes back onto the manager loop.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::{ConfigError, NetResult};
use crate::transport::{Endpoint, LinkEvent, LinkEventSender, LinkId, Transport};

/// The peer-facing end of one loopback link.
#[derive(Debug, Clone)]
struct PeerEnd {
    events: LinkEventSender,
    link: LinkId,
}

#[derive(Debug, Default)]
struct AcceptorState {
    events: Option<LinkEventSender>,
    links: Rc<RefCell<HashMap<LinkId, PeerEnd>>>,
    next_link: Rc<RefCell<LinkId>>,
}

/// In-process rendezvous point shared between a serving and any number of
/// connecting loopback transports.
#[derive(Debug, Clone, Default)]
pub struct LoopbackPort(Rc<RefCell<AcceptorState>>);

impl LoopbackPort {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The in-process link driver.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    events: Option<LinkEventSender>,
    links: Rc<RefCell<HashMap<LinkId, PeerEnd>>>,
    next_link: Rc<RefCell<LinkId>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(next_link: &Rc<RefCell<LinkId>>) -> LinkId {
        let mut next = next_link.borrow_mut();
        *next += 1;
        *next
    }

    fn events(&self) -> NetResult<&LinkEventSender> {
        self.events
            .as_ref()
            .ok_or_else(|| ConfigError::ComponentNotProvided("transport").into())
    }
}

impl Transport for LoopbackTransport {
    fn attach(&mut self, events: LinkEventSender) {
        self.events = Some(events);
    }

    fn open_server(&mut self, endpoint: Endpoint) -> NetResult<()> {
        let Endpoint::Local(port) = endpoint else {
            return Err(ConfigError::ComponentNotProvided("local endpoint").into());
        };
        let mut state = port.0.borrow_mut();
        state.events = Some(self.events()?.clone());
        state.links = self.links.clone();
        state.next_link = self.next_link.clone();
        Ok(())
    }

    fn connect(&mut self, endpoint: Endpoint) -> NetResult<()> {
        let Endpoint::Local(port) = endpoint else {
            return Err(ConfigError::ComponentNotProvided("local endpoint").into());
        };
        let state = port.0.borrow();
        let server_events = state
            .events
            .clone()
            .ok_or(ConfigError::ComponentNotProvided("server"))?;
        let client_events = self.events()?.clone();

        let client_link = Self::alloc(&self.next_link);
        let server_link = Self::alloc(&state.next_link);

        self.links.borrow_mut().insert(
            client_link,
            PeerEnd {
                events: server_events.clone(),
                link: server_link,
            },
        );
        state.links.borrow_mut().insert(
            server_link,
            PeerEnd {
                events: client_events.clone(),
                link: client_link,
            },
        );

        server_events.send(LinkEvent::Opened {
            link: server_link,
            inbound: true,
        });
        client_events.send(LinkEvent::Opened {
            link: client_link,
            inbound: false,
        });
        Ok(())
    }

    fn send(&mut self, link: LinkId, datagram: &[u8]) {
        let peer = self.links.borrow().get(&link).cloned();
        match peer {
            Some(peer) => peer.events.send(LinkEvent::Datagram {
                link: peer.link,
                payload: datagram.to_vec(),
            }),
            None => tracing::warn!(link, "send on an unknown loopback link"),
        }
    }

    fn close(&mut self, link: LinkId) {
        let peer = self.links.borrow_mut().remove(&link);
        if let Some(peer) = peer {
            peer.events.send(LinkEvent::Closed { link: peer.link });
        }
    }
}

//! Transport layer: link drivers, connection handles, routing filters,
//! middleware chains, per-role handlers and the queued transport manager.

pub mod connection;
pub mod filter;
pub mod handler;
pub mod loopback;
pub mod manager;
pub mod middleware;
#[cfg(feature = "tcp")]
pub mod tcp;

pub use connection::ConnectionHandle;
pub use filter::{BaseHandleFilter, HandleFilter};
pub use handler::TransportHandler;
pub use loopback::{LoopbackPort, LoopbackTransport};
pub use manager::{
    EverywhereResolver, RoleResolver, TransportManager, TransportParameters,
};
pub use middleware::{Middleware, MiddlewareContext, MiddlewareStack};
#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;

use crate::errors::NetResult;

/// Opaque per-link identifier allocated by a link driver.
pub type LinkId = u64;

/// Events a link driver reports back to the manager's loop.
#[derive(Debug)]
pub enum LinkEvent {
    /// A link came up. `inbound` links were accepted by a listener; the
    /// accepting side speaks first in the handshake.
    Opened { link: LinkId, inbound: bool },
    /// One complete datagram arrived on a link.
    Datagram { link: LinkId, payload: Vec<u8> },
    /// The link went away (peer closed, read failed).
    Closed { link: LinkId },
}

/// Clonable channel end a link driver uses to marshal events back onto the
/// manager's thread. The remote role tags every event with the handler it
/// belongs to.
#[derive(Debug, Clone)]
pub struct LinkEventSender {
    role: String,
    tx: tokio::sync::mpsc::UnboundedSender<(String, LinkEvent)>,
}

impl LinkEventSender {
    pub fn new(
        role: impl Into<String>,
        tx: tokio::sync::mpsc::UnboundedSender<(String, LinkEvent)>,
    ) -> Self {
        LinkEventSender {
            role: role.into(),
            tx,
        }
    }

    pub fn send(&self, event: LinkEvent) {
        // A closed receiver means the manager is gone; nothing to report to.
        let _ = self.tx.send((self.role.clone(), event));
    }
}

/// Where to listen or whom to connect to; interpreted by the link driver.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// host:port for stream transports.
    Tcp { host: String, port: u16 },
    /// An in-process rendezvous point for the loopback transport.
    Local(LoopbackPort),
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }
}

/// A link driver: the transport-specific half of a transport handler.
///
/// Drivers never touch messages; they move opaque framed datagrams and
/// report connection events through the [`LinkEventSender`] given to
/// [`Transport::attach`]. Drivers backed by background tasks must do all
/// their reporting through that channel; the rest of the handler state is
/// only ever touched on the manager's thread.
pub trait Transport {
    /// Wires the driver to the manager's event channel. Called once while
    /// the manager is constructed, before any open call.
    fn attach(&mut self, events: LinkEventSender);

    /// Begins listening. Accepted links surface as `Opened { inbound: true }`.
    fn open_server(&mut self, endpoint: Endpoint) -> NetResult<()>;

    /// Initiates an outbound connection, surfacing `Opened { inbound: false }`.
    fn connect(&mut self, endpoint: Endpoint) -> NetResult<()>;

    /// Sends one already-encoded datagram over a link.
    fn send(&mut self, link: LinkId, datagram: &[u8]);

    /// Tears down one link. The peer observes `Closed`.
    fn close(&mut self, link: LinkId);

    /// Stops listening and releases driver-wide resources.
    fn shutdown(&mut self) {}
}

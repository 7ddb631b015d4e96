//! Role-level fan-out on a node speaking to several remote roles: the
//! default resolver offers every message to every handler, and an explicit
//! destination is narrowed down one layer below, inside the handler that
//! actually owns the handle.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::*;
use netweave::errors::NetResult;
use netweave::events::EventKind;
use netweave::prelude::*;
use netweave::transport::LoopbackTransport;

/// Counts deliveries; pre-activation senders are fine, this test never
/// completes the client-side handshake.
struct Counting {
    hits: Rc<Cell<usize>>,
}

impl MessageProcessor for Counting {
    fn requires_hello(&self) -> bool {
        false
    }

    fn invoke(
        &mut self,
        _manager: &mut NetworkManager,
        _message: &NetMessage,
    ) -> NetResult<()> {
        self.hits.set(self.hits.get() + 1);
        Ok(())
    }
}

fn plain_params() -> TransportParameters {
    TransportParameters::new(
        Box::new(MsgpackEncoder),
        Box::new(LoopbackTransport::new()),
    )
}

#[test]
fn destination_sends_fan_out_to_all_roles_but_deliver_to_one() {
    init_tracing();

    // A relay speaking to two remote roles: it serves clients and dials an
    // upstream host.
    let mut relay = NetworkManager::builder("relay")
        .transport("client", plain_params())
        .transport("upstream", plain_params())
        .build()
        .unwrap();

    let upstream_hits = Rc::new(Cell::new(0));
    let mut upstream = NetworkManager::builder("upstream")
        .transport("relay", plain_params())
        .motd("upstream host")
        .extra(64, Box::new(Counting { hits: upstream_hits.clone() }))
        .build()
        .unwrap();

    let client_hits = Rc::new(Cell::new(0));
    let mut client = NetworkManager::builder("client")
        .transport("relay", plain_params())
        .extra(64, Box::new(Counting { hits: client_hits.clone() }))
        .build()
        .unwrap();

    let client_port = LoopbackPort::new();
    relay
        .open_server(vec![(
            "client".to_string(),
            Endpoint::Local(client_port.clone()),
        )])
        .unwrap();
    let upstream_port = LoopbackPort::new();
    upstream
        .open_server(vec![(
            "relay".to_string(),
            Endpoint::Local(upstream_port.clone()),
        )])
        .unwrap();

    relay
        .open_connection(vec![("upstream".to_string(), Endpoint::Local(upstream_port))])
        .unwrap();
    client
        .open_connection(vec![("relay".to_string(), Endpoint::Local(client_port))])
        .unwrap();
    pump(&mut [&mut relay, &mut upstream, &mut client]);

    // The relay completed a handshake upstream; the client link merely
    // exists (a relay without an MOTD never speaks first).
    let upstream_handle = relay.get_handle("upstream").unwrap();
    assert!(relay.handle(&upstream_handle).unwrap().activated);
    assert!(relay.get_handle("client").is_some());

    // A destination-addressed send is still offered to every role; the
    // handler without the handle no-ops with a warning, and exactly one
    // copy reaches the addressee.
    let warnings = EventRecorder::attach(&mut relay.events, &[EventKind::Warning]);
    relay.send_message(NetMessage::to(64, vec![], upstream_handle));
    pump(&mut [&mut relay, &mut upstream, &mut client]);

    assert_eq!(upstream_hits.get(), 1);
    assert_eq!(client_hits.get(), 0);
    assert!(warnings.contains("Unknown handle"));

    // A broadcast reaches every role's connections.
    relay.send_message(NetMessage::new(64, vec![]));
    pump(&mut [&mut relay, &mut upstream, &mut client]);

    assert_eq!(upstream_hits.get(), 2);
    assert_eq!(client_hits.get(), 1);
}

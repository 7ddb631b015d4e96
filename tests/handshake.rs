//! Handshake and connection-lifecycle scenarios over paired loopback
//! nodes.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::*;
use netweave::errors::{ConfigError, NetError, NetResult};
use netweave::events::EventKind;
use netweave::prelude::*;
use netweave::schema::net_types;
use netweave::transport::LoopbackTransport;

#[test]
fn hello_cycle_activates_both_sides() {
    let mut server = server_manager();
    let mut client = client_manager();

    let server_events = EventRecorder::attach(
        &mut server.events,
        &[EventKind::HandleActivated, EventKind::Disconnect],
    );
    let client_events = EventRecorder::attach(
        &mut client.events,
        &[EventKind::MotdSet, EventKind::HandleActivated],
    );

    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    // Client sees the MOTD, then its handle activates.
    assert_eq!(
        client_events.kinds(),
        vec![EventKind::MotdSet, EventKind::HandleActivated]
    );
    assert!(client_events.contains("An example native host"));

    // Server activated the peer and assigned the first dynamic repository.
    assert_eq!(server_events.kinds(), vec![EventKind::HandleActivated]);
    let server_handle = server.get_handle("client").unwrap();
    assert_eq!(
        server.shared_parameter(&server_handle, "rp"),
        Some(Value::Uint(128))
    );

    // The assignment replicated to the client's side of the link.
    let client_handle = client.get_handle("server").unwrap();
    let rp = client
        .shared_parameter(&client_handle, "rp")
        .and_then(|value| value.as_u64())
        .unwrap();
    assert!(rp >= 128);
}

#[test]
fn second_client_gets_the_next_repository() {
    let mut server = server_manager();
    let mut first = client_manager();
    let mut second = client_manager();

    let port = open(&mut server);
    join(&mut server, &mut first, &port);
    join(&mut server, &mut second, &port);

    let mut repositories: Vec<u64> = [&first, &second]
        .iter()
        .map(|client| {
            let handle = client.get_handle("server").unwrap();
            client
                .shared_parameter(&handle, "rp")
                .and_then(|value| value.as_u64())
                .unwrap()
        })
        .collect();
    repositories.sort_unstable();
    assert_eq!(repositories, vec![128, 129]);
}

#[test]
fn hash_mismatch_disconnects_the_client() {
    let mut server = server_manager();
    let mut client = NetworkManager::builder("client")
        .transport(
            "server",
            TransportParameters::new(
                Box::new(MsgpackEncoder),
                Box::new(LoopbackTransport::new()),
            ),
        )
        .network_hash(b"different".to_vec())
        .build()
        .unwrap();

    let client_events =
        EventRecorder::attach(&mut client.events, &[EventKind::Disconnect]);

    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    assert!(client_events.contains("hash does not match"));
    assert!(client.get_handle("server").is_none());
    assert!(server.get_handle("client").is_none());
}

#[test]
fn duplicate_hello_disconnects() {
    let mut server = server_manager();
    let mut client = client_manager();
    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    let client_events =
        EventRecorder::attach(&mut client.events, &[EventKind::Disconnect]);
    let hash = client.network_hash().to_vec();
    client.send_message(NetMessage::new(
        codes::HELLO,
        vec![Value::Uint(1), Value::Bytes(hash)],
    ));
    pump(&mut [&mut server, &mut client]);

    assert!(client_events.contains("multiple times"));
}

#[test]
fn messages_before_hello_are_rejected() {
    let mut server = server_manager();
    let mut client = client_manager();
    let client_events =
        EventRecorder::attach(&mut client.events, &[EventKind::Disconnect]);

    let port = open(&mut server);
    connect(&mut client, &port);
    // Let the client learn about its link, but do not let the server speak
    // yet; then jump the gun.
    client.poll();
    client.send_message(NetMessage::new(codes::REQUEST_VISIBLE_OBJECTS, vec![]));
    pump(&mut [&mut server, &mut client]);

    assert!(client_events.contains("before HELLO"));
}

#[test]
fn unexpected_motd_is_a_warning_not_a_crash() {
    let mut server = server_manager();
    // A node with its own MOTD receiving a peer MOTD refuses to answer.
    let mut client = NetworkManager::builder("client")
        .transport(
            "server",
            TransportParameters::new(
                Box::new(MsgpackEncoder),
                Box::new(LoopbackTransport::new()),
            ),
        )
        .motd("I am also a host")
        .build()
        .unwrap();

    let client_events = EventRecorder::attach(
        &mut client.events,
        &[EventKind::Warning, EventKind::HandleActivated],
    );

    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    assert!(client_events.contains("Unexpected MOTD message"));
    assert_eq!(client_events.count(EventKind::HandleActivated), 0);
}

#[test]
fn reserved_extra_codes_are_a_configuration_error() {
    struct Extra;

    impl MessageProcessor for Extra {
        fn invoke(
            &mut self,
            _manager: &mut NetworkManager,
            _message: &NetMessage,
        ) -> NetResult<()> {
            Ok(())
        }
    }

    let result = NetworkManager::builder("server")
        .transport(
            "client",
            TransportParameters::new(
                Box::new(MsgpackEncoder),
                Box::new(LoopbackTransport::new()),
            ),
        )
        .extra(1, Box::new(Extra))
        .build();
    assert!(matches!(
        result,
        Err(NetError::Config(ConfigError::ExtraCallbacksProvided))
    ));
}

#[test]
fn invalid_application_arguments_are_dropped_with_the_bound_named() {
    struct Counting {
        hits: Rc<Cell<usize>>,
    }

    impl MessageProcessor for Counting {
        fn arg_type(&self) -> Option<TypeExpr> {
            Some(net_types::tuple_of([net_types::uint16()]))
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

    let hits = Rc::new(Cell::new(0));
    let mut server = NetworkManager::builder("server")
        .transport(
            "client",
            TransportParameters::new(
                Box::new(MsgpackEncoder),
                Box::new(LoopbackTransport::new()),
            )
            .with_middleware(Box::new(MessageValidator::new())),
        )
        .motd("An example native host")
        .client_repository(64)
        .extra(64, Box::new(Counting { hits: hits.clone() }))
        .build()
        .unwrap();
    let mut client = client_manager();

    let warnings = EventRecorder::attach(&mut server.events, &[EventKind::Warning]);
    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    // In range: processed.
    client.send_message(NetMessage::new(64, vec![Value::Uint(100)]));
    pump(&mut [&mut server, &mut client]);
    assert_eq!(hits.get(), 1);

    // Out of range: dropped by the validator before dispatch.
    client.send_message(NetMessage::new(64, vec![Value::Uint(100_000)]));
    pump(&mut [&mut server, &mut client]);
    assert_eq!(hits.get(), 1);
    assert!(warnings.contains("Lt(65536)"));
}

#[test]
fn peer_shutdown_destroys_the_remote_handle() {
    let mut server = server_manager();
    let mut client = client_manager();
    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    let server_events =
        EventRecorder::attach(&mut server.events, &[EventKind::HandleDestroyed]);
    let client_events =
        EventRecorder::attach(&mut client.events, &[EventKind::HandleDestroyed]);

    client.shutdown();
    pump(&mut [&mut server, &mut client]);

    assert_eq!(client_events.count(EventKind::HandleDestroyed), 1);
    assert_eq!(server_events.count(EventKind::HandleDestroyed), 1);
    assert!(server.get_handle("client").is_none());
}

#[test]
fn destroy_events_fire_exactly_once() {
    let mut server = server_manager();
    let mut client = client_manager();
    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    let server_events = EventRecorder::attach(
        &mut server.events,
        &[EventKind::HandleActivated, EventKind::HandleDestroyed],
    );

    let handle = server.get_handle("client").unwrap();
    // Re-activation after the handshake must not re-fire.
    server.activate_handle(&handle);
    server.destroy_handle(&handle);
    server.destroy_handle(&handle);
    pump(&mut [&mut server, &mut client]);

    assert_eq!(server_events.count(EventKind::HandleActivated), 0);
    assert_eq!(server_events.count(EventKind::HandleDestroyed), 1);
}

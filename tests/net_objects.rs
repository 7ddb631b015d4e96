//! Object replication scenarios: symmetric lifecycle, asymmetric fields,
//! authority-mediated creation, deletion arbitration and targeted sends.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use netweave::events::EventKind;
use netweave::objects::ObjectState;
use netweave::prelude::*;

#[test]
fn symmetric_object_lifecycle() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut server = server_manager();
    let mut client = client_manager();
    server
        .registry_mut()
        .register(lifecycle_class(0, log.clone()))
        .unwrap();
    server.registry_mut().initialize(vec![]).unwrap();
    client
        .registry_mut()
        .register(lifecycle_class(0, log.clone()))
        .unwrap();
    client.registry_mut().initialize(vec![]).unwrap();

    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    let staged = server.new_object("test_obj").unwrap();
    let oid = server.request_generate(staged, 0, 0).unwrap();
    pump(&mut [&mut server, &mut client]);

    // The authority stamped its repository into the id.
    assert_eq!(oid >> 32, 64);

    let server_view = server.object(oid).unwrap();
    assert_eq!(server_view.state, ObjectState::Generated);
    assert_eq!(server_view.behavior::<LifecycleObj>().unwrap().value, 1);

    let client_view = client.object(oid).unwrap();
    assert_eq!(client_view.oid, oid);
    assert_eq!(client_view.state, ObjectState::Generated);
    assert_eq!(client_view.behavior::<LifecycleObj>().unwrap().value, 1);

    server.request_delete(oid);
    pump(&mut [&mut server, &mut client]);

    assert!(server.object(oid).is_none());
    assert!(client.object(oid).is_none());
    let expected = format!("delete:{}", oid);
    let log = log.borrow();
    assert_eq!(log.iter().filter(|entry| **entry == expected).count(), 2);
}

#[test]
fn default_arguments_and_validation_failures() {
    let mut server = server_manager();
    let mut client = client_manager();
    server.registry_mut().register(value_class(0)).unwrap();
    server.registry_mut().initialize(vec![]).unwrap();
    client.registry_mut().register(value_class(0)).unwrap();
    client.registry_mut().initialize(vec![]).unwrap();

    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    let staged = server.new_object("test_obj").unwrap();
    let oid = server.request_generate(staged, 0, 0).unwrap();
    pump(&mut [&mut server, &mut client]);

    let value = |manager: &NetworkManager| {
        manager
            .object(oid)
            .and_then(|object| object.behavior::<ValueObj>())
            .map(|behavior| behavior.value)
            .unwrap()
    };
    assert_eq!(value(&client), 0);
    assert_eq!(value(&server), 0);

    // No argument: the signature default fills in on the receiving side.
    server.send_object_message(oid, "set_value", vec![]).unwrap();
    pump(&mut [&mut server, &mut client]);
    assert_eq!(value(&client), 256);
    assert_eq!(value(&server), 0);

    server
        .send_object_message(oid, "set_value", vec![Value::Uint(100)])
        .unwrap();
    pump(&mut [&mut server, &mut client]);
    assert_eq!(value(&client), 100);

    // Out-of-bounds argument: rejected on the receiving side, no change.
    let bad_calls = EventRecorder::attach(&mut client.events, &[EventKind::BadObjectCall]);
    server
        .send_object_message(oid, "set_value", vec![Value::Uint(100_000)])
        .unwrap();
    pump(&mut [&mut server, &mut client]);
    assert_eq!(value(&client), 100);
    assert!(bad_calls.contains("bad-args"));
    assert!(bad_calls.contains("Lt(65536)"));

    // Excess arguments are rejected the same way.
    bad_calls.clear();
    server
        .send_object_message(
            oid,
            "set_value",
            vec![Value::Uint(1), Value::Uint(2), Value::Uint(3)],
        )
        .unwrap();
    pump(&mut [&mut server, &mut client]);
    assert_eq!(value(&client), 100);
    assert!(bad_calls.contains("many arguments"));
}

#[test]
fn remote_creation_routes_through_the_authority() {
    let mut server = server_manager();
    let mut client = client_manager();
    server.registry_mut().register(value_class(0)).unwrap();
    server.registry_mut().initialize(vec![]).unwrap();
    client.registry_mut().register(value_class(0)).unwrap();
    client.registry_mut().initialize(vec![]).unwrap();

    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    let client_handle = client.get_handle("server").unwrap();
    let repository = client
        .shared_parameter(&client_handle, "rp")
        .and_then(|value| value.as_u64())
        .unwrap();

    let mut staged = client.new_object("test_obj").unwrap();
    staged.queue_field("set_value", vec![Value::Uint(7)]).unwrap();
    let low = client.request_generate(staged, 0, 0).unwrap();
    assert_eq!(
        client.objects().partial_objects[&low].state,
        ObjectState::CreateRequested
    );

    pump(&mut [&mut server, &mut client]);

    // The authority completed the id with the requester's repository and
    // resolved owner zero to the creator.
    let oid = (repository << 32) | low;
    let server_view = server.object(oid).unwrap();
    assert_eq!(server_view.owner as u64, repository);
    assert_eq!(server_view.state, ObjectState::Generated);
    assert_eq!(server_view.behavior::<ValueObj>().unwrap().value, 7);

    // The partial upgraded in place on the creator.
    assert!(client.objects().partial_objects.is_empty());
    let client_view = client.object(oid).unwrap();
    assert_eq!(client_view.state, ObjectState::Generated);
    assert_eq!(client_view.behavior::<ValueObj>().unwrap().value, 7);
}

#[test]
fn deletion_by_a_non_owner_is_ignored() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut server = server_manager();
    let mut client = client_manager();
    server
        .registry_mut()
        .register(lifecycle_class(0, log.clone()))
        .unwrap();
    server.registry_mut().initialize(vec![]).unwrap();
    client
        .registry_mut()
        .register(lifecycle_class(0, log))
        .unwrap();
    client.registry_mut().initialize(vec![]).unwrap();

    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    let staged = server.new_object("test_obj").unwrap();
    let oid = server.request_generate(staged, 0, 0).unwrap();
    pump(&mut [&mut server, &mut client]);

    let warnings = EventRecorder::attach(&mut server.events, &[EventKind::Warning]);
    // The client does not own the object; the authority refuses quietly.
    client.request_delete(oid);
    pump(&mut [&mut server, &mut client]);

    assert!(warnings.contains("unauthorized delete"));
    assert!(server.object(oid).is_some());
    assert!(client.object(oid).is_some());
}

#[test]
fn transient_fields_are_not_replayed_to_late_joiners() {
    let mut server = server_manager();
    server.registry_mut().register(observer_class(1)).unwrap();
    server.registry_mut().register_foreign(pair_class(0)).unwrap();
    server.registry_mut().initialize(vec![]).unwrap();

    let port = open(&mut server);

    let mut staged = server.new_object("test_obj").unwrap();
    staged.queue_field("set_a", vec![Value::Uint(100)]).unwrap();
    staged.queue_field("set_b", vec![Value::Uint(100)]).unwrap();
    let oid = server.request_generate(staged, 0, 0).unwrap();

    // A client joining after generation sees nothing until it asks.
    let mut client = client_manager();
    client.registry_mut().register(pair_class(0)).unwrap();
    client.registry_mut().register_foreign(observer_class(1)).unwrap();
    client.registry_mut().initialize(vec![]).unwrap();
    join(&mut server, &mut client, &port);
    assert!(client.object(oid).is_none());

    client.request_visible_objects();
    pump(&mut [&mut server, &mut client]);

    let view = client.object(oid).unwrap();
    let behavior = view.behavior::<PairObj>().unwrap();
    assert_eq!(behavior.a, 0);
    assert_eq!(behavior.b, 100);
}

#[test]
fn targeted_field_sends_reach_only_the_caller() {
    let mut server = server_manager();
    let mut first = client_manager();
    let mut second = client_manager();
    for manager in [&mut server, &mut first, &mut second] {
        manager.registry_mut().register(relay_class(0)).unwrap();
        manager.registry_mut().initialize(vec![]).unwrap();
    }

    let port = open(&mut server);
    join(&mut server, &mut first, &port);
    join(&mut server, &mut second, &port);

    let mut staged = server.new_object("test_obj").unwrap();
    staged.queue_field("set_value", vec![Value::Uint(100)]).unwrap();
    let oid = server.request_generate(staged, 0, 0).unwrap();
    pump(&mut [&mut server, &mut first, &mut second]);

    let value = |manager: &NetworkManager| {
        manager
            .object(oid)
            .and_then(|object| object.behavior::<ValueObj>())
            .map(|behavior| behavior.value)
            .unwrap()
    };
    assert_eq!(value(&first), 100);
    assert_eq!(value(&second), 100);

    // The relay field answers the calling handle only.
    second
        .send_object_message(oid, "set_my_value", vec![Value::Uint(200)])
        .unwrap();
    pump(&mut [&mut server, &mut first, &mut second]);

    assert_eq!(value(&second), 200);
    assert_eq!(value(&first), 100);
}

#[test]
fn field_call_guards_deny_unauthorized_calls() {
    let mut server = server_manager();
    let mut client = client_manager();
    server.registry_mut().register(guarded_class()).unwrap();
    server.registry_mut().initialize(vec![]).unwrap();
    client.registry_mut().register(guarded_class()).unwrap();
    client.registry_mut().initialize(vec![]).unwrap();

    // Fields tagged auth=admin require the connection to be marked admin.
    server.add_field_call_guard(0, Box::new(|value, field, handle| {
        if !value {
            return false;
        }
        match field.attributes.get("auth").and_then(Value::as_str) {
            Some("admin") => handle
                .map(|h| {
                    h.context.get("auth").and_then(Value::as_str) == Some("admin")
                })
                .unwrap_or(false),
            _ => true,
        }
    }));

    let port = open(&mut server);
    join(&mut server, &mut client, &port);

    let staged = server.new_object("test_obj").unwrap();
    let oid = server.request_generate(staged, 0, 0).unwrap();
    pump(&mut [&mut server, &mut client]);

    let bad_calls = EventRecorder::attach(&mut server.events, &[EventKind::BadObjectCall]);
    client
        .send_object_message(oid, "set_value", vec![Value::Uint(5)])
        .unwrap();
    pump(&mut [&mut server, &mut client]);
    assert!(bad_calls.contains("no-auth"));
    assert_eq!(
        server
            .object(oid)
            .unwrap()
            .behavior::<ValueObj>()
            .unwrap()
            .value,
        0
    );

    // Mark the connection as admin and retry.
    let handle = server.get_handle("client").unwrap();
    if let Some(handle) = server.handle_mut(&handle) {
        handle.context.insert("auth".to_string(), Value::str("admin"));
    }
    client
        .send_object_message(oid, "set_value", vec![Value::Uint(5)])
        .unwrap();
    pump(&mut [&mut server, &mut client]);
    assert_eq!(
        server
            .object(oid)
            .unwrap()
            .behavior::<ValueObj>()
            .unwrap()
            .value,
        5
    );
}

/// A server-role class whose only field requires admin authorization.
fn guarded_class() -> Rc<netweave::objects::ObjectClass> {
    use netweave::objects::NetworkField;
    use netweave::schema::{net_types, FieldSignature};

    netweave::objects::ObjectClass::builder("test_obj", 0)
        .field(
            NetworkField::new(FieldSignature::new("set_value").param(
                "value",
                net_types::uint16(),
            ))
            .attribute("auth", "admin")
            .callback(|behavior, _ctx, args| {
                if let (Some(this), Some(value)) = (
                    behavior.as_any_mut().downcast_mut::<ValueObj>(),
                    args.first().and_then(Value::as_u64),
                ) {
                    this.value = value;
                }
            }),
        )
        .constructor(|| Box::<ValueObj>::default())
        .build()
        .unwrap()
}

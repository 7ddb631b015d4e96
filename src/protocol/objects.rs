//! Object-replication processors: creation (direct and authority-
//! mediated), field invocation, deletion and visibility bootstraps.

use crate::errors::NetResult;
use crate::manager::NetworkManager;
use crate::objects::{NetObject, ObjectState};
use crate::protocol::{args, net_object_types, DisconnectReason};
use crate::schema::TypeExpr;
use crate::wire::NetMessage;

use super::MessageProcessor;

/// CREATE_OBJECT: a repo-less peer asks this authority to complete an
/// object creation. The authority installs the object, stamps the sender's
/// repository into the oid, replays the provided parameters and broadcasts
/// the generate sequence.
pub struct MsgCreateObject;

impl MessageProcessor for MsgCreateObject {
    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_object_types::create_object())
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        let Some(sender) = message.sender.clone() else {
            return Ok(());
        };
        let params = &message.parameters;
        let oid_low = args::u32(params, 0)? as u64;
        let otype = args::u32(params, 1)? as u16;
        let owner = args::u32(params, 2)?;
        let zone = args::u32(params, 3)?;
        let fields = args::field_triples(params, 4)?;

        let Some(class) = manager.registry().constructor_class(otype) else {
            manager.send_disconnect(
                &sender,
                DisconnectReason::InvalidObjectType,
                Some(format!("Unknown object: {}", oid_low)),
            );
            return Ok(());
        };
        let Some(repository) = manager.require_repository(&sender) else {
            return Ok(());
        };

        // Zero means "owned by the creator"; repositories start at one.
        let owner = if owner == 0 { repository } else { owner };
        // The repository number is a property of the connection, not of the
        // requester's payload.
        let oid = oid_low | ((repository as u64) << 32);

        let Some(behavior) = class.construct() else {
            return Ok(());
        };
        let mut object = NetObject::new(class, behavior);
        object.oid = oid;
        object.otype = otype;
        object.owner = owner;
        object.zone = zone;
        object.state = ObjectState::Generating;
        manager.objects_mut().objects.insert(oid, object);

        for (role, field, field_args) in fields {
            manager.call_object_field(oid, role, field, field_args, Some(sender.clone()));
        }
        let loaded = manager
            .object(oid)
            .map(NetObject::get_loaded_params)
            .unwrap_or_default();
        manager.send_object_generate(oid, loaded, None);
        manager.initialize_object(oid);
        Ok(())
    }
}

/// GENERATE_OBJECT: the authority announces an object. The original
/// requester upgrades its partial object; everyone else constructs a fresh
/// view in GENERATING state.
pub struct MsgGenerateObject;

impl MessageProcessor for MsgGenerateObject {
    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_object_types::generate_object())
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        let Some(sender) = message.sender.clone() else {
            return Ok(());
        };
        let params = &message.parameters;
        let oid = args::u64(params, 0)?;
        let otype = args::u32(params, 1)? as u16;
        let owner = args::u32(params, 2)?;
        let zone = args::u32(params, 3)?;

        let repository = manager
            .shared_parameter(&sender, "rp")
            .and_then(|value| value.as_u32());
        if repository == Some((oid >> 32) as u32) {
            // Our own creation request coming back: upgrade the partial.
            let low = oid & u32::MAX as u64;
            match manager.objects_mut().partial_objects.remove(&low) {
                Some(mut object) if object.state == ObjectState::CreateRequested => {
                    if object.otype != otype {
                        manager.events.warning(format!(
                            "Partial object {} came back with type {} instead of {}",
                            oid, otype, object.otype
                        ));
                    }
                    object.oid = oid;
                    object.owner = owner;
                    object.zone = zone;
                    object.state = ObjectState::Generating;
                    manager.objects_mut().objects.insert(oid, object);
                }
                _ => {
                    manager.events.warning(format!(
                        "Ignoring bad partial generation for object {}",
                        oid
                    ));
                }
            }
            return Ok(());
        }

        let Some(class) = manager.registry().constructor_class(otype) else {
            manager.send_disconnect(
                &sender,
                DisconnectReason::InvalidObjectType,
                Some(format!("Unknown object: {}", oid)),
            );
            return Ok(());
        };
        let Some(behavior) = class.construct() else {
            return Ok(());
        };
        let mut object = NetObject::new(class, behavior);
        object.oid = oid;
        object.otype = otype;
        object.owner = owner;
        object.zone = zone;
        object.state = ObjectState::Generating;
        manager.objects_mut().objects.insert(oid, object);
        Ok(())
    }
}

/// SET_OBJECT_FIELD: invokes a field by index on the target view.
pub struct MsgSetObjectField;

impl MessageProcessor for MsgSetObjectField {
    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_object_types::set_object_field())
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        let params = &message.parameters;
        let oid = args::u64(params, 0)?;
        let role = args::u8(params, 1)?;
        let field = args::u8(params, 2)?;
        let field_args = args::list(params, 3)?;

        if manager.object(oid).is_none() {
            manager.events.warning(format!(
                "Ignoring invalid set_object_field for object {}",
                oid
            ));
            return Ok(());
        }
        manager.call_object_field(oid, role, field, field_args, message.sender.clone());
        Ok(())
    }
}

/// OBJECT_GENERATE_DONE: the generate sequence completed; run
/// `net_create`.
pub struct MsgObjectGenerateDone;

impl MessageProcessor for MsgObjectGenerateDone {
    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_object_types::single_oid())
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        let oid = args::u64(&message.parameters, 0)?;
        manager.initialize_object(oid);
        Ok(())
    }
}

/// REQUEST_DELETE_OBJECT: an owner asks this authority to delete.
pub struct MsgDeleteObject;

impl MessageProcessor for MsgDeleteObject {
    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_object_types::single_oid())
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        let Some(sender) = message.sender.clone() else {
            return Ok(());
        };
        let oid = args::u64(&message.parameters, 0)?;
        let Some(repository) = manager.require_repository(&sender) else {
            return Ok(());
        };
        manager.perform_object_deletion(oid, repository);
        Ok(())
    }
}

/// DESTROY_OBJECT: the authority tears an object down everywhere.
pub struct MsgDestroyObject;

impl MessageProcessor for MsgDestroyObject {
    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_object_types::single_oid())
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        let oid = args::u64(&message.parameters, 0)?;
        manager.destroy_network_object(oid);
        Ok(())
    }
}

/// REQUEST_VISIBLE_OBJECTS: replays a generate sequence for everything
/// the visibility filters allow the sender to see.
pub struct MsgRequestVisible;

impl MessageProcessor for MsgRequestVisible {
    fn arg_type(&self) -> Option<TypeExpr> {
        Some(net_object_types::empty())
    }

    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()> {
        let Some(sender) = message.sender.clone() else {
            return Ok(());
        };
        for oid in manager.get_visible_objects(&sender) {
            let loaded = manager
                .object(oid)
                .map(NetObject::get_loaded_params)
                .unwrap_or_default();
            manager.send_object_generate(oid, loaded, Some(sender.clone()));
        }
        Ok(())
    }
}

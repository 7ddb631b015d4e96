//! Message dispatch: the processor trait and the per-code dispatch table.

use std::collections::HashMap;

use crate::errors::{ConfigError, NetResult};
use crate::manager::NetworkManager;
use crate::protocol::{codes, handshake, objects, DisconnectReason};
use crate::schema::TypeExpr;
use crate::wire::{is_standard_code, NetMessage};

/// Handles one message type code.
pub trait MessageProcessor {
    /// Whether the sender must have completed the handshake. Processors
    /// that participate in the handshake itself override this.
    fn requires_hello(&self) -> bool {
        true
    }

    /// The expected parameter-tuple type, consumed by the message-validator
    /// middleware. `None` disables validation for this code.
    fn arg_type(&self) -> Option<TypeExpr> {
        None
    }

    /// Processes one message. Errors are contained at the dispatch
    /// boundary and surface as EXCEPTION events.
    fn invoke(&mut self, manager: &mut NetworkManager, message: &NetMessage) -> NetResult<()>;
}

/// Dispatches incoming messages to processors by type code.
#[derive(Default)]
pub struct DatagramProcessor {
    processors: HashMap<u16, Box<dyn MessageProcessor>>,
}

impl DatagramProcessor {
    /// Builds the standard processor set plus application extras. Extra
    /// codes must lie outside the reserved range.
    pub fn standard(
        extras: Vec<(u16, Box<dyn MessageProcessor>)>,
    ) -> Result<Self, ConfigError> {
        let mut processors: HashMap<u16, Box<dyn MessageProcessor>> = HashMap::new();
        processors.insert(codes::MOTD, Box::new(handshake::MsgMotd));
        processors.insert(codes::HELLO, Box::new(handshake::MsgHello));
        processors.insert(codes::DISCONNECT, Box::new(handshake::MsgDisconnect));
        processors.insert(codes::SHUTDOWN, Box::new(handshake::MsgShutdown));
        processors.insert(
            codes::SHARED_PARAMETER,
            Box::new(handshake::MsgSharedParameter),
        );
        processors.insert(codes::CREATE_OBJECT, Box::new(objects::MsgCreateObject));
        processors.insert(codes::GENERATE_OBJECT, Box::new(objects::MsgGenerateObject));
        processors.insert(codes::SET_OBJECT_FIELD, Box::new(objects::MsgSetObjectField));
        processors.insert(
            codes::OBJECT_GENERATE_DONE,
            Box::new(objects::MsgObjectGenerateDone),
        );
        processors.insert(
            codes::REQUEST_DELETE_OBJECT,
            Box::new(objects::MsgDeleteObject),
        );
        processors.insert(codes::DESTROY_OBJECT, Box::new(objects::MsgDestroyObject));
        processors.insert(
            codes::REQUEST_VISIBLE_OBJECTS,
            Box::new(objects::MsgRequestVisible),
        );

        for (code, processor) in extras {
            if is_standard_code(code) {
                return Err(ConfigError::ExtraCallbacksProvided);
            }
            processors.insert(code, processor);
        }
        Ok(DatagramProcessor { processors })
    }

    /// Expected parameter-tuple types per code, for the validator
    /// middleware.
    pub fn schemas(&self) -> HashMap<u16, TypeExpr> {
        self.processors
            .iter()
            .filter_map(|(code, processor)| Some((*code, processor.arg_type()?)))
            .collect()
    }

    /// Dispatches one message. Unknown reserved codes are errors, unknown
    /// application codes warnings. Processors requiring an activated
    /// sender disconnect violators.
    pub fn process_message(&mut self, manager: &mut NetworkManager, message: &NetMessage) {
        let Some(processor) = self.processors.get_mut(&message.message_type) else {
            if is_standard_code(message.message_type) {
                manager.events.error(format!(
                    "Unknown standard message code: {}!",
                    message.message_type
                ));
            } else {
                manager
                    .events
                    .warning(format!("Unknown message code: {}!", message.message_type));
            }
            return;
        };

        if processor.requires_hello() {
            let activated = message
                .sender
                .as_ref()
                .and_then(|sender| manager.handle(sender))
                .map(|handle| handle.activated)
                .unwrap_or(false);
            if !activated {
                if let Some(sender) = message.sender.clone() {
                    manager.send_disconnect(
                        &sender,
                        DisconnectReason::MessageBeforeHello,
                        None,
                    );
                }
                return;
            }
        }

        if let Err(e) = processor.invoke(manager, message) {
            manager
                .events
                .exception("Error while processing a message", e.to_string());
        }
    }
}

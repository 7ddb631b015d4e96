//! NetWeave - Typed Messaging and Distributed Objects
//!
//! NetWeave is a networking library for multi-process applications that
//! exchange typed messages and replicate distributed objects across roles
//! (e.g. client/server). It provides a pluggable transport layer carrying
//! length-framed datagrams, a handshake and connection-lifecycle protocol,
//! a schema-checked message-dispatch layer, and a distributed-object layer
//! mirroring per-object state across peers with authority and zone-based
//! visibility rules.
//!
//! # Architecture
//!
//! 1. **Schema layer**: a closed value universe, a recursive runtime type
//!    checker with annotated bounds, and a persistent wire format for
//!    field signatures exchanged between independently developed peers.
//! 2. **Transport pipeline**: handle filters → middleware chains →
//!    encoders → framed link drivers, with a re-entrant batching queue.
//! 3. **Protocol**: the MOTD/HELLO handshake state machine plus the seven
//!    object-replication messages, dispatched by type code.
//! 4. **Objects**: explicit class declarations with per-role fields, a
//!    finalizing registry assigning stable type ids, and the replication
//!    engine (generate sequences, field calls, deletion arbitration,
//!    visibility queries).
//!
//! # Quick Start
//!
//! ```no_run
//! use netweave::prelude::*;
//!
//! fn main() -> netweave::errors::NetResult<()> {
//!     let mut server = NetworkManager::builder("server")
//!         .transport(
//!             "client",
//!             TransportParameters::new(
//!                 Box::new(JsonEncoder),
//!                 Box::new(LoopbackTransport::new()),
//!             )
//!             .with_middleware(Box::new(MessageValidator::new())),
//!         )
//!         .motd("An example native host")
//!         .build()?;
//!
//!     let port = LoopbackPort::new();
//!     server.open_server(vec![("client".to_string(), Endpoint::Local(port))])?;
//!     loop {
//!         if !server.poll() {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod events;
pub mod logging;
pub mod manager;
pub mod middlewares;
pub mod objects;
pub mod protocol;
pub mod schema;
pub mod transport;
pub mod wire;

pub use errors::{ConfigError, DataValidationError, EncodeError, MarshalError, NetError, NetResult};
pub use events::{EventBus, EventKind, NetEvent};
pub use manager::{NetworkConfig, NetworkManager, NetworkManagerBuilder};
pub use schema::{FieldSignature, SignatureFlags, TypeExpr, Value};
pub use wire::{HandleRef, NetMessage};

/// The common imports of an application embedding NetWeave.
pub mod prelude {
    pub use crate::errors::NetResult;
    pub use crate::events::{EventKind, NetEvent};
    pub use crate::manager::{NetworkManager, NetworkManagerBuilder};
    pub use crate::middlewares::{MessageValidator, ZoneBasedRouter};
    pub use crate::objects::{
        NetworkField, ObjectBehavior, ObjectClass, ObjectContext, ObjectState,
    };
    pub use crate::protocol::{codes, DisconnectReason, MessageProcessor};
    pub use crate::schema::{net_types, FieldSignature, TypeExpr, Value};
    pub use crate::transport::{
        Endpoint, LoopbackPort, LoopbackTransport, TransportParameters,
    };
    #[cfg(feature = "tcp")]
    pub use crate::transport::TcpTransport;
    pub use crate::wire::JsonEncoder;
    #[cfg(feature = "messagepack")]
    pub use crate::wire::MsgpackEncoder;
    pub use crate::wire::{HandleRef, NetMessage, ProtocolEncoder};
}

//! Distributed-object layer: class declarations, per-object views, the
//! replication state store and the finalizing registry.

pub mod class;
pub mod manager;
pub mod object;
pub mod registry;

pub use class::{
    BehaviorConstructor, FieldCallback, NetworkField, ObjectClass, ObjectClassBuilder,
};
pub use manager::{FieldCallGuard, ObjectManager, ObjectTable, VisibilityFilter};
pub use object::{
    AsAny, NetObject, ObjectBehavior, ObjectContext, ObjectState, StagedObject,
};
pub use registry::ObjectRegistry;

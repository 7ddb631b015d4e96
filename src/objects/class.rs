//! Object class declarations: network name, role, fields with callbacks,
//! and the foreign signature tables learned from peers.
//!
//! A class is declared explicitly by the application; the declaration is
//! the schema. Every view of the same object type across the federation
//! shares one network name; each role's view carries its own field list,
//! and learns the other roles' signatures either from locally registered
//! sibling classes or from peer marshal files.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde_json::{json, Value as Json};

use crate::errors::{ConfigError, MarshalError, NetError};
use crate::objects::object::{ObjectBehavior, ObjectContext};
use crate::schema::{
    marshal_to_signature, signature_to_marshal, FieldSignature, SignatureFlags, Value,
};

/// Invoked with the object's behavior state, a manager context and the
/// validated argument tuple.
pub type FieldCallback =
    Rc<dyn Fn(&mut dyn ObjectBehavior, &mut ObjectContext<'_>, &[Value])>;

/// Constructs a fresh behavior state for an incoming object view.
pub type BehaviorConstructor = Rc<dyn Fn() -> Box<dyn ObjectBehavior>>;

/// One callable field of an object class: signature, callback, and
/// free-form attributes readable by field-call guards (e.g. `auth`).
#[derive(Clone)]
pub struct NetworkField {
    pub signature: FieldSignature,
    pub attributes: HashMap<String, Value>,
    pub(crate) callback: Option<FieldCallback>,
}

impl NetworkField {
    pub fn new(signature: FieldSignature) -> Self {
        NetworkField {
            signature,
            attributes: HashMap::new(),
            callback: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    /// Disables argument caching for this field; the value then only
    /// travels as a live update and is not replayed on visibility queries.
    pub fn transient(mut self) -> Self {
        self.signature.flags -= SignatureFlags::PERSIST_IN_RAM;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn callback(
        mut self,
        callback: impl Fn(&mut dyn ObjectBehavior, &mut ObjectContext<'_>, &[Value]) + 'static,
    ) -> Self {
        self.callback = Some(Rc::new(callback));
        self
    }
}

impl std::fmt::Debug for NetworkField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkField")
            .field("signature", &self.signature)
            .field("attributes", &self.attributes)
            .field("callback", &self.callback.as_ref().map(|_| ".."))
            .finish()
    }
}

/// The declaration of one object type as seen from one role.
#[derive(Clone)]
pub struct ObjectClass {
    pub network_name: String,
    pub object_role: u8,
    /// Assigned by the registry at finalization, by sorted network name.
    pub otype: u16,
    pub fields: Vec<NetworkField>,
    /// Signatures of the other roles' fields, by role.
    pub foreign_fields: BTreeMap<u8, Vec<FieldSignature>>,
    /// field name → (role, field index), built at finalization.
    pub message_index: HashMap<String, (u8, u8)>,
    pub(crate) constructor: Option<BehaviorConstructor>,
    /// Placeholders stand in for types known only from peer marshals, so
    /// the id space stays symmetric. They cannot be instantiated.
    pub(crate) placeholder: bool,
}

impl ObjectClass {
    pub fn builder(network_name: impl Into<String>, object_role: u8) -> ObjectClassBuilder {
        ObjectClassBuilder {
            network_name: network_name.into(),
            object_role,
            fields: Vec::new(),
            constructor: None,
        }
    }

    /// A synthetic stand-in for a network name that only appears in peer
    /// marshal files.
    pub(crate) fn foreign_placeholder(network_name: impl Into<String>) -> Self {
        ObjectClass {
            network_name: network_name.into(),
            object_role: u8::MAX,
            otype: 0,
            fields: Vec::new(),
            foreign_fields: BTreeMap::new(),
            message_index: HashMap::new(),
            constructor: None,
            placeholder: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Builds a fresh behavior state, or `None` for placeholders.
    pub fn construct(&self) -> Option<Box<dyn ObjectBehavior>> {
        self.constructor.as_ref().map(|ctor| ctor())
    }

    pub fn field(&self, index: u8) -> Option<&NetworkField> {
        self.fields.get(index as usize)
    }

    /// Resolves a field name to its (role, index) pair.
    pub fn resolve_field(&self, name: &str) -> Result<(u8, u8), NetError> {
        self.message_index.get(name).copied().ok_or_else(|| {
            ConfigError::UnknownObjectMessage {
                class: self.network_name.clone(),
                message: name.to_string(),
            }
            .into()
        })
    }

    /// Whether a field's arguments are cached for visibility replays.
    /// Unknown signatures default to caching.
    pub fn field_persists(&self, role: u8, field: u8) -> bool {
        let flags = if role == self.object_role {
            self.fields
                .get(field as usize)
                .map(|f| f.signature.flags)
        } else {
            self.foreign_fields
                .get(&role)
                .and_then(|sigs| sigs.get(field as usize))
                .map(|sig| sig.flags)
        };
        flags
            .map(|f| f.contains(SignatureFlags::PERSIST_IN_RAM))
            .unwrap_or(true)
    }

    /// The persisted form of this class: its role plus all local field
    /// signatures.
    pub fn marshal_fields(&self) -> Result<Json, MarshalError> {
        Ok(json!({
            "object_role": self.object_role,
            "signatures": self
                .fields
                .iter()
                .map(|f| signature_to_marshal(&f.signature))
                .collect::<Result<Vec<_>, _>>()?,
        }))
    }

    /// Ingests one peer marshal for this network name. The own role is
    /// skipped so every role can load the full marshal set.
    pub(crate) fn unmarshal_foreign(&mut self, marshal: &Json) -> Result<(), NetError> {
        if self.placeholder {
            return Ok(());
        }
        let role = marshal
            .get("object_role")
            .and_then(Json::as_u64)
            .ok_or_else(|| MarshalError::MalformedMarshal(marshal.to_string()))?
            as u8;
        if role == self.object_role {
            return Ok(());
        }
        let signatures = marshal
            .get("signatures")
            .and_then(Json::as_array)
            .ok_or_else(|| MarshalError::MalformedMarshal(marshal.to_string()))?
            .iter()
            .map(marshal_to_signature)
            .collect::<Result<Vec<_>, _>>()?;
        self.foreign_fields.insert(role, signatures);
        Ok(())
    }

    /// Ingests a locally registered sibling class of another role.
    pub(crate) fn add_foreign_class(&mut self, foreign: &ObjectClass) {
        if self.placeholder || foreign.object_role == self.object_role {
            return;
        }
        self.foreign_fields.insert(
            foreign.object_role,
            foreign
                .fields
                .iter()
                .map(|f| f.signature.clone())
                .collect(),
        );
    }

    /// Builds the name → (role, index) table once every role's signatures
    /// are known.
    pub(crate) fn finalize_fields(&mut self) {
        if self.placeholder {
            return;
        }
        let mut index = HashMap::new();
        for (i, field) in self.fields.iter().enumerate() {
            index.insert(field.name().to_string(), (self.object_role, i as u8));
        }
        for (role, signatures) in &self.foreign_fields {
            for (i, signature) in signatures.iter().enumerate() {
                index.insert(signature.name.clone(), (*role, i as u8));
            }
        }
        self.message_index = index;
    }
}

impl std::fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectClass")
            .field("network_name", &self.network_name)
            .field("object_role", &self.object_role)
            .field("otype", &self.otype)
            .field("fields", &self.fields.len())
            .field("placeholder", &self.placeholder)
            .finish()
    }
}

/// Builder for [`ObjectClass`].
pub struct ObjectClassBuilder {
    network_name: String,
    object_role: u8,
    fields: Vec<NetworkField>,
    constructor: Option<BehaviorConstructor>,
}

impl ObjectClassBuilder {
    pub fn field(mut self, field: NetworkField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn constructor(
        mut self,
        constructor: impl Fn() -> Box<dyn ObjectBehavior> + 'static,
    ) -> Self {
        self.constructor = Some(Rc::new(constructor));
        self
    }

    pub fn build(self) -> Result<Rc<ObjectClass>, ConfigError> {
        if self.network_name.is_empty() {
            return Err(ConfigError::NoNetworkName(self.network_name));
        }
        for field in &self.fields {
            if field.name().is_empty() {
                return Err(ConfigError::UnnamedField(self.network_name.clone()));
            }
            if field.callback.is_none() {
                return Err(ConfigError::FieldNotInitialized {
                    class: self.network_name.clone(),
                    field: field.name().to_string(),
                });
            }
        }
        Ok(Rc::new(ObjectClass {
            network_name: self.network_name,
            object_role: self.object_role,
            otype: 0,
            fields: self.fields,
            foreign_fields: BTreeMap::new(),
            message_index: HashMap::new(),
            constructor: self.constructor,
            placeholder: false,
        }))
    }
}

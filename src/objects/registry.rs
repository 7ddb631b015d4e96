//! The object registry: the set of locally known classes, stable type-id
//! assignment, and signature persistence.
//!
//! Finalization is one-shot. All local classes, locally registered foreign
//! role variants, and every network name found in peer marshal files are
//! collected; names with no local class get a synthetic placeholder so the
//! id space is symmetric across independently configured peers. Ids are
//! assigned by sorting network names lexicographically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::{Map, Value as Json};

use crate::errors::{ConfigError, MarshalError, NetError, NetResult};
use crate::objects::class::ObjectClass;

/// Holds the classes known to this node, before and after finalization.
#[derive(Default)]
pub struct ObjectRegistry {
    pending_local: Vec<ObjectClass>,
    pending_foreign: Vec<ObjectClass>,
    classes: HashMap<u16, Rc<ObjectClass>>,
    name_to_id: HashMap<String, u16>,
    initialized: bool,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Registers a class whose role this node plays.
    pub fn register(&mut self, class: Rc<ObjectClass>) -> Result<(), ConfigError> {
        if self.initialized {
            return Err(ConfigError::RegisterAfterInitialization(
                class.network_name.clone(),
            ));
        }
        self.pending_local.push((*class).clone());
        Ok(())
    }

    /// Registers another role's variant of a class, contributing its field
    /// signatures without making it instantiable here.
    pub fn register_foreign(&mut self, class: Rc<ObjectClass>) -> Result<(), ConfigError> {
        if self.initialized {
            return Err(ConfigError::RegisterAfterInitialization(
                class.network_name.clone(),
            ));
        }
        self.pending_foreign.push((*class).clone());
        Ok(())
    }

    pub fn get(&self, otype: u16) -> Option<&Rc<ObjectClass>> {
        self.classes.get(&otype)
    }

    /// A class usable for constructing incoming objects; placeholders do
    /// not qualify.
    pub fn constructor_class(&self, otype: u16) -> Option<Rc<ObjectClass>> {
        let class = self.classes.get(&otype)?;
        if class.is_placeholder() {
            return None;
        }
        Some(class.clone())
    }

    pub fn class_by_name(&self, name: &str) -> Option<Rc<ObjectClass>> {
        let id = self.name_to_id.get(name)?;
        self.classes.get(id).cloned()
    }

    pub fn otype_of(&self, name: &str) -> Option<u16> {
        self.name_to_id.get(name).copied()
    }

    pub fn classes(&self) -> impl Iterator<Item = &Rc<ObjectClass>> {
        self.classes.values()
    }

    /// One-shot finalization: synthesizes placeholders, assigns ids by
    /// sorted network name, ingests peer marshals and locally registered
    /// foreign variants, and freezes the table.
    pub fn initialize(&mut self, peer_marshals: Vec<Json>) -> NetResult<()> {
        if self.initialized {
            return Err(ConfigError::MultipleRegistryInitializations.into());
        }
        self.initialized = true;

        let mut classes = std::mem::take(&mut self.pending_local);
        let pending_foreign = std::mem::take(&mut self.pending_foreign);

        let known: Vec<String> = classes.iter().map(|c| c.network_name.clone()).collect();
        let mut external: Vec<String> = peer_marshals
            .iter()
            .flat_map(|marshal| marshal.as_object().into_iter().flatten())
            .map(|(name, _)| name.clone())
            .collect();
        external.extend(pending_foreign.iter().map(|c| c.network_name.clone()));
        external.sort();
        external.dedup();
        for name in external {
            if !known.contains(&name) {
                classes.push(ObjectClass::foreign_placeholder(name));
            }
        }

        classes.sort_by(|a, b| a.network_name.cmp(&b.network_name));
        for (index, class) in classes.iter_mut().enumerate() {
            class.otype = index as u16;
            self.name_to_id.insert(class.network_name.clone(), index as u16);
        }

        for marshal in &peer_marshals {
            let entries = marshal
                .as_object()
                .ok_or_else(|| MarshalError::MalformedMarshal(marshal.to_string()))?;
            for (name, class_marshal) in entries {
                let Some(id) = self.name_to_id.get(name) else {
                    continue;
                };
                classes[*id as usize].unmarshal_foreign(class_marshal)?;
            }
        }
        for foreign in &pending_foreign {
            if let Some(id) = self.name_to_id.get(&foreign.network_name) {
                classes[*id as usize].add_foreign_class(foreign);
            }
        }

        for mut class in classes {
            class.finalize_fields();
            self.classes.insert(class.otype, Rc::new(class));
        }
        Ok(())
    }

    /// The persisted document: every known class keyed by network name.
    pub fn marshal_classes(&self) -> NetResult<Json> {
        let mut document = Map::new();
        if self.initialized {
            for class in self.classes.values() {
                if class.is_placeholder() {
                    continue;
                }
                document.insert(class.network_name.clone(), class.marshal_fields()?);
            }
        } else {
            for class in &self.pending_local {
                document.insert(class.network_name.clone(), class.marshal_fields()?);
            }
        }
        Ok(Json::Object(document))
    }

    /// Marshalling mode: dump the local signatures and stop.
    pub fn marshal_to_file(&self, path: &Path) -> NetResult<()> {
        let document = self.marshal_classes()?;
        std::fs::write(path, serde_json::to_vec(&document)?)?;
        Ok(())
    }

    /// Loading mode: read one or more peer signature files and finalize.
    pub fn load_from_files(&mut self, paths: &[PathBuf]) -> NetResult<()> {
        let mut marshals = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = std::fs::read(path)
                .map_err(|_| ConfigError::SignatureFileMissing(path.clone()))?;
            marshals.push(serde_json::from_slice(&contents)?);
        }
        self.initialize(marshals)
    }
}

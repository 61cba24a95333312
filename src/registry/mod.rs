//! Runtime type registry.
//!
//! Descriptors live in an arena indexed by [`ClassId`]. The registry is built
//! once at startup ([`TypeRegistry::new`] followed by
//! [`register_all_builtins`](builtins::register_all_builtins) and any extension
//! registrations) and is read-only afterwards. The only interior mutability is
//! the module table used for lazy extension loading.
//!
//! # Capabilities
//!
//! - Subclass tests by walking the single-inheritance parent chain
//! - Dynamic instantiation through per-descriptor factories
//! - Plugin-scoped name lookup and `plugin::Name` encoding

pub mod builtins;
pub mod descriptor;
pub mod error;
pub mod loader;

pub use builtins::{register_all_builtins, BuiltinClasses};
pub use descriptor::{
    Factory, InstanceContext, RuntimeObject, TypeDescriptor, TypeRegistration, CORE_PLUGIN,
    TYPE_SEPARATOR,
};
pub use error::{RegistryError, RegistryResult};
pub use loader::{ModuleLoader, NoModuleLoader, StaticModuleLoader};

use crate::context::EngineContext;
use crate::id::ClassId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Name of the root descriptor every other type derives from.
pub const ROOT_CLASS_NAME: &str = "Object";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ModuleState {
    NotLoaded,
    Loaded,
    Failed(String),
}

/// Arena of [`TypeDescriptor`]s.
pub struct TypeRegistry {
    descriptors: Vec<TypeDescriptor>,
    by_name: HashMap<(String, String), ClassId>,
    modules: Mutex<HashMap<String, ModuleState>>,
    loader: Box<dyn ModuleLoader>,
}

impl TypeRegistry {
    /// Registry containing only the root descriptor, without extension loading.
    pub fn new() -> Self {
        Self::with_loader(Box::new(NoModuleLoader))
    }

    /// Registry that loads extension modules through `loader`.
    pub fn with_loader(loader: Box<dyn ModuleLoader>) -> Self {
        let root = TypeDescriptor {
            id: ClassId(0),
            plugin: CORE_PLUGIN.to_string(),
            name: ROOT_CLASS_NAME.to_string(),
            display_name: ROOT_CLASS_NAME.to_string(),
            parent: None,
            is_abstract: true,
            requires_context: false,
            factory: None,
        };

        let mut by_name = HashMap::new();
        by_name.insert(
            (CORE_PLUGIN.to_string(), ROOT_CLASS_NAME.to_string()),
            ClassId(0),
        );

        let mut modules = HashMap::new();
        modules.insert(CORE_PLUGIN.to_string(), ModuleState::Loaded);

        Self {
            descriptors: vec![root],
            by_name,
            modules: Mutex::new(modules),
            loader,
        }
    }

    /// Id of the root descriptor.
    pub fn root(&self) -> ClassId {
        ClassId(0)
    }

    // ── Registration ────────────────────────────────────────────────────

    /// Add a descriptor. Fails if `(plugin, name)` is already taken.
    pub fn register_type(&mut self, registration: TypeRegistration) -> RegistryResult<ClassId> {
        let key = (registration.plugin.clone(), registration.name.clone());
        if self.by_name.contains_key(&key) {
            return Err(RegistryError::DuplicateType {
                plugin: registration.plugin,
                name: registration.name,
            });
        }

        let parent = registration.parent.unwrap_or(self.root());
        if self.descriptors.get(parent.index()).is_none() {
            return Err(RegistryError::InvalidParent {
                name: registration.name,
                reason: format!("{} is not registered", parent),
            });
        }

        let id = ClassId(self.descriptors.len() as u32);
        let display_name = registration
            .display_name
            .unwrap_or_else(|| registration.name.clone());

        self.modules
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(registration.plugin.clone())
            .or_insert(ModuleState::NotLoaded);

        tracing::trace!(
            "Registered type {}{}{} as {}",
            registration.plugin,
            TYPE_SEPARATOR,
            registration.name,
            id
        );

        self.descriptors.push(TypeDescriptor {
            id,
            plugin: registration.plugin,
            name: registration.name,
            display_name,
            parent: Some(parent),
            is_abstract: registration.is_abstract,
            requires_context: registration.requires_context,
            factory: registration.factory,
        });
        self.by_name.insert(key, id);

        Ok(id)
    }

    /// Mark a module as already resident so its types never trigger the loader.
    pub fn mark_module_loaded(&mut self, module: impl Into<String>) {
        self.modules
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.into(), ModuleState::Loaded);
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn descriptor(&self, id: ClassId) -> Option<&TypeDescriptor> {
        self.descriptors.get(id.index())
    }

    /// Number of registered descriptors, including the root.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.descriptors.iter()
    }

    pub fn lookup(&self, plugin: &str, name: &str) -> Option<ClassId> {
        self.by_name
            .get(&(plugin.to_string(), name.to_string()))
            .copied()
    }

    /// First type with the given class name in any plugin.
    pub fn find_by_name(&self, name: &str) -> Option<ClassId> {
        self.descriptors
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.id)
    }

    /// True if `class` is `base` or has `base` among its ancestors.
    pub fn is_derived_from(&self, class: ClassId, base: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            if id == base {
                return true;
            }
            current = self.descriptors.get(id.index()).and_then(|d| d.parent);
        }
        false
    }

    /// Every descriptor derived from `base` (including `base` itself), in
    /// registration order.
    pub fn list_subclasses(&self, base: ClassId, skip_abstract: bool) -> Vec<ClassId> {
        self.descriptors
            .iter()
            .filter(|d| !(skip_abstract && d.is_abstract))
            .filter(|d| self.is_derived_from(d.id, base))
            .map(|d| d.id)
            .collect()
    }

    /// Display name of a class, or `"<unknown>"`.
    pub fn class_name(&self, id: ClassId) -> &str {
        self.descriptor(id)
            .map(|d| d.display_name())
            .unwrap_or("<unknown>")
    }

    // ── Serialization ───────────────────────────────────────────────────

    /// `plugin::ClassName`
    pub fn encode_type(&self, id: ClassId) -> RegistryResult<String> {
        self.descriptor(id)
            .map(|d| d.qualified_name())
            .ok_or_else(|| RegistryError::UnknownType(id.to_string()))
    }

    pub fn decode_type(&self, encoded: &str) -> RegistryResult<ClassId> {
        let (plugin, name) = encoded.split_once(TYPE_SEPARATOR).ok_or_else(|| {
            RegistryError::Decode(format!("'{}' has no '{}' separator", encoded, TYPE_SEPARATOR))
        })?;

        if plugin.is_empty() || name.is_empty() || name.contains(TYPE_SEPARATOR) {
            return Err(RegistryError::Decode(format!(
                "'{}' is not of the form plugin{}ClassName",
                encoded, TYPE_SEPARATOR
            )));
        }

        self.lookup(plugin, name)
            .ok_or_else(|| RegistryError::UnknownType(encoded.to_string()))
    }

    // ── Instantiation ───────────────────────────────────────────────────

    /// Construct an instance of `id`.
    ///
    /// Loads the owning module first if it is not resident yet. Fails for
    /// abstract types, for types that need an engine context when none is
    /// given, and when the factory itself reports an error.
    pub fn create_instance(
        &self,
        id: ClassId,
        engine: Option<&EngineContext>,
    ) -> RegistryResult<RuntimeObject> {
        let descriptor = self
            .descriptor(id)
            .ok_or_else(|| RegistryError::UnknownType(id.to_string()))?;

        self.ensure_module_loaded(&descriptor.plugin)?;

        if descriptor.is_abstract {
            return Err(RegistryError::AbstractType(descriptor.qualified_name()));
        }

        if descriptor.requires_context && engine.is_none() {
            return Err(RegistryError::Instantiation {
                name: descriptor.qualified_name(),
                reason: "an engine context is required".to_string(),
            });
        }

        let factory = descriptor
            .factory
            .ok_or_else(|| RegistryError::Instantiation {
                name: descriptor.qualified_name(),
                reason: "no constructor is registered".to_string(),
            })?;

        let ctx = InstanceContext {
            registry: self,
            class: id,
            engine,
        };

        factory(&ctx).map_err(|reason| RegistryError::Instantiation {
            name: descriptor.qualified_name(),
            reason,
        })
    }

    /// Whether the module has been loaded (successfully).
    pub fn is_module_loaded(&self, module: &str) -> bool {
        let modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(modules.get(module), Some(ModuleState::Loaded))
    }

    fn ensure_module_loaded(&self, module: &str) -> RegistryResult<()> {
        let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        let state = modules
            .entry(module.to_string())
            .or_insert(ModuleState::NotLoaded);

        match state {
            ModuleState::Loaded => Ok(()),
            ModuleState::Failed(reason) => Err(RegistryError::ModuleLoad {
                module: module.to_string(),
                reason: reason.clone(),
            }),
            ModuleState::NotLoaded => {
                tracing::info!("Loading extension module '{}'", module);
                match self.loader.load(module) {
                    Ok(()) => {
                        *state = ModuleState::Loaded;
                        Ok(())
                    }
                    Err(reason) => {
                        tracing::warn!("Extension module '{}' failed to load: {}", module, reason);
                        *state = ModuleState::Failed(reason.clone());
                        Err(RegistryError::ModuleLoad {
                            module: module.to_string(),
                            reason,
                        })
                    }
                }
            }
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("descriptors", &self.descriptors.len())
            .finish()
    }
}

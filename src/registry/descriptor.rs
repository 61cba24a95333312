//! Runtime class descriptors and the objects their constructors produce.

use crate::context::EngineContext;
use crate::data::DataObject;
use crate::id::ClassId;
use crate::pipeline::delegation::ModifierDelegate;
use crate::pipeline::modifier::Modifier;
use crate::pipeline::source::DataSource;
use crate::registry::TypeRegistry;
use std::fmt;

/// Plugin id of the types that ship with the engine. Always considered loaded.
pub const CORE_PLUGIN: &str = "core";

/// Separator between plugin id and class name in encoded type references.
pub const TYPE_SEPARATOR: &str = "::";

/// Constructor stored in a descriptor.
///
/// Returns a human-readable reason on failure; the registry wraps it into
/// [`RegistryError::Instantiation`](crate::registry::RegistryError::Instantiation).
pub type Factory = fn(&InstanceContext<'_>) -> Result<RuntimeObject, String>;

/// Arguments handed to a [`Factory`].
pub struct InstanceContext<'a> {
    /// The registry performing the instantiation.
    pub registry: &'a TypeRegistry,
    /// Descriptor being instantiated.
    pub class: ClassId,
    /// Engine context, present when the caller supplied one.
    pub engine: Option<&'a EngineContext>,
}

impl<'a> InstanceContext<'a> {
    /// Engine context, or an error message for factories that cannot work without it.
    pub fn require_engine(&self) -> Result<&'a EngineContext, String> {
        self.engine
            .ok_or_else(|| "an engine context is required".to_string())
    }
}

/// A freshly constructed instance, tagged by the capability it provides.
pub enum RuntimeObject {
    Data(DataObject),
    Modifier(Box<dyn Modifier>),
    Delegate(Box<dyn ModifierDelegate>),
    Source(Box<dyn DataSource>),
}

impl RuntimeObject {
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeObject::Data(_) => "data object",
            RuntimeObject::Modifier(_) => "modifier",
            RuntimeObject::Delegate(_) => "modifier delegate",
            RuntimeObject::Source(_) => "data source",
        }
    }

    pub fn into_data(self) -> Option<DataObject> {
        match self {
            RuntimeObject::Data(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn into_modifier(self) -> Option<Box<dyn Modifier>> {
        match self {
            RuntimeObject::Modifier(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_delegate(self) -> Option<Box<dyn ModifierDelegate>> {
        match self {
            RuntimeObject::Delegate(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_source(self) -> Option<Box<dyn DataSource>> {
        match self {
            RuntimeObject::Source(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Debug for RuntimeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuntimeObject({})", self.kind())
    }
}

/// Describes one registered type: identity, ancestry and how to build it.
#[derive(Clone)]
pub struct TypeDescriptor {
    pub(crate) id: ClassId,
    pub(crate) plugin: String,
    pub(crate) name: String,
    pub(crate) display_name: String,
    pub(crate) parent: Option<ClassId>,
    pub(crate) is_abstract: bool,
    pub(crate) requires_context: bool,
    pub(crate) factory: Option<Factory>,
}

impl TypeDescriptor {
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Plugin (module) the type belongs to.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable name, defaults to the class name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Direct parent. `None` only for the root descriptor.
    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn requires_context(&self) -> bool {
        self.requires_context
    }

    /// `plugin::Name`
    pub fn qualified_name(&self) -> String {
        format!("{}{}{}", self.plugin, TYPE_SEPARATOR, self.name)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("name", &self.qualified_name())
            .field("parent", &self.parent)
            .field("abstract", &self.is_abstract)
            .finish()
    }
}

/// Input to [`TypeRegistry::register_type`].
///
/// ```ignore
/// let id = registry.register_type(
///     TypeRegistration::new("particles", "Particles")
///         .parent(container)
///         .factory(build_particles),
/// )?;
/// ```
#[derive(Clone)]
pub struct TypeRegistration {
    pub(crate) plugin: String,
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) parent: Option<ClassId>,
    pub(crate) is_abstract: bool,
    pub(crate) requires_context: bool,
    pub(crate) factory: Option<Factory>,
}

impl TypeRegistration {
    pub fn new(plugin: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            name: name.into(),
            display_name: None,
            parent: None,
            is_abstract: false,
            requires_context: false,
            factory: None,
        }
    }

    /// Parent type. Defaults to the registry root.
    pub fn parent(mut self, parent: ClassId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Instantiation fails unless an [`EngineContext`] is supplied.
    pub fn requires_context(mut self) -> Self {
        self.requires_context = true;
        self
    }

    pub fn factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }
}

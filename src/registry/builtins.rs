//! Registration of the types that ship with the engine.
//!
//! ```text
//! Object
//! ├── DataObject*
//! │   ├── Attribute
//! │   ├── Property
//! │   ├── PropertyContainer*
//! │   │   ├── Particles
//! │   │   └── Bonds
//! │   └── DataTable
//! ├── Modifier*
//! │   ├── ScalePropertyModifier
//! │   ├── DeleteSelectedModifier
//! │   └── HistogramModifier
//! ├── ModifierDelegate*
//! │   ├── ScaleDelegate*
//! │   │   ├── ParticlesScaleDelegate
//! │   │   └── BondsScaleDelegate
//! │   └── DeleteSelectedDelegate*
//! │       ├── ParticlesDeleteSelectedDelegate
//! │       └── BondsDeleteSelectedDelegate
//! └── DataSource*
//!     └── StaticSource
//! ```
//!
//! `*` marks abstract types.

use super::descriptor::{InstanceContext, RuntimeObject, TypeRegistration, CORE_PLUGIN};
use super::error::RegistryResult;
use super::TypeRegistry;
use crate::data::{AttributeValue, DataCollection, DataObject, DataTable, EmptyPayload, PropertyArray};
use crate::id::ClassId;
use crate::pipeline::modifiers::{delete_selected, histogram, scale};
use crate::pipeline::sources::StaticSource;

/// Ids of the built-in types, resolved once at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinClasses {
    pub data_object: ClassId,
    pub attribute: ClassId,
    pub property: ClassId,
    pub property_container: ClassId,
    pub particles: ClassId,
    pub bonds: ClassId,
    pub data_table: ClassId,

    pub modifier: ClassId,
    pub modifier_delegate: ClassId,
    pub scale_delegate: ClassId,
    pub particles_scale_delegate: ClassId,
    pub bonds_scale_delegate: ClassId,
    pub delete_selected_delegate: ClassId,
    pub particles_delete_selected_delegate: ClassId,
    pub bonds_delete_selected_delegate: ClassId,
    pub scale_property_modifier: ClassId,
    pub delete_selected_modifier: ClassId,
    pub histogram_modifier: ClassId,

    pub data_source: ClassId,
    pub static_source: ClassId,
}

fn core(name: &str) -> TypeRegistration {
    TypeRegistration::new(CORE_PLUGIN, name)
}

// ── Data object constructors ──

fn new_attribute(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    Ok(RuntimeObject::Data(DataObject::new(ctx.class, AttributeValue::Int(0))))
}

fn new_property(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    Ok(RuntimeObject::Data(DataObject::new(ctx.class, PropertyArray::default())))
}

fn new_container(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    Ok(RuntimeObject::Data(DataObject::new(ctx.class, EmptyPayload)))
}

fn new_data_table(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    Ok(RuntimeObject::Data(DataObject::new(ctx.class, DataTable::default())))
}

fn new_static_source(_ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    Ok(RuntimeObject::Source(Box::new(StaticSource::new(
        "Static source",
        DataCollection::new(),
    ))))
}

/// Register every built-in type under the `core` plugin.
///
/// Call once on a fresh registry, before any extension registrations.
pub fn register_all_builtins(registry: &mut TypeRegistry) -> RegistryResult<BuiltinClasses> {
    let data_object = registry.register_type(core("DataObject").abstract_type())?;
    let attribute = registry.register_type(
        core("Attribute")
            .parent(data_object)
            .display_name("Global attribute")
            .factory(new_attribute),
    )?;
    let property = registry.register_type(core("Property").parent(data_object).factory(new_property))?;
    let property_container = registry.register_type(
        core("PropertyContainer")
            .parent(data_object)
            .abstract_type(),
    )?;
    let particles = registry.register_type(
        core("Particles")
            .parent(property_container)
            .factory(new_container),
    )?;
    let bonds = registry.register_type(core("Bonds").parent(property_container).factory(new_container))?;
    let data_table = registry.register_type(
        core("DataTable")
            .parent(data_object)
            .display_name("Data table")
            .factory(new_data_table),
    )?;

    let modifier = registry.register_type(core("Modifier").abstract_type())?;
    let modifier_delegate = registry.register_type(core("ModifierDelegate").abstract_type())?;

    let scale_delegate = registry.register_type(
        core("ScaleDelegate")
            .parent(modifier_delegate)
            .abstract_type(),
    )?;
    let particles_scale_delegate = registry.register_type(
        core("ParticlesScaleDelegate")
            .parent(scale_delegate)
            .display_name("Particles")
            .factory(scale::create_particles_delegate),
    )?;
    let bonds_scale_delegate = registry.register_type(
        core("BondsScaleDelegate")
            .parent(scale_delegate)
            .display_name("Bonds")
            .factory(scale::create_bonds_delegate),
    )?;

    let delete_selected_delegate = registry.register_type(
        core("DeleteSelectedDelegate")
            .parent(modifier_delegate)
            .abstract_type(),
    )?;
    let particles_delete_selected_delegate = registry.register_type(
        core("ParticlesDeleteSelectedDelegate")
            .parent(delete_selected_delegate)
            .display_name("Particles")
            .factory(delete_selected::create_particles_delegate),
    )?;
    let bonds_delete_selected_delegate = registry.register_type(
        core("BondsDeleteSelectedDelegate")
            .parent(delete_selected_delegate)
            .display_name("Bonds")
            .factory(delete_selected::create_bonds_delegate),
    )?;

    let scale_property_modifier = registry.register_type(
        core(scale::SCALE_MODIFIER_NAME)
            .parent(modifier)
            .display_name("Scale property")
            .requires_context()
            .factory(scale::create_modifier),
    )?;
    let delete_selected_modifier = registry.register_type(
        core("DeleteSelectedModifier")
            .parent(modifier)
            .display_name("Delete selected")
            .requires_context()
            .factory(delete_selected::create_modifier),
    )?;
    let histogram_modifier = registry.register_type(
        core("HistogramModifier")
            .parent(modifier)
            .display_name("Histogram")
            .requires_context()
            .factory(histogram::create_modifier),
    )?;

    let data_source = registry.register_type(core("DataSource").abstract_type())?;
    let static_source = registry.register_type(
        core("StaticSource")
            .parent(data_source)
            .display_name("Static source")
            .factory(new_static_source),
    )?;

    tracing::debug!("Registered {} built-in types", registry.len() - 1);

    Ok(BuiltinClasses {
        data_object,
        attribute,
        property,
        property_container,
        particles,
        bonds,
        data_table,
        modifier,
        modifier_delegate,
        scale_delegate,
        particles_scale_delegate,
        bonds_scale_delegate,
        delete_selected_delegate,
        particles_delete_selected_delegate,
        bonds_delete_selected_delegate,
        scale_property_modifier,
        delete_selected_modifier,
        histogram_modifier,
        data_source,
        static_source,
    })
}

//! Built-in modifiers.
//!
//! - [`ScalePropertyModifier`]: multiplies a property, one delegate per container kind
//! - [`DeleteSelectedModifier`]: removes selected elements from every container kind
//! - [`HistogramModifier`]: bins a property on a background engine

pub mod delete_selected;
pub mod histogram;
pub mod scale;

pub use delete_selected::{ContainerDeleteSelectedDelegate, DeleteSelectedModifier, DeleteSelectedParams};
pub use histogram::{HistogramEngine, HistogramModifier};
pub use scale::{ContainerScaleDelegate, ScaleParams, ScalePropertyModifier};

use crate::data::DataCollection;
use crate::id::ClassId;
use crate::registry::{TypeRegistry, CORE_PLUGIN, TYPE_SEPARATOR};

/// Indices of the top-level objects of `class`.
fn container_indices(data: &DataCollection, registry: &TypeRegistry, class: ClassId) -> Vec<usize> {
    data.objects()
        .iter()
        .enumerate()
        .filter(|(_, obj)| obj.is_member(registry, class))
        .map(|(i, _)| i)
        .collect()
}

/// Resolve a core container class for a delegate factory.
fn lookup_container(registry: &TypeRegistry, name: &str) -> Result<ClassId, String> {
    registry
        .lookup(CORE_PLUGIN, name)
        .ok_or_else(|| format!("container type {}{}{} is not registered", CORE_PLUGIN, TYPE_SEPARATOR, name))
}

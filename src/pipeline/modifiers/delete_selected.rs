//! Delete selected modifier: removes every element whose selection flag is set.
//!
//! One delegate per container kind is instantiated and all applicable ones run
//! on each evaluation, so particles and bonds selected in the same input are
//! removed in one pass. The selection property is consumed.

use super::{container_indices, lookup_container};
use crate::data::PropertyArray;
use crate::id::ClassId;
use crate::pipeline::delegation::{ModifierDelegate, MultiDelegatingModifier};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::flow_state::PipelineFlowState;
use crate::pipeline::modifier::ModifierContext;
use crate::pipeline::status::PipelineStatus;
use crate::registry::{InstanceContext, RuntimeObject};
use std::any::Any;

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSelectedParams {
    /// Identifier of the selection property. Non-zero values mark elements for deletion.
    pub selection: String,
}

impl Default for DeleteSelectedParams {
    fn default() -> Self {
        Self {
            selection: "Selection".to_string(),
        }
    }
}

pub type DeleteSelectedModifier = MultiDelegatingModifier<DeleteSelectedParams>;

pub struct ContainerDeleteSelectedDelegate {
    class: ClassId,
    container: ClassId,
    container_name: String,
    applicable: [&'static str; 1],
}

impl ContainerDeleteSelectedDelegate {
    pub fn new(class: ClassId, container: ClassId, container_name: impl Into<String>, encoded: &'static str) -> Self {
        Self {
            class,
            container,
            container_name: container_name.into(),
            applicable: [encoded],
        }
    }
}

impl ModifierDelegate for ContainerDeleteSelectedDelegate {
    fn class(&self) -> ClassId {
        self.class
    }

    fn applicable_types(&self) -> &[&'static str] {
        &self.applicable
    }

    fn apply(
        &mut self,
        ctx: &ModifierContext<'_>,
        params: &dyn Any,
        state: &mut PipelineFlowState,
    ) -> PipelineResult<PipelineStatus> {
        let params = params
            .downcast_ref::<DeleteSelectedParams>()
            .ok_or_else(|| PipelineError::Compute("delete delegate received foreign parameters".into()))?;
        let registry = ctx.registry();
        let data = state.mutable_data();

        let mut deleted = 0usize;
        let mut total = 0usize;
        for index in container_indices(data, registry, self.container) {
            let Some((selection_index, keep)) = data.objects().get(index).and_then(|container| {
                let selection_index = container.sub_object_index(&params.selection)?;
                let selection = container.sub_objects()[selection_index].payload::<PropertyArray>()?;
                let keep: Vec<bool> = selection.component_iter(0).map(|v| v == 0.0).collect();
                Some((selection_index, keep))
            }) else {
                continue;
            };

            total += keep.len();
            deleted += keep.iter().filter(|&&k| !k).count();

            let Some(container) = data.make_mutable(index) else {
                continue;
            };
            container.replace_sub_object(selection_index, None);
            for i in 0..container.sub_objects().len() {
                if let Some(array) = container
                    .make_mutable_sub_object(i)
                    .and_then(|p| p.payload_mut::<PropertyArray>())
                {
                    array.retain_elements(&keep);
                }
            }
        }

        if total == 0 {
            return Ok(PipelineStatus::warning(format!(
                "No {} selection present.",
                self.container_name.to_lowercase()
            )));
        }
        Ok(PipelineStatus::success_with(format!(
            "Deleted {} of {} {} elements",
            deleted, total, self.container_name
        )))
    }
}

// ── Registry constructors ──

pub(crate) fn create_modifier(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    let engine = ctx.require_engine()?;
    let modifier = DeleteSelectedModifier::new(
        engine,
        "Delete selected",
        ctx.class,
        engine.classes().delete_selected_delegate,
        DeleteSelectedParams::default(),
    )
    .map_err(|e| e.to_string())?;
    Ok(RuntimeObject::Modifier(Box::new(modifier)))
}

pub(crate) fn create_particles_delegate(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    let container = lookup_container(ctx.registry, "Particles")?;
    Ok(RuntimeObject::Delegate(Box::new(ContainerDeleteSelectedDelegate::new(
        ctx.class,
        container,
        "Particles",
        "core::Particles",
    ))))
}

pub(crate) fn create_bonds_delegate(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    let container = lookup_container(ctx.registry, "Bonds")?;
    Ok(RuntimeObject::Delegate(Box::new(ContainerDeleteSelectedDelegate::new(
        ctx.class,
        container,
        "Bonds",
        "core::Bonds",
    ))))
}

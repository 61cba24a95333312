//! Scale property modifier: multiplies every value of a named property.
//!
//! The modifier itself only holds the parameters. The work is done by a
//! delegate bound to one container kind (particles or bonds); which one is
//! active is chosen by default selection from the configuration or assigned
//! explicitly.

use super::{container_indices, lookup_container};
use crate::data::PropertyArray;
use crate::id::ClassId;
use crate::pipeline::delegation::{DelegatingModifier, ModifierDelegate};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::flow_state::PipelineFlowState;
use crate::pipeline::modifier::ModifierContext;
use crate::pipeline::status::PipelineStatus;
use crate::registry::{InstanceContext, RuntimeObject};
use std::any::Any;

/// Registered class name of the modifier.
pub const SCALE_MODIFIER_NAME: &str = "ScalePropertyModifier";

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleParams {
    /// Identifier of the property inside each container.
    pub property: String,
    pub factor: f64,
}

impl Default for ScaleParams {
    fn default() -> Self {
        Self {
            property: "Position".to_string(),
            factor: 1.0,
        }
    }
}

pub type ScalePropertyModifier = DelegatingModifier<ScaleParams>;

/// Scales a property of every container of one class.
pub struct ContainerScaleDelegate {
    class: ClassId,
    container: ClassId,
    container_name: String,
    applicable: [&'static str; 1],
}

impl ContainerScaleDelegate {
    pub fn new(class: ClassId, container: ClassId, container_name: impl Into<String>, encoded: &'static str) -> Self {
        Self {
            class,
            container,
            container_name: container_name.into(),
            applicable: [encoded],
        }
    }
}

impl ModifierDelegate for ContainerScaleDelegate {
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
            .downcast_ref::<ScaleParams>()
            .ok_or_else(|| PipelineError::Compute("scale delegate received foreign parameters".into()))?;
        let registry = ctx.registry();
        let data = state.mutable_data();

        let mut scaled = 0usize;
        for index in container_indices(data, registry, self.container) {
            let Some(prop_index) = data
                .objects()
                .get(index)
                .and_then(|c| c.sub_object_index(&params.property))
            else {
                continue;
            };
            let Some(container) = data.make_mutable(index) else {
                continue;
            };
            let Some(array) = container
                .make_mutable_sub_object(prop_index)
                .and_then(|p| p.payload_mut::<PropertyArray>())
            else {
                continue;
            };
            for value in array.values_mut() {
                *value *= params.factor;
            }
            scaled += array.len();
        }

        if scaled == 0 {
            return Err(PipelineError::MissingData {
                class: "Property".to_string(),
                path: format!("{}/{}", self.container_name, params.property),
            });
        }

        Ok(PipelineStatus::success_with(format!(
            "Scaled '{}' of {} {} elements by {}",
            params.property, scaled, self.container_name, params.factor
        )))
    }
}

// ── Registry constructors ──

pub(crate) fn create_modifier(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    let engine = ctx.require_engine()?;
    let default = engine.config().default_delegates.get(SCALE_MODIFIER_NAME);
    let modifier = ScalePropertyModifier::with_default_delegate(
        engine,
        "Scale property",
        ctx.class,
        engine.classes().scale_delegate,
        default.map(String::as_str),
        ScaleParams::default(),
    )
    .map_err(|e| e.to_string())?;
    Ok(RuntimeObject::Modifier(Box::new(modifier)))
}

pub(crate) fn create_particles_delegate(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    let container = lookup_container(ctx.registry, "Particles")?;
    Ok(RuntimeObject::Delegate(Box::new(ContainerScaleDelegate::new(
        ctx.class,
        container,
        "Particles",
        "core::Particles",
    ))))
}

pub(crate) fn create_bonds_delegate(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    let container = lookup_container(ctx.registry, "Bonds")?;
    Ok(RuntimeObject::Delegate(Box::new(ContainerScaleDelegate::new(
        ctx.class,
        container,
        "Bonds",
        "core::Bonds",
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::EngineContext;
    use crate::data::{DataCollection, DataObject, EmptyPayload};
    use crate::id::NodeId;
    use crate::pipeline::time::TimeInterval;

    fn particles(engine: &EngineContext, positions: Vec<f64>) -> DataCollection {
        let c = engine.classes();
        let mut data = DataCollection::new();
        data.add_object(
            DataObject::new(c.particles, EmptyPayload)
                .with_identifier("particles")
                .with_sub_object(
                    DataObject::new(c.property, PropertyArray::vector(positions, 3))
                        .with_identifier("Position"),
                ),
        );
        data
    }

    #[test]
    fn test_scales_values_without_touching_input() {
        let engine = EngineContext::new(EngineConfig::default()).unwrap();
        let c = engine.classes();
        let input = particles(&engine, vec![1.0, 2.0, 3.0]);
        let mut state = PipelineFlowState::new(input.clone(), PipelineStatus::success(), TimeInterval::infinite());

        let mut delegate = ContainerScaleDelegate::new(c.particles_scale_delegate, c.particles, "Particles", "core::Particles");
        let params = ScaleParams {
            property: "Position".into(),
            factor: 2.0,
        };
        let ctx = ModifierContext::new(0, NodeId(1), &engine);
        let status = delegate.apply(&ctx, &params, &mut state).unwrap();
        assert!(status.text().contains("Scaled 'Position'"));

        let scaled = state
            .data()
            .unwrap()
            .get_object(engine.registry(), c.property, "particles/Position")
            .unwrap()
            .payload::<PropertyArray>()
            .unwrap();
        assert_eq!(scaled.values(), &[2.0, 4.0, 6.0]);

        let original = input
            .get_object(engine.registry(), c.property, "particles/Position")
            .unwrap()
            .payload::<PropertyArray>()
            .unwrap();
        assert_eq!(original.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_missing_property_is_reported() {
        let engine = EngineContext::new(EngineConfig::default()).unwrap();
        let c = engine.classes();
        let mut state = PipelineFlowState::new(
            particles(&engine, vec![1.0, 2.0, 3.0]),
            PipelineStatus::success(),
            TimeInterval::infinite(),
        );
        let mut delegate = ContainerScaleDelegate::new(c.particles_scale_delegate, c.particles, "Particles", "core::Particles");
        let params = ScaleParams {
            property: "Velocity".into(),
            factor: 2.0,
        };
        let ctx = ModifierContext::new(0, NodeId(1), &engine);
        let err = delegate.apply(&ctx, &params, &mut state).unwrap_err();
        assert!(matches!(err, PipelineError::MissingData { .. }));
    }

    #[test]
    fn test_default_delegate_from_config() {
        let engine = EngineContext::new(EngineConfig::default()).unwrap();
        let c = engine.classes();
        let modifier = engine
            .registry()
            .create_instance(c.scale_property_modifier, Some(&engine))
            .unwrap()
            .into_modifier()
            .unwrap();
        let modifier = modifier
            .as_any()
            .downcast_ref::<ScalePropertyModifier>()
            .unwrap();
        assert_eq!(modifier.delegate().unwrap().class(), c.particles_scale_delegate);
    }
}

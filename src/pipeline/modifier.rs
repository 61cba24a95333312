//! Modifiers: the transformation stages of a pipeline.

use super::error::PipelineResult;
use super::flow_state::PipelineFlowState;
use super::status::PipelineStatus;
use super::time::{TimeInterval, TimePoint};
use crate::concurrent::ComputeEngine;
use crate::context::EngineContext;
use crate::id::{ClassId, NodeId};
use crate::pipeline::delegation::ModifierDelegate;
use crate::pipeline::error::PipelineError;
use crate::registry::{BuiltinClasses, TypeRegistry};
use std::any::Any;

/// Everything a modifier may consult while evaluating.
#[derive(Clone, Copy)]
pub struct ModifierContext<'a> {
    /// Animation time being evaluated.
    pub time: TimePoint,
    /// Pipeline node the modifier is applied at. Objects it creates record this as their producer.
    pub node: NodeId,
    pub engine: &'a EngineContext,
}

impl<'a> ModifierContext<'a> {
    pub fn new(time: TimePoint, node: NodeId, engine: &'a EngineContext) -> Self {
        Self { time, node, engine }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.engine.registry()
    }

    pub fn classes(&self) -> &'a BuiltinClasses {
        self.engine.classes()
    }
}

/// Result of [`Modifier::evaluate`].
pub enum ModifierOutcome {
    /// The state was modified in place.
    Completed(PipelineStatus),
    /// Heavy work left to do in the background. The state stays untouched
    /// until the engine's results are emitted.
    Engine(Box<dyn ComputeEngine>),
}

impl std::fmt::Debug for ModifierOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModifierOutcome::Completed(status) => f.debug_tuple("Completed").field(status).finish(),
            ModifierOutcome::Engine(_) => f.write_str("Engine(..)"),
        }
    }
}

/// A transformation applied to the output of the upstream stage.
///
/// Modifiers run on the pipeline owner thread. Long computations return a
/// [`ComputeEngine`] from [`evaluate`](Modifier::evaluate) instead of
/// blocking.
pub trait Modifier: Send {
    fn title(&self) -> &str;

    /// Registered class of this modifier.
    fn class(&self) -> ClassId;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    /// Time span around `time` over which the modifier's own parameters stay constant.
    fn validity_interval(&self, _time: TimePoint) -> TimeInterval {
        TimeInterval::infinite()
    }

    /// Transform `state` in place.
    ///
    /// Content problems are reported through the returned status. An `Err`
    /// means the modifier could not run at all; the state is then discarded.
    fn evaluate(
        &mut self,
        ctx: &ModifierContext<'_>,
        state: &mut PipelineFlowState,
    ) -> PipelineResult<ModifierOutcome>;

    /// True if [`evaluate`](Modifier::evaluate) hands work to background engines.
    fn is_asynchronous(&self) -> bool {
        false
    }

    /// Replace the active delegate. Only delegating modifiers accept one.
    fn assign_delegate(&mut self, _delegate: Box<dyn ModifierDelegate>) -> PipelineResult<()> {
        Err(PipelineError::NotDelegating(self.title().to_string()))
    }

    /// Base class of the delegates this modifier accepts.
    fn delegate_base(&self) -> Option<ClassId> {
        None
    }

    /// Number of animation frames after this modifier, given the upstream count.
    fn number_of_source_frames(&self, input_frames: i32) -> i32 {
        input_frames
    }

    /// Animation time at which the upstream stage is asked for `time`.
    fn input_time(&self, time: TimePoint) -> TimePoint {
        time
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

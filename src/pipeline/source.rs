//! Head of a pipeline: the stage that produces the initial data collection.

use super::bridge::ChangeNotifier;
use super::flow_state::{EvaluationRequest, PipelineFlowState};
use super::time::TimePoint;
use crate::concurrent::SharedFuture;
use crate::context::EngineContext;
use crate::id::NodeId;
use std::any::Any;

/// Arguments handed to a [`DataSource`].
#[derive(Clone, Copy)]
pub struct SourceContext<'a> {
    pub node: NodeId,
    pub engine: &'a EngineContext,
}

/// Supplies the data collection at the head of a pipeline.
pub trait DataSource: Send {
    fn title(&self) -> &str;

    /// Full evaluation. The future may be resolved by another thread.
    fn evaluate(
        &mut self,
        ctx: &SourceContext<'_>,
        request: &EvaluationRequest,
    ) -> SharedFuture<PipelineFlowState>;

    /// Whatever can be produced immediately for `time`, without blocking.
    fn evaluate_preliminary(&mut self, ctx: &SourceContext<'_>, time: TimePoint) -> PipelineFlowState;

    /// Number of discrete frames this source provides.
    fn number_of_frames(&self) -> i32 {
        1
    }

    fn animation_time_to_source_frame(&self, _time: TimePoint) -> i32 {
        0
    }

    fn source_frame_to_animation_time(&self, _frame: i32) -> TimePoint {
        0
    }

    /// Called once when the source joins a pipeline. Sources whose content
    /// changes outside of pipeline calls report it through `notifier`.
    fn connect(&mut self, _notifier: ChangeNotifier) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

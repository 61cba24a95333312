//! Source serving one fixed data collection at every time.

use crate::concurrent::SharedFuture;
use crate::data::DataCollection;
use crate::pipeline::flow_state::{EvaluationRequest, PipelineFlowState};
use crate::pipeline::source::{DataSource, SourceContext};
use crate::pipeline::status::PipelineStatus;
use crate::pipeline::time::{TimeInterval, TimePoint};

/// Source holding one fixed collection, valid at every time.
pub struct StaticSource {
    title: String,
    state: PipelineFlowState,
}

impl StaticSource {
    pub fn new(title: impl Into<String>, data: DataCollection) -> Self {
        Self {
            title: title.into(),
            state: PipelineFlowState::new(data, PipelineStatus::success(), TimeInterval::infinite()),
        }
    }

    pub fn data(&self) -> Option<&DataCollection> {
        self.state.data()
    }

    /// Replace the collection. Callers owning the source through a pipeline
    /// must report the change so cached results are dropped.
    pub fn set_data(&mut self, data: DataCollection) {
        self.state.set_data(Some(data));
    }
}

impl DataSource for StaticSource {
    fn title(&self) -> &str {
        &self.title
    }

    fn evaluate(
        &mut self,
        _ctx: &SourceContext<'_>,
        _request: &EvaluationRequest,
    ) -> SharedFuture<PipelineFlowState> {
        SharedFuture::ready(Ok(self.state.clone()))
    }

    fn evaluate_preliminary(&mut self, _ctx: &SourceContext<'_>, _time: TimePoint) -> PipelineFlowState {
        self.state.clone()
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

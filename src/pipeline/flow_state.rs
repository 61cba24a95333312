//! Data passed from stage to stage.

use super::status::PipelineStatus;
use super::time::{TimeInterval, TimePoint};
use crate::data::{DataCollection, SharedRef};

/// Parameters of a single evaluation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationRequest {
    pub time: TimePoint,
    /// Skip downstream modifiers once an upstream stage reported an error.
    pub break_on_error: bool,
}

impl EvaluationRequest {
    pub fn at(time: TimePoint) -> Self {
        Self {
            time,
            break_on_error: false,
        }
    }

    pub fn with_break_on_error(mut self, enabled: bool) -> Self {
        self.break_on_error = enabled;
        self
    }
}

/// Output of a pipeline stage: data, status and the time span it is valid for.
///
/// The collection is shared; cloning a state is cheap and mutation goes
/// through [`mutable_data`](PipelineFlowState::mutable_data).
#[derive(Debug, Clone)]
pub struct PipelineFlowState {
    data: Option<SharedRef<DataCollection>>,
    status: PipelineStatus,
    validity: TimeInterval,
}

impl PipelineFlowState {
    pub fn new(data: DataCollection, status: PipelineStatus, validity: TimeInterval) -> Self {
        Self {
            data: Some(SharedRef::new(data)),
            status,
            validity,
        }
    }

    /// State without data, valid forever.
    pub fn empty() -> Self {
        Self {
            data: None,
            status: PipelineStatus::default(),
            validity: TimeInterval::infinite(),
        }
    }

    /// True if there is no data collection.
    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    pub fn data(&self) -> Option<&DataCollection> {
        self.data.as_deref()
    }

    /// Shared handle to the collection, for identity comparisons.
    pub fn data_ref(&self) -> Option<&SharedRef<DataCollection>> {
        self.data.as_ref()
    }

    /// Mutable collection, copied first if shared. Creates an empty one if missing.
    pub fn mutable_data(&mut self) -> &mut DataCollection {
        self.data
            .get_or_insert_with(|| SharedRef::new(DataCollection::new()))
            .make_mut()
    }

    pub fn set_data(&mut self, data: Option<DataCollection>) {
        self.data = data.map(SharedRef::new);
    }

    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    pub fn set_status(&mut self, status: PipelineStatus) {
        self.status = status;
    }

    /// Merge `status` into the current status.
    pub fn merge_status(&mut self, status: &PipelineStatus) {
        self.status.merge(status);
    }

    pub fn validity(&self) -> TimeInterval {
        self.validity
    }

    pub fn set_validity(&mut self, validity: TimeInterval) {
        self.validity = validity;
    }

    pub fn intersect_validity(&mut self, other: &TimeInterval) {
        self.validity.intersect(other);
    }
}

impl Default for PipelineFlowState {
    fn default() -> Self {
        Self::empty()
    }
}

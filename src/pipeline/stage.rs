//! Stages of a pipeline chain and their per-node bookkeeping.

use super::cache::EvaluationCache;
use super::modifier::Modifier;
use super::source::DataSource;
use super::status::{PipelineStatus, StatusType};
use crate::concurrent::ComputeEngine;
use crate::id::NodeId;

/// Lifecycle of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Just inserted; never evaluated and no delegate assigned.
    Uninitialized,
    /// Evaluated successfully or explicitly configured.
    Ready,
    /// Cached output was invalidated by a change upstream or in the stage itself.
    Stale,
}

/// A modifier inserted into a pipeline, plus the state it keeps there.
pub struct ModifierApplication {
    modifier: Box<dyn Modifier>,
    last_engine: Option<Box<dyn ComputeEngine>>,
    evaluations_in_progress: usize,
}

impl ModifierApplication {
    pub fn new(modifier: Box<dyn Modifier>) -> Self {
        Self {
            modifier,
            last_engine: None,
            evaluations_in_progress: 0,
        }
    }

    pub fn modifier(&self) -> &dyn Modifier {
        self.modifier.as_ref()
    }

    pub fn modifier_mut(&mut self) -> &mut dyn Modifier {
        self.modifier.as_mut()
    }

    /// Engine of the last completed background evaluation.
    pub fn last_engine_mut(&mut self) -> Option<&mut (dyn ComputeEngine + 'static)> {
        self.last_engine.as_deref_mut()
    }

    pub(crate) fn set_last_engine(&mut self, engine: Box<dyn ComputeEngine>) {
        self.last_engine = Some(engine);
    }

    pub(crate) fn clear_last_engine(&mut self) {
        self.last_engine = None;
    }

    pub fn evaluations_in_progress(&self) -> usize {
        self.evaluations_in_progress
    }

    pub(crate) fn begin_evaluation(&mut self) {
        self.evaluations_in_progress += 1;
    }

    pub(crate) fn end_evaluation(&mut self) {
        self.evaluations_in_progress = self.evaluations_in_progress.saturating_sub(1);
    }
}

/// What a stage does.
pub enum StageKind {
    Source(Box<dyn DataSource>),
    Modifier(ModifierApplication),
}

/// One node of a pipeline chain.
pub struct PipelineStage {
    pub(crate) kind: StageKind,
    /// Upstream stage. `None` for sources and detached modifiers.
    pub(crate) input: Option<NodeId>,
    pub(crate) cache: EvaluationCache,
    pub(crate) state: StageState,
    pub(crate) status: PipelineStatus,
    pub(crate) deleted: bool,
}

impl PipelineStage {
    pub(crate) fn new(kind: StageKind, input: Option<NodeId>) -> Self {
        Self {
            kind,
            input,
            cache: EvaluationCache::new(),
            state: StageState::Uninitialized,
            status: PipelineStatus::default(),
            deleted: false,
        }
    }

    pub fn kind(&self) -> &StageKind {
        &self.kind
    }

    pub fn input(&self) -> Option<NodeId> {
        self.input
    }

    pub fn cache(&self) -> &EvaluationCache {
        &self.cache
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn title(&self) -> &str {
        match &self.kind {
            StageKind::Source(source) => source.title(),
            StageKind::Modifier(app) => app.modifier().title(),
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self.kind, StageKind::Source(_))
    }

    pub fn modifier_application(&self) -> Option<&ModifierApplication> {
        match &self.kind {
            StageKind::Modifier(app) => Some(app),
            StageKind::Source(_) => None,
        }
    }

    pub(crate) fn modifier_application_mut(&mut self) -> Option<&mut ModifierApplication> {
        match &mut self.kind {
            StageKind::Modifier(app) => Some(app),
            StageKind::Source(_) => None,
        }
    }

    /// Status as reported outward: `Pending` while background evaluations run.
    pub fn status(&self) -> PipelineStatus {
        let mut status = self.status.clone();
        if self
            .modifier_application()
            .is_some_and(|app| app.evaluations_in_progress() > 0)
        {
            status.set_type(StatusType::Pending);
        }
        status
    }

    pub(crate) fn mark_stale(&mut self) {
        if self.state == StageState::Ready {
            self.state = StageState::Stale;
        }
    }
}

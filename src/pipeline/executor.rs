//! Pipeline executor: owns the stage chain, answers evaluation requests and
//! pumps background work.
//!
//! Stages live in an arena indexed by [`NodeId`]; each modifier stage points at
//! its upstream stage through `input`. All pipeline state is mutated on the
//! thread that owns the `Pipeline`. Background engines run on the shared
//! worker pool and report back through a channel drained by
//! [`Pipeline::process_events`].
//!
//! Two evaluation paths exist:
//! 1. [`Pipeline::evaluate_synchronous`]: blocking, best effort. Background
//!    engines are never started; asynchronous modifiers re-emit their last
//!    results instead.
//! 2. [`Pipeline::evaluate_pipeline`]: returns a [`SharedFuture`] that resolves
//!    once every stage, including background engines, has produced its final
//!    result. Requests for the same node and time share one future.

use super::bridge::{ChangeNotification, ChangeNotifier, ProgressSink};
use super::error::{PipelineError, PipelineResult};
use super::flow_state::{EvaluationRequest, PipelineFlowState};
use super::modifier::{Modifier, ModifierContext, ModifierOutcome};
use super::source::{DataSource, SourceContext};
use super::stage::{ModifierApplication, PipelineStage, StageKind, StageState};
use super::status::{PipelineStatus, StatusType};
use super::time::{TimeInterval, TimePoint};
use crate::concurrent::{Promise, SharedFuture, TaskEvent, TaskHandle, TaskOutcome};
use crate::context::EngineContext;
use crate::id::{ClassId, NodeId};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Status a disabled modifier reports.
pub const DISABLED_STATUS_TEXT: &str = "Modifier is currently disabled.";

enum JobPhase {
    /// Waiting for the upstream stage (or, for sources, the source itself).
    AwaitingInput(SharedFuture<PipelineFlowState>),
    /// Waiting for a background engine. `input` is the state it will patch.
    AwaitingEngine {
        task: TaskHandle,
        input: PipelineFlowState,
    },
}

/// One outstanding asynchronous evaluation of one node.
struct EvaluationJob {
    node: NodeId,
    request: EvaluationRequest,
    promise: Promise<PipelineFlowState>,
    /// Cache generation at start. Results are only cached if it still matches.
    generation: u64,
    phase: JobPhase,
}

impl EvaluationJob {
    fn is_ready(&self) -> bool {
        if self.promise.is_canceled() {
            return true;
        }
        match &self.phase {
            JobPhase::AwaitingInput(future) => future.is_finished(),
            JobPhase::AwaitingEngine { .. } => false,
        }
    }

    fn task(&self) -> Option<&TaskHandle> {
        match &self.phase {
            JobPhase::AwaitingEngine { task, .. } => Some(task),
            JobPhase::AwaitingInput(_) => None,
        }
    }
}

/// Input of a modifier after the common pre-processing.
enum Prepared {
    /// The modifier is skipped; the state is its output.
    PassThrough(PipelineFlowState),
    /// The modifier runs on this state.
    Apply(PipelineFlowState),
}

/// Clear non-error input status, then decide whether the modifier runs at all.
fn prepare_input(mut input: PipelineFlowState, break_on_error: bool, enabled: bool) -> Prepared {
    if input.status().status_type() != StatusType::Error {
        input.set_status(PipelineStatus::default());
    } else if break_on_error {
        return Prepared::PassThrough(input);
    }

    if !enabled || input.is_empty() {
        Prepared::PassThrough(input)
    } else {
        Prepared::Apply(input)
    }
}

fn modifier_context(title: &str) -> String {
    format!("Modifier '{}' reported", title)
}

/// A set of pipeline chains sharing one engine context.
pub struct Pipeline {
    stages: Vec<PipelineStage>,
    engine: Arc<EngineContext>,
    task_tx: Sender<TaskEvent>,
    task_rx: Receiver<TaskEvent>,
    change_tx: Sender<ChangeNotification>,
    change_rx: Receiver<ChangeNotification>,
    jobs: Vec<EvaluationJob>,
    sink: Option<Arc<dyn ProgressSink>>,
    poll_interval: Duration,
}

impl Pipeline {
    pub fn new(engine: Arc<EngineContext>) -> Self {
        let (task_tx, task_rx) = unbounded();
        let (change_tx, change_rx) = unbounded();
        let poll_interval = Duration::from_millis(engine.config().poll_interval_ms.max(1));
        Self {
            stages: Vec::new(),
            engine,
            task_tx,
            task_rx,
            change_tx,
            change_rx,
            jobs: Vec::new(),
            sink: None,
            poll_interval,
        }
    }

    pub fn engine(&self) -> &Arc<EngineContext> {
        &self.engine
    }

    /// Install an observer for progress and status updates.
    pub fn set_progress_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sink = Some(sink);
    }

    // ── Graph building ──

    /// Add a source as the head of a new chain.
    pub fn add_source(&mut self, mut source: Box<dyn DataSource>) -> NodeId {
        let id = NodeId(self.stages.len() as u32);
        source.connect(ChangeNotifier::new(self.change_tx.clone(), id));
        tracing::info!("Added source '{}' as {}", source.title(), id);
        self.stages
            .push(PipelineStage::new(StageKind::Source(source), None));
        id
    }

    /// Insert `modifier` downstream of `input`.
    pub fn add_modifier(&mut self, input: NodeId, modifier: Box<dyn Modifier>) -> PipelineResult<NodeId> {
        self.stage(input)?;
        let id = NodeId(self.stages.len() as u32);
        tracing::info!("Added modifier '{}' as {} (input {})", modifier.title(), id, input);
        self.stages.push(PipelineStage::new(
            StageKind::Modifier(ModifierApplication::new(modifier)),
            Some(input),
        ));
        Ok(id)
    }

    /// Instantiate a registered modifier class and insert it downstream of `input`.
    pub fn create_modifier(&mut self, input: NodeId, class: ClassId) -> PipelineResult<NodeId> {
        let object = self
            .engine
            .registry()
            .create_instance(class, Some(self.engine.as_ref()))?;
        let kind = object.kind();
        let modifier = object.into_modifier().ok_or_else(|| {
            PipelineError::Compute(format!(
                "'{}' is a {}, not a modifier",
                self.engine.registry().class_name(class),
                kind
            ))
        })?;
        self.add_modifier(input, modifier)
    }

    /// Reconnect a modifier to a different upstream stage, or detach it.
    pub fn set_input(&mut self, node: NodeId, input: Option<NodeId>) -> PipelineResult<()> {
        if self.stage(node)?.is_source() {
            return Err(PipelineError::InvalidNode(node));
        }
        if let Some(input) = input {
            self.stage(input)?;
            if input == node || self.upstream_chain(input).contains(&node) {
                return Err(PipelineError::CycleDetected);
            }
        }
        self.stages[node.index()].input = input;
        self.notify_target_changed(node, TimeInterval::infinite())
    }

    /// Remove a stage. Its dependents are reconnected to its input.
    ///
    /// Evaluations in flight for the stage are canceled.
    pub fn remove_stage(&mut self, node: NodeId) -> PipelineResult<()> {
        let input = self.stage(node)?.input;
        let dependents = self.dependents(node);

        self.cancel_evaluations(node)?;
        for &d in &dependents {
            self.stages[d.index()].input = input;
        }

        let stage = &mut self.stages[node.index()];
        stage.deleted = true;
        stage.cache.clear();
        tracing::info!("Removed stage '{}' ({})", stage.title(), node);

        for d in dependents {
            self.notify_target_changed(d, TimeInterval::infinite())?;
        }
        Ok(())
    }

    pub fn stage(&self, node: NodeId) -> PipelineResult<&PipelineStage> {
        self.stages
            .get(node.index())
            .filter(|s| !s.deleted)
            .ok_or(PipelineError::InvalidNode(node))
    }

    fn stage_mut(&mut self, node: NodeId) -> PipelineResult<&mut PipelineStage> {
        self.stages
            .get_mut(node.index())
            .filter(|s| !s.deleted)
            .ok_or(PipelineError::InvalidNode(node))
    }

    /// All live stages.
    pub fn stages(&self) -> impl Iterator<Item = (NodeId, &PipelineStage)> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.deleted)
            .map(|(i, s)| (NodeId(i as u32), s))
    }

    /// Head of the chain `node` belongs to, if it is a source.
    pub fn pipeline_source(&self, node: NodeId) -> Option<NodeId> {
        self.upstream_chain(node)
            .last()
            .copied()
            .filter(|&head| self.stages[head.index()].is_source())
    }

    /// `node` followed by every stage upstream of it.
    fn upstream_chain(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            // A valid chain never revisits a node; stop if it would.
            if chain.contains(&n) {
                break;
            }
            chain.push(n);
            current = self.stages.get(n.index()).and_then(|s| s.input);
        }
        chain
    }

    /// Stages that read directly from `node`.
    fn dependents(&self, node: NodeId) -> Vec<NodeId> {
        self.stages()
            .filter(|(_, s)| s.input == Some(node))
            .map(|(id, _)| id)
            .collect()
    }

    // ── Modifier configuration ──

    pub fn modifier(&self, node: NodeId) -> PipelineResult<&dyn Modifier> {
        self.stage(node)?
            .modifier_application()
            .map(ModifierApplication::modifier)
            .ok_or(PipelineError::InvalidNode(node))
    }

    /// Change a modifier's parameters. Cached results of the modifier and
    /// everything downstream are invalidated afterwards.
    pub fn update_modifier<M, R>(&mut self, node: NodeId, f: impl FnOnce(&mut M) -> R) -> PipelineResult<R>
    where
        M: Modifier + 'static,
    {
        let app = self
            .stage_mut(node)?
            .modifier_application_mut()
            .ok_or(PipelineError::InvalidNode(node))?;
        let modifier = app
            .modifier_mut()
            .as_any_mut()
            .downcast_mut::<M>()
            .ok_or(PipelineError::InvalidNode(node))?;
        let result = f(modifier);
        app.clear_last_engine();
        self.notify_target_changed(node, TimeInterval::infinite())?;
        Ok(result)
    }

    /// Change a source. Cached results downstream of it are invalidated afterwards.
    pub fn update_source<S, R>(&mut self, node: NodeId, f: impl FnOnce(&mut S) -> R) -> PipelineResult<R>
    where
        S: DataSource + 'static,
    {
        let stage = self.stage_mut(node)?;
        let StageKind::Source(source) = &mut stage.kind else {
            return Err(PipelineError::InvalidNode(node));
        };
        let source = source
            .as_any_mut()
            .downcast_mut::<S>()
            .ok_or(PipelineError::InvalidNode(node))?;
        let result = f(source);
        self.notify_target_changed(node, TimeInterval::infinite())?;
        Ok(result)
    }

    pub fn set_modifier_enabled(&mut self, node: NodeId, enabled: bool) -> PipelineResult<()> {
        let app = self
            .stage_mut(node)?
            .modifier_application_mut()
            .ok_or(PipelineError::InvalidNode(node))?;
        app.modifier_mut().set_enabled(enabled);
        if !enabled {
            self.set_status(node, PipelineStatus::success_with(DISABLED_STATUS_TEXT));
        }
        self.notify_target_changed(node, TimeInterval::infinite())
    }

    /// Instantiate the delegate class `class` and make it the modifier's delegate.
    ///
    /// `class` must derive from the modifier's delegate base type.
    pub fn assign_delegate(&mut self, node: NodeId, class: ClassId) -> PipelineResult<()> {
        let engine = Arc::clone(&self.engine);
        let registry = engine.registry();

        let modifier = self.modifier(node)?;
        let base = modifier
            .delegate_base()
            .ok_or_else(|| PipelineError::NotDelegating(modifier.title().to_string()))?;
        if !registry.is_derived_from(class, base) {
            return Err(PipelineError::IncompatibleDelegate {
                delegate: registry.class_name(class).to_string(),
                modifier: modifier.title().to_string(),
            });
        }

        let object = registry.create_instance(class, Some(engine.as_ref()))?;
        let kind = object.kind();
        let delegate = object.into_delegate().ok_or_else(|| {
            PipelineError::Compute(format!(
                "'{}' is a {}, not a modifier delegate",
                registry.class_name(class),
                kind
            ))
        })?;

        let stage = self.stage_mut(node)?;
        if let Some(app) = stage.modifier_application_mut() {
            app.modifier_mut().assign_delegate(delegate)?;
            app.clear_last_engine();
        }
        tracing::debug!("Assigned delegate '{}' to {}", registry.class_name(class), node);

        self.notify_target_changed(node, TimeInterval::infinite())?;
        self.stages[node.index()].state = StageState::Ready;
        Ok(())
    }

    // ── Status ──

    /// Current status of a stage; `Pending` while background work runs for it.
    pub fn stage_status(&self, node: NodeId) -> PipelineResult<PipelineStatus> {
        Ok(self.stage(node)?.status())
    }

    fn set_status(&mut self, node: NodeId, status: PipelineStatus) {
        if let Some(stage) = self.stages.get_mut(node.index()) {
            stage.status = status;
        }
        self.report_status(node);
    }

    fn report_status(&self, node: NodeId) {
        if let (Some(sink), Some(stage)) = (&self.sink, self.stages.get(node.index())) {
            sink.status(node, &stage.status());
        }
    }

    // ── Frame mapping ──

    /// Number of animation frames at `node`.
    pub fn number_of_source_frames(&self, node: NodeId) -> PipelineResult<i32> {
        let stage = self.stage(node)?;
        match &stage.kind {
            StageKind::Source(source) => Ok(source.number_of_frames()),
            StageKind::Modifier(app) => {
                let upstream = match stage.input {
                    Some(input) => self.number_of_source_frames(input)?,
                    None => 1,
                };
                let modifier = app.modifier();
                Ok(if modifier.is_enabled() {
                    modifier.number_of_source_frames(upstream)
                } else {
                    upstream
                })
            }
        }
    }

    /// Source frame displayed at animation `time` when viewing `node`.
    pub fn animation_time_to_source_frame(&self, node: NodeId, time: TimePoint) -> PipelineResult<i32> {
        let stage = self.stage(node)?;
        match &stage.kind {
            StageKind::Source(source) => Ok(source.animation_time_to_source_frame(time)),
            StageKind::Modifier(app) => {
                let modifier = app.modifier();
                let time = if modifier.is_enabled() {
                    modifier.input_time(time)
                } else {
                    time
                };
                match stage.input {
                    Some(input) => self.animation_time_to_source_frame(input, time),
                    None => Ok(0),
                }
            }
        }
    }

    /// Animation time at which the head of `node`'s chain shows `frame`.
    pub fn source_frame_to_animation_time(&self, node: NodeId, frame: i32) -> PipelineResult<TimePoint> {
        self.stage(node)?;
        Ok(match self.pipeline_source(node) {
            Some(head) => match &self.stages[head.index()].kind {
                StageKind::Source(source) => source.source_frame_to_animation_time(frame),
                StageKind::Modifier(_) => 0,
            },
            None => 0,
        })
    }

    // ── Invalidation ──

    /// Restrict the cached results of `node` to `keep`.
    ///
    /// Only `node` itself is affected; use
    /// [`notify_target_changed`](Self::notify_target_changed) to propagate.
    pub fn invalidate(&mut self, node: NodeId, keep: TimeInterval, reset_synchronous: bool) -> PipelineResult<()> {
        let stage = self.stage_mut(node)?;
        stage.cache.invalidate(keep, reset_synchronous);
        stage.mark_stale();
        tracing::debug!("Invalidated {} keeping {}", node, keep);
        Ok(())
    }

    /// The output of `node` changed over `changed`.
    ///
    /// Drops the affected part of the cached results of `node` and of every
    /// stage downstream of it. Propagation stops at stages that hold nothing
    /// overlapping `changed` and have no evaluation running for it.
    pub fn notify_target_changed(&mut self, node: NodeId, changed: TimeInterval) -> PipelineResult<()> {
        self.stage(node)?;

        let mut queue = VecDeque::from([node]);
        while let Some(current) = queue.pop_front() {
            let busy = self
                .jobs
                .iter()
                .any(|job| job.node == current && changed.contains(job.request.time));
            let stage = &mut self.stages[current.index()];
            let affected = busy || stage.cache.served_interval().overlaps(&changed);

            if current != node && !affected {
                tracing::trace!("Change propagation pruned at {}", current);
                continue;
            }

            stage.cache.invalidate_changed(&changed, false);
            stage.mark_stale();
            tracing::debug!("Invalidated {} over {}", current, changed);
            queue.extend(self.dependents(current));
        }
        Ok(())
    }

    /// Complete result cached for `node` at `time`.
    pub fn cached_state(&self, node: NodeId, time: TimePoint) -> Option<&PipelineFlowState> {
        self.stage(node).ok()?.cache.get_at(time)
    }

    // ── Synchronous evaluation ──

    /// Request parameters for `time` using the configured error policy.
    pub fn request(&self, time: TimePoint) -> EvaluationRequest {
        EvaluationRequest::at(time).with_break_on_error(self.engine.config().break_on_error)
    }

    /// Blocking, best-effort evaluation of `node` at `time`.
    ///
    /// Returns the complete cached result if valid, else the last preliminary
    /// result if valid, else recomputes the chain without starting background
    /// engines and stores the outcome as the new preliminary result.
    /// Modifier failures become an `Error` status on the unmodified input.
    pub fn evaluate_synchronous(&mut self, node: NodeId, time: TimePoint) -> PipelineResult<PipelineFlowState> {
        self.stage(node)?;
        let break_on_error = self.engine.config().break_on_error;
        Ok(self.preliminary_state(node, time, break_on_error))
    }

    fn preliminary_state(&mut self, node: NodeId, time: TimePoint, break_on_error: bool) -> PipelineFlowState {
        let stage = &self.stages[node.index()];
        if let Some(state) = stage.cache.get_at(time) {
            tracing::trace!("Synchronous cache hit for {} at {}", node, time);
            return state.clone();
        }
        if let Some(state) = stage.cache.preliminary_at(time) {
            tracing::trace!("Preliminary cache hit for {} at {}", node, time);
            return state.clone();
        }

        let upstream = match (stage.is_source(), stage.input) {
            (false, Some(input)) => self.preliminary_state(input, time, break_on_error),
            _ => PipelineFlowState::empty(),
        };

        let engine = Arc::clone(&self.engine);
        let stage = &mut self.stages[node.index()];
        let (state, status) = match &mut stage.kind {
            StageKind::Source(source) => {
                let ctx = SourceContext {
                    node,
                    engine: &engine,
                };
                let state = source.evaluate_preliminary(&ctx, time);
                let status = state.status().clone();
                (state, Some(status))
            }
            StageKind::Modifier(app) => {
                let ctx = ModifierContext::new(time, node, &engine);
                apply_preliminary(app, &ctx, upstream, break_on_error)
            }
        };

        stage.cache.set_preliminary(state.clone());
        if stage.state != StageState::Ready {
            stage.state = StageState::Ready;
        }
        if let Some(status) = status {
            self.set_status(node, status);
        }
        state
    }

    // ── Asynchronous evaluation ──

    /// Evaluate `node` completely, including background engines.
    ///
    /// Resolves immediately from the cache when possible. Otherwise joins the
    /// node's in-flight evaluation for the same time or starts a new one. The
    /// returned future is resolved by [`process_events`](Self::process_events)
    /// or [`wait`](Self::wait).
    pub fn evaluate_pipeline(
        &mut self,
        request: EvaluationRequest,
        node: NodeId,
    ) -> PipelineResult<SharedFuture<PipelineFlowState>> {
        let stage = self.stage(node)?;
        if let Some(state) = stage.cache.get_at(request.time) {
            tracing::trace!("Cache hit for {} at {}", node, request.time);
            return Ok(SharedFuture::ready(Ok(state.clone())));
        }
        if let Some(future) = stage.cache.in_flight(request.time) {
            tracing::trace!("Joining in-flight evaluation of {} at {}", node, request.time);
            return Ok(future);
        }

        tracing::debug!("Cache miss for {} at {}, evaluating", node, request.time);
        let upstream = match (stage.is_source(), stage.input) {
            (true, _) => {
                let engine = Arc::clone(&self.engine);
                let ctx = SourceContext {
                    node,
                    engine: &engine,
                };
                match &mut self.stages[node.index()].kind {
                    StageKind::Source(source) => source.evaluate(&ctx, &request),
                    StageKind::Modifier(_) => SharedFuture::ready(Ok(PipelineFlowState::empty())),
                }
            }
            (false, Some(input)) => self.evaluate_pipeline(request, input)?,
            (false, None) => SharedFuture::ready(Ok(PipelineFlowState::empty())),
        };

        let (promise, future) = Promise::new();
        let cache = &mut self.stages[node.index()].cache;
        let generation = cache.generation();
        cache.set_in_flight(request.time, future.clone());

        self.jobs.push(EvaluationJob {
            node,
            request,
            promise,
            generation,
            phase: JobPhase::AwaitingInput(upstream),
        });
        self.advance_jobs();
        Ok(future)
    }

    /// Evaluate `node` at `time` and block until the final result is available.
    pub fn evaluate(&mut self, node: NodeId, time: TimePoint) -> PipelineResult<PipelineFlowState> {
        let request = self.request(time);
        let future = self.evaluate_pipeline(request, node)?;
        self.wait(&future)
    }

    /// Pump events until `future` resolves.
    pub fn wait(&mut self, future: &SharedFuture<PipelineFlowState>) -> PipelineResult<PipelineFlowState> {
        loop {
            self.process_events();
            if let Some(result) = future.try_result() {
                return result;
            }
            match self.task_rx.recv_timeout(self.poll_interval) {
                Ok(event) => self.handle_task_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(PipelineError::Canceled),
            }
        }
    }

    /// True while evaluations are outstanding.
    pub fn has_pending_work(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Apply change notifications and background results, then advance every
    /// evaluation whose input became available. Never blocks.
    pub fn process_events(&mut self) {
        while let Ok(change) = self.change_rx.try_recv() {
            if let Err(e) = self.notify_target_changed(change.node, change.interval) {
                tracing::warn!("Ignoring change notification: {}", e);
            }
        }
        while let Ok(event) = self.task_rx.try_recv() {
            self.handle_task_event(event);
        }
        self.advance_jobs();
    }

    /// Cancel every evaluation running for `node`.
    pub fn cancel_evaluations(&mut self, node: NodeId) -> PipelineResult<()> {
        self.stage(node)?;
        let (canceled, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.jobs)
            .into_iter()
            .partition(|job| job.node == node);
        self.jobs = kept;
        for job in canceled {
            self.abandon_job(job);
        }
        Ok(())
    }

    fn advance_jobs(&mut self) -> bool {
        let mut progressed = false;
        while let Some(pos) = self.jobs.iter().position(EvaluationJob::is_ready) {
            let job = self.jobs.remove(pos);
            progressed = true;
            if job.promise.is_canceled() {
                tracing::debug!("Evaluation of {} at {} canceled by consumer", job.node, job.request.time);
                self.abandon_job(job);
                continue;
            }
            self.step_job(job);
        }
        progressed
    }

    /// Drop a job without a result. Its consumers observe `Canceled`.
    fn abandon_job(&mut self, job: EvaluationJob) {
        if let Some(task) = job.task() {
            task.cancel();
            if let Some(app) = self.stages[job.node.index()].modifier_application_mut() {
                app.end_evaluation();
            }
            self.report_status(job.node);
        }
        self.stages[job.node.index()]
            .cache
            .clear_in_flight(&job.promise.future());
    }

    fn step_job(&mut self, job: EvaluationJob) {
        let EvaluationJob {
            node,
            request,
            promise,
            generation,
            phase,
        } = job;

        let JobPhase::AwaitingInput(upstream) = phase else {
            return;
        };
        let result = upstream.try_result().unwrap_or(Err(PipelineError::Canceled));

        if self.stages[node.index()].is_source() {
            if let Ok(state) = &result {
                self.set_status(node, state.status().clone());
            }
            self.finish(node, promise, generation, result);
            return;
        }

        match result {
            Ok(input) => self.run_modifier(node, request, promise, generation, input),
            Err(e) if e.is_canceled() => self.finish(node, promise, generation, Err(e)),
            Err(e) => {
                let context = format!(
                    "Input of modifier '{}' failed",
                    self.stages[node.index()].title()
                );
                self.finish(node, promise, generation, Err(e.with_context(context)));
            }
        }
    }

    fn run_modifier(
        &mut self,
        node: NodeId,
        request: EvaluationRequest,
        promise: Promise<PipelineFlowState>,
        generation: u64,
        input: PipelineFlowState,
    ) {
        let engine = Arc::clone(&self.engine);
        let ctx = ModifierContext::new(request.time, node, &engine);

        let Some(app) = self.stages[node.index()].modifier_application_mut() else {
            self.finish(node, promise, generation, Err(PipelineError::InvalidNode(node)));
            return;
        };
        let modifier = app.modifier_mut();
        let mut state = match prepare_input(input, request.break_on_error, modifier.is_enabled()) {
            Prepared::PassThrough(state) => {
                self.finish(node, promise, generation, Ok(state));
                return;
            }
            Prepared::Apply(state) => state,
        };

        let title = modifier.title().to_string();
        let validity = modifier.validity_interval(request.time);
        match modifier.evaluate(&ctx, &mut state) {
            Ok(ModifierOutcome::Completed(status)) => {
                state.intersect_validity(&validity);
                state.merge_status(&status);
                self.set_status(node, status);
                self.finish(node, promise, generation, Ok(state));
            }
            Ok(ModifierOutcome::Engine(compute)) => {
                app.begin_evaluation();
                let task = engine.tasks().submit(compute, self.task_tx.clone());
                tracing::debug!("Modifier '{}' started background task {}", title, task.id());
                self.jobs.push(EvaluationJob {
                    node,
                    request,
                    promise,
                    generation,
                    phase: JobPhase::AwaitingEngine { task, input: state },
                });
                self.report_status(node);
            }
            Err(e) => {
                tracing::debug!("Modifier '{}' failed: {}", title, e);
                self.set_status(node, PipelineStatus::error(e.to_string()));
                self.finish(node, promise, generation, Err(e.with_context(modifier_context(&title))));
            }
        }
    }

    fn handle_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Progress { task, fraction, text } => {
                let node = self
                    .jobs
                    .iter()
                    .find(|job| job.task().is_some_and(|t| t.id() == task))
                    .map(|job| job.node);
                if let (Some(node), Some(sink)) = (node, &self.sink) {
                    sink.progress(node, fraction, text.as_deref());
                }
            }
            TaskEvent::Finished {
                task,
                engine: mut compute,
                outcome,
            } => {
                let Some(pos) = self
                    .jobs
                    .iter()
                    .position(|job| job.task().is_some_and(|t| t.id() == task))
                else {
                    tracing::trace!("Discarding results of abandoned task {}", task);
                    return;
                };
                let EvaluationJob {
                    node,
                    request,
                    promise,
                    generation,
                    phase,
                } = self.jobs.remove(pos);
                let JobPhase::AwaitingEngine { input, .. } = phase else {
                    return;
                };

                let engine = Arc::clone(&self.engine);
                let ctx = ModifierContext::new(request.time, node, &engine);
                let stage = &mut self.stages[node.index()];
                let current_generation = stage.cache.generation();
                let Some(app) = stage.modifier_application_mut() else {
                    return;
                };
                app.end_evaluation();
                let title = app.modifier().title().to_string();

                match outcome {
                    TaskOutcome::Succeeded => {
                        let mut state = input;
                        match compute.emit_results(&ctx, &mut state) {
                            Ok(status) => {
                                state.intersect_validity(&compute.validity());
                                state.intersect_validity(&app.modifier().validity_interval(request.time));
                                state.merge_status(&status);
                                if generation == current_generation {
                                    app.set_last_engine(compute);
                                }
                                tracing::debug!("Task {} of '{}' emitted its results", task, title);
                                self.set_status(node, status);
                                self.finish(node, promise, generation, Ok(state));
                            }
                            Err(e) => {
                                self.set_status(node, PipelineStatus::error(e.to_string()));
                                self.finish(node, promise, generation, Err(e.with_context(modifier_context(&title))));
                            }
                        }
                    }
                    TaskOutcome::Failed(e) => {
                        tracing::warn!("Task {} of '{}' failed: {}", task, title, e);
                        self.set_status(node, PipelineStatus::error(e.to_string()));
                        self.finish(node, promise, generation, Err(e.with_context(modifier_context(&title))));
                    }
                    TaskOutcome::Canceled => {
                        tracing::debug!("Task {} of '{}' was canceled", task, title);
                        self.report_status(node);
                        self.finish(node, promise, generation, Err(PipelineError::Canceled));
                    }
                }
            }
        }
    }

    /// Resolve a job. Successful results are cached if no invalidation happened since it started.
    fn finish(
        &mut self,
        node: NodeId,
        promise: Promise<PipelineFlowState>,
        generation: u64,
        result: PipelineResult<PipelineFlowState>,
    ) {
        if let Some(stage) = self.stages.get_mut(node.index()) {
            stage.cache.clear_in_flight(&promise.future());
            if let Ok(state) = &result {
                if stage.cache.insert(state.clone(), generation) {
                    stage.state = StageState::Ready;
                    tracing::trace!("Cached result of {} valid over {}", node, state.validity());
                } else {
                    tracing::debug!("Result of {} computed before the last invalidation, not cached", node);
                }
            }
        }
        promise.set(result);
    }
}

/// Preliminary application of one modifier. Returns the output state and the
/// new stage status (`None` leaves the status as is).
fn apply_preliminary(
    app: &mut ModifierApplication,
    ctx: &ModifierContext<'_>,
    input: PipelineFlowState,
    break_on_error: bool,
) -> (PipelineFlowState, Option<PipelineStatus>) {
    let modifier = app.modifier_mut();
    let mut state = match prepare_input(input, break_on_error, modifier.is_enabled()) {
        Prepared::PassThrough(state) => return (state, None),
        Prepared::Apply(state) => state,
    };

    // Shares the collection, so a failed evaluation can fall back to the untouched input.
    let original = state.clone();
    let title = modifier.title().to_string();
    let validity = modifier.validity_interval(ctx.time);

    let outcome = if modifier.is_asynchronous() {
        None
    } else {
        Some(modifier.evaluate(ctx, &mut state))
    };

    let result = match outcome {
        Some(Ok(ModifierOutcome::Completed(status))) => Ok(status),
        Some(Err(e)) => Err(e),
        Some(Ok(ModifierOutcome::Engine(_))) | None => match app.last_engine_mut() {
            Some(engine) => {
                state.intersect_validity(&engine.validity());
                engine.emit_results(ctx, &mut state)
            }
            None => Ok(PipelineStatus::pending(
                "Results are being computed in the background.",
            )),
        },
    };

    match result {
        Ok(status) => {
            state.intersect_validity(&validity);
            state.merge_status(&status);
            (state, Some(status))
        }
        Err(e) => {
            let mut state = original;
            state.set_status(PipelineStatus::error(format!(
                "{}: {}",
                modifier_context(&title),
                e
            )));
            (state, Some(PipelineStatus::error(e.to_string())))
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        for job in &self.jobs {
            if let Some(task) = job.task() {
                task.cancel();
            }
        }
    }
}

//! Instrumented sources, modifiers and engines

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use visflow::{
    concurrent::{ComputeEngine, SharedFuture, TaskContext},
    data::DataCollection,
    id::{ClassId, NodeId},
    pipeline::{
        ChangeNotifier, DataSource, EvaluationRequest, Modifier, ModifierContext, ModifierOutcome,
        PipelineError, PipelineFlowState, PipelineResult, PipelineStatus, ProgressSink,
        SourceContext, TimeInterval, TimePoint,
    },
};

// ── Sources ──

/// Static data source that counts its evaluations
pub struct CountingSource {
    pub data: DataCollection,
    pub validity: TimeInterval,
    pub status: PipelineStatus,
    pub evaluations: Arc<AtomicUsize>,
    pub notifier: Option<ChangeNotifier>,
}

impl CountingSource {
    pub fn new(data: DataCollection) -> Self {
        Self {
            data,
            validity: TimeInterval::infinite(),
            status: PipelineStatus::success(),
            evaluations: Arc::new(AtomicUsize::new(0)),
            notifier: None,
        }
    }

    pub fn with_status(mut self, status: PipelineStatus) -> Self {
        self.status = status;
        self
    }

    fn state(&self) -> PipelineFlowState {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        PipelineFlowState::new(self.data.clone(), self.status.clone(), self.validity)
    }
}

impl DataSource for CountingSource {
    fn title(&self) -> &str {
        "Counting source"
    }

    fn evaluate(&mut self, _ctx: &SourceContext<'_>, _request: &EvaluationRequest) -> SharedFuture<PipelineFlowState> {
        SharedFuture::ready(Ok(self.state()))
    }

    fn evaluate_preliminary(&mut self, _ctx: &SourceContext<'_>, _time: TimePoint) -> PipelineFlowState {
        self.state()
    }

    fn connect(&mut self, notifier: ChangeNotifier) {
        self.notifier = Some(notifier);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Synchronous modifiers ──

/// Modifier that records how often it ran and adds an `Evaluations` attribute
pub struct CountingModifier {
    pub title: String,
    pub enabled: bool,
    pub evaluations: Arc<AtomicUsize>,
    pub status: PipelineStatus,
    pub fail: bool,
    /// Validity reported for every time; `None` means valid forever
    pub validity: Option<TimeInterval>,
}

impl CountingModifier {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            enabled: true,
            evaluations: Arc::new(AtomicUsize::new(0)),
            status: PipelineStatus::success(),
            fail: false,
            validity: None,
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.evaluations)
    }
}

impl Modifier for CountingModifier {
    fn title(&self) -> &str {
        &self.title
    }

    fn class(&self) -> ClassId {
        ClassId::INVALID
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn validity_interval(&self, _time: TimePoint) -> TimeInterval {
        self.validity.unwrap_or_else(TimeInterval::infinite)
    }

    fn evaluate(&mut self, ctx: &ModifierContext<'_>, state: &mut PipelineFlowState) -> PipelineResult<ModifierOutcome> {
        let n = self.evaluations.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(PipelineError::Compute("counting modifier failed".into()));
        }
        let classes = ctx.classes();
        state
            .mutable_data()
            .add_attribute(ctx.registry(), classes.attribute, "Evaluations", n as i64, Some(ctx.node));
        Ok(ModifierOutcome::Completed(self.status.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Background engines ──

/// Test-side handle of a [`GatedModifier`]
pub struct GateControl {
    release: Sender<()>,
    started: Receiver<TimePoint>,
    finished: Receiver<bool>,
    pub emits: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
}

impl GateControl {
    /// Let one blocked engine finish its work
    pub fn release(&self) {
        let _ = self.release.send(());
    }

    /// Wait until an engine entered `perform`; returns the time it computes
    pub fn wait_started(&self) -> TimePoint {
        self.started
            .recv_timeout(super::test_timeout())
            .expect("engine did not start")
    }

    /// Wait until an engine left `perform`; true if it observed cancellation
    pub fn wait_finished(&self) -> bool {
        self.finished
            .recv_timeout(super::test_timeout())
            .expect("engine did not finish")
    }
}

/// Asynchronous modifier whose engines block until released.
///
/// Results are valid only at the evaluated time and add a `Gate.Time` attribute.
pub struct GatedModifier {
    enabled: bool,
    gate: Receiver<()>,
    started: Sender<TimePoint>,
    finished: Sender<bool>,
    emits: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl GatedModifier {
    pub fn new() -> (Self, GateControl) {
        let (release, gate) = unbounded();
        let (started_tx, started) = unbounded();
        let (finished_tx, finished) = unbounded();
        let emits = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(false));
        (
            Self {
                enabled: true,
                gate,
                started: started_tx,
                finished: finished_tx,
                emits: Arc::clone(&emits),
                fail: Arc::clone(&fail),
            },
            GateControl {
                release,
                started,
                finished,
                emits,
                fail,
            },
        )
    }
}

impl Modifier for GatedModifier {
    fn title(&self) -> &str {
        "Gated"
    }

    fn class(&self) -> ClassId {
        ClassId::INVALID
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn validity_interval(&self, time: TimePoint) -> TimeInterval {
        TimeInterval::instant(time)
    }

    fn is_asynchronous(&self) -> bool {
        true
    }

    fn evaluate(&mut self, ctx: &ModifierContext<'_>, _state: &mut PipelineFlowState) -> PipelineResult<ModifierOutcome> {
        Ok(ModifierOutcome::Engine(Box::new(GateEngine {
            time: ctx.time,
            gate: self.gate.clone(),
            started: self.started.clone(),
            finished: self.finished.clone(),
            emits: Arc::clone(&self.emits),
            fail: self.fail.load(Ordering::SeqCst),
        })))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct GateEngine {
    time: TimePoint,
    gate: Receiver<()>,
    started: Sender<TimePoint>,
    finished: Sender<bool>,
    emits: Arc<AtomicUsize>,
    fail: bool,
}

impl ComputeEngine for GateEngine {
    fn perform(&mut self, task: &TaskContext) -> PipelineResult<()> {
        let _ = self.started.send(self.time);
        loop {
            if task.is_canceled() {
                let _ = self.finished.send(true);
                return Err(PipelineError::Canceled);
            }
            match self.gate.recv_timeout(Duration::from_millis(2)) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => task.set_progress(0.5),
            }
        }
        let _ = self.finished.send(false);
        if self.fail {
            return Err(PipelineError::Compute("gate engine failed".into()));
        }
        Ok(())
    }

    fn emit_results(&mut self, ctx: &ModifierContext<'_>, state: &mut PipelineFlowState) -> PipelineResult<PipelineStatus> {
        self.emits.fetch_add(1, Ordering::SeqCst);
        let classes = ctx.classes();
        state
            .mutable_data()
            .add_attribute(ctx.registry(), classes.attribute, "Gate.Time", self.time as i64, Some(ctx.node));
        Ok(PipelineStatus::success_with("gate open"))
    }
}

// ── Sinks ──

/// Progress sink that records everything it receives
#[derive(Default)]
pub struct RecordingSink {
    pub progress: Mutex<Vec<(NodeId, f64)>>,
    pub statuses: Mutex<Vec<(NodeId, PipelineStatus)>>,
}

impl ProgressSink for RecordingSink {
    fn progress(&self, node: NodeId, fraction: f64, _text: Option<&str>) {
        self.progress.lock().unwrap().push((node, fraction));
    }

    fn status(&self, node: NodeId, status: &PipelineStatus) {
        self.statuses.lock().unwrap().push((node, status.clone()));
    }
}

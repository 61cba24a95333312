//! Background compute engines and the state they share with their owner.

use crate::id::TaskId;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::flow_state::PipelineFlowState;
use crate::pipeline::modifier::ModifierContext;
use crate::pipeline::status::PipelineStatus;
use crate::pipeline::time::TimeInterval;
use crossbeam_channel::Sender;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// A unit of heavy work computed off the pipeline owner thread.
///
/// [`perform`](ComputeEngine::perform) runs on a worker thread and must poll
/// [`TaskContext::is_canceled`] at bounded intervals. The results are spliced
/// into the pipeline state by [`emit_results`](ComputeEngine::emit_results),
/// which always runs on the owner thread and is never called for a canceled
/// or failed engine.
pub trait ComputeEngine: Send {
    fn perform(&mut self, task: &TaskContext) -> PipelineResult<()>;

    fn emit_results(
        &mut self,
        ctx: &ModifierContext<'_>,
        state: &mut PipelineFlowState,
    ) -> PipelineResult<PipelineStatus>;

    /// Time span over which the computed results stay valid.
    fn validity(&self) -> TimeInterval {
        TimeInterval::infinite()
    }
}

/// Lifecycle of a submitted engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Pending = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
    Canceled = 4,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EngineState::Pending,
            1 => EngineState::Running,
            2 => EngineState::Succeeded,
            3 => EngineState::Failed,
            _ => EngineState::Canceled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EngineState::Succeeded | EngineState::Failed | EngineState::Canceled
        )
    }
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(PipelineError),
    Canceled,
}

impl TaskOutcome {
    pub fn state(&self) -> EngineState {
        match self {
            TaskOutcome::Succeeded => EngineState::Succeeded,
            TaskOutcome::Failed(_) => EngineState::Failed,
            TaskOutcome::Canceled => EngineState::Canceled,
        }
    }
}

/// Messages sent from workers to the pipeline owner thread.
pub enum TaskEvent {
    Progress {
        task: TaskId,
        fraction: f64,
        text: Option<String>,
    },
    /// The engine travels back so its results can be emitted on the owner thread.
    Finished {
        task: TaskId,
        engine: Box<dyn ComputeEngine>,
        outcome: TaskOutcome,
    },
}

impl fmt::Debug for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskEvent::Progress {
                task,
                fraction,
                text,
            } => f
                .debug_struct("Progress")
                .field("task", task)
                .field("fraction", fraction)
                .field("text", text)
                .finish(),
            TaskEvent::Finished { task, outcome, .. } => f
                .debug_struct("Finished")
                .field("task", task)
                .field("outcome", outcome)
                .finish(),
        }
    }
}

#[derive(Debug)]
struct ControlInner {
    canceled: AtomicBool,
    state: AtomicU8,
}

/// Cancellation flag and lifecycle state shared by a task and its owner.
#[derive(Debug, Clone)]
pub struct TaskControl {
    inner: Arc<ControlInner>,
}

impl TaskControl {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ControlInner {
                canceled: AtomicBool::new(false),
                state: AtomicU8::new(EngineState::Pending as u8),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }
}

impl Default for TaskControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Handed to [`ComputeEngine::perform`].
pub struct TaskContext {
    id: TaskId,
    control: TaskControl,
    events: Sender<TaskEvent>,
    last_permille: AtomicU32,
}

impl TaskContext {
    pub(crate) fn new(id: TaskId, control: TaskControl, events: Sender<TaskEvent>) -> Self {
        Self {
            id,
            control,
            events,
            last_permille: AtomicU32::new(u32::MAX),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn is_canceled(&self) -> bool {
        self.control.is_canceled()
    }

    /// `Err(Canceled)` once cancellation was requested, for use with `?`.
    pub fn check_canceled(&self) -> PipelineResult<()> {
        if self.is_canceled() {
            Err(PipelineError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Report fractional progress in `[0, 1]`. Updates finer than 0.1% are dropped.
    pub fn set_progress(&self, fraction: f64) {
        let permille = (fraction.clamp(0.0, 1.0) * 1000.0) as u32;
        if self.last_permille.swap(permille, Ordering::Relaxed) == permille {
            return;
        }
        let _ = self.events.send(TaskEvent::Progress {
            task: self.id,
            fraction: fraction.clamp(0.0, 1.0),
            text: None,
        });
    }

    pub fn set_progress_text(&self, text: impl Into<String>) {
        let fraction = match self.last_permille.load(Ordering::Relaxed) {
            u32::MAX => 0.0,
            p => p as f64 / 1000.0,
        };
        let _ = self.events.send(TaskEvent::Progress {
            task: self.id,
            fraction,
            text: Some(text.into()),
        });
    }
}

//! Worker pool executing [`ComputeEngine::perform`] off the owner thread.

use super::task::{ComputeEngine, EngineState, TaskContext, TaskControl, TaskEvent, TaskOutcome};
use crate::id::TaskId;
use crate::pipeline::error::PipelineError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

struct Job {
    id: TaskId,
    engine: Box<dyn ComputeEngine>,
    control: TaskControl,
    events: Sender<TaskEvent>,
}

/// Owner-side handle of a submitted engine.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    control: TaskControl,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.control.is_canceled()
    }

    pub fn state(&self) -> EngineState {
        self.control.state()
    }
}

/// Fixed-size pool of worker threads fed from a shared job queue.
///
/// Completion is reported through the `events` sender supplied with each
/// submission, so several pipelines can share one pool while each receives
/// only its own events.
pub struct TaskManager {
    job_tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    next_id: AtomicU64,
}

impl TaskManager {
    /// Spawn `threads` workers (at least one).
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (job_tx, job_rx) = unbounded::<Job>();

        let workers = (0..threads)
            .filter_map(|index| {
                let rx = job_rx.clone();
                thread::Builder::new()
                    .name(format!("visflow-worker-{}", index))
                    .spawn(move || worker_loop(index, rx))
                    .map_err(|e| tracing::warn!("Failed to spawn worker {}: {}", index, e))
                    .ok()
            })
            .collect::<Vec<_>>();

        tracing::debug!("Task manager started with {} workers", workers.len());

        Self {
            job_tx: Some(job_tx),
            workers,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue `engine` for execution. Its completion is posted to `events`.
    pub fn submit(&self, engine: Box<dyn ComputeEngine>, events: Sender<TaskEvent>) -> TaskHandle {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let control = TaskControl::new();
        let handle = TaskHandle {
            id,
            control: control.clone(),
        };

        let job = Job {
            id,
            engine,
            control,
            events,
        };

        let rejected = match &self.job_tx {
            Some(tx) => tx.send(job).err().map(|e| e.into_inner()),
            None => Some(job),
        };

        // No worker left to run it: report as failed right away.
        if let Some(job) = rejected {
            tracing::warn!("Task {} rejected, worker pool is shut down", job.id);
            job.control.set_state(EngineState::Failed);
            let _ = job.events.send(TaskEvent::Finished {
                task: job.id,
                engine: job.engine,
                outcome: TaskOutcome::Failed(PipelineError::Compute(
                    "worker pool is shut down".to_string(),
                )),
            });
        }

        handle
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        // Closing the queue lets every worker finish its current job and exit.
        self.job_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        tracing::debug!("Task manager stopped");
    }
}

fn worker_loop(index: usize, jobs: Receiver<Job>) {
    while let Ok(job) = jobs.recv() {
        run_job(job);
    }
    tracing::trace!("Worker {} stopped", index);
}

fn run_job(job: Job) {
    let Job {
        id,
        mut engine,
        control,
        events,
    } = job;

    let outcome = if control.is_canceled() {
        TaskOutcome::Canceled
    } else {
        control.set_state(EngineState::Running);
        tracing::debug!("Task {} running", id);
        let ctx = TaskContext::new(id, control.clone(), events.clone());

        match catch_unwind(AssertUnwindSafe(|| engine.perform(&ctx))) {
            Ok(Ok(())) if control.is_canceled() => TaskOutcome::Canceled,
            Ok(Ok(())) => TaskOutcome::Succeeded,
            Ok(Err(e)) if e.is_canceled() || control.is_canceled() => TaskOutcome::Canceled,
            Ok(Err(e)) => TaskOutcome::Failed(e),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                TaskOutcome::Failed(PipelineError::Compute(format!(
                    "compute engine panicked: {}",
                    message
                )))
            }
        }
    };

    control.set_state(outcome.state());
    tracing::debug!("Task {} finished: {:?}", id, outcome.state());

    // The owner may already be gone; nothing left to notify then.
    let _ = events.send(TaskEvent::Finished {
        task: id,
        engine,
        outcome,
    });
}

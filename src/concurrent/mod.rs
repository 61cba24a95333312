//! Background execution: shared futures, compute engines and the worker pool.
//!
//! Engines run [`ComputeEngine::perform`] on a worker thread. Completion is
//! posted back as a [`TaskEvent`] over a channel owned by the pipeline, which
//! emits the results on its own thread.

pub mod future;
pub mod manager;
pub mod task;

pub use future::{Promise, SharedFuture};
pub use manager::{TaskHandle, TaskManager};
pub use task::{ComputeEngine, EngineState, TaskContext, TaskControl, TaskEvent, TaskOutcome};

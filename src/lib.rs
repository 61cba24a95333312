//! # visflow: cached data pipelines for scientific visualization
//!
//! A pipeline engine that turns a source data collection into a processed
//! result through a chain of modifiers, caching each stage's output over the
//! animation time span it stays valid for. Heavy modifiers run on a
//! background worker pool and splice their results back on the thread that
//! owns the pipeline.
//!
//! ## Architecture
//!
//! - **Registry**: runtime type descriptors with single inheritance, lazy
//!   extension loading and `plugin::Name` encoding
//! - **Data**: copy-on-write data objects grouped into collections
//! - **Pipeline**: stage chain, per-stage evaluation cache, delegation and the executor
//! - **Concurrent**: shared futures, cancellable compute engines and the worker pool
//!
//! ## Configuration
//!
//! Engine settings are read from `engine.toml` in the platform-appropriate
//! data directory under `dev.visflow.engine`:
//!
//! - **Linux**: `~/.local/share/dev.visflow.engine/`
//! - **macOS**: `~/Library/Application Support/dev.visflow.engine/`
//! - **Windows**: `%APPDATA%\dev.visflow.engine\`
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use visflow::{config::EngineConfig, context::EngineContext, pipeline::Pipeline};
//!
//! let engine = Arc::new(EngineContext::new(EngineConfig::load_or_default())?);
//! let classes = *engine.classes();
//! let mut pipeline = Pipeline::new(Arc::clone(&engine));
//!
//! let source = pipeline.add_source(Box::new(my_source));
//! let scale = pipeline.create_modifier(source, classes.scale_property_modifier)?;
//!
//! // Fast preview, then the complete result
//! let preview = pipeline.evaluate_synchronous(scale, 0)?;
//! let state = pipeline.evaluate(scale, 0)?;
//! ```

pub mod concurrent;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod registry;

// Re-export commonly used types
pub use config::EngineConfig;
pub use context::EngineContext;
pub use data::{DataCollection, DataObject, SharedRef};
pub use error::{EngineError, EngineResult, ResultExt};
pub use id::{ClassId, NodeId, TaskId};
pub use pipeline::{Pipeline, PipelineError, PipelineFlowState, PipelineResult, PipelineStatus, TimeInterval};
pub use registry::{TypeRegistration, TypeRegistry};

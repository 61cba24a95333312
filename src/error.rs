//! Error handling for visflow
//!
//! This module defines the crate-level error type and a Result alias used by
//! the outer surfaces (configuration, engine context setup, the demo binary).
//! Layer-specific errors live next to their layer:
//!
//! - [`RegistryError`](crate::registry::RegistryError) for type registration and instantiation
//! - [`PipelineError`](crate::pipeline::PipelineError) for evaluation and delegation

use crate::pipeline::PipelineError;
use crate::registry::RegistryError;
use thiserror::Error;

/// Main error type for visflow operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Errors raised by the runtime type registry
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Errors raised while evaluating a pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EngineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for visflow operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> EngineResult<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for EngineResult<T> {
    fn context(self, context: impl Into<String>) -> EngineResult<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> EngineResult<T> {
        self.map_err(|e| EngineError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| EngineError::from(e).with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, RegistryError> {
    fn context(self, context: impl Into<String>) -> EngineResult<T> {
        self.map_err(|e| EngineError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| EngineError::from(e).with_context(f()))
    }
}
